use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strata_core::auth::Policy;
use strata_core::driver::AuthDriver;
use strata_core::error::ApiError;
use strata_core::query::SearchQuery;
use strata_core::schema::SchemaInfo;
use strata_tier::TierCoordinator;

use crate::gate::AuthGate;

/// The two cooperative background loops that keep authorization fresh:
///
/// - the **policy snapshot loop** re-reads every policy row through the
///   coordinator and pushes the set to the auth driver (and back into the
///   faster tiers);
/// - the **invalidation loop** clears the process-local token memo so
///   revocations propagate within one interval.
///
/// Both loops log failures and keep running; they exit when the shutdown
/// token fires.
pub struct PolicyRefresher {
    coordinator: Arc<TierCoordinator>,
    gate: Arc<AuthGate>,
    driver: Arc<dyn AuthDriver>,
    policy_schema: Arc<SchemaInfo>,
    rbac_interval: Duration,
    info_interval: Duration,
}

impl PolicyRefresher {
    pub fn new(
        coordinator: Arc<TierCoordinator>,
        gate: Arc<AuthGate>,
        driver: Arc<dyn AuthDriver>,
        policy_schema: Arc<SchemaInfo>,
        rbac_interval: Duration,
        info_interval: Duration,
    ) -> Self {
        PolicyRefresher {
            coordinator,
            gate,
            driver,
            policy_schema,
            rbac_interval,
            info_interval,
        }
    }

    /// One pass of the policy snapshot loop. Returns the number of
    /// policies pushed (zero rows found pushes nothing).
    pub async fn refresh_policies(&self) -> Result<usize, ApiError> {
        let rows = self
            .coordinator
            .search(&self.policy_schema, &SearchQuery::default(), false)
            .await?;
        let policies: Vec<Policy> = rows
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect();
        if policies.is_empty() {
            return Ok(0);
        }
        self.driver
            .refresh_rbacs(&policies)
            .await
            .map_err(ApiError::from)?;
        self.coordinator.backfill_upsert(&self.policy_schema, rows);
        debug!(count = policies.len(), "policy snapshot refreshed");
        Ok(policies.len())
    }

    /// Spawn both loops. They stop when `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let snapshot = {
            let refresher = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(refresher.rbac_interval);
                // First refresh lands one interval after startup.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = refresher.refresh_policies().await {
                                warn!(error = %e, "policy snapshot refresh failed");
                            }
                        }
                    }
                }
            })
        };

        let invalidation = {
            let refresher = self;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(refresher.info_interval);
                // The immediate first tick would clear a memo that is
                // necessarily empty at startup; skip it.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            refresher.gate.invalidate();
                            debug!("auth info memo cleared");
                        }
                    }
                }
            })
        };

        vec![snapshot, invalidation]
    }
}
