use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use strata_core::auth::AuthInfo;
use strata_core::driver::AuthDriver;
use strata_core::error::ApiError;
use strata_core::query::SearchQuery;
use strata_core::filter::Filter;
use strata_core::schema::{AuthLevel, CrudVerb, SchemaInfo};

use crate::ttl::TtlCache;

/// Header carrying the tenant key.
const ORGANIZATION: &str = "organization";
/// Accepted alias for [`ORGANIZATION`].
const REALM: &str = "realm";

/// Bearer credentials extracted from a request.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub token: Option<String>,
    pub realm: String,
}

impl Credentials {
    /// Pull the bearer token and tenant key out of the request headers. A
    /// missing tenant header falls back to the configured default realm.
    pub fn from_headers(headers: &HeaderMap, default_realm: &str) -> Self {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                let (scheme, token) = value.split_once(' ')?;
                scheme
                    .eq_ignore_ascii_case("bearer")
                    .then(|| token.trim().to_string())
            });
        let realm = headers
            .get(ORGANIZATION)
            .or_else(|| headers.get(REALM))
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(default_realm)
            .to_string();
        Credentials { token, realm }
    }
}

/// Per-request authorization: token resolution with a process-local memo,
/// ACL and ownership checks, and tenant scoping of reads and writes.
///
/// Memoized tokens age out at the configured TTL; the invalidation loop
/// additionally clears the whole memo on its own interval, which bounds
/// how stale a revoked token can be.
pub struct AuthGate {
    driver: Arc<dyn AuthDriver>,
    memo: TtlCache<String, Arc<AuthInfo>>,
}

impl AuthGate {
    pub fn new(driver: Arc<dyn AuthDriver>, memo_ttl: Duration) -> Self {
        AuthGate {
            driver,
            memo: TtlCache::new(memo_ttl),
        }
    }

    /// Resolve the bearer token: process-local memo first, then the driver
    /// (which consults the shared store and the identity provider).
    pub async fn authenticate(&self, creds: &Credentials) -> Result<Arc<AuthInfo>, ApiError> {
        let Some(token) = creds.token.as_deref() else {
            return Err(ApiError::Unauthorized("missing bearer token".into()));
        };
        let key = format!("{}:{token}", creds.realm);
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit);
        }
        match self.driver.authenticate(token, &creds.realm).await {
            Ok(Some(info)) => {
                debug!(realm = %creds.realm, username = %info.username, "token resolved");
                let info = Arc::new(info);
                self.memo.insert(key, info.clone());
                Ok(info)
            }
            Ok(None) => Err(ApiError::Unauthorized("invalid or expired token".into())),
            Err(e) if e.is_lookup() => Err(ApiError::Unauthorized(e.to_string())),
            Err(e) => {
                warn!(error = %e, "identity backend failed");
                Err(ApiError::ServiceUnavailable(e.to_string()))
            }
        }
    }

    /// Enforce the schema's auth level for a verb. Token existence is
    /// already proven by [`authenticate`](Self::authenticate); this checks
    /// the ACL tiers.
    pub fn authorize(
        &self,
        info: &AuthInfo,
        verb: CrudVerb,
        schema: &SchemaInfo,
    ) -> Result<(), ApiError> {
        match schema.auth {
            AuthLevel::Free | AuthLevel::Token => Ok(()),
            AuthLevel::Acl | AuthLevel::Owner => {
                if info.allows(verb, &schema.sref) {
                    Ok(())
                } else {
                    Err(ApiError::Forbidden(format!(
                        "{} is not allowed to {} {}",
                        info.username,
                        verb.as_str(),
                        schema.sref
                    )))
                }
            }
        }
    }

    /// Scope a search/count query to the caller: the tenant clause always,
    /// the ownership clause at the per-owner level (admins excepted).
    pub fn scope_query(&self, info: &AuthInfo, schema: &SchemaInfo, query: &mut SearchQuery) {
        query.and_filter(Filter::eq("org", info.realm.clone()));
        if schema.auth == AuthLevel::Owner && !info.admin {
            query.and_filter(Filter::eq("owner", info.username.clone()));
        }
    }

    /// Post-check a single fetched row against the caller. A foreign
    /// tenant's row reads as absent; a foreign owner's row is forbidden at
    /// the per-owner level.
    pub fn scope_row(
        &self,
        info: &AuthInfo,
        schema: &SchemaInfo,
        row: &Value,
    ) -> Result<(), ApiError> {
        let org = row.get("org").and_then(Value::as_str).unwrap_or_default();
        if org != info.realm {
            return Err(ApiError::NotFound(format!("{}", schema.sref)));
        }
        if schema.auth == AuthLevel::Owner && !info.admin {
            let owner = row.get("owner").and_then(Value::as_str).unwrap_or_default();
            if !info.check_account(info.realm.as_str(), owner) {
                return Err(ApiError::Forbidden(format!(
                    "{} does not own this {}",
                    info.username, schema.name
                )));
            }
        }
        Ok(())
    }

    /// Drop every memoized token, forcing re-resolution on next touch.
    pub fn invalidate(&self) {
        self.memo.clear();
    }

    /// Number of memoized tokens (used by the invalidation loop tests).
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}
