//! Reference resolution: dereference `(sref, uref)` pairs into full
//! entities by calling the owning service.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde_json::Value;
use tracing::debug;

use strata_core::error::ApiError;
use strata_core::model::Reference;

use crate::service::AppState;

/// The caller's auth headers, forwarded verbatim on the outbound request.
#[derive(Clone, Debug, Default)]
pub struct AuthHeaders {
    pub authorization: Option<String>,
    pub organization: Option<String>,
}

impl AuthHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pick = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        AuthHeaders {
            authorization: pick(AUTHORIZATION.as_str()),
            organization: pick("organization"),
        }
    }
}

/// Resolve a reference into the full entity.
///
/// The sref must be registered, readable (`R` in crud), and owned by a
/// remote provider; the entity is fetched with the caller's auth headers
/// and returned as delivered.
pub async fn resolve(
    app: &AppState,
    reference: &Reference,
    auth: &AuthHeaders,
) -> Result<Value, ApiError> {
    let schema = app
        .registry()
        .by_sref(&reference.sref)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown sref '{}'", reference.sref)))?;

    if !schema.crud.read {
        return Err(ApiError::MethodNotAllowed(format!(
            "{} is not readable",
            schema.sref
        )));
    }
    if schema.is_local() {
        return Err(ApiError::BadRequest(format!(
            "{} has no remote provider",
            schema.sref
        )));
    }

    let url = format!("{}{}", schema.provider, reference.uref);
    debug!(%url, "resolving reference");
    let mut request = app.http().get(&url);
    if let Some(authorization) = &auth.authorization {
        request = request.header(AUTHORIZATION.as_str(), authorization);
    }
    if let Some(organization) = &auth.organization {
        request = request.header("organization", organization);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("provider unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            401 => ApiError::Unauthorized(format!("provider rejected {url}")),
            403 => ApiError::Forbidden(format!("provider rejected {url}")),
            404 => ApiError::NotFound(format!("{url}")),
            _ => ApiError::ServiceUnavailable(format!("provider returned {status} for {url}")),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ApiError::BadRequest(format!("provider returned a bad body: {e}")))
}
