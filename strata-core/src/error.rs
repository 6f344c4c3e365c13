use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// HTTP-facing error returned by route handlers.
///
/// Serialized as `{"message": "<text>"}` with the matching status code.
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    MethodNotAllowed(String),
    Conflict(String),
    NotImplemented(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::MethodNotAllowed(msg)
            | ApiError::Conflict(msg)
            | ApiError::NotImplemented(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.message() });
        (self.status(), axum::Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status(), self.message())
    }
}

impl std::fmt::Debug for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

/// Error raised by a storage or auth driver.
///
/// The variant is behaviorally significant to the tier coordinator:
///
/// - [`Lookup`](DriverError::Lookup): the request itself is malformed for
///   that backend (an untranslatable filter, a bad payload). Surfaces as
///   `400 Bad Request` and never triggers a tier fallback.
/// - [`NotFound`](DriverError::NotFound): the target row is definitively
///   absent at the backend.
/// - [`Conflict`](DriverError::Conflict): a primary write was rejected
///   (duplicate id, or an update against a missing/soft-deleted row).
/// - [`Backend`](DriverError::Backend): anything else (connection loss,
///   backend-side failure). Triggers the documented fallback; when no
///   fallback produces a result, surfaces as `503 Service Unavailable`.
#[derive(Clone)]
pub enum DriverError {
    Lookup(String),
    NotFound(String),
    Conflict(String),
    Backend(String),
}

/// Result alias used throughout the driver interfaces.
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Construct a `Backend` variant from any error type.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        DriverError::Backend(err.to_string())
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, DriverError::Lookup(_))
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Lookup(msg) => write!(f, "lookup error: {msg}"),
            DriverError::NotFound(msg) => write!(f, "not found: {msg}"),
            DriverError::Conflict(msg) => write!(f, "conflict: {msg}"),
            DriverError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::fmt::Debug for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for DriverError {}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Lookup(err.to_string())
    }
}

impl From<DriverError> for ApiError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Lookup(msg) => ApiError::BadRequest(msg),
            DriverError::NotFound(msg) => ApiError::NotFound(msg),
            DriverError::Conflict(msg) => ApiError::Conflict(msg),
            DriverError::Backend(msg) => ApiError::ServiceUnavailable(msg),
        }
    }
}

/// Error raised while registering a schema. These abort startup.
#[derive(Debug)]
pub enum RegistryError {
    /// A field resolved to no column/mapping in the shape builder.
    Unmappable { sref: String, field: String },
    /// The sref is already registered.
    Duplicate(String),
    /// The schema requires a tier or gate for which no driver is wired.
    MissingDriver { sref: String, driver: &'static str },
    /// A backend driver failed during tier registration.
    Driver(DriverError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Unmappable { sref, field } => {
                write!(f, "schema {sref}: field '{field}' has no backend mapping")
            }
            RegistryError::Duplicate(sref) => write!(f, "schema {sref} is already registered"),
            RegistryError::MissingDriver { sref, driver } => {
                write!(f, "schema {sref} requires the {driver} driver, which is not wired")
            }
            RegistryError::Driver(err) => write!(f, "tier registration failed: {err}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<DriverError> for RegistryError {
    fn from(err: DriverError) -> Self {
        RegistryError::Driver(err)
    }
}
