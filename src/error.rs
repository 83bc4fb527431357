//! Unified error type.

use http::{Method, StatusCode};

/// Boxed error returned by hooks and renderers.
///
/// Hooks and renderers are application code; kiri only needs to report what
/// went wrong, not to inspect it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by kiri's fallible operations.
///
/// Registration errors (`DuplicateEndpoint`, `MalformedPattern`) surface at
/// startup. Matching errors become 404 / 405 responses. Reverse-resolution
/// errors are programmer errors and are returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An endpoint with this name is already registered.
    #[error("endpoint `{0}` is already registered")]
    DuplicateEndpoint(String),

    /// A rule did not parse, or its placeholders disagree with the handler's
    /// declared parameters.
    #[error("malformed pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: String },

    /// No route matches the request path.
    #[error("no route matches `{0}`")]
    NotFound(String),

    /// The path matched, but not for this method.
    #[error("method {method} not allowed for `{path}`")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    #[error("unknown endpoint `{0}`")]
    UnknownEndpoint(String),

    #[error("endpoint `{endpoint}` requires parameter `{param}`")]
    MissingParameter { endpoint: String, param: String },

    #[error("invalid value `{value}` for parameter `{param}` of endpoint `{endpoint}`")]
    InvalidParameter {
        endpoint: String,
        param: String,
        value: String,
    },

    /// A `POST` did not carry the session's form token.
    #[error("missing or invalid form token")]
    InvalidFormToken,

    /// A request-setup hook failed or panicked.
    #[error("request setup hook failed: {0}")]
    Hook(#[source] BoxError),

    /// Template rendering failed, or no renderer is configured.
    #[error("render failed: {0}")]
    Render(#[source] BoxError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The HTTP status this error maps to at the boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidFormToken => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn malformed(pattern: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPattern {
            pattern: pattern.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
