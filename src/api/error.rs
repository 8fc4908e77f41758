use thiserror::Error;

/// Errors produced by the remote gallery service or the transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403 from any endpoint
    #[error("{0}")]
    Unauthorized(String),

    /// Any other non-2xx response, carrying the server-provided message
    /// or a generic fallback
    #[error("{message}")]
    Request { status: u16, message: String },

    /// Transport failure, no server message available
    #[error("network error: {0}")]
    Network(String),

    /// Response body that could not be decoded, or a request that could
    /// not be constructed
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            ApiError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}
