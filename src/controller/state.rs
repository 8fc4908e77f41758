use thiserror::Error;

use crate::api::{ApiError, ImageRecord};

/// The client's belief about the current authentication state.
///
/// Owned exclusively by the controller; observers receive clones via
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub authenticated: bool,
    pub token: Option<String>,
    pub username: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn authenticated(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            token: Some(token.into()),
            username: Some(username.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Immutable view of the controller state, published to observers after
/// every state change.
#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    pub session: Session,
    pub images: Vec<ImageRecord>,
    /// The single most recent user-visible error, if any
    pub error: Option<String>,
}

/// Failure of a controller operation.
///
/// Every variant is also mirrored into the snapshot's error string, so a
/// presentation layer can either inspect the returned value or watch the
/// state stream.
#[derive(Debug, Error)]
pub enum GalleryError {
    /// Rejected locally before any request was made
    #[error("{0}")]
    Validation(String),

    /// 401/403 from the service; forces the logout transition
    #[error("{0}")]
    Auth(String),

    /// Non-2xx response with a server-provided or fallback message
    #[error("{message}")]
    Request { status: u16, message: String },

    /// Transport failure
    #[error("{0}")]
    Network(String),
}

impl GalleryError {
    pub fn is_auth(&self) -> bool {
        matches!(self, GalleryError::Auth(_))
    }
}

impl From<ApiError> for GalleryError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(message) => GalleryError::Auth(message),
            ApiError::Request { status, message } => GalleryError::Request { status, message },
            ApiError::Network(message) => {
                GalleryError::Network(format!("Could not reach the gallery service: {}", message))
            }
            ApiError::Malformed(message) => {
                GalleryError::Network(format!("Unexpected response from the gallery service: {}", message))
            }
        }
    }
}
