//! Remote contract of the gallery service.
//!
//! The controller only ever talks to the service through the
//! [`GalleryApi`] trait; the HTTP implementation lives in [`http`] and
//! tests substitute an in-memory fake.

mod error;
pub mod http;
mod types;

pub use error::ApiError;
pub use http::{BearerAttacher, CookieAttacher, CredentialAttacher, HttpGalleryApi};
pub use types::{AuthResponse, CredentialsRequest, ErrorBody, ImageRecord, ImageUpload, VerifyResponse};

use async_trait::async_trait;

/// Abstract gallery service: authentication plus the image collection.
///
/// Exact paths are a deployment detail of the implementation; this trait
/// captures the shape of the exchange only.
#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn register(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// Check a persisted token against the session-check endpoint.
    async fn verify(&self, token: &str) -> Result<VerifyResponse, ApiError>;

    /// Best-effort server-side session teardown.
    async fn logout(&self, token: &str) -> Result<(), ApiError>;

    /// Fetch the full ordered image list for the session.
    async fn list_images(&self, token: &str) -> Result<Vec<ImageRecord>, ApiError>;

    /// Submit one image as a single-part multipart upload.
    async fn upload_image(&self, token: &str, upload: ImageUpload)
        -> Result<ImageRecord, ApiError>;

    /// Delete an image by its server-assigned filename.
    async fn delete_image(&self, token: &str, filename: &str) -> Result<(), ApiError>;
}
