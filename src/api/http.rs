//! HTTP implementation of the gallery service contract.
//!
//! All requests go through a single `reqwest::Client` with a fixed
//! timeout; the session credential is attached by an injected
//! [`CredentialAttacher`] so the client works against both bearer-token
//! and cookie-based deployments.

use async_trait::async_trait;
use reqwest::{header, multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::error::ApiError;
use super::types::{AuthResponse, CredentialsRequest, ErrorBody, ImageRecord, ImageUpload, VerifyResponse};
use super::GalleryApi;

/// Attaches the session credential to an outgoing request.
pub trait CredentialAttacher: Send + Sync {
    fn attach(&self, request: RequestBuilder, token: &str) -> RequestBuilder;
}

/// `Authorization: Bearer <token>` header.
pub struct BearerAttacher;

impl CredentialAttacher for BearerAttacher {
    fn attach(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(header::AUTHORIZATION, format!("Bearer {}", token))
    }
}

/// `Cookie: <name>=<token>` header, for deployments that issue session
/// cookies instead of tokens.
pub struct CookieAttacher {
    cookie_name: String,
}

impl CookieAttacher {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

impl CredentialAttacher for CookieAttacher {
    fn attach(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(header::COOKIE, format!("{}={}", self.cookie_name, token))
    }
}

/// Gallery service client over HTTP/JSON.
pub struct HttpGalleryApi {
    base_url: String,
    client: Client,
    attacher: Box<dyn CredentialAttacher>,
}

impl HttpGalleryApi {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        attacher: Box<dyn CredentialAttacher>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            base_url,
            client,
            attacher,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        self.attacher.attach(request, token)
    }

    /// Send a request and decode a JSON body, mapping non-2xx statuses
    /// to the corresponding error kind.
    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Send a request, discard any body, only check the status.
    async fn send_ack(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .ok()
            .and_then(|body| {
                serde_json::from_str::<ErrorBody>(&body)
                    .ok()
                    .and_then(ErrorBody::into_message)
            });
        debug!(status = %status, "gallery service returned an error");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized(
                message.unwrap_or_else(|| "Authentication required".to_string()),
            )),
            _ => Err(ApiError::Request {
                status: status.as_u16(),
                message: message
                    .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16())),
            }),
        }
    }
}

/// The image list arrives either bare or wrapped in an `images` field,
/// depending on the deployment.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageListResponse {
    Wrapped { images: Vec<ImageRecord> },
    Bare(Vec<ImageRecord>),
}

impl ImageListResponse {
    fn into_records(self) -> Vec<ImageRecord> {
        match self {
            ImageListResponse::Wrapped { images } => images,
            ImageListResponse::Bare(images) => images,
        }
    }
}

#[async_trait]
impl GalleryApi for HttpGalleryApi {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = CredentialsRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.send_json(self.client.post(self.url("/login")).json(&body))
            .await
    }

    async fn register(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = CredentialsRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.send_json(self.client.post(self.url("/register")).json(&body))
            .await
    }

    async fn verify(&self, token: &str) -> Result<VerifyResponse, ApiError> {
        self.send_json(self.authed(self.client.get(self.url("/verify")), token))
            .await
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.send_ack(self.authed(self.client.post(self.url("/logout")), token))
            .await
    }

    async fn list_images(&self, token: &str) -> Result<Vec<ImageRecord>, ApiError> {
        let response: ImageListResponse = self
            .send_json(self.authed(self.client.get(self.url("/images")), token))
            .await?;
        Ok(response.into_records())
    }

    async fn upload_image(
        &self,
        token: &str,
        upload: ImageUpload,
    ) -> Result<ImageRecord, ApiError> {
        let mut part = multipart::Part::bytes(upload.data).file_name(upload.filename);
        if let Some(content_type) = &upload.content_type {
            part = part
                .mime_str(content_type.essence_str())
                .map_err(|e| ApiError::Malformed(e.to_string()))?;
        }
        let form = multipart::Form::new().part("image", part);
        self.send_json(
            self.authed(self.client.post(self.url("/upload")), token)
                .multipart(form),
        )
        .await
    }

    async fn delete_image(&self, token: &str, filename: &str) -> Result<(), ApiError> {
        self.send_ack(self.authed(
            self.client.delete(self.url(&format!("/images/{}", filename))),
            token,
        ))
        .await
    }
}
