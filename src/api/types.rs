use chrono::{DateTime, Utc};
use mime_guess::mime::Mime;
use serde::{Deserialize, Serialize};

/// Credentials payload for `/login` and `/register`.
#[derive(Debug, Serialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Successful response from `/login` or `/register`.
///
/// Some deployments return only the token; the username then falls back
/// to whatever the caller submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// Successful response from the session-check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub user: String,
}

/// A server-confirmed uploaded image.
///
/// `filename` is the server-assigned unique key; the client never derives
/// or rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub filename: String,
    #[serde(default)]
    pub original_filename: String,
    pub upload_date: DateTime<Utc>,
}

/// Error payload returned by the service on non-2xx responses.
///
/// Deployed variants disagree on the field name (`message` vs `error`),
/// so both are accepted.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.is_empty())
    }
}

/// An image payload to be uploaded.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub filename: String,
    /// Declared media type; guessed from the filename when absent
    pub content_type: Option<Mime>,
}

impl ImageUpload {
    pub fn new(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: filename.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// The declared media type, or one guessed from the filename extension.
    pub fn effective_type(&self) -> Option<Mime> {
        self.content_type
            .clone()
            .or_else(|| mime_guess::from_path(&self.filename).first())
    }
}
