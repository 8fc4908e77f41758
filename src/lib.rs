pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod credentials;

pub use api::{ApiError, GalleryApi, HttpGalleryApi, ImageRecord, ImageUpload};
pub use controller::{GalleryController, GalleryError, GallerySnapshot, Session};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
