//! Session & gallery controller.
//!
//! The only unit in the crate with nontrivial state transitions. It owns
//! the session, the cached image list and the current error message, and
//! decides — given authentication state and server responses — what
//! observers see and which requests are issued.
//!
//! # Staleness
//!
//! Operations are dispatched from UI callbacks and may overlap. Every
//! in-flight request captures the session *epoch* at dispatch; the epoch
//! increments on every session transition (login, logout, forced
//! logout), and a response carrying a stale epoch is discarded without
//! touching state. A refresh completing after a logout can therefore
//! never repopulate the gallery.

mod state;

pub use state::{GalleryError, GallerySnapshot, Session};

use mime_guess::mime;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{GalleryApi, ImageRecord, ImageUpload};
use crate::credentials::CredentialStore;

#[derive(Default)]
struct Inner {
    session: Session,
    images: Vec<ImageRecord>,
    error: Option<String>,
    epoch: u64,
}

/// Client-side controller for authentication state and the image gallery.
///
/// Construct with an API implementation and a credential store; both are
/// injected so the controller runs without a network or filesystem in
/// tests.
pub struct GalleryController {
    api: Arc<dyn GalleryApi>,
    store: Arc<dyn CredentialStore>,
    inner: Mutex<Inner>,
    watch_tx: watch::Sender<GallerySnapshot>,
}

impl GalleryController {
    pub fn new(api: Arc<dyn GalleryApi>, store: Arc<dyn CredentialStore>) -> Self {
        let (watch_tx, _) = watch::channel(GallerySnapshot::default());
        Self {
            api,
            store,
            inner: Mutex::new(Inner::default()),
            watch_tx,
        }
    }

    /// Subscribe to state changes. A new snapshot is published after
    /// every mutation.
    pub fn subscribe(&self) -> watch::Receiver<GallerySnapshot> {
        self.watch_tx.subscribe()
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> GallerySnapshot {
        let inner = self.inner.lock();
        Self::snapshot_of(&inner)
    }

    /// Load any persisted credential and verify it. Leaves the session
    /// anonymous when no credential is stored.
    pub async fn initialize(&self) -> Result<(), GalleryError> {
        let token = match self.store.load() {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read stored credential");
                None
            }
        };
        match token {
            Some(token) => self.verify(&token).await,
            None => Ok(()),
        }
    }

    /// Check a token against the session-check endpoint.
    ///
    /// Success authenticates the session and refreshes the gallery.
    /// Any failure — rejection or network — clears the session and the
    /// persisted credential, so exactly one of {authenticated, anonymous}
    /// results.
    pub async fn verify(&self, token: &str) -> Result<(), GalleryError> {
        let epoch = self.current_epoch();
        match self.api.verify(token).await {
            Ok(response) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.epoch != epoch {
                        debug!("discarding stale verify response");
                        return Ok(());
                    }
                    inner.epoch += 1;
                    inner.session = Session::authenticated(token, response.user);
                    inner.error = None;
                    self.publish(&inner);
                }
                self.refresh_images().await
            }
            Err(err) => {
                let gerr = GalleryError::from(err);
                if let Err(err) = self.store.clear() {
                    warn!(error = %err, "failed to clear stored credential");
                }
                let mut inner = self.inner.lock();
                if inner.epoch == epoch {
                    inner.epoch += 1;
                    inner.session = Session::anonymous();
                    inner.images.clear();
                    inner.error = Some(gerr.to_string());
                    self.publish(&inner);
                }
                Err(gerr)
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), GalleryError> {
        let epoch = self.current_epoch();
        match self.api.login(username, password).await {
            Ok(auth) => self.establish_session(epoch, username, auth).await,
            Err(err) => Err(self.record_failure(epoch, err.into())),
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), GalleryError> {
        let epoch = self.current_epoch();
        match self.api.register(username, password).await {
            Ok(auth) => self.establish_session(epoch, username, auth).await,
            Err(err) => Err(self.record_failure(epoch, err.into())),
        }
    }

    /// Clear the session, the persisted credential and the gallery.
    ///
    /// The local transition is unconditional; the server is notified
    /// best-effort and any failure is only logged.
    pub async fn logout(&self) {
        let token = {
            let mut inner = self.inner.lock();
            let token = inner.session.token.take();
            inner.epoch += 1;
            inner.session = Session::anonymous();
            inner.images.clear();
            inner.error = None;
            self.publish(&inner);
            token
        };
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear stored credential");
        }
        if let Some(token) = token {
            if let Err(err) = self.api.logout(&token).await {
                debug!(error = %err, "server logout notification failed");
            }
        }
    }

    /// Fetch the full image list and replace the cache wholesale.
    ///
    /// On failure the cache is reset to empty rather than left stale, so
    /// the displayed gallery never shows unconfirmed state.
    pub async fn refresh_images(&self) -> Result<(), GalleryError> {
        let (epoch, token) = self.require_token()?;
        match self.api.list_images(&token).await {
            Ok(records) => {
                let mut inner = self.inner.lock();
                if inner.epoch != epoch {
                    debug!("discarding stale image list");
                    return Ok(());
                }
                inner.images = dedupe_by_filename(records);
                inner.error = None;
                self.publish(&inner);
                Ok(())
            }
            Err(err) => {
                let gerr = GalleryError::from(err);
                {
                    let mut inner = self.inner.lock();
                    if inner.epoch == epoch {
                        inner.images.clear();
                    }
                }
                Err(self.record_failure_authed(epoch, gerr))
            }
        }
    }

    /// Upload one image.
    ///
    /// The payload must be non-empty and its declared media type (or the
    /// type guessed from the filename when undeclared) must be `image/*`;
    /// anything else is rejected locally without contacting the server.
    /// On success the returned record is appended to the gallery.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<ImageRecord, GalleryError> {
        if upload.data.is_empty() {
            return Err(self.record_validation("Cannot upload an empty file"));
        }
        match upload.effective_type() {
            Some(media) if media.type_() == mime::IMAGE => {}
            Some(media) => {
                return Err(self.record_validation(format!(
                    "Only image files can be uploaded (got {})",
                    media.essence_str()
                )));
            }
            None => {
                return Err(self.record_validation("Could not determine the file's media type"));
            }
        }

        let (epoch, token) = self.require_token()?;
        match self.api.upload_image(&token, upload).await {
            Ok(record) => {
                let mut inner = self.inner.lock();
                if inner.epoch != epoch {
                    debug!(filename = %record.filename, "discarding stale upload response");
                    return Ok(record);
                }
                upsert_record(&mut inner.images, record.clone());
                inner.error = None;
                self.publish(&inner);
                Ok(record)
            }
            Err(err) => Err(self.record_failure_authed(epoch, err.into())),
        }
    }

    /// Delete an image by its server-assigned filename.
    ///
    /// Removing a filename the cache does not hold is a no-op, and a 404
    /// from the server counts as success: the record is gone either way.
    pub async fn delete_image(&self, filename: &str) -> Result<(), GalleryError> {
        let (epoch, token) = self.require_token()?;
        let result = self.api.delete_image(&token, filename).await;
        let result = match result {
            Err(crate::api::ApiError::Request { status: 404, .. }) => Ok(()),
            other => other,
        };
        match result {
            Ok(()) => {
                let mut inner = self.inner.lock();
                if inner.epoch != epoch {
                    debug!(filename, "discarding stale delete response");
                    return Ok(());
                }
                inner.images.retain(|record| record.filename != filename);
                inner.error = None;
                self.publish(&inner);
                Ok(())
            }
            Err(err) => Err(self.record_failure_authed(epoch, err.into())),
        }
    }

    // ------------------------------------------------------------------
    // Internal transitions
    // ------------------------------------------------------------------

    async fn establish_session(
        &self,
        epoch: u64,
        submitted_username: &str,
        auth: crate::api::AuthResponse,
    ) -> Result<(), GalleryError> {
        let username = auth
            .user
            .clone()
            .unwrap_or_else(|| submitted_username.to_string());
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                debug!("discarding stale authentication response");
                return Ok(());
            }
            inner.epoch += 1;
            inner.session = Session::authenticated(&auth.token, username);
            inner.error = None;
            self.publish(&inner);
        }
        if let Err(err) = self.store.store(&auth.token) {
            warn!(error = %err, "failed to persist credential");
        }
        self.refresh_images().await
    }

    fn current_epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    fn require_token(&self) -> Result<(u64, String), GalleryError> {
        let inner = self.inner.lock();
        match &inner.session.token {
            Some(token) => Ok((inner.epoch, token.clone())),
            None => Err(GalleryError::Auth("Not logged in".to_string())),
        }
    }

    /// Record a failure that does not affect the session (login and
    /// register rejections stay on the anonymous side).
    fn record_failure(&self, epoch: u64, err: GalleryError) -> GalleryError {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("discarding stale failure");
            return err;
        }
        inner.error = Some(err.to_string());
        self.publish(&inner);
        err
    }

    fn record_validation(&self, message: impl Into<String>) -> GalleryError {
        let err = GalleryError::Validation(message.into());
        let mut inner = self.inner.lock();
        inner.error = Some(err.to_string());
        self.publish(&inner);
        err
    }

    /// Record a failure from an authenticated endpoint. A 401/403 here
    /// means the session is no longer valid server-side, so it forces
    /// the full logout transition in addition to the message.
    fn record_failure_authed(&self, epoch: u64, err: GalleryError) -> GalleryError {
        if err.is_auth() {
            if let Err(store_err) = self.store.clear() {
                warn!(error = %store_err, "failed to clear stored credential");
            }
        }
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("discarding stale failure");
            return err;
        }
        if err.is_auth() {
            inner.epoch += 1;
            inner.session = Session::anonymous();
            inner.images.clear();
        }
        inner.error = Some(err.to_string());
        self.publish(&inner);
        err
    }

    fn publish(&self, inner: &Inner) {
        self.watch_tx.send_replace(Self::snapshot_of(inner));
    }

    fn snapshot_of(inner: &Inner) -> GallerySnapshot {
        GallerySnapshot {
            session: inner.session.clone(),
            images: inner.images.clone(),
            error: inner.error.clone(),
        }
    }
}

/// Keep the first occurrence of each filename; the list invariant is
/// that no two records share one.
fn dedupe_by_filename(records: Vec<ImageRecord>) -> Vec<ImageRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.filename.clone()))
        .collect()
}

fn upsert_record(images: &mut Vec<ImageRecord>, record: ImageRecord) {
    if let Some(existing) = images
        .iter_mut()
        .find(|existing| existing.filename == record.filename)
    {
        *existing = record;
    } else {
        images.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, AuthResponse, VerifyResponse};
    use crate::credentials::MemoryCredentialStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::oneshot;

    /// In-memory gallery service double. Tokens are `tok-<username>`;
    /// anything else is rejected as unauthorized.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        images: Mutex<Vec<ImageRecord>>,
        fail_login: Mutex<Option<ApiError>>,
        fail_list: Mutex<Option<ApiError>>,
        fail_upload: Mutex<Option<ApiError>>,
        fail_delete: Mutex<Option<ApiError>>,
        list_entered: Mutex<Option<oneshot::Sender<()>>>,
        list_gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeApi {
        fn record_call(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn check_token(&self, token: &str) -> Result<String, ApiError> {
            token
                .strip_prefix("tok-")
                .map(|user| user.to_string())
                .ok_or_else(|| ApiError::Unauthorized("Token is invalid".to_string()))
        }

        fn server_record(filename: &str) -> ImageRecord {
            ImageRecord {
                filename: format!("srv_{}", filename),
                original_filename: filename.to_string(),
                upload_date: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl GalleryApi for FakeApi {
        async fn login(&self, username: &str, _password: &str) -> Result<AuthResponse, ApiError> {
            self.record_call(format!("login {}", username));
            if let Some(err) = self.fail_login.lock().take() {
                return Err(err);
            }
            Ok(AuthResponse {
                token: format!("tok-{}", username),
                user: Some(username.to_string()),
            })
        }

        async fn register(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
            self.record_call(format!("register {}", username));
            self.login(username, password).await
        }

        async fn verify(&self, token: &str) -> Result<VerifyResponse, ApiError> {
            self.record_call("verify");
            let user = self.check_token(token)?;
            Ok(VerifyResponse { user })
        }

        async fn logout(&self, _token: &str) -> Result<(), ApiError> {
            self.record_call("logout");
            Ok(())
        }

        async fn list_images(&self, token: &str) -> Result<Vec<ImageRecord>, ApiError> {
            self.record_call("list");
            if let Some(entered) = self.list_entered.lock().take() {
                let _ = entered.send(());
            }
            let gate = self.list_gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if let Some(err) = self.fail_list.lock().take() {
                return Err(err);
            }
            self.check_token(token)?;
            Ok(self.images.lock().clone())
        }

        async fn upload_image(
            &self,
            token: &str,
            upload: ImageUpload,
        ) -> Result<ImageRecord, ApiError> {
            self.record_call(format!("upload {}", upload.filename));
            if let Some(err) = self.fail_upload.lock().take() {
                return Err(err);
            }
            self.check_token(token)?;
            let record = Self::server_record(&upload.filename);
            self.images.lock().push(record.clone());
            Ok(record)
        }

        async fn delete_image(&self, token: &str, filename: &str) -> Result<(), ApiError> {
            self.record_call(format!("delete {}", filename));
            if let Some(err) = self.fail_delete.lock().take() {
                return Err(err);
            }
            self.check_token(token)?;
            let mut images = self.images.lock();
            let before = images.len();
            images.retain(|record| record.filename != filename);
            if images.len() == before {
                return Err(ApiError::Request {
                    status: 404,
                    message: "Image not found".to_string(),
                });
            }
            Ok(())
        }
    }

    fn jpeg_upload(name: &str) -> ImageUpload {
        ImageUpload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], name)
    }

    fn setup() -> (Arc<FakeApi>, Arc<MemoryCredentialStore>, Arc<GalleryController>) {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = Arc::new(GalleryController::new(api.clone(), store.clone()));
        (api, store, controller)
    }

    #[tokio::test]
    async fn test_login_success_authenticates_and_refreshes() {
        let (api, store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.session.is_authenticated());
        assert_eq!(snapshot.session.username.as_deref(), Some("alice"));
        assert!(snapshot.images.is_empty());
        assert!(snapshot.error.is_none());
        assert_eq!(store.load().unwrap().as_deref(), Some("tok-alice"));
        assert!(api.calls.lock().contains(&"list".to_string()));
    }

    #[tokio::test]
    async fn test_login_failure_stays_anonymous() {
        let (api, store, controller) = setup();
        *api.fail_login.lock() = Some(ApiError::Unauthorized("Invalid credentials".to_string()));

        let err = controller.login("alice", "wrong").await.unwrap_err();
        assert!(err.is_auth());

        let snapshot = controller.snapshot();
        assert!(!snapshot.session.is_authenticated());
        assert_eq!(snapshot.error.as_deref(), Some("Invalid credentials"));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_authenticates() {
        let (_api, _store, controller) = setup();
        controller.register("bob", "pw2").await.unwrap();
        assert_eq!(
            controller.snapshot().session.username.as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn test_upload_then_delete_round_trip() {
        let (_api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        assert!(controller.snapshot().images.is_empty());

        let record = controller.upload_image(jpeg_upload("cat.jpg")).await.unwrap();
        assert_eq!(record.original_filename, "cat.jpg");
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.images.len(), 1);
        assert_eq!(snapshot.images[0].filename, record.filename);

        controller.delete_image(&record.filename).await.unwrap();
        assert!(controller.snapshot().images.is_empty());
    }

    #[tokio::test]
    async fn test_uploads_accumulate_with_unique_filenames() {
        let (_api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();

        for name in ["a.jpg", "b.png", "c.gif"] {
            controller.upload_image(jpeg_upload(name)).await.unwrap();
        }

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.images.len(), 3);
        let unique: std::collections::HashSet<_> = snapshot
            .images
            .iter()
            .map(|record| record.filename.clone())
            .collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image_without_network() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        api.calls.lock().clear();

        let upload = ImageUpload::new(b"hello".to_vec(), "notes.txt");
        let err = controller.upload_image(upload).await.unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));

        assert!(api.calls.lock().is_empty(), "no request may be issued");
        let snapshot = controller.snapshot();
        assert!(snapshot.images.is_empty());
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_payload() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        api.calls.lock().clear();

        let err = controller
            .upload_image(ImageUpload::new(Vec::new(), "cat.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
        assert!(api.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_upload_honors_declared_content_type() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        api.calls.lock().clear();

        // Declared type wins over the .jpg extension
        let upload = ImageUpload::new(b"hello".to_vec(), "fake.jpg")
            .with_content_type(mime::TEXT_PLAIN);
        let err = controller.upload_image(upload).await.unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
        assert!(api.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_filename_is_noop() {
        let (_api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();

        // Fake answers 404 for a filename it never stored; the controller
        // treats that as an idempotent success.
        controller.delete_image("ghost.jpg").await.unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.images.is_empty());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_list() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        let record = controller.upload_image(jpeg_upload("cat.jpg")).await.unwrap();

        *api.fail_delete.lock() = Some(ApiError::Request {
            status: 500,
            message: "Disk on fire".to_string(),
        });
        let err = controller.delete_image(&record.filename).await.unwrap_err();
        assert!(matches!(err, GalleryError::Request { status: 500, .. }));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.images.len(), 1);
        assert_eq!(snapshot.error.as_deref(), Some("Disk on fire"));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let (api, store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        controller.upload_image(jpeg_upload("cat.jpg")).await.unwrap();

        controller.logout().await;

        let snapshot = controller.snapshot();
        assert!(!snapshot.session.is_authenticated());
        assert!(snapshot.session.token.is_none());
        assert!(snapshot.images.is_empty());
        assert!(store.load().unwrap().is_none());
        assert!(api.calls.lock().contains(&"logout".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_failure_empties_list() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        controller.upload_image(jpeg_upload("a.jpg")).await.unwrap();
        controller.upload_image(jpeg_upload("b.jpg")).await.unwrap();

        *api.fail_list.lock() = Some(ApiError::Request {
            status: 500,
            message: "Error retrieving images".to_string(),
        });
        let err = controller.refresh_images().await.unwrap_err();
        assert!(matches!(err, GalleryError::Request { .. }));

        let snapshot = controller.snapshot();
        assert!(snapshot.images.is_empty(), "never show unconfirmed state");
        assert_eq!(snapshot.error.as_deref(), Some("Error retrieving images"));
        assert!(snapshot.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_auth_failure_forces_logout() {
        let (api, store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        controller.upload_image(jpeg_upload("a.jpg")).await.unwrap();

        *api.fail_list.lock() = Some(ApiError::Unauthorized("Token is invalid".to_string()));
        let err = controller.refresh_images().await.unwrap_err();
        assert!(err.is_auth());

        let snapshot = controller.snapshot();
        assert!(!snapshot.session.is_authenticated());
        assert!(snapshot.images.is_empty());
        assert!(store.load().unwrap().is_none());
        assert_eq!(snapshot.error.as_deref(), Some("Token is invalid"));
    }

    #[tokio::test]
    async fn test_initialize_with_valid_token() {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryCredentialStore::with_token("tok-alice"));
        let controller = GalleryController::new(api, store);

        controller.initialize().await.unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.session.is_authenticated());
        assert_eq!(snapshot.session.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_initialize_with_stale_token() {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryCredentialStore::with_token("expired"));
        let controller = GalleryController::new(api, store.clone());

        let err = controller.initialize().await.unwrap_err();
        assert!(err.is_auth());

        let snapshot = controller.snapshot();
        assert!(!snapshot.session.is_authenticated());
        assert!(snapshot.images.is_empty());
        assert!(store.load().unwrap().is_none(), "credential must be removed");
    }

    #[tokio::test]
    async fn test_initialize_without_token_is_noop() {
        let (api, _store, controller) = setup();
        controller.initialize().await.unwrap();
        assert!(api.calls.lock().is_empty());
        assert!(!controller.snapshot().session.is_authenticated());
    }

    #[tokio::test]
    async fn test_stale_refresh_after_logout_is_discarded() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();
        controller.upload_image(jpeg_upload("a.jpg")).await.unwrap();

        let (entered_tx, entered_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = oneshot::channel();
        *api.list_entered.lock() = Some(entered_tx);
        *api.list_gate.lock() = Some(gate_rx);

        let background = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.refresh_images().await })
        };
        entered_rx.await.unwrap();

        controller.logout().await;
        gate_tx.send(()).unwrap();
        background.await.unwrap().unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.images.is_empty(), "late response must not repopulate");
        assert!(!snapshot.session.is_authenticated());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_refresh_dedupes_filenames() {
        let (api, _store, controller) = setup();
        let record = FakeApi::server_record("a.jpg");
        *api.images.lock() = vec![record.clone(), record];

        controller.login("alice", "pw1").await.unwrap();
        assert_eq!(controller.snapshot().images.len(), 1);
    }

    #[tokio::test]
    async fn test_error_is_replaced_not_queued() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();

        *api.fail_list.lock() = Some(ApiError::Request {
            status: 500,
            message: "first".to_string(),
        });
        controller.refresh_images().await.unwrap_err();

        *api.fail_list.lock() = Some(ApiError::Request {
            status: 500,
            message: "second".to_string(),
        });
        controller.refresh_images().await.unwrap_err();

        assert_eq!(controller.snapshot().error.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let (api, _store, controller) = setup();
        controller.login("alice", "pw1").await.unwrap();

        *api.fail_list.lock() = Some(ApiError::Request {
            status: 500,
            message: "transient".to_string(),
        });
        controller.refresh_images().await.unwrap_err();
        assert!(controller.snapshot().error.is_some());

        controller.refresh_images().await.unwrap();
        assert!(controller.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_operations_require_authentication() {
        let (api, _store, controller) = setup();
        let err = controller.refresh_images().await.unwrap_err();
        assert!(err.is_auth());
        let err = controller.delete_image("a.jpg").await.unwrap_err();
        assert!(err.is_auth());
        assert!(api.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_watch_observers_see_state_changes() {
        let (_api, _store, controller) = setup();
        let mut rx = controller.subscribe();

        controller.login("alice", "pw1").await.unwrap();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.session.is_authenticated());
    }
}
