//! Local/cloud synchronization of the campaign list.
//!
//! Local storage always holds the latest campaign list. When a user is
//! signed in and the tracker is online, the list is also mirrored to a
//! per-user cloud document, and a change listener copies remote updates
//! back into local storage.

use crate::campaign::Campaign;
use crate::persist::{self, KeyValueStore, Loaded, PersistError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Version written into every cloud document.
pub const SAVE_FILE_VERSION: &str = "1.0.0";

/// Local key for the persisted [`SyncStatus`].
pub const SYNC_STATUS_KEY: &str = "encounterFlowApp_syncStatus";

/// Local key for this installation's device id.
pub const DEVICE_ID_KEY: &str = "encounterFlow_deviceId";

/// Errors from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cloud error: {0}")]
    Cloud(String),

    #[error("Storage error: {0}")]
    Persist(#[from] PersistError),
}

/// Identity supplied by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Where and how a cloud document was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub device_id: String,
    pub app_version: String,
    pub last_local_save: i64,
    pub platform: String,
}

/// The per-user cloud document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default)]
    pub version: String,
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub last_sync: i64,
    #[serde(default)]
    pub created_at: i64,
    pub metadata: SaveMetadata,
}

/// Cloud document store keyed by user id.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserDocument>, SyncError>;

    /// Write with merge semantics: an existing document keeps its
    /// `created_at`.
    async fn set(&self, uid: &str, doc: UserDocument) -> Result<(), SyncError>;

    /// Every document written for `uid` from now on.
    fn subscribe(&self, uid: &str) -> broadcast::Receiver<UserDocument>;
}

/// In-memory cloud store. Can be switched off to simulate outages.
#[derive(Default)]
pub struct MemoryCloud {
    docs: std::sync::Mutex<HashMap<String, UserDocument>>,
    feeds: std::sync::Mutex<HashMap<String, broadcast::Sender<UserDocument>>>,
    down: AtomicBool,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SyncError> {
        if self.down.load(Ordering::SeqCst) {
            Err(SyncError::Cloud("service unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn feed(&self, uid: &str) -> broadcast::Sender<UserDocument> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds
            .entry(uid.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }
}

#[async_trait]
impl CloudStore for MemoryCloud {
    async fn get(&self, uid: &str) -> Result<Option<UserDocument>, SyncError> {
        self.check()?;
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(uid).cloned())
    }

    async fn set(&self, uid: &str, mut doc: UserDocument) -> Result<(), SyncError> {
        self.check()?;
        {
            let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = docs.get(uid) {
                doc.created_at = existing.created_at;
            }
            docs.insert(uid.to_string(), doc.clone());
        }
        // No subscribers is fine
        let _ = self.feed(uid).send(doc);
        Ok(())
    }

    fn subscribe(&self, uid: &str) -> broadcast::Receiver<UserDocument> {
        self.feed(uid).subscribe()
    }
}

/// Sync state shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync: Option<i64>,
    pub is_syncing: bool,
    pub has_local_changes: bool,
    pub sync_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            last_sync: None,
            is_syncing: false,
            has_local_changes: false,
            sync_error: None,
        }
    }
}

/// Status shared between [`DataSync`] and its change listener.
#[derive(Clone)]
struct StatusHandle {
    status: Arc<Mutex<SyncStatus>>,
    local: Arc<dyn KeyValueStore>,
}

impl StatusHandle {
    async fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self.status.lock().await;
            f(&mut *status);
            status.clone()
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.local.set(SYNC_STATUS_KEY, &json).await {
                    warn!(error = %e, "failed to save sync status");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode sync status"),
        }
    }

    async fn get(&self) -> SyncStatus {
        self.status.lock().await.clone()
    }
}

/// Chooses between local and cloud persistence and keeps them in step.
pub struct DataSync {
    local: Arc<dyn KeyValueStore>,
    cloud: Option<Arc<dyn CloudStore>>,
    storage_key: String,
    user: Option<User>,
    status: StatusHandle,
    listener: Option<JoinHandle<()>>,
    invalidations: broadcast::Sender<()>,
}

impl DataSync {
    /// Create and restore the persisted sync status.
    ///
    /// `is_online` and `is_syncing` are not restored; they describe this
    /// process, not the last one.
    pub async fn open(
        local: Arc<dyn KeyValueStore>,
        cloud: Option<Arc<dyn CloudStore>>,
        storage_key: impl Into<String>,
    ) -> Self {
        let mut status = SyncStatus::default();
        match local.get(SYNC_STATUS_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<SyncStatus>(&json) {
                Ok(stored) => {
                    status = SyncStatus {
                        is_online: status.is_online,
                        is_syncing: false,
                        ..stored
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed sync status"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read sync status"),
        }

        Self {
            status: StatusHandle {
                status: Arc::new(Mutex::new(status)),
                local: Arc::clone(&local),
            },
            local,
            cloud,
            storage_key: storage_key.into(),
            user: None,
            listener: None,
            invalidations: broadcast::channel(16).0,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.get().await
    }

    /// Notified whenever a remote change has been written to local storage.
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<()> {
        self.invalidations.subscribe()
    }

    /// Switch users. The change listener restarts only if the uid changes.
    pub fn set_user(&mut self, user: Option<User>) {
        let same = self.user.as_ref().map(|u| &u.uid) == user.as_ref().map(|u| &u.uid);
        if same {
            self.user = user;
            return;
        }

        self.stop_listener();
        self.user = user;
        if let (Some(user), Some(cloud)) = (&self.user, &self.cloud) {
            info!(uid = %user.uid, "starting cloud sync");
            self.listener = Some(self.spawn_listener(Arc::clone(cloud), user.uid.clone()));
        }
    }

    /// Load from the cloud when possible, otherwise from local storage.
    ///
    /// A cloud copy is mirrored into local storage as a backup.
    pub async fn load_campaigns(&self) -> Loaded {
        if let Some((cloud, user)) = self.cloud_target().await {
            match cloud.get(&user.uid).await {
                Ok(Some(doc)) => {
                    let now = Utc::now().timestamp_millis();
                    let campaigns = persist::repair_campaigns(doc.campaigns, now);
                    let mirrored = persist::save_campaigns(
                        self.local.as_ref(),
                        &self.storage_key,
                        &campaigns,
                    )
                    .await;
                    if let Err(e) = mirrored {
                        warn!(error = %e, "failed to mirror cloud campaigns locally");
                    }
                    self.status
                        .update(|s| {
                            s.last_sync = Some(now);
                            s.sync_error = None;
                            s.has_local_changes = false;
                        })
                        .await;
                    info!(
                        uid = %user.uid,
                        campaigns = campaigns.len(),
                        "loaded campaigns from cloud"
                    );
                    return Loaded {
                        campaigns,
                        warning: None,
                    };
                }
                Ok(None) => debug!(uid = %user.uid, "no cloud document yet"),
                Err(e) => {
                    warn!(uid = %user.uid, error = %e, "cloud load failed, using local copy");
                    let message = e.to_string();
                    self.status.update(|s| s.sync_error = Some(message)).await;
                }
            }
        }

        persist::load_campaigns(self.local.as_ref(), &self.storage_key).await
    }

    /// Save locally, then mirror to the cloud when signed in and online.
    ///
    /// Only a local failure is returned; cloud failures are recorded in the
    /// status.
    pub async fn save_campaigns(&self, campaigns: &[Campaign]) -> Result<(), SyncError> {
        let saved =
            persist::save_campaigns(self.local.as_ref(), &self.storage_key, campaigns).await;
        if let Err(e) = saved {
            let message = e.to_string();
            self.status.update(|s| s.sync_error = Some(message)).await;
            return Err(e.into());
        }
        self.status.update(|s| s.has_local_changes = true).await;

        if self.cloud_target().await.is_some() {
            self.sync_to_cloud(campaigns).await;
        }
        Ok(())
    }

    /// Push `campaigns` to the cloud. Returns whether the push happened.
    pub async fn sync_to_cloud(&self, campaigns: &[Campaign]) -> bool {
        let Some((cloud, user)) = self.cloud_target().await else {
            return false;
        };

        self.status
            .update(|s| {
                s.is_syncing = true;
                s.sync_error = None;
            })
            .await;

        let doc = self.build_document(user, campaigns).await;
        match cloud.set(&user.uid, doc).await {
            Ok(()) => {
                let now = Utc::now().timestamp_millis();
                self.status
                    .update(|s| {
                        s.last_sync = Some(now);
                        s.has_local_changes = false;
                        s.is_syncing = false;
                    })
                    .await;
                debug!(uid = %user.uid, campaigns = campaigns.len(), "synced campaigns to cloud");
                true
            }
            Err(e) => {
                warn!(uid = %user.uid, error = %e, "cloud sync failed");
                let message = e.to_string();
                self.status
                    .update(|s| {
                        s.is_syncing = false;
                        s.sync_error = Some(message);
                    })
                    .await;
                false
            }
        }
    }

    /// Record connectivity. Coming back online pushes pending local changes.
    pub async fn set_online(&self, online: bool) -> bool {
        self.status.update(|s| s.is_online = online).await;
        if !online || !self.status.get().await.has_local_changes {
            return false;
        }

        let loaded = persist::load_campaigns(self.local.as_ref(), &self.storage_key).await;
        self.sync_to_cloud(&loaded.campaigns).await
    }

    /// This installation's id, generated and stored on first use.
    pub async fn device_id(&self) -> String {
        if let Ok(Some(id)) = self.local.get(DEVICE_ID_KEY).await {
            return id;
        }

        let random: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
        let id = format!("device_{}_{random}", Utc::now().timestamp_millis());
        if let Err(e) = self.local.set(DEVICE_ID_KEY, &id).await {
            warn!(error = %e, "failed to store device id");
        }
        id
    }

    async fn build_document(&self, user: &User, campaigns: &[Campaign]) -> UserDocument {
        let now = Utc::now().timestamp_millis();
        UserDocument {
            version: SAVE_FILE_VERSION.to_string(),
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            campaigns: campaigns.to_vec(),
            last_sync: now,
            created_at: now,
            metadata: SaveMetadata {
                device_id: self.device_id().await,
                app_version: SAVE_FILE_VERSION.to_string(),
                last_local_save: now,
                platform: std::env::consts::OS.to_string(),
            },
        }
    }

    /// The cloud and user to sync with, if signed in and online.
    async fn cloud_target(&self) -> Option<(&Arc<dyn CloudStore>, &User)> {
        let (cloud, user) = (self.cloud.as_ref()?, self.user.as_ref()?);
        if self.status.get().await.is_online {
            Some((cloud, user))
        } else {
            None
        }
    }

    fn spawn_listener(&self, cloud: Arc<dyn CloudStore>, uid: String) -> JoinHandle<()> {
        let mut feed = cloud.subscribe(&uid);
        let local = Arc::clone(&self.local);
        let key = self.storage_key.clone();
        let status = self.status.clone();
        let invalidations = self.invalidations.clone();

        tokio::spawn(async move {
            loop {
                let doc = match feed.recv().await {
                    Ok(doc) => doc,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(uid = %uid, missed, "cloud listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let saved = persist::save_campaigns(local.as_ref(), &key, &doc.campaigns).await;
                if let Err(e) = saved {
                    warn!(uid = %uid, error = %e, "failed to store cloud update locally");
                    let message = e.to_string();
                    status.update(|s| s.sync_error = Some(message)).await;
                    continue;
                }
                let now = Utc::now().timestamp_millis();
                status
                    .update(|s| {
                        s.last_sync = Some(now);
                        s.has_local_changes = false;
                    })
                    .await;
                debug!(uid = %uid, campaigns = doc.campaigns.len(), "applied cloud update");
                let _ = invalidations.send(());
            }
            debug!(uid = %uid, "cloud listener stopped");
        })
    }

    fn stop_listener(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

impl Drop for DataSync {
    fn drop(&mut self) {
        self.stop_listener();
    }
}
