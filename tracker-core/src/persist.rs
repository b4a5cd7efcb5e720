//! Local persistence of the campaign list.
//!
//! The whole list is stored as one JSON array under a single key. Reads
//! tolerate missing and malformed data: a missing key is an empty list, and
//! malformed content is removed and reported as a [`DataWarning`].

use crate::campaign::{sort_campaigns, Campaign};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Key the campaign list is stored under.
pub const LOCAL_STORAGE_KEY: &str = "encounterFlowApp_campaigns_v2";

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable")]
    Unavailable,
}

/// String blobs by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// One JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-memory store. Can be switched off to simulate storage failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When unavailable, every operation fails.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(PersistError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.check()?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.check()?;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.check()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Campaign list
// ============================================================================

/// A non-fatal problem found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataWarning {
    /// Stored data was unreadable and has been cleared.
    MalformedCampaigns { reason: String },
    /// Storage could not be read; nothing was loaded.
    StorageUnavailable { reason: String },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::MalformedCampaigns { .. } => {
                write!(f, "Saved campaign data was corrupted and has been reset")
            }
            DataWarning::StorageUnavailable { reason } => {
                write!(f, "Saved campaigns could not be read: {reason}")
            }
        }
    }
}

/// Result of loading the campaign list.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    /// Sorted most recently modified first.
    pub campaigns: Vec<Campaign>,
    pub warning: Option<DataWarning>,
}

/// Parse a stored campaign list, repairing fields older saves lack.
pub fn decode_campaigns(text: &str, now: i64) -> Result<Vec<Campaign>, serde_json::Error> {
    let campaigns: Vec<Campaign> = serde_json::from_str(text)?;
    Ok(repair_campaigns(campaigns, now))
}

/// Fill missing timestamps with `now` and restore ordering.
pub fn repair_campaigns(mut campaigns: Vec<Campaign>, now: i64) -> Vec<Campaign> {
    for campaign in &mut campaigns {
        campaign.repair(now);
    }
    sort_campaigns(&mut campaigns);
    campaigns
}

/// Load the campaign list stored under `key`.
pub async fn load_campaigns(store: &dyn KeyValueStore, key: &str) -> Loaded {
    let text = match store.get(key).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!(key, "no saved campaigns");
            return Loaded::default();
        }
        Err(e) => {
            warn!(key, error = %e, "failed to read saved campaigns");
            return Loaded {
                campaigns: Vec::new(),
                warning: Some(DataWarning::StorageUnavailable {
                    reason: e.to_string(),
                }),
            };
        }
    };

    match decode_campaigns(&text, Utc::now().timestamp_millis()) {
        Ok(campaigns) => {
            info!(key, campaigns = campaigns.len(), "loaded campaigns");
            Loaded {
                campaigns,
                warning: None,
            }
        }
        Err(e) => {
            warn!(key, error = %e, "saved campaigns are malformed, resetting");
            if let Err(remove_err) = store.remove(key).await {
                warn!(key, error = %remove_err, "failed to clear malformed campaigns");
            }
            Loaded {
                campaigns: Vec::new(),
                warning: Some(DataWarning::MalformedCampaigns {
                    reason: e.to_string(),
                }),
            }
        }
    }
}

/// Store the whole campaign list under `key`.
pub async fn save_campaigns(
    store: &dyn KeyValueStore,
    key: &str,
    campaigns: &[Campaign],
) -> Result<(), PersistError> {
    let content = serde_json::to_string(campaigns)?;
    store.set(key, &content).await?;
    debug!(key, campaigns = campaigns.len(), bytes = content.len(), "saved campaigns");
    Ok(())
}
