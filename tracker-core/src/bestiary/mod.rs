//! Bestiary lookup with a lazily built type index and per-type cache.
//!
//! Loading happens in two phases:
//! 1. [`Bestiary::load_type_index`] discovers which files exist, reads every
//!    record once, and keeps only a count and the list of source files per
//!    type label. The parsed records are dropped.
//! 2. [`Bestiary::monsters_of_type`] re-reads only the files that contain
//!    the requested type and caches the normalized, name-sorted result for
//!    the rest of the session.
//!
//! A file that cannot be fetched or parsed is logged and left out. Nothing
//! in here fails the caller.

pub mod catalog;
pub mod monster;
pub mod source;

pub use catalog::{search_types, type_description, type_icon, TypeStyle};
pub use monster::{ability_modifier, ArmorClass, CreatureType, Monster};
pub use source::{BestiarySource, DirSource, HttpSource, SourceError};

use crate::config::{DiscoveryConfig, TrackerConfig};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One entry of the type index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub label: String,
    pub count: usize,
    /// Files with at least one record of this type, in discovery order.
    pub sources: Vec<String>,
}

impl TypeInfo {
    pub fn description(&self) -> &'static str {
        type_description(&self.label)
    }

    pub fn icon(&self) -> &'static str {
        type_icon(&self.label)
    }
}

/// Snapshot of the per-type cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheStatus {
    /// Cached type labels, sorted.
    pub cached_types: Vec<String>,
    pub total_cached: usize,
}

/// Session-scoped bestiary.
pub struct Bestiary {
    source: Arc<dyn BestiarySource>,
    discovery: DiscoveryConfig,
    files: Mutex<Option<Vec<String>>>,
    index: Mutex<Vec<TypeInfo>>,
    cache: Mutex<HashMap<String, Arc<Vec<Monster>>>>,
}

impl Bestiary {
    pub fn new(source: Arc<dyn BestiarySource>, discovery: DiscoveryConfig) -> Self {
        Self {
            source,
            discovery,
            files: Mutex::new(None),
            index: Mutex::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Pick an HTTP or directory source from the configured base.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, SourceError> {
        let source: Arc<dyn BestiarySource> = if config.bestiary_is_remote() {
            Arc::new(HttpSource::new(&config.bestiary_base)?)
        } else {
            Arc::new(DirSource::new(&config.bestiary_base))
        };
        Ok(Self::new(source, config.discovery.clone()))
    }

    // ========================================================================
    // Phase 1
    // ========================================================================

    /// Files that exist at the source. Probed once per session.
    pub async fn discover_files(&self) -> Vec<String> {
        let mut files = self.files.lock().await;
        if let Some(found) = files.as_ref() {
            return found.clone();
        }

        let found = self.probe_files().await;
        *files = Some(found.clone());
        found
    }

    async fn probe_files(&self) -> Vec<String> {
        let candidates = &self.discovery.candidates;
        let mut found = Vec::new();
        let mut reachable = false;

        for (i, batch) in candidates.chunks(self.discovery.batch_size.max(1)).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.discovery.batch_delay).await;
            }

            let probes = batch.iter().map(|file| async move {
                (file, self.source.exists(file).await)
            });
            for (file, result) in join_all(probes).await {
                match result {
                    Ok(true) => {
                        reachable = true;
                        found.push(file.clone());
                    }
                    Ok(false) => reachable = true,
                    Err(e) => warn!(file = %file, error = %e, "bestiary probe failed"),
                }
            }
        }

        if !reachable && !candidates.is_empty() {
            warn!(
                source = %self.source.describe(),
                fallback = self.discovery.fallback.len(),
                "bestiary source unreachable, using fallback file list"
            );
            return self.discovery.fallback.clone();
        }

        info!(
            source = %self.source.describe(),
            found = found.len(),
            probed = candidates.len(),
            "discovered bestiary files"
        );
        found
    }

    /// Type labels with record counts, most common first.
    ///
    /// Built once; an empty index is rebuilt on the next call.
    pub async fn load_type_index(&self) -> Vec<TypeInfo> {
        let mut index = self.index.lock().await;
        if !index.is_empty() {
            return index.clone();
        }

        let files = self.discover_files().await;
        let loaded = join_all(files.iter().map(|file| self.load_file(file))).await;

        let mut groups: HashMap<String, TypeInfo> = HashMap::new();
        let mut skipped = 0usize;
        for (file, records) in files.iter().zip(loaded) {
            for record in records.into_iter().flatten() {
                let labels = record.type_labels();
                if labels.is_empty() {
                    skipped += 1;
                    debug!(file = %file, monster = %record.name, "unclassifiable creature type");
                    continue;
                }
                for label in labels {
                    let entry = groups.entry(label.clone()).or_insert_with(|| TypeInfo {
                        label,
                        count: 0,
                        sources: Vec::new(),
                    });
                    entry.count += 1;
                    if !entry.sources.contains(file) {
                        entry.sources.push(file.clone());
                    }
                }
            }
        }

        let mut built: Vec<TypeInfo> = groups.into_values().collect();
        built.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        info!(types = built.len(), skipped, "built bestiary type index");

        *index = built.clone();
        built
    }

    /// Index entries matching a search over label and description.
    pub async fn search_types(&self, query: &str) -> Vec<TypeInfo> {
        let index = self.load_type_index().await;
        search_types(&index, query).into_iter().cloned().collect()
    }

    // ========================================================================
    // Phase 2
    // ========================================================================

    /// Every record of `label`, normalized and sorted by name.
    ///
    /// Served from cache after the first call. A label missing from the
    /// index yields an empty list and is not cached.
    pub async fn monsters_of_type(&self, label: &str) -> Arc<Vec<Monster>> {
        if let Some(hit) = self.cache.lock().await.get(label).cloned() {
            debug!(label, count = hit.len(), "bestiary cache hit");
            return hit;
        }

        let index = self.load_type_index().await;
        let Some(info) = index.iter().find(|t| t.label == label) else {
            debug!(label, "type not in bestiary index");
            return Arc::new(Vec::new());
        };

        let loaded = join_all(info.sources.iter().map(|file| self.load_file(file))).await;
        let mut monsters: Vec<Monster> = loaded
            .into_iter()
            .flatten()
            .flatten()
            .filter(|m| m.type_labels().iter().any(|l| l == label))
            .map(Monster::normalized)
            .collect();
        monsters.sort_by(|a, b| compare_names(&a.name, &b.name));

        info!(label, count = monsters.len(), files = info.sources.len(), "loaded bestiary type");
        let monsters = Arc::new(monsters);
        self.cache
            .lock()
            .await
            .insert(label.to_string(), Arc::clone(&monsters));
        monsters
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        debug!("bestiary cache cleared");
    }

    pub async fn cache_status(&self) -> CacheStatus {
        let cache = self.cache.lock().await;
        let mut cached_types: Vec<String> = cache.keys().cloned().collect();
        cached_types.sort();
        CacheStatus {
            cached_types,
            total_cached: cache.values().map(|m| m.len()).sum(),
        }
    }

    /// Fetch and parse one file. Records that do not parse are skipped.
    async fn load_file(&self, file: &str) -> Option<Vec<Monster>> {
        let text = match self.source.fetch(file).await {
            Ok(text) => text,
            Err(e) => {
                warn!(file, error = %e, "failed to load bestiary file");
                return None;
            }
        };

        let records = match parse_records(file, &text) {
            Ok(records) => records,
            Err(e) => {
                warn!(file, error = %e, "skipping bestiary file");
                return None;
            }
        };

        let total = records.len();
        let monsters: Vec<Monster> = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Monster>(record) {
                Ok(monster) => Some(monster),
                Err(e) => {
                    debug!(file, error = %e, "skipping malformed monster record");
                    None
                }
            })
            .collect();
        debug!(file, records = total, parsed = monsters.len(), "loaded bestiary file");
        Some(monsters)
    }
}

/// Pull the `monster` array out of a bestiary file.
fn parse_records(file: &str, text: &str) -> Result<Vec<Value>, SourceError> {
    let parse_error = |message: String| SourceError::Parse {
        file: file.to_string(),
        message,
    };
    let mut data: Value = serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;
    match data.get_mut("monster").map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        _ => Err(parse_error("missing `monster` array".to_string())),
    }
}

/// Case-insensitive name order, ties broken by exact text.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
