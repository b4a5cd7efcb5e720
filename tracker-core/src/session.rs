//! Tracker session - the main entry point for front ends.
//!
//! `TrackerSession` ties together:
//! - The campaign book (all campaign and encounter state)
//! - Data sync (local storage, optional cloud mirror)
//! - The bestiary
//!
//! Every mutation commits through the book and is then saved. Saving never
//! fails a mutation: a save error is logged and shows up in the sync status.

use crate::bestiary::{Bestiary, Monster, SourceError};
use crate::campaign::{Campaign, CampaignBook, CampaignError};
use crate::config::TrackerConfig;
use crate::encounter::{Encounter, EncounterAction, EncounterEffect};
use crate::id::{CampaignId, EncounterId};
use crate::persist::{DataWarning, FileStore, KeyValueStore};
use crate::sync::{CloudStore, DataSync, SyncStatus, User};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error("Bestiary error: {0}")]
    Bestiary(#[from] SourceError),
}

/// A running tracker.
pub struct TrackerSession {
    book: CampaignBook,
    sync: DataSync,
    bestiary: Bestiary,
    warnings: Vec<DataWarning>,
}

impl TrackerSession {
    /// Open a session backed by files under the configured data directory.
    pub async fn open(config: &TrackerConfig) -> Result<Self, SessionError> {
        Self::open_with(config, Arc::new(FileStore::new(&config.data_dir)), None).await
    }

    /// Open with explicit storage collaborators.
    pub async fn open_with(
        config: &TrackerConfig,
        local: Arc<dyn KeyValueStore>,
        cloud: Option<Arc<dyn CloudStore>>,
    ) -> Result<Self, SessionError> {
        let bestiary = Bestiary::from_config(config)?;
        let sync = DataSync::open(local, cloud, config.storage_key.clone()).await;
        Ok(Self::from_parts(sync, bestiary).await)
    }

    /// Assemble from ready-made parts and load the campaign list.
    pub async fn from_parts(sync: DataSync, bestiary: Bestiary) -> Self {
        let mut session = Self {
            book: CampaignBook::new(),
            sync,
            bestiary,
            warnings: Vec::new(),
        };
        session.reload().await;
        session
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn book(&self) -> &CampaignBook {
        &self.book
    }

    pub fn campaigns(&self) -> &[Campaign] {
        self.book.campaigns()
    }

    pub fn encounter(&self, campaign: &CampaignId, encounter: &EncounterId) -> Option<&Encounter> {
        self.book.encounter(campaign, encounter)
    }

    pub fn bestiary(&self) -> &Bestiary {
        &self.bestiary
    }

    pub fn user(&self) -> Option<&User> {
        self.sync.user()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync.status().await
    }

    /// Load warnings collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<DataWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Fires when a remote change landed in local storage; call
    /// [`reload`](Self::reload) in response.
    pub fn invalidations(&self) -> broadcast::Receiver<()> {
        self.sync.subscribe_invalidations()
    }

    // ========================================================================
    // Identity and connectivity
    // ========================================================================

    pub async fn sign_in(&mut self, user: User) {
        info!(uid = %user.uid, "signed in");
        self.sync.set_user(Some(user));
        self.reload().await;
    }

    pub async fn sign_out(&mut self) {
        info!("signed out");
        self.sync.set_user(None);
        self.reload().await;
    }

    /// Returns whether coming back online pushed pending changes.
    pub async fn set_online(&self, online: bool) -> bool {
        self.sync.set_online(online).await
    }

    /// Re-read the campaign list from storage.
    pub async fn reload(&mut self) {
        let loaded = self.sync.load_campaigns().await;
        if let Some(warning) = loaded.warning {
            self.warnings.push(warning);
        }
        self.book.replace(loaded.campaigns);
    }

    // ========================================================================
    // Campaigns
    // ========================================================================

    pub async fn create_campaign(&mut self, name: &str) -> Result<CampaignId, SessionError> {
        let id = self.book.create_campaign(name)?;
        self.save().await;
        Ok(id)
    }

    pub async fn rename_campaign(
        &mut self,
        id: &CampaignId,
        name: &str,
    ) -> Result<(), SessionError> {
        self.book.rename_campaign(id, name)?;
        self.save().await;
        Ok(())
    }

    pub async fn delete_campaign(&mut self, id: &CampaignId) -> Result<(), SessionError> {
        self.book.delete_campaign(id)?;
        self.save().await;
        Ok(())
    }

    pub async fn delete_all_campaigns(&mut self) {
        self.book.delete_all_campaigns();
        self.save().await;
    }

    pub async fn touch_campaign(&mut self, id: &CampaignId) -> Result<(), SessionError> {
        self.book.touch_campaign(id)?;
        self.save().await;
        Ok(())
    }

    // ========================================================================
    // Encounters
    // ========================================================================

    pub async fn create_encounter(
        &mut self,
        campaign: &CampaignId,
        name: &str,
    ) -> Result<EncounterId, SessionError> {
        let id = self.book.create_encounter(campaign, name)?;
        self.save().await;
        Ok(id)
    }

    pub async fn rename_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        name: &str,
    ) -> Result<(), SessionError> {
        self.book.rename_encounter(campaign, encounter, name)?;
        self.save().await;
        Ok(())
    }

    pub async fn delete_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
    ) -> Result<(), SessionError> {
        self.book.delete_encounter(campaign, encounter)?;
        self.save().await;
        Ok(())
    }

    pub async fn delete_all_encounters(
        &mut self,
        campaign: &CampaignId,
    ) -> Result<(), SessionError> {
        self.book.delete_all_encounters(campaign)?;
        self.save().await;
        Ok(())
    }

    pub async fn touch_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
    ) -> Result<(), SessionError> {
        self.book.touch_encounter(campaign, encounter)?;
        self.save().await;
        Ok(())
    }

    /// Apply an encounter action. Nothing is saved if it is rejected.
    pub async fn apply(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        action: EncounterAction,
    ) -> Result<Vec<EncounterEffect>, SessionError> {
        let effects = self.book.apply(campaign, encounter, action)?;
        self.save().await;
        Ok(effects)
    }

    /// Add a bestiary monster to an encounter as a new combatant.
    pub async fn add_monster(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        monster: &Monster,
        initiative: Option<i32>,
    ) -> Result<Vec<EncounterEffect>, SessionError> {
        let effects = self
            .book
            .add_monster(campaign, encounter, monster, initiative)?;
        self.save().await;
        Ok(effects)
    }

    async fn save(&self) {
        if let Err(e) = self.sync.save_campaigns(self.book.campaigns()).await {
            error!(error = %e, "failed to save campaigns");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::encounter::NewCombatant;
    use crate::persist::{MemoryStore, LOCAL_STORAGE_KEY};
    use crate::testing::{bestiary_file, monster_json, MockSource};
    use serde_json::json;
    use std::time::Duration;

    async fn session(local: Arc<MemoryStore>) -> TrackerSession {
        let goblin = monster_json("Goblin", json!({"type": "humanoid", "tags": ["goblinoid"]}));
        let source = MockSource::new().with_file("bestiary-mm.json", bestiary_file(vec![goblin]));
        let bestiary = Bestiary::new(
            Arc::new(source),
            DiscoveryConfig::default()
                .with_candidates(["bestiary-mm.json"])
                .with_batch_delay(Duration::ZERO),
        );
        let sync = DataSync::open(local, None, LOCAL_STORAGE_KEY).await;
        TrackerSession::from_parts(sync, bestiary).await
    }

    #[tokio::test]
    async fn test_mutations_are_saved() {
        let local = Arc::new(MemoryStore::new());
        let mut s = session(local.clone()).await;
        let camp = s.create_campaign("Saved").await.unwrap();
        s.create_encounter(&camp, "Fight").await.unwrap();

        let reopened = session(local).await;
        assert_eq!(reopened.campaigns().len(), 1);
        assert_eq!(reopened.campaigns()[0].encounters()[0].name(), "Fight");
    }

    #[tokio::test]
    async fn test_save_failure_does_not_fail_mutation() {
        let local = Arc::new(MemoryStore::new());
        let mut s = session(local.clone()).await;
        local.set_available(false);

        let camp = s.create_campaign("Unsaved").await.unwrap();
        assert!(s.book().campaign(&camp).is_some());
        assert!(s.sync_status().await.sync_error.is_some());
    }

    #[tokio::test]
    async fn test_malformed_storage_warning_is_taken_once() {
        let local = Arc::new(MemoryStore::new());
        local.set(LOCAL_STORAGE_KEY, "{oops").await.unwrap();

        let mut s = session(local).await;
        assert!(s.campaigns().is_empty());
        let warnings = s.take_warnings();
        assert!(matches!(
            warnings.as_slice(),
            [DataWarning::MalformedCampaigns { .. }]
        ));
        assert!(s.take_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_add_monster_from_bestiary() {
        let mut s = session(Arc::new(MemoryStore::new())).await;
        let camp = s.create_campaign("Camp").await.unwrap();
        let enc = s.create_encounter(&camp, "Ambush").await.unwrap();

        let humanoids = s.bestiary().monsters_of_type("Humanoid").await;
        let goblin = humanoids[0].clone();
        s.add_monster(&camp, &enc, &goblin, None).await.unwrap();
        s.apply(
            &camp,
            &enc,
            EncounterAction::AddCombatant(NewCombatant::new("Aragorn", 18, 75)),
        )
        .await
        .unwrap();

        let roster = s.encounter(&camp, &enc).unwrap().combatants();
        assert_eq!(roster[0].name(), "Goblin");
        assert_eq!((roster[0].ac(), roster[0].hp()), (12, 11));
        assert_eq!(roster.len(), 2);
    }
}
