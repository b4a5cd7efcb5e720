//! Campaigns and the campaign book.
//!
//! The [`CampaignBook`] is the only place campaigns and encounters are
//! mutated. Every entry point stamps what it touched and then calls
//! `commit`, which re-sorts encounters and campaigns so the most recently
//! touched come first.

use crate::bestiary::Monster;
use crate::encounter::{Encounter, EncounterAction, EncounterEffect, EncounterError};
use crate::id::{CampaignId, EncounterId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from campaign book operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("Encounter not found: {0}")]
    EncounterNotFound(EncounterId),

    #[error(transparent)]
    Encounter(#[from] EncounterError),
}

/// A named collection of encounters. The unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    id: CampaignId,
    name: String,
    #[serde(default)]
    encounters: Vec<Encounter>,
    #[serde(default)]
    last_modified: i64,
}

impl Campaign {
    fn new(name: String, now: i64) -> Self {
        Self {
            id: CampaignId::new(),
            name,
            encounters: Vec::new(),
            last_modified: now,
        }
    }

    pub fn id(&self) -> &CampaignId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encounters, most recently modified first.
    pub fn encounters(&self) -> &[Encounter] {
        &self.encounters
    }

    pub fn encounter(&self, id: &EncounterId) -> Option<&Encounter> {
        self.encounters.iter().find(|e| e.id() == id)
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn encounter_mut(&mut self, id: &EncounterId) -> Result<&mut Encounter, CampaignError> {
        self.encounters
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| CampaignError::EncounterNotFound(id.clone()))
    }

    fn sort_encounters(&mut self) {
        self.encounters
            .sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));
    }

    /// Fill in timestamps that saves from older versions lack.
    pub(crate) fn repair(&mut self, now: i64) {
        if self.last_modified <= 0 {
            self.last_modified = now;
        }
        for encounter in &mut self.encounters {
            encounter.repair(now);
        }
        self.sort_encounters();
    }
}

/// Sort campaigns most recently modified first, along with their encounters.
pub fn sort_campaigns(campaigns: &mut [Campaign]) {
    for campaign in campaigns.iter_mut() {
        campaign.sort_encounters();
    }
    campaigns.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
}

/// Owns the full campaign list and keeps it ordered.
#[derive(Debug, Clone, Default)]
pub struct CampaignBook {
    campaigns: Vec<Campaign>,
    last_stamp: i64,
}

impl CampaignBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a loaded campaign list.
    pub fn from_campaigns(campaigns: Vec<Campaign>) -> Self {
        let last_stamp = campaigns
            .iter()
            .flat_map(|c| {
                std::iter::once(c.last_modified)
                    .chain(c.encounters.iter().map(|e| e.last_modified()))
            })
            .max()
            .unwrap_or(0);
        let mut book = Self {
            campaigns,
            last_stamp,
        };
        book.commit();
        book
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn campaign(&self, id: &CampaignId) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| &c.id == id)
    }

    pub fn encounter(&self, campaign: &CampaignId, encounter: &EncounterId) -> Option<&Encounter> {
        self.campaign(campaign).and_then(|c| c.encounter(encounter))
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn into_campaigns(self) -> Vec<Campaign> {
        self.campaigns
    }

    /// Replace the whole list, e.g. after a reload.
    pub fn replace(&mut self, campaigns: Vec<Campaign>) {
        *self = Self::from_campaigns(campaigns);
    }

    // ========================================================================
    // Campaigns
    // ========================================================================

    pub fn create_campaign(&mut self, name: &str) -> Result<CampaignId, CampaignError> {
        let name = require_name(name)?;
        let stamp = self.next_stamp();
        let campaign = Campaign::new(name, stamp);
        let id = campaign.id.clone();
        info!(campaign = %id, name = %campaign.name, "campaign created");
        self.campaigns.push(campaign);
        self.commit();
        Ok(id)
    }

    pub fn rename_campaign(&mut self, id: &CampaignId, name: &str) -> Result<(), CampaignError> {
        let name = require_name(name)?;
        let stamp = self.next_stamp();
        let campaign = self.campaign_mut(id)?;
        campaign.name = name;
        campaign.last_modified = stamp;
        self.commit();
        Ok(())
    }

    pub fn delete_campaign(&mut self, id: &CampaignId) -> Result<(), CampaignError> {
        let before = self.campaigns.len();
        self.campaigns.retain(|c| &c.id != id);
        if self.campaigns.len() == before {
            return Err(CampaignError::CampaignNotFound(id.clone()));
        }
        info!(campaign = %id, "campaign deleted");
        self.commit();
        Ok(())
    }

    pub fn delete_all_campaigns(&mut self) {
        info!(count = self.campaigns.len(), "all campaigns deleted");
        self.campaigns.clear();
    }

    /// Mark a campaign as used (opened or returned to) so it sorts first.
    pub fn touch_campaign(&mut self, id: &CampaignId) -> Result<(), CampaignError> {
        let stamp = self.next_stamp();
        self.campaign_mut(id)?.last_modified = stamp;
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Encounters
    // ========================================================================

    pub fn create_encounter(
        &mut self,
        campaign: &CampaignId,
        name: &str,
    ) -> Result<EncounterId, CampaignError> {
        let name = require_name(name)?;
        let stamp = self.next_stamp();
        let target = self.campaign_mut(campaign)?;
        let encounter = Encounter::new(name, stamp);
        let id = encounter.id().clone();
        target.encounters.push(encounter);
        target.last_modified = stamp;
        debug!(campaign = %campaign, encounter = %id, "encounter created");
        self.commit();
        Ok(id)
    }

    pub fn rename_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        name: &str,
    ) -> Result<(), CampaignError> {
        self.apply(campaign, encounter, EncounterAction::Rename(name.to_string()))
            .map(|_| ())
            .map_err(|e| match e {
                CampaignError::Encounter(EncounterError::Invalid(_)) => CampaignError::EmptyName,
                other => other,
            })
    }

    pub fn delete_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
    ) -> Result<(), CampaignError> {
        let stamp = self.next_stamp();
        let target = self.campaign_mut(campaign)?;
        let before = target.encounters.len();
        target.encounters.retain(|e| e.id() != encounter);
        if target.encounters.len() == before {
            return Err(CampaignError::EncounterNotFound(encounter.clone()));
        }
        target.last_modified = stamp;
        debug!(campaign = %campaign, encounter = %encounter, "encounter deleted");
        self.commit();
        Ok(())
    }

    pub fn delete_all_encounters(&mut self, campaign: &CampaignId) -> Result<(), CampaignError> {
        let stamp = self.next_stamp();
        let target = self.campaign_mut(campaign)?;
        target.encounters.clear();
        target.last_modified = stamp;
        self.commit();
        Ok(())
    }

    /// Apply an action to one encounter and propagate the new ordering.
    ///
    /// A rejected action leaves the book untouched, timestamps included.
    pub fn apply(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        action: EncounterAction,
    ) -> Result<Vec<EncounterEffect>, CampaignError> {
        let stamp = self.last_stamp;
        let target = self.campaign_mut(campaign)?;
        let enc = target.encounter_mut(encounter)?;

        // Resolve before taking a stamp so failures leave the clock alone too
        enc.resolve(&action)?;
        let stamp = next_after(stamp);
        let effects = enc.apply(action, stamp)?;
        target.last_modified = stamp;
        self.last_stamp = stamp;
        self.commit();
        Ok(effects)
    }

    /// Add a copy of a bestiary monster to an encounter.
    pub fn add_monster(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
        monster: &Monster,
        initiative: Option<i32>,
    ) -> Result<Vec<EncounterEffect>, CampaignError> {
        let mut new = monster.to_new_combatant();
        new.initiative = initiative;
        self.apply(campaign, encounter, EncounterAction::AddCombatant(new))
    }

    /// Stamp an encounter without changing it, e.g. when it is opened.
    pub fn touch_encounter(
        &mut self,
        campaign: &CampaignId,
        encounter: &EncounterId,
    ) -> Result<(), CampaignError> {
        let stamp = self.next_stamp();
        let target = self.campaign_mut(campaign)?;
        target.encounter_mut(encounter)?.touch(stamp);
        target.last_modified = stamp;
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Re-establish ordering after any mutation.
    fn commit(&mut self) {
        sort_campaigns(&mut self.campaigns);
    }

    /// A millisecond stamp strictly greater than any previously issued.
    fn next_stamp(&mut self) -> i64 {
        self.last_stamp = next_after(self.last_stamp);
        self.last_stamp
    }

    fn campaign_mut(&mut self, id: &CampaignId) -> Result<&mut Campaign, CampaignError> {
        self.campaigns
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| CampaignError::CampaignNotFound(id.clone()))
    }
}

/// Saturates at `i64::MAX`, which a stored stamp may already hold.
fn next_after(last: i64) -> i64 {
    Utc::now().timestamp_millis().max(last.saturating_add(1))
}

fn require_name(name: &str) -> Result<String, CampaignError> {
    let name = name.trim();
    if name.is_empty() {
        Err(CampaignError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}
