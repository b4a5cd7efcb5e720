//! Testing utilities for the tracker.
//!
//! This module provides tools for integration testing:
//! - `MockSource` for bestiary tests without disk or network access
//! - `EncounterHarness` for scripted encounter scenarios
//! - Fixture builders for monster records

use crate::bestiary::{BestiarySource, SourceError};
use crate::campaign::{CampaignBook, CampaignError};
use crate::encounter::{Combatant, EncounterAction, EncounterEffect, NewCombatant, Stage};
use crate::id::{CampaignId, CombatantId, EncounterId};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An in-memory bestiary source that counts every call.
#[derive(Default)]
pub struct MockSource {
    files: HashMap<String, String>,
    /// Files whose fetch fails with a network error.
    failing: HashSet<String>,
    /// Files whose probe errors, as if their host were down.
    unreachable_files: HashSet<String>,
    /// Every probe errors, as if the host were down.
    unreachable: bool,
    /// How long each probe takes.
    probe_delay: Duration,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetches: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }

    /// The file exists but fetching it fails.
    pub fn with_failing_file(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.files.entry(name.clone()).or_default();
        self.failing.insert(name);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Probing this one name fails with a network error.
    pub fn with_unreachable_file(mut self, name: impl Into<String>) -> Self {
        self.unreachable_files.insert(name.into());
        self
    }

    /// Make every probe sleep, so overlapping probes can be observed.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Most probes ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Files fetched since creation or the last reset, sorted.
    pub fn fetched_files(&self) -> Vec<String> {
        let mut files = self.fetched_log().clone();
        files.sort();
        files
    }

    pub fn reset_fetches(&self) {
        self.fetches.store(0, Ordering::SeqCst);
        self.fetched_log().clear();
    }

    fn fetched_log(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BestiarySource for MockSource {
    async fn exists(&self, file: &str) -> Result<bool, SourceError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unreachable || self.unreachable_files.contains(file) {
            return Err(SourceError::Network("connection refused".to_string()));
        }
        Ok(self.files.contains_key(file))
    }

    async fn fetch(&self, file: &str) -> Result<String, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched_log().push(file.to_string());

        if self.unreachable || self.failing.contains(file) {
            return Err(SourceError::Network("connection reset".to_string()));
        }
        self.files.get(file).cloned().ok_or_else(|| SourceError::Status {
            file: file.to_string(),
            status: 404,
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A minimal monster record with the given `type` value.
pub fn monster_json(name: &str, creature_type: Value) -> Value {
    json!({
        "name": name,
        "source": "MM",
        "size": ["M"],
        "type": creature_type,
        "alignment": ["N"],
        "ac": [12],
        "hp": {"average": 11, "formula": "2d8+2"},
        "speed": {"walk": 30},
        "cr": "1/2"
    })
}

/// Serialize records into a bestiary file body.
pub fn bestiary_file(monsters: Vec<Value>) -> String {
    json!({ "monster": monsters }).to_string()
}

// ============================================================================
// Encounter harness
// ============================================================================

/// A campaign book holding a single encounter, for scripted scenarios.
pub struct EncounterHarness {
    pub book: CampaignBook,
    pub campaign: CampaignId,
    pub encounter: EncounterId,
}

impl EncounterHarness {
    pub fn new() -> Self {
        let mut book = CampaignBook::new();
        let campaign = book
            .create_campaign("Test Campaign")
            .expect("valid campaign name");
        let encounter = book
            .create_encounter(&campaign, "Test Encounter")
            .expect("valid encounter name");
        Self {
            book,
            campaign,
            encounter,
        }
    }

    pub fn apply(
        &mut self,
        action: EncounterAction,
    ) -> Result<Vec<EncounterEffect>, CampaignError> {
        self.book.apply(&self.campaign, &self.encounter, action)
    }

    /// Add a combatant and return its id.
    pub fn add(&mut self, new: NewCombatant) -> Result<CombatantId, CampaignError> {
        let effects = self.apply(EncounterAction::AddCombatant(new))?;
        effects
            .into_iter()
            .find_map(|effect| match effect {
                EncounterEffect::CombatantAdded(combatant) => Some(combatant.id().clone()),
                _ => None,
            })
            .ok_or_else(|| CampaignError::EncounterNotFound(self.encounter.clone()))
    }

    /// Move from setup to combat, giving each combatant the listed score.
    pub fn start_combat(
        &mut self,
        initiatives: &[(CombatantId, i32)],
    ) -> Result<(), CampaignError> {
        self.apply(EncounterAction::ProceedToInitiative)?;
        for (id, initiative) in initiatives {
            self.apply(EncounterAction::SetInitiative {
                id: id.clone(),
                initiative: *initiative,
            })?;
        }
        self.apply(EncounterAction::ConfirmInitiative)?;
        self.apply(EncounterAction::StartCombat)?;
        Ok(())
    }

    pub fn stage(&self) -> Option<Stage> {
        self.book
            .encounter(&self.campaign, &self.encounter)
            .map(|e| e.stage())
    }

    pub fn combatants(&self) -> Vec<Combatant> {
        self.book
            .encounter(&self.campaign, &self.encounter)
            .map(|e| e.combatants().to_vec())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.combatants()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// `(current, max)` hit points of a combatant.
    pub fn hp(&self, id: &CombatantId) -> Option<(i32, i32)> {
        self.combatants()
            .iter()
            .find(|c| c.id() == id)
            .map(|c| (c.current_hp(), c.hp()))
    }
}

impl Default for EncounterHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a combatant's hit points.
pub fn assert_hp(harness: &EncounterHarness, id: &CombatantId, current: i32, max: i32) {
    assert_eq!(
        harness.hp(id),
        Some((current, max)),
        "unexpected HP for {id}"
    );
}

/// Assert the roster order by name.
pub fn assert_order(harness: &EncounterHarness, names: &[&str]) {
    assert_eq!(harness.names(), names, "unexpected roster order");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_starts_with_a_real_encounter() {
        let harness = EncounterHarness::new();
        let campaign = harness.book.campaign(&harness.campaign).unwrap();
        assert_eq!(campaign.name(), "Test Campaign");
        let encounter = campaign.encounter(&harness.encounter).unwrap();
        assert_eq!(encounter.name(), "Test Encounter");
        assert_eq!(harness.stage(), Some(Stage::PlayerSetup));
        assert!(harness.combatants().is_empty());
    }
}
