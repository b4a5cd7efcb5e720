//! Encounter state machine.
//!
//! An encounter moves a roster of combatants through a linear workflow:
//!
//! ```text
//! PlayerSetup -> InitiativeSetup -> PreCombat -> CombatActive -> Finished
//! ```
//!
//! Every change goes through the same pipeline:
//! 1. An [`EncounterAction`] describes what the user wants to do
//! 2. [`Encounter::resolve`] validates it against the current state and
//!    produces [`EncounterEffect`]s, or rejects it with an error
//! 3. The effects are applied to the encounter
//!
//! Because validation happens entirely in step 2, a rejected action never
//! leaves a half-applied change behind.

use crate::id::{CombatantId, EncounterId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Input that was rejected before touching any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("{field} must be a number (got {input:?})")]
    NotANumber { field: &'static str, input: String },

    #[error("Armor class must be non-negative (got {0})")]
    NegativeArmorClass(i32),

    #[error("Max HP must be positive (got {0})")]
    NonPositiveMaxHp(i32),

    #[error("Current HP must be between 0 and {max} (got {value})")]
    CurrentHpOutOfRange { value: i32, max: i32 },

    #[error("{field} must be a positive amount (got {value})")]
    NonPositiveAmount { field: &'static str, value: i32 },

    #[error("An initiative value is required to join a roster that is already past setup")]
    InitiativeRequired,
}

/// Errors from encounter actions. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncounterError {
    #[error("Encounter is finished and can no longer be changed")]
    Finished,

    #[error("{action} is not allowed during {stage}")]
    WrongStage { action: &'static str, stage: Stage },

    #[error("Encounter has no combatants")]
    EmptyRoster,

    #[error("Missing initiative for: {}", .0.join(", "))]
    MissingInitiative(Vec<String>),

    #[error("Combatant not found: {0}")]
    CombatantNotFound(CombatantId),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

// ============================================================================
// Stage
// ============================================================================

/// Position of an encounter in its setup -> combat workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    PlayerSetup,
    InitiativeSetup,
    PreCombat,
    CombatActive,
    /// Terminal. Only a rename is accepted once here.
    Finished,
}

impl Stage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::PlayerSetup => "Player Setup",
            Stage::InitiativeSetup => "Initiative Setup",
            Stage::PreCombat => "Pre Combat",
            Stage::CombatActive => "Combat Active",
            Stage::Finished => "Finished",
        }
    }

    /// Roster order is derived from initiative in these stages.
    pub fn is_initiative_ordered(&self) -> bool {
        matches!(self, Stage::PreCombat | Stage::CombatActive)
    }

    /// Stages that fall back to setup when the roster empties.
    fn needs_roster(&self) -> bool {
        matches!(
            self,
            Stage::InitiativeSetup | Stage::PreCombat | Stage::CombatActive
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Combatants
// ============================================================================

/// A player character or monster tracked within one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    id: CombatantId,
    name: String,
    ac: u32,
    hp: i32,
    current_hp: i32,
    #[serde(default)]
    initiative: Option<i32>,
}

impl Combatant {
    fn from_new(new: NewCombatant) -> Self {
        // Callers validate first, so the conversions below cannot lose data.
        let ac = u32::try_from(new.ac).unwrap_or_default();
        Self {
            id: CombatantId::new(),
            name: new.name.trim().to_string(),
            ac,
            hp: new.hp,
            current_hp: new.hp,
            initiative: new.initiative,
        }
    }

    pub fn id(&self) -> &CombatantId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ac(&self) -> u32 {
        self.ac
    }

    /// Maximum hit points.
    pub fn hp(&self) -> i32 {
        self.hp
    }

    pub fn current_hp(&self) -> i32 {
        self.current_hp
    }

    /// Initiative score, 0 until one has been entered.
    pub fn initiative(&self) -> i32 {
        self.initiative.unwrap_or(0)
    }

    pub fn has_initiative(&self) -> bool {
        self.initiative.is_some()
    }

    /// Downed combatants stay in the roster; this is display-only.
    pub fn is_downed(&self) -> bool {
        self.current_hp <= 0
    }

    /// Clamp stats that older saves may have left out of range.
    fn repair(&mut self) {
        if self.hp <= 0 {
            self.hp = 1;
        }
        self.current_hp = self.current_hp.clamp(0, self.hp);
    }
}

/// Details for a combatant about to join an encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCombatant {
    pub name: String,
    pub ac: i32,
    pub hp: i32,
    pub initiative: Option<i32>,
}

impl NewCombatant {
    pub fn new(name: impl Into<String>, ac: i32, hp: i32) -> Self {
        Self {
            name: name.into(),
            ac,
            hp,
            initiative: None,
        }
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = Some(initiative);
        self
    }

    /// Build from raw form input, rejecting blank or non-numeric fields.
    pub fn parse(name: &str, ac: &str, hp: &str) -> Result<Self, ValidationError> {
        let new = Self::new(
            name.trim(),
            parse_number("AC", ac)?,
            parse_number("HP", hp)?,
        );
        new.validate()?;
        Ok(new)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.ac < 0 {
            return Err(ValidationError::NegativeArmorClass(self.ac));
        }
        if self.hp <= 0 {
            return Err(ValidationError::NonPositiveMaxHp(self.hp));
        }
        Ok(())
    }
}

/// Parse a whole number typed by the user.
pub fn parse_number(field: &'static str, input: &str) -> Result<i32, ValidationError> {
    input
        .trim()
        .parse::<i32>()
        .map_err(|_| ValidationError::NotANumber {
            field,
            input: input.to_string(),
        })
}

/// Parse a damage or heal amount, which must be positive.
pub fn parse_amount(field: &'static str, input: &str) -> Result<i32, ValidationError> {
    positive(field, parse_number(field, input)?)
}

/// Parse an initiative score.
pub fn parse_initiative(input: &str) -> Result<i32, ValidationError> {
    parse_number("Initiative", input)
}

/// A roster edit to a single field of a combatant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombatantEdit {
    Name(String),
    ArmorClass(i32),
    MaxHp(i32),
    CurrentHp(i32),
}

// ============================================================================
// Actions and Effects
// ============================================================================

/// Something the user wants to do to an encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterAction {
    /// Add a combatant. Past setup an initiative must be supplied.
    AddCombatant(NewCombatant),

    /// Remove a combatant from the roster
    RemoveCombatant(CombatantId),

    /// Leave player setup and start collecting initiative
    ProceedToInitiative,

    /// Record a combatant's initiative score
    SetInitiative { id: CombatantId, initiative: i32 },

    /// Order the roster by initiative and get ready to fight
    ConfirmInitiative,

    /// Begin combat
    StartCombat,

    /// Subtract hit points, never below 0
    ApplyDamage { id: CombatantId, amount: i32 },

    /// Restore hit points, never above max
    ApplyHeal { id: CombatantId, amount: i32 },

    /// Change a single field while editing the roster
    EditCombatant { id: CombatantId, edit: CombatantEdit },

    /// End the encounter; it becomes read-only
    Finish,

    /// Change the encounter name
    Rename(String),
}

impl EncounterAction {
    pub fn name(&self) -> &'static str {
        match self {
            EncounterAction::AddCombatant(_) => "Adding a combatant",
            EncounterAction::RemoveCombatant(_) => "Removing a combatant",
            EncounterAction::ProceedToInitiative => "Proceeding to initiative",
            EncounterAction::SetInitiative { .. } => "Setting initiative",
            EncounterAction::ConfirmInitiative => "Confirming initiative",
            EncounterAction::StartCombat => "Starting combat",
            EncounterAction::ApplyDamage { .. } => "Applying damage",
            EncounterAction::ApplyHeal { .. } => "Healing",
            EncounterAction::EditCombatant { .. } => "Editing a combatant",
            EncounterAction::Finish => "Finishing the encounter",
            EncounterAction::Rename(_) => "Renaming",
        }
    }
}

/// A concrete state change produced by resolving an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterEffect {
    CombatantAdded(Combatant),
    CombatantRemoved { id: CombatantId, name: String },
    StageChanged { from: Stage, to: Stage },
    InitiativeSet { id: CombatantId, initiative: i32 },
    /// Stable sort by initiative, highest first
    RosterSorted,
    HpChanged {
        id: CombatantId,
        previous: i32,
        current: i32,
    },
    NameChanged { id: CombatantId, name: String },
    ArmorClassChanged { id: CombatantId, ac: u32 },
    MaxHpChanged {
        id: CombatantId,
        hp: i32,
        current_hp: i32,
    },
    Renamed(String),
}

impl EncounterEffect {
    /// Whether this effect left a combatant at 0 HP.
    pub fn downs_combatant(&self) -> bool {
        matches!(
            self,
            EncounterEffect::HpChanged { previous, current, .. } if *current == 0 && *previous > 0
        )
    }
}

// ============================================================================
// Encounter
// ============================================================================

/// One combat scenario: an ordered roster plus its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    id: EncounterId,
    name: String,
    #[serde(rename = "players", default)]
    combatants: Vec<Combatant>,
    #[serde(default)]
    stage: Stage,
    #[serde(default)]
    last_modified: i64,
    #[serde(default)]
    created_date: i64,
}

impl Encounter {
    pub fn new(name: impl Into<String>, now: i64) -> Self {
        Self {
            id: EncounterId::new(),
            name: name.into(),
            combatants: Vec::new(),
            stage: Stage::PlayerSetup,
            last_modified: now,
            created_date: now,
        }
    }

    pub fn id(&self) -> &EncounterId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn combatant(&self, id: &CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    pub fn created_date(&self) -> i64 {
        self.created_date
    }

    /// Finished encounters are in review mode.
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Validate an action and return the effects it would have, without
    /// changing anything.
    pub fn resolve(
        &self,
        action: &EncounterAction,
    ) -> Result<Vec<EncounterEffect>, EncounterError> {
        if self.is_finished() && !matches!(action, EncounterAction::Rename(_)) {
            return Err(EncounterError::Finished);
        }

        match action {
            EncounterAction::AddCombatant(new) => self.resolve_add(new),
            EncounterAction::RemoveCombatant(id) => self.resolve_remove(id),
            EncounterAction::ProceedToInitiative => {
                self.require_stage(action, Stage::PlayerSetup)?;
                self.require_roster()?;
                Ok(vec![self.stage_change(Stage::InitiativeSetup)])
            }
            EncounterAction::SetInitiative { id, initiative } => {
                if self.stage == Stage::PlayerSetup {
                    return Err(self.wrong_stage(action));
                }
                self.find(id)?;
                let mut effects = vec![EncounterEffect::InitiativeSet {
                    id: id.clone(),
                    initiative: *initiative,
                }];
                if self.stage.is_initiative_ordered() {
                    effects.push(EncounterEffect::RosterSorted);
                }
                Ok(effects)
            }
            EncounterAction::ConfirmInitiative => {
                self.require_stage(action, Stage::InitiativeSetup)?;
                self.require_roster()?;
                let missing: Vec<String> = self
                    .combatants
                    .iter()
                    .filter(|c| !c.has_initiative())
                    .map(|c| c.name.clone())
                    .collect();
                if !missing.is_empty() {
                    return Err(EncounterError::MissingInitiative(missing));
                }
                Ok(vec![
                    EncounterEffect::RosterSorted,
                    self.stage_change(Stage::PreCombat),
                ])
            }
            EncounterAction::StartCombat => {
                self.require_stage(action, Stage::PreCombat)?;
                self.require_roster()?;
                Ok(vec![self.stage_change(Stage::CombatActive)])
            }
            EncounterAction::ApplyDamage { id, amount } => {
                self.require_stage(action, Stage::CombatActive)?;
                let amount = positive("Damage", *amount)?;
                let target = self.find(id)?;
                let current = target.current_hp.saturating_sub(amount).max(0);
                Ok(vec![EncounterEffect::HpChanged {
                    id: id.clone(),
                    previous: target.current_hp,
                    current,
                }])
            }
            EncounterAction::ApplyHeal { id, amount } => {
                self.require_stage(action, Stage::CombatActive)?;
                let amount = positive("Heal", *amount)?;
                let target = self.find(id)?;
                let current = target.current_hp.saturating_add(amount).min(target.hp);
                Ok(vec![EncounterEffect::HpChanged {
                    id: id.clone(),
                    previous: target.current_hp,
                    current,
                }])
            }
            EncounterAction::EditCombatant { id, edit } => self.resolve_edit(id, edit),
            EncounterAction::Finish => {
                self.require_stage(action, Stage::CombatActive)?;
                Ok(vec![self.stage_change(Stage::Finished)])
            }
            EncounterAction::Rename(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ValidationError::EmptyName.into());
                }
                Ok(vec![EncounterEffect::Renamed(name.to_string())])
            }
        }
    }

    /// Resolve an action and apply its effects, stamping the encounter.
    pub fn apply(
        &mut self,
        action: EncounterAction,
        now: i64,
    ) -> Result<Vec<EncounterEffect>, EncounterError> {
        let effects = match self.resolve(&action) {
            Ok(effects) => effects,
            Err(e) => {
                tracing::debug!(
                    encounter = %self.id,
                    action = action.name(),
                    error = %e,
                    "encounter action rejected"
                );
                return Err(e);
            }
        };

        for effect in &effects {
            self.apply_effect(effect);
        }
        self.last_modified = now;

        tracing::debug!(
            encounter = %self.id,
            action = action.name(),
            stage = %self.stage,
            effects = effects.len(),
            "encounter action applied"
        );
        Ok(effects)
    }

    fn apply_effect(&mut self, effect: &EncounterEffect) {
        match effect {
            EncounterEffect::CombatantAdded(combatant) => self.combatants.push(combatant.clone()),
            EncounterEffect::CombatantRemoved { id, .. } => self.combatants.retain(|c| &c.id != id),
            EncounterEffect::StageChanged { to, .. } => self.stage = *to,
            EncounterEffect::InitiativeSet { id, initiative } => {
                if let Some(c) = self.combatant_mut(id) {
                    c.initiative = Some(*initiative);
                }
            }
            EncounterEffect::RosterSorted => {
                // sort_by is stable, so ties keep their current relative order
                self.combatants
                    .sort_by(|a, b| b.initiative().cmp(&a.initiative()));
            }
            EncounterEffect::HpChanged { id, current, .. } => {
                if let Some(c) = self.combatant_mut(id) {
                    c.current_hp = *current;
                }
            }
            EncounterEffect::NameChanged { id, name } => {
                if let Some(c) = self.combatant_mut(id) {
                    c.name = name.clone();
                }
            }
            EncounterEffect::ArmorClassChanged { id, ac } => {
                if let Some(c) = self.combatant_mut(id) {
                    c.ac = *ac;
                }
            }
            EncounterEffect::MaxHpChanged { id, hp, current_hp } => {
                if let Some(c) = self.combatant_mut(id) {
                    c.hp = *hp;
                    c.current_hp = *current_hp;
                }
            }
            EncounterEffect::Renamed(name) => self.name = name.clone(),
        }
    }

    pub(crate) fn touch(&mut self, now: i64) {
        self.last_modified = now;
    }

    /// Fill in timestamps and clamp stats that older saves may lack.
    pub(crate) fn repair(&mut self, now: i64) {
        if self.last_modified <= 0 {
            self.last_modified = now;
        }
        if self.created_date <= 0 {
            self.created_date = self.last_modified;
        }
        for combatant in &mut self.combatants {
            combatant.repair();
        }
        if self.combatants.is_empty() && self.stage.needs_roster() {
            self.stage = Stage::PlayerSetup;
        }
    }

    fn resolve_add(&self, new: &NewCombatant) -> Result<Vec<EncounterEffect>, EncounterError> {
        new.validate()?;
        if self.stage != Stage::PlayerSetup && new.initiative.is_none() {
            return Err(ValidationError::InitiativeRequired.into());
        }

        let mut effects = vec![EncounterEffect::CombatantAdded(Combatant::from_new(new.clone()))];
        if self.stage.is_initiative_ordered() {
            effects.push(EncounterEffect::RosterSorted);
        }
        Ok(effects)
    }

    fn resolve_remove(&self, id: &CombatantId) -> Result<Vec<EncounterEffect>, EncounterError> {
        let target = self.find(id)?;
        let mut effects = vec![EncounterEffect::CombatantRemoved {
            id: id.clone(),
            name: target.name.clone(),
        }];
        if self.combatants.len() == 1 && self.stage.needs_roster() {
            effects.push(self.stage_change(Stage::PlayerSetup));
        }
        Ok(effects)
    }

    fn resolve_edit(
        &self,
        id: &CombatantId,
        edit: &CombatantEdit,
    ) -> Result<Vec<EncounterEffect>, EncounterError> {
        let target = self.find(id)?;
        let effect = match edit {
            CombatantEdit::Name(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ValidationError::EmptyName.into());
                }
                EncounterEffect::NameChanged {
                    id: id.clone(),
                    name: name.to_string(),
                }
            }
            CombatantEdit::ArmorClass(ac) => {
                let ac = u32::try_from(*ac).map_err(|_| ValidationError::NegativeArmorClass(*ac))?;
                EncounterEffect::ArmorClassChanged { id: id.clone(), ac }
            }
            CombatantEdit::MaxHp(hp) => {
                if *hp <= 0 {
                    return Err(ValidationError::NonPositiveMaxHp(*hp).into());
                }
                EncounterEffect::MaxHpChanged {
                    id: id.clone(),
                    hp: *hp,
                    current_hp: target.current_hp.min(*hp),
                }
            }
            CombatantEdit::CurrentHp(value) => {
                if *value < 0 || *value > target.hp {
                    return Err(ValidationError::CurrentHpOutOfRange {
                        value: *value,
                        max: target.hp,
                    }
                    .into());
                }
                EncounterEffect::HpChanged {
                    id: id.clone(),
                    previous: target.current_hp,
                    current: *value,
                }
            }
        };
        Ok(vec![effect])
    }

    fn find(&self, id: &CombatantId) -> Result<&Combatant, EncounterError> {
        self.combatant(id)
            .ok_or_else(|| EncounterError::CombatantNotFound(id.clone()))
    }

    fn combatant_mut(&mut self, id: &CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| &c.id == id)
    }

    fn require_stage(&self, action: &EncounterAction, stage: Stage) -> Result<(), EncounterError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(self.wrong_stage(action))
        }
    }

    fn require_roster(&self) -> Result<(), EncounterError> {
        if self.combatants.is_empty() {
            Err(EncounterError::EmptyRoster)
        } else {
            Ok(())
        }
    }

    fn wrong_stage(&self, action: &EncounterAction) -> EncounterError {
        EncounterError::WrongStage {
            action: action.name(),
            stage: self.stage,
        }
    }

    fn stage_change(&self, to: Stage) -> EncounterEffect {
        EncounterEffect::StageChanged {
            from: self.stage,
            to,
        }
    }
}

fn positive(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value <= 0 {
        Err(ValidationError::NonPositiveAmount { field, value })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(enc: &mut Encounter, name: &str, ac: i32, hp: i32) -> CombatantId {
        enc.apply(
            EncounterAction::AddCombatant(NewCombatant::new(name, ac, hp)),
            1,
        )
        .unwrap();
        enc.combatants().last().unwrap().id().clone()
    }

    fn set_init(enc: &mut Encounter, id: &CombatantId, initiative: i32) {
        enc.apply(
            EncounterAction::SetInitiative {
                id: id.clone(),
                initiative,
            },
            1,
        )
        .unwrap();
    }

    /// Encounter in combat with a single Orc (15 HP).
    fn orc_fight() -> (Encounter, CombatantId) {
        let mut enc = Encounter::new("Goblin Ambush", 0);
        let orc = add(&mut enc, "Orc", 13, 15);
        enc.apply(EncounterAction::ProceedToInitiative, 1).unwrap();
        set_init(&mut enc, &orc, 12);
        enc.apply(EncounterAction::ConfirmInitiative, 1).unwrap();
        enc.apply(EncounterAction::StartCombat, 1).unwrap();
        (enc, orc)
    }

    fn assert_hp_invariant(enc: &Encounter) {
        for c in enc.combatants() {
            assert!(c.current_hp() >= 0 && c.current_hp() <= c.hp(), "{c:?}");
        }
    }

    #[test]
    fn test_add_combatant_in_setup() {
        let mut enc = Encounter::new("Test", 0);
        let id = add(&mut enc, "Orc", 13, 15);

        let orc = enc.combatant(&id).unwrap();
        assert_eq!(orc.name(), "Orc");
        assert_eq!(orc.ac(), 13);
        assert_eq!(orc.hp(), 15);
        assert_eq!(orc.current_hp(), 15);
        assert_eq!(orc.initiative(), 0);
        assert!(!orc.has_initiative());
    }

    #[test]
    fn test_add_rejects_invalid_input() {
        let mut enc = Encounter::new("Test", 0);
        let before = enc.clone();

        for new in [
            NewCombatant::new("  ", 10, 10),
            NewCombatant::new("Orc", -1, 10),
            NewCombatant::new("Orc", 10, 0),
        ] {
            let result = enc.apply(EncounterAction::AddCombatant(new), 5);
            assert!(matches!(result, Err(EncounterError::Invalid(_))));
        }
        assert_eq!(enc, before);
    }

    #[test]
    fn test_parse_new_combatant() {
        let new = NewCombatant::parse(" Orc Raider ", "13", " 15").unwrap();
        assert_eq!(new.name, "Orc Raider");
        assert_eq!((new.ac, new.hp), (13, 15));

        assert_eq!(
            NewCombatant::parse("Orc", "thirteen", "15"),
            Err(ValidationError::NotANumber {
                field: "AC",
                input: "thirteen".to_string()
            })
        );
        assert!(NewCombatant::parse("Orc", "13", "").is_err());
        assert_eq!(
            parse_amount("Damage", "-3"),
            Err(ValidationError::NonPositiveAmount {
                field: "Damage",
                value: -3
            })
        );
        assert_eq!(parse_amount("Heal", " 7 "), Ok(7));
        assert_eq!(parse_initiative("-2"), Ok(-2));
    }

    #[test]
    fn test_proceed_requires_combatants() {
        let mut enc = Encounter::new("Empty", 0);
        assert_eq!(
            enc.apply(EncounterAction::ProceedToInitiative, 1),
            Err(EncounterError::EmptyRoster)
        );
        assert_eq!(enc.stage(), Stage::PlayerSetup);
    }

    #[test]
    fn test_confirm_initiative_sorts_descending_and_stable() {
        let mut enc = Encounter::new("Order", 0);
        let a = add(&mut enc, "A", 10, 10);
        let b = add(&mut enc, "B", 10, 10);
        let c = add(&mut enc, "C", 10, 10);
        let d = add(&mut enc, "D", 10, 10);
        enc.apply(EncounterAction::ProceedToInitiative, 1).unwrap();
        set_init(&mut enc, &a, 5);
        set_init(&mut enc, &b, 18);
        set_init(&mut enc, &c, 5);
        set_init(&mut enc, &d, 12);

        enc.apply(EncounterAction::ConfirmInitiative, 2).unwrap();

        let names: Vec<_> = enc.combatants().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["B", "D", "A", "C"]);
        assert_eq!(enc.stage(), Stage::PreCombat);
    }

    #[test]
    fn test_confirm_with_missing_initiative_keeps_stage() {
        let mut enc = Encounter::new("Missing", 0);
        let a = add(&mut enc, "Aragorn", 18, 75);
        add(&mut enc, "Orc", 13, 15);
        enc.apply(EncounterAction::ProceedToInitiative, 1).unwrap();
        set_init(&mut enc, &a, 20);
        let before = enc.clone();

        let result = enc.apply(EncounterAction::ConfirmInitiative, 9);
        assert_eq!(
            result,
            Err(EncounterError::MissingInitiative(vec!["Orc".to_string()]))
        );
        assert_eq!(enc, before);
        assert_eq!(enc.stage(), Stage::InitiativeSetup);
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let (mut enc, orc) = orc_fight();
        let effects = enc
            .apply(
                EncounterAction::ApplyDamage {
                    id: orc.clone(),
                    amount: 20,
                },
                2,
            )
            .unwrap();

        let orc_state = enc.combatant(&orc).unwrap();
        assert_eq!(orc_state.current_hp(), 0);
        assert!(orc_state.is_downed());
        assert!(effects[0].downs_combatant());
        // Downed combatants stay in the roster
        assert_eq!(enc.combatants().len(), 1);
    }

    #[test]
    fn test_heal_clamps_at_max() {
        let mut enc = Encounter::new("Heal", 0);
        let id = add(&mut enc, "Cleric", 16, 20);
        enc.apply(EncounterAction::ProceedToInitiative, 1).unwrap();
        set_init(&mut enc, &id, 3);
        enc.apply(EncounterAction::ConfirmInitiative, 1).unwrap();
        enc.apply(EncounterAction::StartCombat, 1).unwrap();
        enc.apply(
            EncounterAction::ApplyDamage {
                id: id.clone(),
                amount: 15,
            },
            1,
        )
        .unwrap();
        assert_eq!(enc.combatant(&id).unwrap().current_hp(), 5);

        enc.apply(
            EncounterAction::ApplyHeal {
                id: id.clone(),
                amount: 30,
            },
            1,
        )
        .unwrap();
        assert_eq!(enc.combatant(&id).unwrap().current_hp(), 20);
    }

    #[test]
    fn test_damage_outside_combat_rejected() {
        let mut enc = Encounter::new("Setup", 0);
        let id = add(&mut enc, "Orc", 13, 15);
        let result = enc.apply(EncounterAction::ApplyDamage { id, amount: 3 }, 1);
        assert!(matches!(result, Err(EncounterError::WrongStage { .. })));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let (mut enc, orc) = orc_fight();
        let result = enc.apply(
            EncounterAction::ApplyHeal {
                id: orc.clone(),
                amount: 0,
            },
            1,
        );
        assert!(matches!(
            result,
            Err(EncounterError::Invalid(ValidationError::NonPositiveAmount { .. }))
        ));
        assert_eq!(enc.combatant(&orc).unwrap().current_hp(), 15);
    }

    #[test]
    fn test_deleting_last_combatant_resets_stage() {
        for target in [Stage::InitiativeSetup, Stage::PreCombat, Stage::CombatActive] {
            let mut enc = Encounter::new("Reset", 0);
            let id = add(&mut enc, "Orc", 13, 15);
            enc.apply(EncounterAction::ProceedToInitiative, 1).unwrap();
            if target != Stage::InitiativeSetup {
                set_init(&mut enc, &id, 4);
                enc.apply(EncounterAction::ConfirmInitiative, 1).unwrap();
            }
            if target == Stage::CombatActive {
                enc.apply(EncounterAction::StartCombat, 1).unwrap();
            }
            assert_eq!(enc.stage(), target);

            enc.apply(EncounterAction::RemoveCombatant(id), 2).unwrap();
            assert!(enc.combatants().is_empty());
            assert_eq!(enc.stage(), Stage::PlayerSetup);
        }
    }

    #[test]
    fn test_deleting_one_of_many_keeps_stage() {
        let (mut enc, orc) = orc_fight();
        enc.apply(
            EncounterAction::AddCombatant(NewCombatant::new("Goblin", 15, 7).with_initiative(2)),
            1,
        )
        .unwrap();
        enc.apply(EncounterAction::RemoveCombatant(orc), 1).unwrap();
        assert_eq!(enc.stage(), Stage::CombatActive);
        assert_eq!(enc.combatants().len(), 1);
    }

    #[test]
    fn test_adding_mid_combat_requires_initiative_and_sorts() {
        let (mut enc, _orc) = orc_fight();

        let result = enc.apply(
            EncounterAction::AddCombatant(NewCombatant::new("Wolf", 13, 11)),
            1,
        );
        assert_eq!(
            result,
            Err(EncounterError::Invalid(ValidationError::InitiativeRequired))
        );

        enc.apply(
            EncounterAction::AddCombatant(NewCombatant::new("Wolf", 13, 11).with_initiative(15)),
            1,
        )
        .unwrap();
        enc.apply(
            EncounterAction::AddCombatant(NewCombatant::new("Zombie", 8, 22).with_initiative(-1)),
            1,
        )
        .unwrap();

        let names: Vec<_> = enc.combatants().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Wolf", "Orc", "Zombie"]);
    }

    #[test]
    fn test_roster_edits_validate_and_clamp() {
        let (mut enc, orc) = orc_fight();
        let before = enc.clone();

        let edit = |edit| EncounterAction::EditCombatant {
            id: orc.clone(),
            edit,
        };

        assert!(enc.apply(edit(CombatantEdit::CurrentHp(16)), 1).is_err());
        assert!(enc.apply(edit(CombatantEdit::CurrentHp(-1)), 1).is_err());
        assert!(enc.apply(edit(CombatantEdit::Name("   ".into())), 1).is_err());
        assert!(enc.apply(edit(CombatantEdit::ArmorClass(-3)), 1).is_err());
        assert!(enc.apply(edit(CombatantEdit::MaxHp(0)), 1).is_err());
        assert_eq!(enc, before);

        enc.apply(edit(CombatantEdit::MaxHp(10)), 2).unwrap();
        let orc_state = enc.combatant(&orc).unwrap();
        assert_eq!((orc_state.hp(), orc_state.current_hp()), (10, 10));

        enc.apply(edit(CombatantEdit::CurrentHp(0)), 2).unwrap();
        enc.apply(edit(CombatantEdit::Name(" Orc Chief ".into())), 2)
            .unwrap();
        enc.apply(edit(CombatantEdit::ArmorClass(16)), 2).unwrap();
        let orc_state = enc.combatant(&orc).unwrap();
        assert_eq!(orc_state.current_hp(), 0);
        assert_eq!(orc_state.name(), "Orc Chief");
        assert_eq!(orc_state.ac(), 16);
        assert_hp_invariant(&enc);
    }

    #[test]
    fn test_finished_encounter_is_read_only() {
        let (mut enc, orc) = orc_fight();
        enc.apply(EncounterAction::Finish, 3).unwrap();
        assert!(enc.is_finished());
        let before = enc.clone();

        let attempts = vec![
            EncounterAction::AddCombatant(NewCombatant::new("Late", 10, 10).with_initiative(1)),
            EncounterAction::RemoveCombatant(orc.clone()),
            EncounterAction::ProceedToInitiative,
            EncounterAction::SetInitiative {
                id: orc.clone(),
                initiative: 3,
            },
            EncounterAction::ConfirmInitiative,
            EncounterAction::StartCombat,
            EncounterAction::ApplyDamage {
                id: orc.clone(),
                amount: 1,
            },
            EncounterAction::ApplyHeal {
                id: orc.clone(),
                amount: 1,
            },
            EncounterAction::EditCombatant {
                id: orc.clone(),
                edit: CombatantEdit::CurrentHp(1),
            },
            EncounterAction::Finish,
        ];
        for action in attempts {
            assert_eq!(enc.apply(action, 99), Err(EncounterError::Finished));
        }
        assert_eq!(enc, before);
    }

    #[test]
    fn test_finish_only_from_combat() {
        let mut enc = Encounter::new("Early", 0);
        add(&mut enc, "Orc", 13, 15);
        assert!(matches!(
            enc.apply(EncounterAction::Finish, 1),
            Err(EncounterError::WrongStage { .. })
        ));
    }

    #[test]
    fn test_apply_stamps_last_modified() {
        let mut enc = Encounter::new("Stamp", 100);
        assert_eq!(enc.created_date(), 100);
        enc.apply(EncounterAction::Rename("Renamed".into()), 250)
            .unwrap();
        assert_eq!(enc.name(), "Renamed");
        assert_eq!(enc.last_modified(), 250);
        assert_eq!(enc.created_date(), 100);
    }

    #[test]
    fn test_hp_invariant_over_mixed_sequence() {
        let (mut enc, orc) = orc_fight();
        for (i, amount) in [3, 40, 1, 7, 100, 2].into_iter().enumerate() {
            let action = if i % 2 == 0 {
                EncounterAction::ApplyDamage {
                    id: orc.clone(),
                    amount,
                }
            } else {
                EncounterAction::ApplyHeal {
                    id: orc.clone(),
                    amount,
                }
            };
            enc.apply(action, i as i64).unwrap();
            assert_hp_invariant(&enc);
        }
    }

    #[test]
    fn test_legacy_encounter_json() {
        let json = r#"{
            "id": "enc-1",
            "name": "Old Save",
            "players": [
                {"id": "p1", "name": "Orc", "ac": 13, "hp": 15, "initiative": 0, "currentHp": -4}
            ],
            "stage": "COMBAT_ACTIVE",
            "lastModified": 1700000000000,
            "type": "local"
        }"#;
        let mut enc: Encounter = serde_json::from_str(json).unwrap();
        enc.repair(1);

        assert_eq!(enc.stage(), Stage::CombatActive);
        assert_eq!(enc.created_date(), 1700000000000);
        assert_eq!(enc.combatants()[0].current_hp(), 0);
        assert_eq!(enc.combatants()[0].initiative(), 0);
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(
            serde_json::to_string(&Stage::InitiativeSetup).unwrap(),
            "\"INITIATIVE_SETUP\""
        );
        assert_eq!(
            serde_json::from_str::<Stage>("\"FINISHED\"").unwrap(),
            Stage::Finished
        );
        assert_eq!(Stage::PreCombat.to_string(), "Pre Combat");
    }
}
