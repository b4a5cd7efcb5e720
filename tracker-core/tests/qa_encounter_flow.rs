//! QA tests for running an encounter from setup to review.
//!
//! These tests drive a full encounter through the campaign book:
//! - Roster setup and validation
//! - Initiative collection and ordering
//! - Damage, healing and mid-combat arrivals
//! - The read-only finished state

use tracker_core::testing::{assert_hp, assert_order, EncounterHarness};
use tracker_core::{
    CampaignError, CombatantEdit, EncounterAction, EncounterEffect, EncounterError, NewCombatant,
    Stage, ValidationError,
};

fn encounter_error(result: Result<Vec<EncounterEffect>, CampaignError>) -> EncounterError {
    match result {
        Err(CampaignError::Encounter(e)) => e,
        other => panic!("expected an encounter error, got {other:?}"),
    }
}

// =============================================================================
// Full flow
// =============================================================================

#[test]
fn test_goblin_ambush_full_flow() {
    let mut h = EncounterHarness::new();
    assert_eq!(h.stage(), Some(Stage::PlayerSetup));

    let aragorn = h.add(NewCombatant::new("Aragorn", 18, 75)).unwrap();
    let goblin = h.add(NewCombatant::new("Goblin", 15, 7)).unwrap();
    let boss = h.add(NewCombatant::new("Goblin Boss", 17, 21)).unwrap();
    assert_order(&h, &["Aragorn", "Goblin", "Goblin Boss"]);

    h.start_combat(&[(aragorn.clone(), 12), (goblin.clone(), 17), (boss.clone(), 9)])
        .unwrap();
    assert_eq!(h.stage(), Some(Stage::CombatActive));
    assert_order(&h, &["Goblin", "Aragorn", "Goblin Boss"]);

    let effects = h
        .apply(EncounterAction::ApplyDamage {
            id: goblin.clone(),
            amount: 20,
        })
        .unwrap();
    assert!(effects.iter().any(EncounterEffect::downs_combatant));
    assert_hp(&h, &goblin, 0, 7);

    h.apply(EncounterAction::ApplyDamage {
        id: aragorn.clone(),
        amount: 30,
    })
    .unwrap();
    h.apply(EncounterAction::ApplyHeal {
        id: aragorn.clone(),
        amount: 100,
    })
    .unwrap();
    assert_hp(&h, &aragorn, 75, 75);

    h.apply(EncounterAction::Finish).unwrap();
    assert_eq!(h.stage(), Some(Stage::Finished));

    // Review mode is read-only apart from the name
    let err = encounter_error(h.apply(EncounterAction::ApplyHeal {
        id: goblin.clone(),
        amount: 5,
    }));
    assert!(matches!(err, EncounterError::Finished));
    assert_hp(&h, &goblin, 0, 7);

    h.apply(EncounterAction::Rename("Ambush (won)".to_string()))
        .unwrap();
    let enc = h.book.encounter(&h.campaign, &h.encounter).unwrap();
    assert_eq!(enc.name(), "Ambush (won)");
}

// =============================================================================
// Setup
// =============================================================================

#[test]
fn test_new_combatant_defaults() {
    let mut h = EncounterHarness::new();
    let orc = h.add(NewCombatant::new("Orc", 13, 15)).unwrap();

    let roster = h.combatants();
    assert_eq!(roster[0].current_hp(), 15);
    assert_eq!(roster[0].initiative(), 0);
    assert!(!roster[0].has_initiative());
    assert_hp(&h, &orc, 15, 15);
}

#[test]
fn test_invalid_form_input_is_rejected() {
    assert!(matches!(
        NewCombatant::parse("Orc", "thirteen", "15"),
        Err(ValidationError::NotANumber { .. })
    ));

    let mut h = EncounterHarness::new();
    let blank = NewCombatant::new("  ", 13, 15);
    let err = encounter_error(h.apply(EncounterAction::AddCombatant(blank)));
    assert!(matches!(err, EncounterError::Invalid(ValidationError::EmptyName)));
    assert!(h.combatants().is_empty());
}

#[test]
fn test_cannot_skip_initiative() {
    let mut h = EncounterHarness::new();
    h.add(NewCombatant::new("Orc", 13, 15)).unwrap();

    let err = encounter_error(h.apply(EncounterAction::StartCombat));
    assert!(matches!(err, EncounterError::WrongStage { .. }));
    assert_eq!(h.stage(), Some(Stage::PlayerSetup));
}

// =============================================================================
// Initiative
// =============================================================================

#[test]
fn test_confirm_reports_missing_initiative() {
    let mut h = EncounterHarness::new();
    let orc = h.add(NewCombatant::new("Orc", 13, 15)).unwrap();
    h.add(NewCombatant::new("Wolf", 13, 11)).unwrap();

    h.apply(EncounterAction::ProceedToInitiative).unwrap();
    h.apply(EncounterAction::SetInitiative {
        id: orc,
        initiative: 14,
    })
    .unwrap();

    let err = encounter_error(h.apply(EncounterAction::ConfirmInitiative));
    assert_eq!(err, EncounterError::MissingInitiative(vec!["Wolf".to_string()]));
    assert_eq!(h.stage(), Some(Stage::InitiativeSetup));
}

#[test]
fn test_initiative_ties_keep_entry_order() {
    let mut h = EncounterHarness::new();
    let a = h.add(NewCombatant::new("Alpha", 10, 10)).unwrap();
    let b = h.add(NewCombatant::new("Bravo", 10, 10)).unwrap();
    let c = h.add(NewCombatant::new("Charlie", 10, 10)).unwrap();

    h.start_combat(&[(a, 10), (b, 15), (c, 10)]).unwrap();
    assert_order(&h, &["Bravo", "Alpha", "Charlie"]);
}

#[test]
fn test_late_arrival_slots_into_order() {
    let mut h = EncounterHarness::new();
    let orc = h.add(NewCombatant::new("Orc", 13, 15)).unwrap();
    let ogre = h.add(NewCombatant::new("Ogre", 11, 59)).unwrap();
    h.start_combat(&[(orc, 18), (ogre, 4)]).unwrap();

    let no_initiative = NewCombatant::new("Wolf", 13, 11);
    let err = encounter_error(h.apply(EncounterAction::AddCombatant(no_initiative)));
    assert!(matches!(
        err,
        EncounterError::Invalid(ValidationError::InitiativeRequired)
    ));

    h.add(NewCombatant::new("Wolf", 13, 11).with_initiative(12))
        .unwrap();
    assert_order(&h, &["Orc", "Wolf", "Ogre"]);
}

// =============================================================================
// Roster changes
// =============================================================================

#[test]
fn test_removing_everyone_returns_to_setup() {
    let mut h = EncounterHarness::new();
    let orc = h.add(NewCombatant::new("Orc", 13, 15)).unwrap();
    h.start_combat(&[(orc.clone(), 10)]).unwrap();

    h.apply(EncounterAction::RemoveCombatant(orc)).unwrap();
    assert_eq!(h.stage(), Some(Stage::PlayerSetup));
    assert!(h.combatants().is_empty());
}

#[test]
fn test_lowering_max_hp_clamps_current() {
    let mut h = EncounterHarness::new();
    let troll = h.add(NewCombatant::new("Troll", 15, 84)).unwrap();
    h.start_combat(&[(troll.clone(), 13)]).unwrap();

    h.apply(EncounterAction::EditCombatant {
        id: troll.clone(),
        edit: CombatantEdit::MaxHp(40),
    })
    .unwrap();
    assert_hp(&h, &troll, 40, 40);

    let err = encounter_error(h.apply(EncounterAction::EditCombatant {
        id: troll.clone(),
        edit: CombatantEdit::CurrentHp(41),
    }));
    assert!(matches!(
        err,
        EncounterError::Invalid(ValidationError::CurrentHpOutOfRange { .. })
    ));
    assert_hp(&h, &troll, 40, 40);
}

#[test]
fn test_rejected_action_does_not_touch_timestamps() {
    let mut h = EncounterHarness::new();
    h.add(NewCombatant::new("Orc", 13, 15)).unwrap();
    let before = h
        .book
        .encounter(&h.campaign, &h.encounter)
        .unwrap()
        .last_modified();

    assert!(h.apply(EncounterAction::ConfirmInitiative).is_err());

    let after = h
        .book
        .encounter(&h.campaign, &h.encounter)
        .unwrap()
        .last_modified();
    assert_eq!(before, after);
}
