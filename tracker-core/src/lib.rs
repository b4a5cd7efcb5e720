//! D&D encounter and initiative tracker engine.
//!
//! This crate provides:
//! - Campaigns holding encounters, each a stage machine from player setup
//!   through initiative to active combat
//! - Action/Effect resolution for deterministic encounter state
//! - A bestiary with a lazily built type index and per-type cache
//! - Local persistence with optional cloud mirroring
//!
//! # Quick Start
//!
//! ```ignore
//! use tracker_core::{EncounterAction, NewCombatant, TrackerConfig, TrackerSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracker_core::logging::init();
//!     let config = TrackerConfig::from_env()?;
//!     let mut session = TrackerSession::open(&config).await?;
//!
//!     let campaign = session.create_campaign("Lost Mine").await?;
//!     let encounter = session.create_encounter(&campaign, "Goblin Ambush").await?;
//!     session
//!         .apply(
//!             &campaign,
//!             &encounter,
//!             EncounterAction::AddCombatant(NewCombatant::new("Aragorn", 18, 75)),
//!         )
//!         .await?;
//!
//!     for info in session.bestiary().search_types("drag").await {
//!         println!("{} {} ({})", info.icon(), info.label, info.count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bestiary;
pub mod campaign;
pub mod config;
pub mod encounter;
pub mod id;
pub mod logging;
pub mod persist;
pub mod session;
pub mod sync;
pub mod testing;

// Primary public API
pub use bestiary::{Bestiary, BestiarySource, CacheStatus, Monster, TypeInfo};
pub use campaign::{Campaign, CampaignBook, CampaignError};
pub use config::{DiscoveryConfig, TrackerConfig};
pub use encounter::{
    Combatant, CombatantEdit, Encounter, EncounterAction, EncounterEffect, EncounterError,
    NewCombatant, Stage, ValidationError,
};
pub use id::{CampaignId, CombatantId, EncounterId};
pub use persist::{DataWarning, FileStore, KeyValueStore};
pub use session::{SessionError, TrackerSession};
pub use sync::{CloudStore, DataSync, SyncStatus, User};
pub use testing::{EncounterHarness, MockSource};
