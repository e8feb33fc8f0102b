//! Domain models for campaign content.
//!
//! # Aggregates
//!
//! Each root entity owns everything nested beneath it:
//!
//! - [`Location`]: notable features, points of interest, and two intermediate
//!   collections, [`District`]s and [`Area`]s, which own their own leaf lists.
//! - [`Faction`]: resources, leadership, members.
//! - [`Npc`]: descriptions, personality traits, inventory.
//! - [`Quest`]: [`Stage`]s (objectives, completion paths) and
//!   [`DecisionPoint`]s (choices), twists and rewards.
//!
//! Fields holding another aggregate's id (`faction_control`, `allies`,
//! `related_quests`, ...) are weak references: they are checked on write but
//! never own the target.

mod faction;
mod location;
mod npc;
mod quest;

pub use faction::*;
pub use location::*;
pub use npc::*;
pub use quest::*;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The kinds of root aggregate the store persists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Location,
    Faction,
    Npc,
    Quest,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Location, Self::Faction, Self::Npc, Self::Quest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Faction => "faction",
            Self::Npc => "npc",
            Self::Quest => "quest",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    /// Accepts singular and plural spellings (`location`, `locations`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" | "locations" => Ok(Self::Location),
            "faction" | "factions" => Ok(Self::Faction),
            "npc" | "npcs" => Ok(Self::Npc),
            "quest" | "quests" => Ok(Self::Quest),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

/// A typed root aggregate.
///
/// The store itself works on JSON documents shaped by the schema registry;
/// this trait ties a Rust type to its [`EntityKind`] so callers can round-trip
/// through typed values instead.
pub trait Aggregate: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// The id, when the caller chose one instead of letting the store assign it.
    fn id(&self) -> Option<&str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_singular_and_plural() {
        assert_eq!("location".parse::<EntityKind>(), Ok(EntityKind::Location));
        assert_eq!("Factions".parse::<EntityKind>(), Ok(EntityKind::Faction));
        assert_eq!(" npcs ".parse::<EntityKind>(), Ok(EntityKind::Npc));
        assert!("dragon".parse::<EntityKind>().is_err());
    }

    #[test]
    fn entity_kind_round_trips_through_as_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
    }
}
