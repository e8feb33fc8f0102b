use serde::{Deserialize, Serialize};

use super::{Aggregate, EntityKind};

/// A non-player character.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Npc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub quirk: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub quests: Vec<QuestLink>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub locations: Vec<LocationLink>,
}

/// The NPC's involvement in a quest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestLink {
    pub quest_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// How the NPC relates to another NPC.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub target_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Where the NPC can be found.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationLink {
    pub location_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Aggregate for Npc {
    const KIND: EntityKind = EntityKind::Npc;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
