use serde::{Deserialize, Serialize};

use super::{Aggregate, EntityKind};

/// An organisation with leaders, members and relations to other factions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Faction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub faction_type: Option<String>,
    #[serde(default)]
    pub alignment: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public_goal: Option<String>,
    #[serde(default)]
    pub true_goal: Option<String>,
    #[serde(default)]
    pub headquarters: Option<String>,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub leadership: Vec<Leader>,
    #[serde(default)]
    pub members: Vec<Member>,
    /// Allied faction ids.
    #[serde(default)]
    pub allies: Vec<String>,
    /// Rival faction ids.
    #[serde(default)]
    pub enemies: Vec<String>,
    /// Quest ids the faction is involved in.
    #[serde(default)]
    pub quests: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Leader {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
}

impl Aggregate for Faction {
    const KIND: EntityKind = EntityKind::Faction;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
