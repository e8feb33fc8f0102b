use serde::{Deserialize, Serialize};

use super::{Aggregate, EntityKind};

/// A quest with staged objectives and branching decisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(rename = "type", default)]
    pub quest_type: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub decision_points: Vec<DecisionPoint>,
    #[serde(default)]
    pub twists: Vec<String>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub follow_up_quests: Vec<FollowUp>,
    /// Ids of related quests.
    #[serde(default)]
    pub related_quests: Vec<String>,
    #[serde(default)]
    pub associated_npcs: Vec<AssociatedNpc>,
}

/// One stage of a quest, identified by its number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    pub stage: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub completion_paths: Vec<CompletionPath>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionPath {
    pub path_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub challenges: Option<String>,
    #[serde(default)]
    pub outcomes: Option<String>,
}

/// A point where the party's choice changes the outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionPoint {
    pub decision: String,
    #[serde(default)]
    pub stage: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub choice: String,
    #[serde(default)]
    pub consequences: Option<String>,
}

/// A reward granted when the quest is finished along `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
    pub path: String,
    pub reward: String,
}

/// A quest unlocked when this one is finished along `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowUp {
    pub path: String,
    pub follow_up_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssociatedNpc {
    pub npc_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl Aggregate for Quest {
    const KIND: EntityKind = EntityKind::Quest;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
