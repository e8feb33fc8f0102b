use serde::{Deserialize, Serialize};

use super::{Aggregate, EntityKind};

/// A place in the campaign world.
///
/// A location owns two independent intermediate collections: [`District`]s
/// (for settlements) and [`Area`]s (for dungeons and wilderness). Each owns
/// its own leaf lists, and reads never mix the two.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub danger_level: Option<String>,
    /// Id of the faction holding the location.
    #[serde(default)]
    pub faction_control: Option<String>,
    #[serde(default)]
    pub notable_features: Vec<String>,
    /// NPC ids.
    #[serde(default)]
    pub npcs: Vec<String>,
    /// Faction ids.
    #[serde(default)]
    pub factions: Vec<String>,
    #[serde(default)]
    pub points_of_interest: Vec<PointOfInterest>,
    /// Ids of neighbouring locations.
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub districts: Vec<District>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointOfInterest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named quarter of a settlement. Names are unique within one location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct District {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    /// Resident NPC ids.
    #[serde(default)]
    pub npcs: Vec<String>,
}

/// A named region of a site. Names are unique within one location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Area {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub encounters: Vec<String>,
    #[serde(default)]
    pub treasures: Vec<String>,
    /// NPC ids found in the area.
    #[serde(default)]
    pub npcs: Vec<String>,
}

impl Aggregate for Location {
    const KIND: EntityKind = EntityKind::Location;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
