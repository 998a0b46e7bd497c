// Core types for action plans and their execution records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coordination::resource_key;

/// Block coordinates in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Position {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    MainHand,
    OffHand,
    Head,
    Chest,
    Legs,
    Feet,
}

/// A single world action with its typed parameters.
///
/// Serialises as `{"action": "<name>", "params": {...}}` so plans produced by
/// the planner can be decoded directly into steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    Move {
        target: Position,
        #[serde(default)]
        approx: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        avoid: Vec<String>,
    },
    Look {
        target: Position,
    },
    Mine {
        target: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    Place {
        target: Position,
        block: String,
    },
    Craft {
        recipe: String,
        count: u32,
        #[serde(default)]
        use_crafting_table: bool,
    },
    Smelt {
        input: String,
        count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fuel_hint: Option<String>,
    },
    Equip {
        item: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot: Option<EquipSlot>,
    },
    Eat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<String>,
    },
    Wait {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
    },
    Deposit {
        container: Position,
        item: String,
        count: u32,
    },
    Withdraw {
        container: Position,
        item: String,
        count: u32,
    },
}

/// Field-less discriminant of [`Action`], used as the handler registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Look,
    Mine,
    Place,
    Craft,
    Smelt,
    Equip,
    Eat,
    Wait,
    Deposit,
    Withdraw,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::Move,
        ActionKind::Look,
        ActionKind::Mine,
        ActionKind::Place,
        ActionKind::Craft,
        ActionKind::Smelt,
        ActionKind::Equip,
        ActionKind::Eat,
        ActionKind::Wait,
        ActionKind::Deposit,
        ActionKind::Withdraw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Look => "look",
            ActionKind::Mine => "mine",
            ActionKind::Place => "place",
            ActionKind::Craft => "craft",
            ActionKind::Smelt => "smelt",
            ActionKind::Equip => "equip",
            ActionKind::Eat => "eat",
            ActionKind::Wait => "wait",
            ActionKind::Deposit => "deposit",
            ActionKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Move { .. } => ActionKind::Move,
            Action::Look { .. } => ActionKind::Look,
            Action::Mine { .. } => ActionKind::Mine,
            Action::Place { .. } => ActionKind::Place,
            Action::Craft { .. } => ActionKind::Craft,
            Action::Smelt { .. } => ActionKind::Smelt,
            Action::Equip { .. } => ActionKind::Equip,
            Action::Eat { .. } => ActionKind::Eat,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Deposit { .. } => ActionKind::Deposit,
            Action::Withdraw { .. } => ActionKind::Withdraw,
        }
    }

    /// Lock key of the container this action needs exclusive access to.
    pub fn resource_key(&self) -> Option<String> {
        match self {
            Action::Deposit { container, .. } | Action::Withdraw { container, .. } => {
                Some(resource_key("chest", container.x, container.y, container.z))
            }
            _ => None,
        }
    }
}

/// One step of a plan. Ids must be unique per logical plan submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: String,
    #[serde(flatten)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionStep {
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Terminal outcome of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Status recorded in the action log; `Retry` is transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Skipped,
    Retry,
}

impl From<ActionStatus> for LogStatus {
    fn from(status: ActionStatus) -> Self {
        match status {
            ActionStatus::Success => LogStatus::Success,
            ActionStatus::Failed => LogStatus::Failed,
            ActionStatus::Skipped => LogStatus::Skipped,
        }
    }
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
            LogStatus::Skipped => "skipped",
            LogStatus::Retry => "retry",
        }
    }
}

/// One entry per attempt, success, skip or terminal failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: String,
    pub action: ActionKind,
    pub status: LogStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_planner_step_decodes_into_typed_action() {
        let step: ActionStep = serde_json::from_value(json!({
            "id": "step-3",
            "action": "mine",
            "params": {"target": {"x": 4, "y": 0, "z": 8}, "block": "oak_log", "count": 4},
            "description": "Harvest enough logs for planks"
        }))
        .unwrap();

        assert_eq!(step.kind(), ActionKind::Mine);
        assert_eq!(
            step.action,
            Action::Mine {
                target: Position::new(4, 0, 8),
                block: Some("oak_log".to_string()),
                count: Some(4),
            }
        );
    }

    #[test]
    fn test_unknown_action_is_rejected_at_decode() {
        let result: Result<ActionStep, _> = serde_json::from_value(json!({
            "id": "step-1",
            "action": "teleport",
            "params": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_container_actions_expose_chest_key() {
        let deposit = Action::Deposit {
            container: Position::new(10, 64, -3),
            item: "cobblestone".to_string(),
            count: 64,
        };
        assert_eq!(deposit.resource_key().as_deref(), Some("chest:10,64,-3"));
        assert_eq!(Action::Eat { item: None }.resource_key(), None);
    }

    #[test]
    fn test_kind_names_match_wire_names() {
        for kind in ActionKind::ALL {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, kind.as_str());
        }
    }
}
