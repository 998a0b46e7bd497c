use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::Position;

/// Perception sample of the agent's surroundings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub health: f32,
    #[serde(default)]
    pub food: f32,
    #[serde(default)]
    pub inventory: HashMap<String, u32>,
    /// Rolling window of recent chat
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
}

impl WorldSnapshot {
    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            at,
        }
    }
}

pub type SnapshotPredicate = Arc<dyn Fn(&WorldSnapshot) -> bool + Send + Sync>;
pub type PayloadFilter = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub enum ChatPattern {
    /// Case-insensitive substring
    Contains(String),
    Regex(Regex),
}

/// Something observable that decides a goal
#[derive(Clone)]
pub enum GoalSignal {
    Predicate {
        label: String,
        check: SnapshotPredicate,
    },
    /// Matches the snapshot's rolling chat window, counting only messages
    /// stamped at or after the goal started. `Contains` is case-insensitive;
    /// `sender`, when set, is compared ignoring ASCII case.
    Chat {
        pattern: ChatPattern,
        sender: Option<String>,
    },
    Event {
        channel: String,
        filter: Option<PayloadFilter>,
    },
}

impl GoalSignal {
    pub fn predicate<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&WorldSnapshot) -> bool + Send + Sync + 'static,
    {
        GoalSignal::Predicate {
            label: label.into(),
            check: Arc::new(check),
        }
    }

    pub fn chat_contains(text: impl Into<String>) -> Self {
        GoalSignal::Chat {
            pattern: ChatPattern::Contains(text.into()),
            sender: None,
        }
    }

    pub fn chat_matches(pattern: Regex) -> Self {
        GoalSignal::Chat {
            pattern: ChatPattern::Regex(pattern),
            sender: None,
        }
    }

    pub fn event(channel: impl Into<String>) -> Self {
        GoalSignal::Event {
            channel: channel.into(),
            filter: None,
        }
    }

    pub fn event_where<F>(channel: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        GoalSignal::Event {
            channel: channel.into(),
            filter: Some(Arc::new(filter)),
        }
    }

    /// Restrict a chat signal to one sender. Other kinds are returned unchanged.
    pub fn from_sender(self, name: impl Into<String>) -> Self {
        match self {
            GoalSignal::Chat { pattern, .. } => GoalSignal::Chat {
                pattern,
                sender: Some(name.into()),
            },
            other => other,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            GoalSignal::Predicate { label, .. } => label.clone(),
            GoalSignal::Chat { pattern, sender } => {
                let what = match pattern {
                    ChatPattern::Contains(text) => format!("chat contains \"{text}\""),
                    ChatPattern::Regex(re) => format!("chat matches /{}/", re.as_str()),
                };
                match sender {
                    Some(sender) => format!("{what} from {sender}"),
                    None => what,
                }
            }
            GoalSignal::Event { channel, .. } => format!("event on {channel}"),
        }
    }
}

impl fmt::Debug for GoalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GoalSignal").field(&self.describe()).finish()
    }
}

/// What a goal needs to pass or fail
#[derive(Debug, Clone)]
pub struct GoalDefinition {
    pub name: String,
    pub success_signal: GoalSignal,
    /// Checked in declared order; the first match wins
    pub failure_signals: Vec<GoalSignal>,
    pub timeout: Duration,
}

impl GoalDefinition {
    pub fn new(name: impl Into<String>, success_signal: GoalSignal, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            success_signal,
            failure_signals: Vec::new(),
            timeout,
        }
    }

    pub fn fail_when(mut self, signal: GoalSignal) -> Self {
        self.failure_signals.push(signal);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Pending,
    Pass,
    Fail,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Pending)
    }
}

/// Read-only view of a goal under tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedGoal {
    pub id: String,
    pub name: String,
    pub status: GoalStatus,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Append-only dashboard record of one status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub id: String,
    pub name: String,
    pub status: GoalStatus,
    pub ts: DateTime<Utc>,
    pub reason: String,
}
