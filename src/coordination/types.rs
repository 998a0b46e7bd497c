use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The shared coordination document persisted between agent processes.
///
/// Records whose `expires_at` is at or before "now" are logically absent;
/// callers must run [`CoordinationState::prune`] before trusting the contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationState {
    #[serde(default)]
    pub leader: Option<LeaderRecord>,
    #[serde(default)]
    pub locks: BTreeMap<String, ResourceLockRecord>,
}

/// The single, global leader lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderRecord {
    pub goal: String,
    pub name: String,
    pub role: String,
    pub agent_id: String,
    pub key: String,
    pub elected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A TTL lease over one contested resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLockRecord {
    pub owner: String,
    pub owner_since: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaderRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl ResourceLockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `owner` may take this lease at `now`: expired leases are free,
    /// and the current owner may always extend its own.
    pub fn is_available_to(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.is_expired(now) || self.owner == owner
    }
}

impl CoordinationState {
    /// Drop every expired leader and lock record. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let mut pruned = 0;

        if self.leader.as_ref().is_some_and(|leader| leader.is_expired(now)) {
            self.leader = None;
            pruned += 1;
        }

        let before = self.locks.len();
        self.locks.retain(|_, record| !record.is_expired(now));
        pruned += before - self.locks.len();

        pruned
    }

    pub fn is_empty(&self) -> bool {
        self.leader.is_none() && self.locks.is_empty()
    }
}

/// An agent offering itself as leader for a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderCandidate {
    pub name: String,
    pub role: String,
    pub agent_id: String,
}

impl LeaderCandidate {
    pub fn new(name: impl Into<String>, role: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            agent_id: agent_id.into(),
        }
    }

    /// Identity compared against the stored leader's `key`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.name, self.agent_id)
    }
}

/// Outcome of a leader resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderResolution {
    /// The live leader for the goal after resolution; `None` when no election
    /// could be written (store busy or lease length out of range) and no live
    /// leader for the goal was visible.
    pub leader: Option<LeaderRecord>,
    pub is_leader: bool,
    pub elected: bool,
}

/// Expiry of a lease of length `ttl` starting at `now`, or `None` when the
/// length does not fit a timestamp.
pub fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    now.checked_add_signed(ttl)
}

/// Build the conventional `"<type>:<x>,<y>,<z>"` resource key.
pub fn resource_key(kind: &str, x: i64, y: i64, z: i64) -> String {
    format!("{kind}:{x},{y},{z}")
}
