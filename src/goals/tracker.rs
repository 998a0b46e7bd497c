use chrono::{DateTime, Utc};
use statig::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use super::lifecycle::{GoalLifecycle, GoalVerdict};
use super::signals::{satisfied_by_event, satisfied_by_snapshot};
use super::types::{GoalDefinition, GoalEvent, TrackedGoal, WorldSnapshot};

pub const TIMED_OUT: &str = "Timed out";

struct GoalEntry {
    id: String,
    definition: GoalDefinition,
    started_at: DateTime<Utc>,
    lifecycle: StateMachine<GoalLifecycle>,
}

impl GoalEntry {
    fn is_pending(&self) -> bool {
        self.lifecycle.inner().is_pending()
    }

    fn timed_out(&self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.started_at).to_std().unwrap_or_default();
        elapsed >= self.definition.timeout
    }

    fn view(&self) -> TrackedGoal {
        let context = self.lifecycle.inner();
        TrackedGoal {
            id: self.id.clone(),
            name: self.definition.name.clone(),
            status: context.status(),
            started_at: self.started_at,
            resolved_at: context.resolved_at(),
            reason: context.reason().map(str::to_string),
        }
    }
}

/// Turns snapshots and named events into terminal pass/fail outcomes.
///
/// Each goal resolves exactly once; the dashboard receives one event per
/// resolution and is never rewritten. Predicates are called as-is, so a
/// panicking predicate unwinds out of [`GoalTracker::ingest_snapshot`].
#[derive(Default)]
pub struct GoalTracker {
    goals: Vec<GoalEntry>,
    dashboard: Vec<GoalEvent>,
}

impl GoalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `definition` from `now`; returns the new goal id.
    pub fn track(&mut self, definition: GoalDefinition, now: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        info!(goal_id = %id, goal = %definition.name, timeout_ms = definition.timeout.as_millis() as u64, "Tracking goal");
        self.goals.push(GoalEntry {
            lifecycle: GoalLifecycle::new(id.clone()).state_machine(),
            id: id.clone(),
            definition,
            started_at: now,
        });
        id
    }

    /// Evaluate every pending goal against `snapshot`: timeout, then the
    /// success signal, then failure signals in order. Returns new events.
    pub fn ingest_snapshot(&mut self, snapshot: &WorldSnapshot, now: DateTime<Utc>) -> Vec<GoalEvent> {
        let mut emitted = Vec::new();

        for entry in self.goals.iter_mut().filter(|entry| entry.is_pending()) {
            let verdict = if entry.timed_out(now) {
                Some(fail(TIMED_OUT.to_string(), now))
            } else if satisfied_by_snapshot(&entry.definition.success_signal, snapshot, entry.started_at) {
                Some(GoalVerdict::Pass {
                    reason: format!("Success signal matched: {}", entry.definition.success_signal.describe()),
                    at: now,
                })
            } else {
                entry
                    .definition
                    .failure_signals
                    .iter()
                    .find(|signal| satisfied_by_snapshot(signal, snapshot, entry.started_at))
                    .map(|signal| fail(format!("Failure signal matched: {}", signal.describe()), now))
            };

            if let Some(verdict) = verdict {
                emitted.extend(apply(entry, &verdict));
            }
        }

        debug!(tick = snapshot.tick, resolved = emitted.len(), "Snapshot ingested");
        self.dashboard.extend(emitted.iter().cloned());
        emitted
    }

    /// Resolve pending goals whose success signal listens on `channel`.
    pub fn notify_event(&mut self, channel: &str, payload: &serde_json::Value, now: DateTime<Utc>) -> Vec<GoalEvent> {
        let mut emitted = Vec::new();

        for entry in self.goals.iter_mut().filter(|entry| entry.is_pending()) {
            let verdict = if entry.timed_out(now) {
                Some(fail(TIMED_OUT.to_string(), now))
            } else if satisfied_by_event(&entry.definition.success_signal, channel, payload) {
                Some(GoalVerdict::Pass {
                    reason: format!("Event received on {channel}"),
                    at: now,
                })
            } else {
                None
            };

            if let Some(verdict) = verdict {
                emitted.extend(apply(entry, &verdict));
            }
        }

        debug!(channel = %channel, resolved = emitted.len(), "Event notified");
        self.dashboard.extend(emitted.iter().cloned());
        emitted
    }

    pub fn goal(&self, id: &str) -> Option<TrackedGoal> {
        self.goals.iter().find(|entry| entry.id == id).map(GoalEntry::view)
    }

    /// All goals in registration order
    pub fn goals(&self) -> Vec<TrackedGoal> {
        self.goals.iter().map(GoalEntry::view).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.goals.iter().filter(|entry| entry.is_pending()).count()
    }

    /// Every transition recorded so far, oldest first
    pub fn dashboard(&self) -> &[GoalEvent] {
        &self.dashboard
    }
}

fn fail(reason: String, at: DateTime<Utc>) -> GoalVerdict {
    GoalVerdict::Fail { reason, at }
}

/// Feed `verdict` to the goal's lifecycle and describe the transition, if any.
fn apply(entry: &mut GoalEntry, verdict: &GoalVerdict) -> Option<GoalEvent> {
    let before = entry.lifecycle.inner().status();
    entry.lifecycle.handle(verdict);
    let context = entry.lifecycle.inner();
    if context.status() == before || !context.status().is_terminal() {
        return None;
    }

    Some(GoalEvent {
        id: entry.id.clone(),
        name: entry.definition.name.clone(),
        status: context.status(),
        ts: context.resolved_at().unwrap_or_else(Utc::now),
        reason: context.reason().unwrap_or_default().to_string(),
    })
}
