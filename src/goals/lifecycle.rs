use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statig::prelude::*;

use super::types::GoalStatus;

/// Decision reached by evaluating a goal's signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalVerdict {
    Pass { reason: String, at: DateTime<Utc> },
    Fail { reason: String, at: DateTime<Utc> },
}

/// Per-goal lifecycle: `pending` moves to `passed` or `failed` once, and
/// resolved goals ignore every later verdict.
#[derive(Debug, Default)]
pub struct GoalLifecycle {
    pub goal_id: String,
    status: GoalStatus,
    reason: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl GoalLifecycle {
    pub fn new(goal_id: String) -> Self {
        Self {
            goal_id,
            ..Default::default()
        }
    }

    fn resolve(&mut self, status: GoalStatus, reason: &str, at: DateTime<Utc>) {
        self.status = status;
        self.reason = Some(reason.to_string());
        self.resolved_at = Some(at);
    }
}

#[state_machine(initial = "State::pending()")]
impl GoalLifecycle {
    #[state]
    fn pending(&mut self, event: &GoalVerdict) -> Outcome<State> {
        match event {
            GoalVerdict::Pass { reason, at } => {
                self.resolve(GoalStatus::Pass, reason, *at);
                tracing::info!(goal_id = %self.goal_id, reason = %reason, "Goal passed");
                Transition(State::passed())
            }
            GoalVerdict::Fail { reason, at } => {
                self.resolve(GoalStatus::Fail, reason, *at);
                tracing::info!(goal_id = %self.goal_id, reason = %reason, "Goal failed");
                Transition(State::failed())
            }
        }
    }

    #[state]
    fn passed(&mut self, event: &GoalVerdict) -> Outcome<State> {
        tracing::debug!(goal_id = %self.goal_id, verdict = ?event, "Ignoring verdict for passed goal");
        Handled
    }

    #[state]
    fn failed(&mut self, event: &GoalVerdict) -> Outcome<State> {
        tracing::debug!(goal_id = %self.goal_id, verdict = ?event, "Ignoring verdict for failed goal");
        Handled
    }
}

impl GoalLifecycle {
    pub fn status(&self) -> GoalStatus {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == GoalStatus::Pending
    }
}
