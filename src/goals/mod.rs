// Goal Tracking Module
//
// Goals resolve once, from world snapshots or named events, and every
// resolution lands on an append-only dashboard.

pub mod lifecycle;
pub mod signals;
pub mod tracker;
pub mod types;

pub use lifecycle::{GoalLifecycle, GoalVerdict};
pub use tracker::{GoalTracker, TIMED_OUT};
pub use types::{
    ChatMessage, ChatPattern, GoalDefinition, GoalEvent, GoalSignal, GoalStatus, TrackedGoal,
    WorldSnapshot,
};
