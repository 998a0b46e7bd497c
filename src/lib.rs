// MineAgents Coordination Core - multi-agent safety and reliable action execution
// This exposes the core components for agent processes and integration tests

pub mod actions;
pub mod config;
pub mod coordination;
pub mod goals;
pub mod telemetry;

// Re-export key types for easy access
pub use actions::{
    Action, ActionExecutor, ActionHandler, ActionKind, ActionLogEntry, ActionResult,
    ActionStatus, ActionStep, LockedHandler, LogSink, Position, RetryPolicy,
};
pub use config::{config, MineAgentsConfig};
pub use coordination::{
    CoordinationError, CoordinationState, CoordinationStore, LeaderCandidate, LeaderElection,
    LeaderResolution, LockOptions, ResourceLockManager,
};
pub use goals::{GoalDefinition, GoalEvent, GoalSignal, GoalStatus, GoalTracker, WorldSnapshot};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
