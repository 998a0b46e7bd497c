// Action Execution Module
//
// Plans arrive as ordered ActionSteps; the executor runs them sequentially
// against handlers supplied by the game-client runtime.

pub mod executor;
pub mod handler;
pub mod logging;
pub mod types;

pub use executor::{ActionExecutor, RetryPolicy, DUPLICATE_IN_PROGRESS, DUPLICATE_SUCCEEDED};
pub use handler::{ActionHandler, LockedHandler};
pub use logging::{LogLevel, LogRecord, LogSink, TracingSink};
pub use types::{
    Action, ActionKind, ActionLogEntry, ActionResult, ActionStatus, ActionStep, EquipSlot,
    LogStatus, Position,
};
