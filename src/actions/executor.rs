use chrono::Utc;
use rand::Rng;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::handler::ActionHandler;
use super::logging::{LogLevel, LogRecord, LogSink, TracingSink};
use super::types::{
    ActionKind, ActionLogEntry, ActionResult, ActionStatus, ActionStep, LogStatus,
};
use crate::config::ExecutorConfig;

pub const DUPLICATE_SUCCEEDED: &str = "duplicate action id already succeeded";
pub const DUPLICATE_IN_PROGRESS: &str = "duplicate action id already in progress";

/// Retry schedule for failed attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: config.max_backoff_ms.map(Duration::from_millis),
            jitter: config.jitter,
            attempt_timeout: config.attempt_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Delay after failed attempt `attempt` (counted from 1): base, 2×base, 4×base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let mut delay = self.base_delay.saturating_mul(1u32 << exponent);
        if let Some(max) = self.max_delay {
            delay = delay.min(max);
        }
        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }
        delay
    }
}

#[derive(Debug, Default)]
struct ExecutionState {
    executed: HashSet<String>,
    executing: HashSet<String>,
    log: Vec<ActionLogEntry>,
}

/// Runs plans step by step against registered handlers.
///
/// A step id that has succeeded is never run again until [`ActionExecutor::reset`];
/// a step id already mid-execution is skipped. All outcomes are values.
pub struct ActionExecutor<W: ?Sized + Sync> {
    world: Arc<W>,
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler<W>>>,
    policy: RetryPolicy,
    sink: Arc<dyn LogSink>,
    state: Mutex<ExecutionState>,
}

impl<W: ?Sized + Send + Sync + 'static> ActionExecutor<W> {
    pub fn new(world: Arc<W>, policy: RetryPolicy) -> Self {
        Self {
            world,
            handlers: HashMap::new(),
            policy,
            sink: Arc::new(TracingSink),
            state: Mutex::new(ExecutionState::default()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register<H>(&mut self, kind: ActionKind, handler: H) -> &mut Self
    where
        H: ActionHandler<W> + 'static,
    {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            debug!(action = %kind, "Replaced action handler");
        }
        self
    }

    pub fn registered_actions(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `steps` strictly in order, one result per step.
    pub async fn execute_plan(&self, steps: &[ActionStep]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.execute_step(step).await);
        }

        let succeeded = results
            .iter()
            .filter(|r| r.status == ActionStatus::Success)
            .count();
        info!(
            steps = steps.len(),
            succeeded = succeeded,
            "Plan execution finished"
        );
        results
    }

    /// Execute a single step with duplicate suppression and retries.
    pub async fn execute_step(&self, step: &ActionStep) -> ActionResult {
        let kind = step.kind();

        let (handler, _in_flight) = {
            let mut state = self.lock_state();
            if state.executed.contains(&step.id) {
                drop(state);
                return self.finish(step, ActionStatus::Skipped, 0, Some(DUPLICATE_SUCCEEDED.to_string()));
            }
            if state.executing.contains(&step.id) {
                drop(state);
                return self.finish(step, ActionStatus::Skipped, 0, Some(DUPLICATE_IN_PROGRESS.to_string()));
            }
            let Some(handler) = self.handlers.get(&kind).cloned() else {
                drop(state);
                return self.finish(
                    step,
                    ActionStatus::Failed,
                    0,
                    Some(format!("unsupported action: {kind}")),
                );
            };
            state.executing.insert(step.id.clone());
            let in_flight = InFlight {
                state: &self.state,
                id: step.id.clone(),
            };
            (handler, in_flight)
        };

        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(step_id = %step.id, action = %kind, attempt = attempt, "Running action handler");

            match self.run_attempt(handler.as_ref(), step).await {
                Ok(()) => {
                    self.lock_state().executed.insert(step.id.clone());
                    break self.finish(step, ActionStatus::Success, attempt, None);
                }
                Err(reason) if attempt < max_attempts => {
                    self.append(step, LogStatus::Retry, attempt, Some(reason));
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                }
                Err(reason) => {
                    break self.finish(step, ActionStatus::Failed, attempt, Some(reason));
                }
            }
        }
    }

    /// Clear executed/in-progress ids and the action log.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.executed.clear();
        state.executing.clear();
        state.log.clear();
        info!("Action executor reset");
    }

    pub fn has_executed(&self, id: &str) -> bool {
        self.lock_state().executed.contains(id)
    }

    /// Snapshot of the action log since the last reset.
    pub fn action_log(&self) -> Vec<ActionLogEntry> {
        self.lock_state().log.clone()
    }

    async fn run_attempt(&self, handler: &dyn ActionHandler<W>, step: &ActionStep) -> Result<(), String> {
        let call = handler.handle(self.world.as_ref(), step);
        let outcome = match self.policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(format!("handler timed out after {}ms", limit.as_millis())),
            },
            None => call.await,
        };
        outcome.map_err(|e| e.to_string())
    }

    fn finish(&self, step: &ActionStep, status: ActionStatus, attempts: u32, reason: Option<String>) -> ActionResult {
        self.append(step, status.into(), attempts, reason.clone());
        ActionResult {
            id: step.id.clone(),
            action: step.kind(),
            status,
            attempts,
            reason,
        }
    }

    fn append(&self, step: &ActionStep, status: LogStatus, attempts: u32, reason: Option<String>) {
        let entry = ActionLogEntry {
            id: step.id.clone(),
            action: step.kind(),
            status,
            attempts,
            reason,
            timestamp: Utc::now(),
        };

        let level = match status {
            LogStatus::Success => LogLevel::Info,
            LogStatus::Skipped => LogLevel::Debug,
            LogStatus::Retry => LogLevel::Warn,
            LogStatus::Failed => LogLevel::Error,
        };
        if status == LogStatus::Failed {
            warn!(step_id = %step.id, action = %entry.action, attempts = attempts, "Action failed");
        }

        self.sink.record(LogRecord {
            level,
            event: format!("action.{}", status.as_str()),
            message: entry.reason.clone(),
            data: Some(json!(entry)),
        });
        self.lock_state().log.push(entry);
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutionState> {
        lock(&self.state)
    }
}

/// Clears a step id from the executing set when dropped, including when the
/// `execute_step` future is cancelled mid-attempt.
struct InFlight<'a> {
    state: &'a Mutex<ExecutionState>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.state).executing.remove(&self.id);
    }
}

// A poisoned lock only means a handler panicked mid-step; the sets are still usable
fn lock(state: &Mutex<ExecutionState>) -> MutexGuard<'_, ExecutionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::logging::MockLogSink;
    use crate::actions::types::{Action, Position};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct World;

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionHandler<World> for Flaky {
        async fn handle(&self, _world: &World, _step: &ActionStep) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(anyhow!("path blocked (call {})", call + 1))
            } else {
                Ok(())
            }
        }
    }

    fn look(id: &str) -> ActionStep {
        ActionStep::new(id, Action::Look { target: Position::new(0, 64, 0) })
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: None,
            jitter: false,
            attempt_timeout: None,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_respects_cap_and_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Some(Duration::from_millis(300)),
            jitter: true,
            attempt_timeout: None,
        };
        for attempt in 1..=8 {
            let delay = policy.backoff(attempt);
            assert!(delay <= Duration::from_millis(300));
            assert!(delay >= Duration::from_millis(50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default());
        executor.register(
            ActionKind::Look,
            Flaky {
                failures_before_success: 1,
                calls: AtomicU32::new(0),
            },
        );

        let results = executor.execute_plan(&[look("step-1")]).await;
        assert_eq!(results[0].status, ActionStatus::Success);
        assert_eq!(results[0].attempts, 2);

        let statuses: Vec<_> = executor.action_log().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![LogStatus::Retry, LogStatus::Success]);
        assert!(executor.has_executed("step-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_action_fails_without_attempts() {
        let executor: ActionExecutor<World> = ActionExecutor::new(Arc::new(World), RetryPolicy::default());

        let results = executor.execute_plan(&[look("step-1")]).await;
        assert_eq!(results[0].status, ActionStatus::Failed);
        assert_eq!(results[0].attempts, 0);
        assert_eq!(results[0].reason.as_deref(), Some("unsupported action: look"));
        assert!(!executor.has_executed("step-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        struct Stuck;

        #[async_trait]
        impl ActionHandler<World> for Stuck {
            async fn handle(&self, _world: &World, _step: &ActionStep) -> anyhow::Result<()> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: None,
            jitter: false,
            attempt_timeout: Some(Duration::from_millis(500)),
        };
        let mut executor = ActionExecutor::new(Arc::new(World), policy);
        executor.register(ActionKind::Look, Stuck);

        let result = executor.execute_step(&look("step-1")).await;
        assert_eq!(result.status, ActionStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.reason.as_deref(), Some("handler timed out after 500ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_outcome_reaches_the_sink() {
        let mut sink = MockLogSink::new();
        sink.expect_record()
            .withf(|record| record.event == "action.retry" && record.level == LogLevel::Warn)
            .times(1)
            .return_const(());
        sink.expect_record()
            .withf(|record| record.event == "action.success")
            .times(1)
            .return_const(());
        sink.expect_record()
            .withf(|record| {
                record.event == "action.skipped"
                    && record.message.as_deref() == Some(DUPLICATE_SUCCEEDED)
            })
            .times(1)
            .return_const(());

        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default())
            .with_sink(Arc::new(sink));
        executor.register(
            ActionKind::Look,
            Flaky {
                failures_before_success: 1,
                calls: AtomicU32::new(0),
            },
        );

        executor.execute_plan(&[look("step-1"), look("step-1")]).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_rerun() {
        let handler = Arc::new(Flaky {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default());
        executor.register(ActionKind::Look, handler.clone());

        executor.execute_plan(&[look("step-1")]).await;
        executor.execute_plan(&[look("step-1")]).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        executor.reset();
        assert!(executor.action_log().is_empty());
        executor.execute_plan(&[look("step-1")]).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_step_can_be_resubmitted() {
        struct SlowFirstCall {
            calls: AtomicU32,
        }

        #[async_trait]
        impl ActionHandler<World> for SlowFirstCall {
            async fn handle(&self, _world: &World, _step: &ActionStep) -> anyhow::Result<()> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok(())
            }
        }

        let handler = Arc::new(SlowFirstCall {
            calls: AtomicU32::new(0),
        });
        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default());
        executor.register(ActionKind::Look, handler.clone());

        let step = look("step-1");
        let cancelled = tokio::time::timeout(Duration::from_secs(1), executor.execute_step(&step)).await;
        assert!(cancelled.is_err());
        assert!(!executor.has_executed("step-1"));

        let retried = executor.execute_step(&step).await;
        assert_eq!(retried.status, ActionStatus::Success);
        assert_eq!(retried.attempts, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registered_actions_are_sorted() {
        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default());
        for kind in [ActionKind::Withdraw, ActionKind::Move, ActionKind::Look] {
            executor.register(
                kind,
                Flaky {
                    failures_before_success: 0,
                    calls: AtomicU32::new(0),
                },
            );
        }

        assert_eq!(
            executor.registered_actions(),
            vec![ActionKind::Move, ActionKind::Look, ActionKind::Withdraw]
        );
    }
}
