// Property-Based Testing for Action Idempotence
// A handler runs at most once per step id, however often the id repeats across plans

use async_trait::async_trait;
use mineagents_core::actions::{
    Action, ActionExecutor, ActionHandler, ActionKind, ActionStatus, ActionStep, RetryPolicy,
};
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

struct World;

/// Counts handler invocations per step id
#[derive(Default)]
struct CallCounter {
    calls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl ActionHandler<World> for CallCounter {
    async fn handle(&self, _world: &World, step: &ActionStep) -> anyhow::Result<()> {
        *self.calls.lock().unwrap().entry(step.id.clone()).or_insert(0) += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct PlannedStep {
    // A narrow id space forces plenty of duplicates
    #[proptest(strategy = "0u8..6")]
    id: u8,
    #[proptest(strategy = "1u32..=64")]
    count: u32,
}

impl PlannedStep {
    fn to_step(&self) -> ActionStep {
        ActionStep::new(
            format!("step-{}", self.id),
            Action::Craft {
                recipe: "oak_planks".to_string(),
                count: self.count,
                use_crafting_table: false,
            },
        )
    }
}

fn plans_strategy() -> impl Strategy<Value = Vec<Vec<PlannedStep>>> {
    prop::collection::vec(prop::collection::vec(any::<PlannedStep>(), 0..12), 1..4)
}

fn run_plans(plans: &[Vec<PlannedStep>]) -> (HashMap<String, u32>, Vec<Vec<ActionStatus>>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async {
        let counter = Arc::new(CallCounter::default());
        let mut executor = ActionExecutor::new(Arc::new(World), RetryPolicy::default());
        executor.register(ActionKind::Craft, counter.clone());

        let mut statuses = Vec::new();
        for plan in plans {
            let steps: Vec<_> = plan.iter().map(PlannedStep::to_step).collect();
            let results = executor.execute_plan(&steps).await;
            statuses.push(results.into_iter().map(|r| r.status).collect());
        }

        let calls = counter.calls.lock().unwrap().clone();
        (calls, statuses)
    })
}

proptest! {
    #[test]
    fn prop_handler_runs_once_per_id(plans in plans_strategy()) {
        let (calls, _) = run_plans(&plans);

        let distinct: HashSet<_> = plans.iter().flatten().map(|s| format!("step-{}", s.id)).collect();
        prop_assert_eq!(calls.len(), distinct.len());
        for (id, count) in &calls {
            prop_assert_eq!(*count, 1, "handler ran {} times for {}", count, id);
        }
    }

    #[test]
    fn prop_only_first_occurrence_succeeds(plans in plans_strategy()) {
        let (_, statuses) = run_plans(&plans);

        let mut seen = HashSet::new();
        for (plan, plan_statuses) in plans.iter().zip(&statuses) {
            prop_assert_eq!(plan.len(), plan_statuses.len());
            for (step, status) in plan.iter().zip(plan_statuses) {
                let expected = if seen.insert(step.id) {
                    ActionStatus::Success
                } else {
                    ActionStatus::Skipped
                };
                prop_assert_eq!(*status, expected);
            }
        }
    }
}
