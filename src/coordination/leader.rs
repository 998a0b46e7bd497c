use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use super::store::CoordinationStore;
use super::types::{lease_expiry, LeaderCandidate, LeaderRecord, LeaderResolution};
use crate::telemetry::{create_coordination_span, generate_correlation_id};

/// Advisory single-winner leader election, one outstanding goal at a time.
///
/// The store keeps exactly one leader record; electing for a second goal
/// replaces the first goal's leader once the stored `goal` no longer matches.
#[derive(Debug, Clone)]
pub struct LeaderElection {
    store: Arc<CoordinationStore>,
    default_ttl: Duration,
}

impl LeaderElection {
    pub fn new(store: Arc<CoordinationStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Resolve with the election's default lease length.
    pub async fn resolve(&self, goal: &str, candidate: &LeaderCandidate) -> LeaderResolution {
        self.resolve_leader_for_goal(goal, candidate, self.default_ttl).await
    }

    /// Return the live leader for `goal`, electing `candidate` when there is none.
    pub async fn resolve_leader_for_goal(
        &self,
        goal: &str,
        candidate: &LeaderCandidate,
        ttl: Duration,
    ) -> LeaderResolution {
        let key = candidate.key();
        if lease_expiry(Utc::now(), ttl).is_none() {
            warn!(
                goal = %goal,
                candidate = %candidate.name,
                ttl_ms = ttl.as_millis() as u64,
                "Leader lease length out of range, not standing"
            );
            return self.visible_resolution(goal, &key);
        }

        let correlation_id = generate_correlation_id();
        let span = create_coordination_span(
            "resolve_leader_for_goal",
            Some(&candidate.agent_id),
            Some(goal),
            Some(&correlation_id),
        );

        let result = self
            .store
            .update(|state, now| {
                if let Some(existing) = state.leader.as_ref().filter(|leader| leader.goal == goal) {
                    return LeaderResolution {
                        is_leader: existing.key == key,
                        leader: Some(existing.clone()),
                        elected: false,
                    };
                }

                let Some(expires_at) = lease_expiry(now, ttl) else {
                    return LeaderResolution {
                        leader: None,
                        is_leader: false,
                        elected: false,
                    };
                };
                let record = LeaderRecord {
                    goal: goal.to_string(),
                    name: candidate.name.clone(),
                    role: candidate.role.clone(),
                    agent_id: candidate.agent_id.clone(),
                    key: key.clone(),
                    elected_at: now,
                    expires_at,
                };
                state.leader = Some(record.clone());
                LeaderResolution {
                    leader: Some(record),
                    is_leader: true,
                    elected: true,
                }
            })
            .instrument(span)
            .await;

        match result {
            Ok(resolution) => {
                if resolution.elected {
                    info!(goal = %goal, leader = %candidate.name, agent_id = %candidate.agent_id, "Leader elected");
                } else {
                    debug!(
                        goal = %goal,
                        candidate = %candidate.name,
                        is_leader = resolution.is_leader,
                        "Existing leader retained"
                    );
                }
                resolution
            }
            Err(e) => {
                warn!(goal = %goal, candidate = %candidate.name, error = %e, "Leader resolution failed closed");
                self.visible_resolution(goal, &key)
            }
        }
    }

    /// Resolution from a lock-free read, never claiming an election.
    fn visible_resolution(&self, goal: &str, key: &str) -> LeaderResolution {
        let leader = self.store.peek().leader.filter(|leader| leader.goal == goal);
        LeaderResolution {
            is_leader: leader.as_ref().is_some_and(|leader| leader.key == key),
            leader,
            elected: false,
        }
    }

    /// The live leader record, whatever goal it belongs to.
    pub async fn current_leader(&self) -> Option<LeaderRecord> {
        match self.store.read().await {
            Ok(state) => state.leader,
            Err(e) => {
                debug!(error = %e, "Falling back to lock-free leader read");
                self.store.peek().leader
            }
        }
    }

    /// Clear the leader record if `candidate` holds it.
    pub async fn resign(&self, candidate: &LeaderCandidate) -> bool {
        let key = candidate.key();
        let result = self
            .store
            .update(|state, _now| {
                if state.leader.as_ref().is_some_and(|leader| leader.key == key) {
                    state.leader = None;
                    true
                } else {
                    false
                }
            })
            .await;

        match result {
            Ok(resigned) => {
                if resigned {
                    info!(leader = %candidate.name, "Leader resigned");
                }
                resigned
            }
            Err(e) => {
                warn!(leader = %candidate.name, error = %e, "Leader resignation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn election(dir: &TempDir) -> LeaderElection {
        let store = CoordinationStore::new(dir.path().join("state.json"), dir.path().join("state.lock"))
            .with_lock_retry(5, Duration::from_millis(2));
        LeaderElection::new(Arc::new(store), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_incumbent_sees_itself_as_leader() {
        let dir = TempDir::new().unwrap();
        let election = election(&dir);
        let alpha = LeaderCandidate::new("alpha", "builder", "a1");

        let first = election.resolve("gather wood", &alpha).await;
        let second = election.resolve("gather wood", &alpha).await;

        assert!(first.elected && first.is_leader);
        assert!(!second.elected);
        assert!(second.is_leader);
        assert_eq!(first.leader, second.leader, "lease is returned unchanged");
    }

    #[tokio::test]
    async fn test_resign_only_by_holder() {
        let dir = TempDir::new().unwrap();
        let election = election(&dir);
        let alpha = LeaderCandidate::new("alpha", "builder", "a1");
        let bravo = LeaderCandidate::new("bravo", "miner", "b1");

        election.resolve("gather wood", &alpha).await;
        assert!(!election.resign(&bravo).await);
        assert!(election.current_leader().await.is_some());

        assert!(election.resign(&alpha).await);
        assert!(election.current_leader().await.is_none());

        let next = election.resolve("gather wood", &bravo).await;
        assert!(next.elected);
    }

    #[tokio::test]
    async fn test_same_name_different_agent_id_is_not_leader() {
        let dir = TempDir::new().unwrap();
        let election = election(&dir);

        election.resolve("mine iron", &LeaderCandidate::new("alpha", "miner", "a1")).await;
        let impostor = election.resolve("mine iron", &LeaderCandidate::new("alpha", "miner", "a2")).await;

        assert!(!impostor.is_leader);
        assert!(!impostor.elected);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_keeps_incumbent() {
        let dir = TempDir::new().unwrap();
        let election = election(&dir);
        let alpha = LeaderCandidate::new("alpha", "builder", "a1");
        let bravo = LeaderCandidate::new("bravo", "miner", "b1");

        let refused = election
            .resolve_leader_for_goal("gather wood", &alpha, Duration::from_millis(u64::MAX))
            .await;
        assert!(!refused.elected && !refused.is_leader);
        assert!(refused.leader.is_none());
        assert!(election.current_leader().await.is_none());

        election.resolve("gather wood", &alpha).await;
        let challenger = election
            .resolve_leader_for_goal("mine iron", &bravo, Duration::from_millis(1_000_000_000_000_000_000))
            .await;
        assert!(!challenger.elected);
        assert_eq!(election.current_leader().await.unwrap().name, "alpha");
    }
}
