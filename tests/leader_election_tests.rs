//! Leader election lifecycle against a shared coordination document

use mineagents_core::coordination::{CoordinationStore, LeaderCandidate, LeaderElection};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn election(dir: &TempDir) -> LeaderElection {
    let store = CoordinationStore::new(dir.path().join("coordination.json"), dir.path().join("coordination.lock"))
        .with_lock_retry(20, Duration::from_millis(2));
    LeaderElection::new(Arc::new(store), Duration::from_secs(60))
}

#[tokio::test]
async fn test_build_shelter_election_lifecycle() {
    let dir = TempDir::new().unwrap();
    // Two agents, two independent handles on the same files
    let alpha_view = election(&dir);
    let bravo_view = election(&dir);
    let alpha = LeaderCandidate::new("alpha", "builder", "agent-a");
    let bravo = LeaderCandidate::new("bravo", "miner", "agent-b");
    let ttl = Duration::from_millis(150);

    let first = alpha_view.resolve_leader_for_goal("build shelter", &alpha, ttl).await;
    assert!(first.elected);
    assert!(first.is_leader);

    let second = bravo_view.resolve_leader_for_goal("build shelter", &bravo, ttl).await;
    assert!(!second.elected);
    assert!(!second.is_leader);
    assert_eq!(second.leader.as_ref().unwrap().name, "alpha");

    tokio::time::sleep(ttl + Duration::from_millis(50)).await;

    let third = bravo_view.resolve_leader_for_goal("build shelter", &bravo, ttl).await;
    assert!(third.elected, "expired lease must trigger a new election");
    assert!(third.is_leader);
    assert_eq!(third.leader.unwrap().name, "bravo");
}

#[tokio::test]
async fn test_leader_slot_is_global_across_goals() {
    // One leader record serves every goal: electing for a different goal
    // replaces the incumbent instead of running a parallel election.
    let dir = TempDir::new().unwrap();
    let election = election(&dir);
    let alpha = LeaderCandidate::new("alpha", "builder", "agent-a");
    let bravo = LeaderCandidate::new("bravo", "miner", "agent-b");

    let shelter = election.resolve("build shelter", &alpha).await;
    assert!(shelter.elected);

    let mining = election.resolve("mine iron", &bravo).await;
    assert!(mining.elected);
    assert_eq!(mining.leader.unwrap().goal, "mine iron");

    // The shelter election now sees no matching leader and re-elects
    let shelter_again = election.resolve("build shelter", &alpha).await;
    assert!(shelter_again.elected);
    assert_eq!(election.current_leader().await.unwrap().goal, "build shelter");
}

#[tokio::test]
async fn test_leader_record_persisted_in_document() {
    let dir = TempDir::new().unwrap();
    let election = election(&dir);
    election
        .resolve("build shelter", &LeaderCandidate::new("alpha", "builder", "agent-a"))
        .await;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("coordination.json")).unwrap()).unwrap();
    let leader = &raw["leader"];
    assert_eq!(leader["goal"], "build shelter");
    assert_eq!(leader["name"], "alpha");
    assert_eq!(leader["agentId"], "agent-a");
    assert_eq!(leader["key"], "alpha#agent-a");
    assert!(leader["electedAt"].is_string());
    assert!(leader["expiresAt"].is_string());
}
