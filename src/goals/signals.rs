// Pure evaluators, one per signal kind

use chrono::{DateTime, Utc};

use super::types::{ChatMessage, ChatPattern, GoalSignal, WorldSnapshot};

/// Whether `signal` is satisfied by `snapshot`. Chat older than `since` is
/// ignored; event signals never match a snapshot.
pub fn satisfied_by_snapshot(signal: &GoalSignal, snapshot: &WorldSnapshot, since: DateTime<Utc>) -> bool {
    match signal {
        GoalSignal::Predicate { check, .. } => check(snapshot),
        GoalSignal::Chat { pattern, sender } => snapshot
            .chat
            .iter()
            .filter(|message| message.at >= since)
            .any(|message| chat_matches(pattern, sender.as_deref(), message)),
        GoalSignal::Event { .. } => false,
    }
}

/// Whether `signal` is an event signal on `channel` accepting `payload`.
pub fn satisfied_by_event(signal: &GoalSignal, channel: &str, payload: &serde_json::Value) -> bool {
    match signal {
        GoalSignal::Event { channel: wanted, filter } => {
            wanted == channel && filter.as_ref().map_or(true, |accept| accept(payload))
        }
        _ => false,
    }
}

fn chat_matches(pattern: &ChatPattern, sender: Option<&str>, message: &ChatMessage) -> bool {
    if sender.is_some_and(|wanted| !wanted.eq_ignore_ascii_case(&message.sender)) {
        return false;
    }
    match pattern {
        ChatPattern::Contains(text) => message.text.to_lowercase().contains(&text.to_lowercase()),
        ChatPattern::Regex(re) => re.is_match(&message.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use regex::Regex;
    use serde_json::json;

    fn snapshot_with_chat(messages: Vec<ChatMessage>) -> WorldSnapshot {
        WorldSnapshot {
            chat: messages,
            ..Default::default()
        }
    }

    #[test]
    fn test_predicate_reads_snapshot() {
        let signal = GoalSignal::predicate("16 planks", |s| s.item_count("oak_planks") >= 16);
        let mut snapshot = WorldSnapshot::default();
        let since = Utc::now();
        assert!(!satisfied_by_snapshot(&signal, &snapshot, since));

        snapshot.inventory.insert("oak_planks".to_string(), 16);
        assert!(satisfied_by_snapshot(&signal, &snapshot, since));
    }

    #[test]
    fn test_chat_ignores_messages_before_goal_start() {
        let start = Utc::now();
        let signal = GoalSignal::chat_contains("Shelter Done");
        let old = snapshot_with_chat(vec![ChatMessage::new("alpha", "shelter done", start - Duration::seconds(5))]);
        let fresh = snapshot_with_chat(vec![ChatMessage::new("alpha", "shelter done!", start)]);

        assert!(!satisfied_by_snapshot(&signal, &old, start));
        assert!(satisfied_by_snapshot(&signal, &fresh, start));
    }

    #[test]
    fn test_chat_regex_and_sender_filter() {
        let start = Utc::now();
        let signal = GoalSignal::chat_matches(Regex::new(r"^(abort|stop)\b").unwrap()).from_sender("Steve");
        let from_other = snapshot_with_chat(vec![ChatMessage::new("Alex", "stop now", start)]);
        let from_steve = snapshot_with_chat(vec![ChatMessage::new("steve", "stop now", start)]);

        assert!(!satisfied_by_snapshot(&signal, &from_other, start));
        assert!(satisfied_by_snapshot(&signal, &from_steve, start));
    }

    #[test]
    fn test_event_channel_and_filter() {
        let signal = GoalSignal::event_where("block_placed", |p| p["block"] == "oak_door");

        assert!(satisfied_by_event(&signal, "block_placed", &json!({"block": "oak_door"})));
        assert!(!satisfied_by_event(&signal, "block_placed", &json!({"block": "dirt"})));
        assert!(!satisfied_by_event(&signal, "block_broken", &json!({"block": "oak_door"})));
        assert!(!satisfied_by_snapshot(&signal, &WorldSnapshot::default(), Utc::now()));
    }
}
