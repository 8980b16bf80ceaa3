// src/sync.rs
//
// Message reconciliation: merges a remote platform's conversation history
// into a local chat without duplicating messages, and recomputes the chat's
// display summary (last message, last message date, read/unread status).
//
// This is a pure function over its inputs. It performs no I/O; the caller
// persists the returned insertions and summary update in one transaction.
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::chat::{Message, SENDER_ME, SENDER_THEM, STATUS_UNREAD};
use crate::models::patch::Patch;

/// A platform-native message record as fetched from the external API.
/// Treated as untrusted: the text may be empty and the timestamp malformed.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub sender_account_id: String,
    pub text: String,
    pub created_at_raw: String,
}

/// A message selected for insertion, classified and timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub text: String,
    pub sender: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ReconcileResult {
    /// Messages to append, in chronological order (oldest first).
    pub messages_to_insert: Vec<NewMessage>,
    pub last_message: Patch<String>,
    pub last_message_date: Patch<DateTime<Utc>>,
    pub status: Patch<String>,
}

impl ReconcileResult {
    fn unchanged() -> Self {
        ReconcileResult {
            messages_to_insert: Vec::new(),
            last_message: Patch::Unchanged,
            last_message_date: Patch::Unchanged,
            status: Patch::Unchanged,
        }
    }
}

/// Merges `remote_messages` (delivered newest-first by the platform) into a
/// chat that already holds `chat_messages`.
///
/// A message text already present in the chat is never re-inserted,
/// regardless of sender or timestamp; the text value is the de-duplication
/// key. Empty texts are skipped. A timestamp that fails to parse falls back
/// to `now` rather than failing the run. Any surviving message from the
/// remote party marks the chat unread; reconciliation never marks it read.
pub fn reconcile(
    chat_messages: &[Message],
    remote_messages: &[RemoteMessage],
    self_account_id: &str,
    now: DateTime<Utc>,
) -> ReconcileResult {
    let mut seen: HashSet<&str> = chat_messages.iter().map(|m| m.text.as_str()).collect();

    let mut inserts: Vec<NewMessage> = Vec::new();
    let mut mark_unread = false;

    // Remote order is newest-first; walk it backwards for chronological order.
    for remote in remote_messages.iter().rev() {
        if remote.text.is_empty() || seen.contains(remote.text.as_str()) {
            continue;
        }
        // Also guards against duplicate texts within the same remote batch.
        seen.insert(remote.text.as_str());

        let sender = if remote.sender_account_id == self_account_id {
            SENDER_ME
        } else {
            SENDER_THEM
        };
        if sender == SENDER_THEM {
            mark_unread = true;
        }

        inserts.push(NewMessage {
            text: remote.text.clone(),
            sender: sender.to_string(),
            created_at: parse_created_at(&remote.created_at_raw).unwrap_or(now),
        });
    }

    let (last_text, last_date) = match inserts.last() {
        Some(last) => (last.text.clone(), last.created_at),
        None => return ReconcileResult::unchanged(),
    };

    ReconcileResult {
        last_message: Patch::Set(last_text),
        last_message_date: Patch::Set(last_date),
        status: if mark_unread {
            Patch::Set(STATUS_UNREAD.to_string())
        } else {
            Patch::Unchanged
        },
        messages_to_insert: inserts,
    }
}

/// Parses a platform timestamp. The Graph API emits ISO-8601 with a `+0000`
/// style offset, which strict RFC 3339 parsing rejects, so try both.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn existing(texts: &[&str]) -> Vec<Message> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Message {
                id: i as i32 + 1,
                chat_id: 1,
                text: text.to_string(),
                sender: SENDER_THEM.to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            })
            .collect()
    }

    fn remote(sender_account_id: &str, text: &str, created_at_raw: &str) -> RemoteMessage {
        RemoteMessage {
            sender_account_id: sender_account_id.to_string(),
            text: text.to_string(),
            created_at_raw: created_at_raw.to_string(),
        }
    }

    const SELF_ID: &str = "17841400000000000";
    const CUSTOMER_ID: &str = "9120000000000001";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    // Newest-first batch: the business reply is the most recent message.
    fn sample_batch() -> Vec<RemoteMessage> {
        vec![
            remote(SELF_ID, "Yes, it is!", "2024-02-01T10:05:00+0000"),
            remote(CUSTOMER_ID, "Hi! Is this available?", "2024-02-01T10:00:00+0000"),
        ]
    }

    #[test]
    fn test_empty_chat_inserts_all_oldest_first() {
        let result = reconcile(&[], &sample_batch(), SELF_ID, now());

        assert_eq!(result.messages_to_insert.len(), 2);
        assert_eq!(result.messages_to_insert[0].text, "Hi! Is this available?");
        assert_eq!(result.messages_to_insert[0].sender, SENDER_THEM);
        assert_eq!(result.messages_to_insert[1].text, "Yes, it is!");
        assert_eq!(result.messages_to_insert[1].sender, SENDER_ME);

        assert_eq!(result.last_message, Patch::Set("Yes, it is!".to_string()));
        assert_eq!(
            result.last_message_date,
            Patch::Set(Utc.with_ymd_and_hms(2024, 2, 1, 10, 5, 0).unwrap())
        );
        // A customer message survived, so the chat is unread even though the
        // newest message is from the business.
        assert_eq!(result.status, Patch::Set(STATUS_UNREAD.to_string()));
    }

    #[test]
    fn test_existing_text_is_not_reinserted() {
        let chat_messages = existing(&["Hi! Is this available?"]);
        let result = reconcile(&chat_messages, &sample_batch(), SELF_ID, now());

        assert_eq!(result.messages_to_insert.len(), 1);
        assert_eq!(result.messages_to_insert[0].text, "Yes, it is!");
        // Only a business message survived: status stays as-is.
        assert_eq!(result.status, Patch::Unchanged);
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let batch = vec![
            remote(CUSTOMER_ID, "", "2024-02-01T10:05:00+0000"),
            remote(CUSTOMER_ID, "Hello", "2024-02-01T10:00:00+0000"),
        ];
        let result = reconcile(&[], &batch, SELF_ID, now());

        assert_eq!(result.messages_to_insert.len(), 1);
        assert_eq!(result.messages_to_insert[0].text, "Hello");
    }

    #[test]
    fn test_unparsable_timestamp_falls_back_to_now() {
        let batch = vec![remote(CUSTOMER_ID, "Hello", "not-a-timestamp")];
        let result = reconcile(&[], &batch, SELF_ID, now());

        assert_eq!(result.messages_to_insert.len(), 1);
        assert_eq!(result.messages_to_insert[0].created_at, now());
    }

    #[test]
    fn test_duplicate_texts_within_batch_collapse() {
        let batch = vec![
            remote(CUSTOMER_ID, "ok", "2024-02-01T10:02:00+0000"),
            remote(SELF_ID, "ok", "2024-02-01T10:01:00+0000"),
            remote(CUSTOMER_ID, "ok", "2024-02-01T10:00:00+0000"),
        ];
        let result = reconcile(&[], &batch, SELF_ID, now());

        assert_eq!(result.messages_to_insert.len(), 1);
        // The oldest occurrence wins (chronological processing order).
        assert_eq!(result.messages_to_insert[0].sender, SENDER_THEM);
    }

    #[test]
    fn test_idempotent_across_runs() {
        let batch = sample_batch();
        let first = reconcile(&[], &batch, SELF_ID, now());
        assert_eq!(first.messages_to_insert.len(), 2);

        // Persisting the first run's insertions and reconciling again yields
        // nothing new and leaves the summary untouched.
        let stored: Vec<Message> = first
            .messages_to_insert
            .iter()
            .enumerate()
            .map(|(i, m)| Message {
                id: i as i32 + 1,
                chat_id: 1,
                text: m.text.clone(),
                sender: m.sender.clone(),
                created_at: m.created_at,
            })
            .collect();

        let second = reconcile(&stored, &batch, SELF_ID, now());
        assert!(second.messages_to_insert.is_empty());
        assert_eq!(second.last_message, Patch::Unchanged);
        assert_eq!(second.last_message_date, Patch::Unchanged);
        assert_eq!(second.status, Patch::Unchanged);
    }

    #[test]
    fn test_no_survivors_leaves_summary_unchanged() {
        let chat_messages = existing(&["Hi! Is this available?", "Yes, it is!"]);
        let result = reconcile(&chat_messages, &sample_batch(), SELF_ID, now());

        assert!(result.messages_to_insert.is_empty());
        assert_eq!(result.last_message, Patch::Unchanged);
        assert_eq!(result.status, Patch::Unchanged);
    }

    #[test]
    fn test_inserted_messages_are_chronologically_ordered() {
        let batch = vec![
            remote(CUSTOMER_ID, "third", "2024-02-01T10:02:00+0000"),
            remote(CUSTOMER_ID, "second", "2024-02-01T10:01:00+0000"),
            remote(CUSTOMER_ID, "first", "2024-02-01T10:00:00+0000"),
        ];
        let result = reconcile(&[], &batch, SELF_ID, now());

        let times: Vec<_> = result
            .messages_to_insert
            .iter()
            .map(|m| m.created_at)
            .collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(result.messages_to_insert[0].text, "first");
        assert_eq!(result.last_message, Patch::Set("third".to_string()));
    }

    #[test]
    fn test_parse_created_at_accepts_rfc3339_and_graph_offsets() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_created_at("2024-02-01T10:00:00Z"), Some(expected));
        assert_eq!(
            parse_created_at("2024-02-01T10:00:00+00:00"),
            Some(expected)
        );
        assert_eq!(parse_created_at("2024-02-01T10:00:00+0000"), Some(expected));
        assert_eq!(parse_created_at("yesterday"), None);
        assert_eq!(parse_created_at(""), None);
    }
}
