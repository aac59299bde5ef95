//! Stage E2 — per-contact aggregation. Recomputes `Contact` totals/activity
//! level and rebuilds every `ChatParticipant` row for a contact from the
//! enriched message corpus. Pure function over already-fetched rows so it
//! stays trivially re-runnable (idempotent) and testable without a Store.

use crate::model::{ActivityLevel, ChatParticipant, Contact, EngagementLevel};
use crate::store::ChatParticipantCount;

pub struct ContactAggregate {
    pub contact: Contact,
    pub participants: Vec<ChatParticipant>,
}

/// Recomputes `contact`'s derived fields from its per-chat message counts.
/// A contact with no message-bearing chat (shouldn't happen — a Contact row
/// only ever exists because a message created it) leaves the contact
/// unchanged and produces no participant rows.
pub fn rebuild_contact(mut contact: Contact, counts: &[ChatParticipantCount]) -> ContactAggregate {
    if counts.is_empty() {
        return ContactAggregate { contact, participants: Vec::new() };
    }

    let total_messages: i64 = counts.iter().map(|c| c.message_count).sum();
    let total_chats = counts.len() as i64;
    let first_seen = counts.iter().map(|c| c.first_seen).min().unwrap();
    let last_seen = counts.iter().map(|c| c.last_seen).max().unwrap();

    contact.total_messages = total_messages;
    contact.total_chats = total_chats;
    contact.activity_level = ActivityLevel::from_total_messages(total_messages);
    contact.first_seen = first_seen;
    contact.last_seen = last_seen;

    let participants = counts
        .iter()
        .map(|c| ChatParticipant {
            chat_id: c.chat_id,
            user_id: contact.user_id,
            message_count: c.message_count,
            first_seen: c.first_seen,
            last_seen: c.last_seen,
            engagement_level: EngagementLevel::from_message_count(c.message_count),
        })
        .collect();

    ContactAggregate { contact, participants }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_contact() -> Contact {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Contact {
            user_id: 1,
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            is_bot: false,
            is_verified: false,
            is_premium: false,
            total_messages: 0,
            total_chats: 0,
            activity_level: ActivityLevel::Occasional,
            first_seen: now,
            last_seen: now,
        }
    }

    #[test]
    fn sums_counts_across_chats_and_classifies_activity() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let counts = vec![
            ChatParticipantCount { chat_id: 1, message_count: 60, first_seen: early, last_seen: late },
            ChatParticipantCount { chat_id: 2, message_count: 45, first_seen: early, last_seen: early },
        ];
        let aggregate = rebuild_contact(sample_contact(), &counts);
        assert_eq!(aggregate.contact.total_messages, 105);
        assert_eq!(aggregate.contact.total_chats, 2);
        assert_eq!(aggregate.contact.activity_level, ActivityLevel::VeryActive);
        assert_eq!(aggregate.participants.len(), 2);
        assert_eq!(aggregate.participants[0].engagement_level, EngagementLevel::High);
        assert_eq!(aggregate.participants[1].engagement_level, EngagementLevel::Medium);
    }

    #[test]
    fn no_message_bearing_chats_leaves_contact_untouched() {
        let aggregate = rebuild_contact(sample_contact(), &[]);
        assert_eq!(aggregate.contact.total_messages, 0);
        assert!(aggregate.participants.is_empty());
    }
}
