//! Flat row rendering for every projected table: complex columns
//! serialized as JSON text, timestamps as `YYYY-MM-DD HH:MM:SS`, booleans
//! as textual `true`/`false`. Column order here is the external
//! interface — reordering a `*_HEADER` constant is a breaking change.

use chrono::{DateTime, Utc};

use crate::model::{Chat, Contact, Conversation, Lead};
use crate::store::StoreStats;

use super::Row;

fn ts(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn json(value: &[String]) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

fn bool_str(b: bool) -> String {
    if b { "true".to_string() } else { "false".to_string() }
}

/// Message projection columns (stable order). **Text is never exported**
/// — this is the one hard defect-class boundary in the whole crate.
pub const MESSAGE_HEADER: &[&str] = &[
    "chat_id",
    "message_id",
    "from_user_id",
    "date",
    "message_type",
    "is_reply",
    "is_forwarded",
    "word_count",
    "time_of_day",
    "day_of_week",
    "sentiment",
    "contains_business_keywords",
    "content_category",
];

pub fn message_row(m: &crate::model::Message) -> Row {
    vec![
        m.chat_id.to_string(),
        m.message_id.to_string(),
        m.from_user_id.map(|v| v.to_string()).unwrap_or_default(),
        ts(&m.date),
        m.message_type.as_str().to_string(),
        bool_str(m.is_reply),
        bool_str(m.is_forwarded),
        m.word_count.map(|v| v.to_string()).unwrap_or_default(),
        m.time_of_day.map(|v| v.as_str().to_string()).unwrap_or_default(),
        m.day_of_week.map(|v| v.to_string()).unwrap_or_default(),
        m.sentiment.map(|v| v.as_str().to_string()).unwrap_or_default(),
        m.contains_business_keywords.map(bool_str).unwrap_or_default(),
        m.content_category.map(|v| v.as_str().to_string()).unwrap_or_default(),
    ]
}

/// Contact/Lead projection columns (stable order); a contact with no
/// qualifying Lead renders the Lead-derived columns empty.
pub const CONTACT_HEADER: &[&str] = &[
    "user_id",
    "username",
    "first_name",
    "last_name",
    "phone",
    "total_messages",
    "activity_level",
    "intelligence_score",
    "bd_score",
    "conversion_likelihood",
    "lead_quality",
    "priority",
    "estimated_value",
    "investment_capacity",
    "deal_size_category",
    "relationship_strength",
    "last_interaction",
];

pub fn contact_row(contact: &Contact, lead: Option<&Lead>) -> Row {
    vec![
        contact.user_id.to_string(),
        contact.username.clone().unwrap_or_default(),
        contact.first_name.clone().unwrap_or_default(),
        contact.last_name.clone().unwrap_or_default(),
        contact.phone.clone().unwrap_or_default(),
        contact.total_messages.to_string(),
        contact.activity_level.as_str().to_string(),
        lead.map(|l| l.intelligence_score.to_string()).unwrap_or_default(),
        lead.map(|l| l.bd_score.to_string()).unwrap_or_default(),
        lead.map(|l| l.conversion_likelihood.to_string()).unwrap_or_default(),
        lead.map(|l| l.lead_quality.as_str().to_string()).unwrap_or_default(),
        lead.map(|l| l.priority.as_str().to_string()).unwrap_or_default(),
        lead.map(|l| l.estimated_value.to_string()).unwrap_or_default(),
        lead.map(|l| l.investment_capacity.as_str().to_string()).unwrap_or_default(),
        lead.map(|l| l.deal_size_category.as_str().to_string()).unwrap_or_default(),
        lead.map(|l| l.relationship_strength.as_str().to_string()).unwrap_or_default(),
        ts(&contact.last_seen),
    ]
}

pub const CHAT_HEADER: &[&str] = &[
    "chat_id",
    "chat_type",
    "title",
    "username",
    "participant_count",
    "first_message_date",
    "last_message_date",
    "total_messages",
];

pub fn chat_row(chat: &Chat) -> Row {
    vec![
        chat.chat_id.to_string(),
        chat.chat_type.as_str().to_string(),
        chat.title.clone().unwrap_or_default(),
        chat.username.clone().unwrap_or_default(),
        chat.participant_count.map(|v| v.to_string()).unwrap_or_default(),
        ts(&chat.first_message_date),
        ts(&chat.last_message_date),
        chat.total_messages.to_string(),
    ]
}

pub const INTERACTION_HEADER: &[&str] = &[
    "chat_id",
    "user_id",
    "message_count",
    "business_relevance",
    "first_date",
    "last_date",
    "shared_interests",
    "conversation_topics",
];

pub fn interaction_row(c: &Conversation) -> Row {
    vec![
        c.chat_id.to_string(),
        c.user_id.to_string(),
        c.message_count.to_string(),
        c.business_relevance.to_string(),
        ts(&c.first_date),
        ts(&c.last_date),
        json(&c.shared_interests),
        json(&c.conversation_topics),
    ]
}

pub const DASHBOARD_HEADER: &[&str] = &[
    "contacts",
    "chats",
    "messages",
    "leads",
    "pending_syncs",
    "failed_syncs",
    "leads_estimated_value_sum",
    "opportunities_expected_value_sum",
];

pub fn dashboard_row(stats: &StoreStats, leads_value: f64, opportunity_value: f64) -> Row {
    vec![
        stats.contacts.to_string(),
        stats.chats.to_string(),
        stats.messages.to_string(),
        stats.leads.to_string(),
        stats.pending_syncs.to_string(),
        stats.failed_syncs.to_string(),
        leads_value.to_string(),
        opportunity_value.to_string(),
    ]
}
