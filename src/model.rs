//! Closed record types for every entity that crosses a component boundary.
//!
//! Each struct has explicit fields rather than a dynamic map; list-valued
//! fields (keyword hits, indicator lists) are plain `Vec<String>` built once
//! per enrichment pass and never shared by reference across rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    VeryActive,
    Active,
    Moderate,
    Occasional,
}

impl ActivityLevel {
    pub fn from_total_messages(total: i64) -> Self {
        if total > 100 {
            ActivityLevel::VeryActive
        } else if total > 50 {
            ActivityLevel::Active
        } else if total > 10 {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::Occasional
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::VeryActive => "very_active",
            ActivityLevel::Active => "active",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Occasional => "occasional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_bot: bool,
    pub is_verified: bool,
    pub is_premium: bool,
    pub total_messages: i64,
    pub total_chats: i64,
    pub activity_level: ActivityLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Supergroup => "supergroup",
            ChatType::Channel => "channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: i64,
    pub chat_type: ChatType,
    pub title: Option<String>,
    pub username: Option<String>,
    pub participant_count: Option<i64>,
    pub first_message_date: DateTime<Utc>,
    pub last_message_date: DateTime<Utc>,
    pub total_messages: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

impl EngagementLevel {
    pub fn from_message_count(count: i64) -> Self {
        if count > 50 {
            EngagementLevel::High
        } else if count > 10 {
            EngagementLevel::Medium
        } else {
            EngagementLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::High => "high",
            EngagementLevel::Medium => "medium",
            EngagementLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub engagement_level: EngagementLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthCategory {
    Short,
    Medium,
    Long,
}

impl LengthCategory {
    /// B2: `word_count = 0` is `short`; exactly 20 words is `medium`.
    pub fn from_word_count(word_count: i64) -> Self {
        if word_count <= 10 {
            LengthCategory::Short
        } else if word_count <= 30 {
            LengthCategory::Medium
        } else {
            LengthCategory::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthCategory::Short => "short",
            LengthCategory::Medium => "medium",
            LengthCategory::Long => "long",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Business,
    Technical,
    Casual,
    Social,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Business => "business",
            ContentCategory::Technical => "technical",
            ContentCategory::Casual => "casual",
            ContentCategory::Social => "social",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Photo,
    Video,
    Document,
    Voice,
    Sticker,
    Other,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Photo => "photo",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Voice => "voice",
            MessageType::Sticker => "sticker",
            MessageType::Other => "other",
        }
    }
}

/// A single Telegram message. `text_ciphertext` is always AEAD-sealed at
/// rest; plaintext only exists transiently while a request holds the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub chat_id: i64,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub date: DateTime<Utc>,
    pub text_ciphertext: Vec<u8>,
    pub message_type: MessageType,
    pub is_reply: bool,
    pub is_forwarded: bool,
    pub edit_date: Option<DateTime<Utc>>,

    // Enrichment columns (E1); `None` until the Enricher has visited the row.
    pub word_count: Option<i64>,
    pub time_of_day: Option<TimeOfDay>,
    pub day_of_week: Option<i64>,
    pub length_category: Option<LengthCategory>,
    pub sentiment: Option<Sentiment>,
    pub contains_business_keywords: Option<bool>,
    pub is_question: Option<bool>,
    pub contains_media: Option<bool>,
    pub contains_links: Option<bool>,
    pub content_category: Option<ContentCategory>,
}

impl Message {
    pub fn is_enriched(&self) -> bool {
        self.word_count.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_count: i64,
    pub business_relevance: f64,
    pub first_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    pub shared_interests: Vec<String>,
    pub conversation_topics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadQuality {
    Hot,
    Warm,
    Cold,
}

impl LeadQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadQuality::Hot => "hot",
            LeadQuality::Warm => "warm",
            LeadQuality::Cold => "cold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    High,
    Medium,
    Low,
}

impl Capacity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capacity::High => "high",
            Capacity::Medium => "medium",
            Capacity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DealSizeCategory {
    Enterprise,
    MidMarket,
    Startup,
}

impl DealSizeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealSizeCategory::Enterprise => "enterprise",
            DealSizeCategory::MidMarket => "mid-market",
            DealSizeCategory::Startup => "startup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStrength {
    Strong,
    Moderate,
    Weak,
}

impl RelationshipStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStrength::Strong => "strong",
            RelationshipStrength::Moderate => "moderate",
            RelationshipStrength::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementQuality {
    Deep,
    Moderate,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralPotential {
    High,
    Medium,
    Low,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpTiming {
    ThisWeek,
    NextWeek,
    ComingWeeks,
}

impl FollowUpTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpTiming::ThisWeek => "this week",
            FollowUpTiming::NextWeek => "next week",
            FollowUpTiming::ComingWeeks => "coming weeks",
        }
    }
}

/// A qualified lead. Exists only for contacts with `intelligence_score >= 25`;
/// dropping below the threshold never deletes the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: String,
    pub user_id: i64,
    pub bd_score: f64,
    pub intelligence_score: f64,
    pub conversion_likelihood: f64,
    pub lead_quality: LeadQuality,
    pub priority: Priority,
    pub estimated_value: f64,
    pub investment_capacity: Capacity,
    pub deal_size_category: DealSizeCategory,
    pub relationship_strength: RelationshipStrength,

    pub business_keywords: Vec<String>,
    pub investment_keywords: Vec<String>,
    pub technology_expertise: Vec<String>,
    pub decision_maker_signals: Vec<String>,
    pub network_influence: Vec<String>,
    pub trust_indicators: Vec<String>,
    pub financial_indicators: Vec<String>,

    pub personalized_message: Option<String>,
    pub meeting_agenda: Option<String>,
    pub call_to_action: Option<String>,
    pub follow_up_timing: Option<FollowUpTiming>,

    pub engagement_quality: EngagementQuality,
    pub referral_potential: ReferralPotential,
    pub response_rate: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new_id(user_id: i64) -> String {
        format!("lead_{user_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Sent,
    Done,
    Failed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Pending => "pending",
            FollowUpStatus::Sent => "sent",
            FollowUpStatus::Done => "done",
            FollowUpStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUp {
    pub follow_up_id: String,
    pub lead_id: String,
    pub action_type: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    Identified,
    Qualification,
    Proposal,
    Closing,
}

impl OpportunityStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStage::Identified => "identified",
            OpportunityStage::Qualification => "qualification",
            OpportunityStage::Proposal => "proposal",
            OpportunityStage::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: String,
    pub lead_id: String,
    pub opportunity_type: String,
    pub estimated_value: f64,
    pub probability: f64,
    pub timeline: String,
    pub stage: OpportunityStage,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Upsert,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Upsert => "upsert",
            SyncOperation::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upsert" => Some(SyncOperation::Upsert),
            "delete" => Some(SyncOperation::Delete),
            _ => None,
        }
    }
}

/// `SyncTask.state` transitions are monotonic per attempt:
/// `pending -> in_progress -> {completed|failed|conflict}`. `failed` may
/// re-enter `pending` via retry policy; `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Conflict,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::InProgress => "in_progress",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
            SyncState::Conflict => "conflict",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncState::Pending),
            "in_progress" => Some(SyncState::InProgress),
            "completed" => Some(SyncState::Completed),
            "failed" => Some(SyncState::Failed),
            "conflict" => Some(SyncState::Conflict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub sync_id: String,
    pub table_name: String,
    pub record_id: String,
    pub operation: SyncOperation,
    pub state: SyncState,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Clamps a raw score into the `[0, 100]` range required by I3. Out-of-range
/// derivations clamp, they never discard the row.
pub fn clamp_score(raw: f64) -> f64 {
    raw.clamp(0.0, 100.0)
}

/// Clamps a raw probability into the `[0, 1]` range required by I3.
pub fn clamp_probability(raw: f64) -> f64 {
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_category_boundaries() {
        assert_eq!(LengthCategory::from_word_count(0), LengthCategory::Short);
        assert_eq!(LengthCategory::from_word_count(20), LengthCategory::Medium);
    }

    #[test]
    fn activity_level_thresholds() {
        assert_eq!(ActivityLevel::from_total_messages(150), ActivityLevel::VeryActive);
        assert_eq!(ActivityLevel::from_total_messages(75), ActivityLevel::Active);
        assert_eq!(ActivityLevel::from_total_messages(20), ActivityLevel::Moderate);
        assert_eq!(ActivityLevel::from_total_messages(3), ActivityLevel::Occasional);
    }

    #[test]
    fn clamp_score_never_exceeds_range() {
        assert_eq!(clamp_score(250.0), 100.0);
        assert_eq!(clamp_score(-5.0), 0.0);
    }
}
