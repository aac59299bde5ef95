//! The embedded store (C2): a single SQLite file holding every entity in
//! `model`, reached exclusively through this module. A pooled connection,
//! forward migrations, and row-mapping helpers live next to the queries
//! that use them.

pub mod migrations;
pub mod pool;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use thiserror::Error;
use tracing::debug;

use crate::model::*;
use pool::ConnectionPool;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema on disk (version {found}) is newer than this binary knows (version {known})")]
    SchemaAhead { found: i64, known: i64 },

    #[error("row not found")]
    NotFound,

    #[error("invalid stored data: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn to_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn from_rfc3339(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

fn json_vec(v: &[String]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_vec(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

#[derive(Debug, Default, Clone)]
pub struct StoreStats {
    pub contacts: i64,
    pub chats: i64,
    pub messages: i64,
    pub leads: i64,
    pub pending_syncs: i64,
    pub failed_syncs: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ChatParticipantCount {
    pub chat_id: i64,
    pub message_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Aggregate signals over a contact's already-enriched message corpus
/// (E1 must have visited every row counted here). Computed in SQL rather
/// than by loading every message, since none of it needs plaintext.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactMessageStats {
    pub total_messages: i64,
    pub total_chats: i64,
    pub positive_count: i64,
    pub business_count: i64,
    pub recent_30d_count: i64,
    pub mean_word_count: f64,
}

/// Owns the connection pool and exposes one method per persistence
/// operation named in the data model. Every method below takes and returns
/// plain `model` types — no SQL leaks past this module.
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub async fn open(data_dir: &Path, max_connections: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("core.db");
        let pool = ConnectionPool::open(&db_path, max_connections)?;

        // Migrations need a `&mut Connection` to open a transaction and set
        // `user_version`, which the pool only ever hands out through
        // closures over `&Connection`; open one directly for this one-time
        // pass before the pool starts handing out its own connections.
        let mut raw = rusqlite::Connection::open(&db_path)?;
        migrations::apply_pending(&mut raw)?;
        drop(raw);

        debug!(path = %db_path.display(), "store opened");
        Ok(Self { pool })
    }

    // ---- contacts --------------------------------------------------

    pub async fn upsert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let c = contact.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO contacts (
                    user_id, username, first_name, last_name, phone,
                    is_bot, is_verified, is_premium, total_messages, total_chats,
                    activity_level, first_seen, last_seen
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
                ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    phone = excluded.phone,
                    is_bot = excluded.is_bot,
                    is_verified = excluded.is_verified,
                    is_premium = excluded.is_premium,
                    total_messages = excluded.total_messages,
                    total_chats = excluded.total_chats,
                    activity_level = excluded.activity_level,
                    last_seen = excluded.last_seen",
                params![
                    c.user_id,
                    c.username,
                    c.first_name,
                    c.last_name,
                    c.phone,
                    c.is_bot,
                    c.is_verified,
                    c.is_premium,
                    c.total_messages,
                    c.total_chats,
                    c.activity_level.as_str(),
                    to_rfc3339(&c.first_seen),
                    to_rfc3339(&c.last_seen),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_contact(&self, user_id: i64) -> Result<Option<Contact>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            db.query_row(
                "SELECT user_id, username, first_name, last_name, phone, is_bot, is_verified,
                        is_premium, total_messages, total_chats, activity_level, first_seen, last_seen
                 FROM contacts WHERE user_id = ?1",
                params![user_id],
                row_to_contact,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn search_contacts(&self, query: &str, limit: i64) -> Result<Vec<Contact>, StoreError> {
        let conn = self.pool.get().await?;
        let like = format!("%{query}%");
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT user_id, username, first_name, last_name, phone, is_bot, is_verified,
                        is_premium, total_messages, total_chats, activity_level, first_seen, last_seen
                 FROM contacts
                 WHERE username LIKE ?1 OR first_name LIKE ?1 OR last_name LIKE ?1
                 ORDER BY total_messages DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![like, limit], row_to_contact)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    /// All contacts, ordered by `user_id`. Used by full sync and by the
    /// Enricher's E2 pass (every contact with >= 1 message qualifies, and a
    /// `Contact` row only ever exists because a message created it).
    pub async fn all_contacts(&self, limit: i64) -> Result<Vec<Contact>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT user_id, username, first_name, last_name, phone, is_bot, is_verified,
                        is_premium, total_messages, total_chats, activity_level, first_seen, last_seen
                 FROM contacts ORDER BY user_id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_contact)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    /// Distinct `from_user_id`s with at least one message, used to drive
    /// E2/E3 even for a contact row that predates the enrichment columns.
    pub async fn distinct_contact_ids_with_messages(&self) -> Result<Vec<i64>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(|db| {
            let mut stmt = db.prepare("SELECT DISTINCT from_user_id FROM messages WHERE from_user_id IS NOT NULL")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    // ---- chats -------------------------------------------------------

    pub async fn upsert_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let ch = chat.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO chats (
                    chat_id, chat_type, title, username, participant_count,
                    first_message_date, last_message_date, total_messages
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                ON CONFLICT(chat_id) DO UPDATE SET
                    title = excluded.title,
                    username = excluded.username,
                    participant_count = excluded.participant_count,
                    last_message_date = excluded.last_message_date,
                    total_messages = excluded.total_messages",
                params![
                    ch.chat_id,
                    ch.chat_type.as_str(),
                    ch.title,
                    ch.username,
                    ch.participant_count,
                    to_rfc3339(&ch.first_message_date),
                    to_rfc3339(&ch.last_message_date),
                    ch.total_messages,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn all_chats(&self, limit: i64) -> Result<Vec<Chat>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, chat_type, title, username, participant_count,
                        first_message_date, last_message_date, total_messages
                 FROM chats ORDER BY chat_id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_chat)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    /// Per-chat `(count, first_seen, last_seen)` for one contact, the raw
    /// material E2 rebuilds `ChatParticipant` rows from.
    pub async fn chat_participant_counts(&self, user_id: i64) -> Result<Vec<ChatParticipantCount>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, COUNT(*), MIN(date), MAX(date)
                 FROM messages WHERE from_user_id = ?1 GROUP BY chat_id",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)?
                .into_iter()
                .map(|(chat_id, count, first, last)| {
                    Ok(ChatParticipantCount {
                        chat_id,
                        message_count: count,
                        first_seen: from_rfc3339(&first)?,
                        last_seen: from_rfc3339(&last)?,
                    })
                })
                .collect()
        })
        .await
    }

    pub async fn upsert_chat_participant(&self, p: &ChatParticipant) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let p = p.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO chat_participants (chat_id, user_id, message_count, first_seen, last_seen, engagement_level)
                 VALUES (?1,?2,?3,?4,?5,?6)
                 ON CONFLICT(chat_id, user_id) DO UPDATE SET
                    message_count = excluded.message_count,
                    last_seen = excluded.last_seen,
                    engagement_level = excluded.engagement_level",
                params![
                    p.chat_id,
                    p.user_id,
                    p.message_count,
                    to_rfc3339(&p.first_seen),
                    to_rfc3339(&p.last_seen),
                    p.engagement_level.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    // ---- messages ------------------------------------------------------

    /// Upserts a batch atomically, keyed on `(chat_id, message_id)`,
    /// re-running edits against `edit_date` and refreshing enrichment
    /// columns when present without clobbering them with `NULL`.
    pub async fn upsert_messages(&self, batch: &[Message]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let conn = self.pool.get().await?;
        let rows = batch.to_vec();
        conn.with_tx(move |tx| {
            for m in &rows {
                tx.execute(
                    "INSERT INTO messages (
                        chat_id, message_id, from_user_id, date, text_ciphertext, message_type,
                        is_reply, is_forwarded, edit_date,
                        word_count, time_of_day, day_of_week, length_category, sentiment,
                        contains_business_keywords, is_question, contains_media, contains_links, content_category
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)
                    ON CONFLICT(chat_id, message_id) DO UPDATE SET
                        edit_date = excluded.edit_date,
                        text_ciphertext = excluded.text_ciphertext,
                        word_count = COALESCE(excluded.word_count, messages.word_count),
                        time_of_day = COALESCE(excluded.time_of_day, messages.time_of_day),
                        day_of_week = COALESCE(excluded.day_of_week, messages.day_of_week),
                        length_category = COALESCE(excluded.length_category, messages.length_category),
                        sentiment = COALESCE(excluded.sentiment, messages.sentiment),
                        contains_business_keywords = COALESCE(excluded.contains_business_keywords, messages.contains_business_keywords),
                        is_question = COALESCE(excluded.is_question, messages.is_question),
                        contains_media = COALESCE(excluded.contains_media, messages.contains_media),
                        contains_links = COALESCE(excluded.contains_links, messages.contains_links),
                        content_category = COALESCE(excluded.content_category, messages.content_category)",
                    params![
                        m.chat_id,
                        m.message_id,
                        m.from_user_id,
                        to_rfc3339(&m.date),
                        m.text_ciphertext,
                        m.message_type.as_str(),
                        m.is_reply,
                        m.is_forwarded,
                        m.edit_date.as_ref().map(to_rfc3339),
                        m.word_count,
                        m.time_of_day.map(|t| t.as_str()),
                        m.day_of_week,
                        m.length_category.map(|l| l.as_str()),
                        m.sentiment.map(|s| s.as_str()),
                        m.contains_business_keywords,
                        m.is_question,
                        m.contains_media,
                        m.contains_links,
                        m.content_category.map(|c| c.as_str()),
                    ],
                )?;
            }
            Ok(())
        })
        .await
    }

    pub async fn unenriched_messages(&self, limit: i64) -> Result<Vec<Message>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, message_id, from_user_id, date, text_ciphertext, message_type,
                        is_reply, is_forwarded, edit_date, word_count, time_of_day, day_of_week,
                        length_category, sentiment, contains_business_keywords, is_question,
                        contains_media, contains_links, content_category
                 FROM messages WHERE word_count IS NULL ORDER BY chat_id, message_id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_message)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    pub async fn chat_watermark(&self, chat_id: i64) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let raw: Option<String> = db
                .query_row("SELECT max_date FROM chat_watermarks WHERE chat_id = ?1", params![chat_id], |r| r.get(0))
                .optional()?;
            raw.map(|s| from_rfc3339(&s)).transpose()
        })
        .await
    }

    /// The highest `message_id` already ingested for a chat, used as the
    /// incremental-pull cursor (`after_message_id`) so a repeat ingest pass
    /// only walks history newer than what's already stored.
    pub async fn chat_message_watermark(&self, chat_id: i64) -> Result<i64, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            db.query_row(
                "SELECT max_message_id FROM chat_watermarks WHERE chat_id = ?1",
                params![chat_id],
                |r| r.get(0),
            )
            .optional()
            .map(|v| v.unwrap_or(0))
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn set_chat_watermark(&self, chat_id: i64, max_date: DateTime<Utc>, max_message_id: i64) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            db.execute(
                "INSERT INTO chat_watermarks (chat_id, max_date, max_message_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                    max_date = excluded.max_date,
                    max_message_id = MAX(chat_watermarks.max_message_id, excluded.max_message_id)",
                params![chat_id, to_rfc3339(&max_date), max_message_id],
            )?;
            Ok(())
        })
        .await
    }

    /// The digest recorded for a chat's last full-history pull, used to
    /// skip re-writing a batch that is byte-for-byte identical to what's
    /// already stored (the nightly full pull otherwise re-upserts every
    /// message in the dialog even when nothing changed).
    pub async fn chat_batch_digest(&self, chat_id: i64) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            db.query_row(
                "SELECT batch_digest FROM chat_watermarks WHERE chat_id = ?1",
                params![chat_id],
                |r| r.get(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn set_chat_batch_digest(&self, chat_id: i64, digest: &str) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let digest = digest.to_string();
        conn.with(move |db| {
            db.execute(
                "UPDATE chat_watermarks SET batch_digest = ?2 WHERE chat_id = ?1",
                params![chat_id, digest],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent `limit` successfully-enriched messages from one contact,
    /// newest first — the window E3's taxonomy scan runs over (canonical
    /// N=200 choice, not the whole unbounded corpus).
    pub async fn recent_messages_for_contact(&self, user_id: i64, limit: i64) -> Result<Vec<Message>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, message_id, from_user_id, date, text_ciphertext, message_type,
                        is_reply, is_forwarded, edit_date, word_count, time_of_day, day_of_week,
                        length_category, sentiment, contains_business_keywords, is_question,
                        contains_media, contains_links, content_category
                 FROM messages WHERE from_user_id = ?1 AND word_count >= 0
                 ORDER BY date DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit], row_to_message)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    /// Aggregate signals over every enriched message from one contact
    /// (E2/E3 volume/ratio bonuses). Poison rows (decrypt failures,
    /// `word_count = -1`) are excluded.
    pub async fn contact_message_stats(&self, user_id: i64) -> Result<ContactMessageStats, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let cutoff = to_rfc3339(&(Utc::now() - chrono::Duration::days(30)));
            db.query_row(
                "SELECT
                    COUNT(*),
                    COUNT(DISTINCT chat_id),
                    SUM(CASE WHEN sentiment = 'positive' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN contains_business_keywords = 1 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN date >= ?2 THEN 1 ELSE 0 END),
                    COALESCE(AVG(word_count), 0.0)
                 FROM messages WHERE from_user_id = ?1 AND word_count >= 0",
                params![user_id, cutoff],
                |row| {
                    Ok(ContactMessageStats {
                        total_messages: row.get(0)?,
                        total_chats: row.get(1)?,
                        positive_count: row.get(2)?,
                        business_count: row.get(3)?,
                        recent_30d_count: row.get(4)?,
                        mean_word_count: row.get(5)?,
                    })
                },
            )
            .map_err(StoreError::from)
        })
        .await
    }

    /// Messages shaped for the `messages` sync projection: every column
    /// except `text_ciphertext` — message text is never exported.
    pub async fn messages_for_export(&self, since_chat_id: i64, limit: i64) -> Result<Vec<Message>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, message_id, from_user_id, date, message_type,
                        is_reply, is_forwarded, edit_date, word_count, time_of_day, day_of_week,
                        length_category, sentiment, contains_business_keywords, is_question,
                        contains_media, contains_links, content_category
                 FROM messages WHERE chat_id >= ?1 ORDER BY chat_id, message_id LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since_chat_id, limit], row_to_message_without_text)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    // ---- conversations --------------------------------------------------

    pub async fn upsert_conversation(&self, c: &Conversation) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let c = c.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO conversations (chat_id, user_id, message_count, business_relevance, first_date, last_date, shared_interests, conversation_topics)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(chat_id, user_id) DO UPDATE SET
                    message_count = excluded.message_count,
                    business_relevance = excluded.business_relevance,
                    last_date = excluded.last_date,
                    shared_interests = excluded.shared_interests,
                    conversation_topics = excluded.conversation_topics",
                params![
                    c.chat_id,
                    c.user_id,
                    c.message_count,
                    c.business_relevance,
                    to_rfc3339(&c.first_date),
                    to_rfc3339(&c.last_date),
                    json_vec(&c.shared_interests),
                    json_vec(&c.conversation_topics),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn all_conversations(&self, limit: i64) -> Result<Vec<Conversation>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT chat_id, user_id, message_count, business_relevance, first_date, last_date, shared_interests, conversation_topics
                 FROM conversations ORDER BY chat_id, user_id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_conversation)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    // ---- leads -----------------------------------------------------

    pub async fn upsert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let l = lead.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO leads (
                    lead_id, user_id, bd_score, intelligence_score, conversion_likelihood,
                    lead_quality, priority, estimated_value, investment_capacity, deal_size_category,
                    relationship_strength, business_keywords, investment_keywords, technology_expertise,
                    decision_maker_signals, network_influence, trust_indicators, financial_indicators,
                    personalized_message, meeting_agenda, call_to_action, follow_up_timing,
                    engagement_quality, referral_potential, response_rate, created_at, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27)
                ON CONFLICT(user_id) DO UPDATE SET
                    bd_score = excluded.bd_score,
                    intelligence_score = excluded.intelligence_score,
                    conversion_likelihood = excluded.conversion_likelihood,
                    lead_quality = excluded.lead_quality,
                    priority = excluded.priority,
                    estimated_value = excluded.estimated_value,
                    investment_capacity = excluded.investment_capacity,
                    deal_size_category = excluded.deal_size_category,
                    relationship_strength = excluded.relationship_strength,
                    business_keywords = excluded.business_keywords,
                    investment_keywords = excluded.investment_keywords,
                    technology_expertise = excluded.technology_expertise,
                    decision_maker_signals = excluded.decision_maker_signals,
                    network_influence = excluded.network_influence,
                    trust_indicators = excluded.trust_indicators,
                    financial_indicators = excluded.financial_indicators,
                    personalized_message = excluded.personalized_message,
                    meeting_agenda = excluded.meeting_agenda,
                    call_to_action = excluded.call_to_action,
                    follow_up_timing = excluded.follow_up_timing,
                    engagement_quality = excluded.engagement_quality,
                    referral_potential = excluded.referral_potential,
                    response_rate = excluded.response_rate,
                    updated_at = excluded.updated_at",
                params![
                    l.lead_id,
                    l.user_id,
                    l.bd_score,
                    l.intelligence_score,
                    l.conversion_likelihood,
                    l.lead_quality.as_str(),
                    l.priority.as_str(),
                    l.estimated_value,
                    l.investment_capacity.as_str(),
                    l.deal_size_category.as_str(),
                    l.relationship_strength.as_str(),
                    json_vec(&l.business_keywords),
                    json_vec(&l.investment_keywords),
                    json_vec(&l.technology_expertise),
                    json_vec(&l.decision_maker_signals),
                    json_vec(&l.network_influence),
                    json_vec(&l.trust_indicators),
                    json_vec(&l.financial_indicators),
                    l.personalized_message,
                    l.meeting_agenda,
                    l.call_to_action,
                    l.follow_up_timing.map(|t| t.as_str()),
                    match l.engagement_quality {
                        EngagementQuality::Deep => "deep",
                        EngagementQuality::Moderate => "moderate",
                        EngagementQuality::Light => "light",
                    },
                    match l.referral_potential {
                        ReferralPotential::High => "high",
                        ReferralPotential::Medium => "medium",
                        ReferralPotential::Low => "low",
                        ReferralPotential::None => "none",
                    },
                    l.response_rate,
                    to_rfc3339(&l.created_at),
                    to_rfc3339(&l.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        let conn = self.pool.get().await?;
        let id = lead_id.to_string();
        conn.with(move |db| {
            db.query_row(LEAD_SELECT, params![id], row_to_lead).optional().map_err(StoreError::from)
        })
        .await
    }

    pub async fn leads_above(&self, min_intelligence_score: f64, limit: i64) -> Result<Vec<Lead>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let sql = format!("{LEAD_SELECT} WHERE intelligence_score >= ?1 ORDER BY intelligence_score DESC LIMIT ?2");
            let mut stmt = db.prepare(&sql)?;
            let rows = stmt.query_map(params![min_intelligence_score, limit], row_to_lead)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    pub async fn all_leads(&self, limit: i64) -> Result<Vec<Lead>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let sql = format!("{LEAD_SELECT} ORDER BY user_id LIMIT ?1");
            let mut stmt = db.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], row_to_lead)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    pub async fn leads_sum_estimated_value(&self) -> Result<f64, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(|db| {
            db.query_row("SELECT COALESCE(SUM(estimated_value), 0.0) FROM leads", [], |r| r.get(0))
                .map_err(StoreError::from)
        })
        .await
    }

    // ---- follow-ups --------------------------------------------------

    pub async fn upsert_follow_up(&self, f: &FollowUp) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let f = f.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO follow_ups (follow_up_id, lead_id, action_type, description, priority, due_date, status, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(follow_up_id) DO UPDATE SET
                    description = excluded.description,
                    priority = excluded.priority,
                    due_date = excluded.due_date,
                    status = excluded.status",
                params![
                    f.follow_up_id,
                    f.lead_id,
                    f.action_type,
                    f.description,
                    f.priority.as_str(),
                    to_rfc3339(&f.due_date),
                    f.status.as_str(),
                    to_rfc3339(&f.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn all_follow_ups(&self, limit: i64) -> Result<Vec<FollowUp>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT follow_up_id, lead_id, action_type, description, priority, due_date, status, created_at
                 FROM follow_ups ORDER BY due_date LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_follow_up)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    // ---- opportunities ------------------------------------------------

    pub async fn upsert_opportunity(&self, o: &Opportunity) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let o = o.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO opportunities (opportunity_id, lead_id, opportunity_type, estimated_value, probability, timeline, stage, next_steps)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(opportunity_id) DO UPDATE SET
                    estimated_value = excluded.estimated_value,
                    probability = excluded.probability,
                    timeline = excluded.timeline,
                    stage = excluded.stage,
                    next_steps = excluded.next_steps",
                params![
                    o.opportunity_id,
                    o.lead_id,
                    o.opportunity_type,
                    o.estimated_value,
                    o.probability,
                    o.timeline,
                    o.stage.as_str(),
                    json_vec(&o.next_steps),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn all_opportunities(&self, limit: i64) -> Result<Vec<Opportunity>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT opportunity_id, lead_id, opportunity_type, estimated_value, probability, timeline, stage, next_steps
                 FROM opportunities ORDER BY opportunity_id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_opportunity)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    pub async fn opportunities_sum_expected_value(&self) -> Result<f64, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(|db| {
            db.query_row("SELECT COALESCE(SUM(estimated_value * probability), 0.0) FROM opportunities", [], |r| r.get(0))
                .map_err(StoreError::from)
        })
        .await
    }

    // ---- sync tasks -----------------------------------------------------

    pub async fn enqueue_sync(&self, task: &SyncTask) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let t = task.clone();
        conn.with(move |db| {
            db.execute(
                "INSERT INTO sync_tasks (sync_id, table_name, record_id, operation, state, attempts, last_error, enqueued_at, completed_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
                 ON CONFLICT(sync_id) DO UPDATE SET state = excluded.state",
                params![
                    t.sync_id,
                    t.table_name,
                    t.record_id,
                    t.operation.as_str(),
                    t.state.as_str(),
                    t.attempts,
                    t.last_error,
                    to_rfc3339(&t.enqueued_at),
                    t.completed_at.as_ref().map(to_rfc3339),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn pending_syncs(&self, limit: i64) -> Result<Vec<SyncTask>, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(move |db| {
            let mut stmt = db.prepare(
                "SELECT sync_id, table_name, record_id, operation, state, attempts, last_error, enqueued_at, completed_at
                 FROM sync_tasks WHERE state = 'pending' ORDER BY enqueued_at LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_sync_task)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
        })
        .await
    }

    /// Transitions a task's state, recording an attempt and optional error.
    /// State moves monotonically per attempt; `retry` moves `failed` back
    /// to `pending` rather than leaving it terminal.
    pub async fn mark_sync(&self, sync_id: &str, state: SyncState, error: Option<&str>) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let id = sync_id.to_string();
        let err = error.map(str::to_string);
        conn.with(move |db| {
            let completed_at = matches!(state, SyncState::Completed).then(|| to_rfc3339(&Utc::now()));
            db.execute(
                "UPDATE sync_tasks SET state = ?1, attempts = attempts + 1, last_error = ?2, completed_at = ?3 WHERE sync_id = ?4",
                params![state.as_str(), err, completed_at, id],
            )?;
            Ok(())
        })
        .await
    }

    // ---- maintenance --------------------------------------------------

    pub async fn vacuum(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        conn.with(|db| {
            db.execute_batch("VACUUM;")?;
            Ok(())
        })
        .await
    }

    pub async fn backup_to(&self, destination: &Path) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let dest = destination.to_path_buf();
        conn.with(move |db| {
            let mut dst = rusqlite::Connection::open(&dest)?;
            let backup = rusqlite::backup::Backup::new(db, &mut dst)?;
            backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
            Ok(())
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.pool.get().await?;
        conn.with(|db| {
            Ok(StoreStats {
                contacts: db.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?,
                chats: db.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?,
                messages: db.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?,
                leads: db.query_row("SELECT COUNT(*) FROM leads", [], |r| r.get(0))?,
                pending_syncs: db.query_row("SELECT COUNT(*) FROM sync_tasks WHERE state = 'pending'", [], |r| r.get(0))?,
                failed_syncs: db.query_row("SELECT COUNT(*) FROM sync_tasks WHERE state = 'failed'", [], |r| r.get(0))?,
            })
        })
        .await
    }
}

const LEAD_SELECT: &str = "SELECT lead_id, user_id, bd_score, intelligence_score, conversion_likelihood,
    lead_quality, priority, estimated_value, investment_capacity, deal_size_category,
    relationship_strength, business_keywords, investment_keywords, technology_expertise,
    decision_maker_signals, network_influence, trust_indicators, financial_indicators,
    personalized_message, meeting_agenda, call_to_action, follow_up_timing,
    engagement_quality, referral_potential, response_rate, created_at, updated_at
    FROM leads";

fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
    let activity_level: String = row.get(10)?;
    Ok(Contact {
        user_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        is_bot: row.get(5)?,
        is_verified: row.get(6)?,
        is_premium: row.get(7)?,
        total_messages: row.get(8)?,
        total_chats: row.get(9)?,
        activity_level: match activity_level.as_str() {
            "very_active" => ActivityLevel::VeryActive,
            "active" => ActivityLevel::Active,
            "moderate" => ActivityLevel::Moderate,
            _ => ActivityLevel::Occasional,
        },
        first_seen: parse_dt(row, 11)?,
        last_seen: parse_dt(row, 12)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let message_type: String = row.get(5)?;
    let time_of_day: Option<String> = row.get(10)?;
    let length_category: Option<String> = row.get(12)?;
    let sentiment: Option<String> = row.get(13)?;
    let content_category: Option<String> = row.get(18)?;
    let edit_date: Option<String> = row.get(8)?;

    Ok(Message {
        chat_id: row.get(0)?,
        message_id: row.get(1)?,
        from_user_id: row.get(2)?,
        date: parse_dt(row, 3)?,
        text_ciphertext: row.get(4)?,
        message_type: match message_type.as_str() {
            "photo" => MessageType::Photo,
            "video" => MessageType::Video,
            "document" => MessageType::Document,
            "voice" => MessageType::Voice,
            "sticker" => MessageType::Sticker,
            "other" => MessageType::Other,
            _ => MessageType::Text,
        },
        is_reply: row.get(6)?,
        is_forwarded: row.get(7)?,
        edit_date: edit_date.map(|s| s.parse_ts()).transpose()?,
        word_count: row.get(9)?,
        time_of_day: time_of_day.map(|s| match s.as_str() {
            "morning" => TimeOfDay::Morning,
            "afternoon" => TimeOfDay::Afternoon,
            "evening" => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }),
        day_of_week: row.get(11)?,
        length_category: length_category.map(|s| match s.as_str() {
            "short" => LengthCategory::Short,
            "medium" => LengthCategory::Medium,
            _ => LengthCategory::Long,
        }),
        sentiment: sentiment.map(|s| match s.as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }),
        contains_business_keywords: row.get(14)?,
        is_question: row.get(15)?,
        contains_media: row.get(16)?,
        contains_links: row.get(17)?,
        content_category: content_category.map(|s| match s.as_str() {
            "business" => ContentCategory::Business,
            "technical" => ContentCategory::Technical,
            "social" => ContentCategory::Social,
            _ => ContentCategory::Casual,
        }),
    })
}

/// Same shape as `row_to_message` but for a `SELECT` that omits
/// `text_ciphertext` (the export/projection query) — one column index
/// earlier throughout, and `text_ciphertext` is never populated.
fn row_to_message_without_text(row: &Row) -> rusqlite::Result<Message> {
    let message_type: String = row.get(4)?;
    let time_of_day: Option<String> = row.get(9)?;
    let length_category: Option<String> = row.get(11)?;
    let sentiment: Option<String> = row.get(12)?;
    let content_category: Option<String> = row.get(17)?;
    let edit_date: Option<String> = row.get(7)?;

    Ok(Message {
        chat_id: row.get(0)?,
        message_id: row.get(1)?,
        from_user_id: row.get(2)?,
        date: parse_dt(row, 3)?,
        text_ciphertext: Vec::new(),
        message_type: match message_type.as_str() {
            "photo" => MessageType::Photo,
            "video" => MessageType::Video,
            "document" => MessageType::Document,
            "voice" => MessageType::Voice,
            "sticker" => MessageType::Sticker,
            "other" => MessageType::Other,
            _ => MessageType::Text,
        },
        is_reply: row.get(5)?,
        is_forwarded: row.get(6)?,
        edit_date: edit_date.map(|s| s.parse_ts()).transpose()?,
        word_count: row.get(8)?,
        time_of_day: time_of_day.map(|s| match s.as_str() {
            "morning" => TimeOfDay::Morning,
            "afternoon" => TimeOfDay::Afternoon,
            "evening" => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }),
        day_of_week: row.get(10)?,
        length_category: length_category.map(|s| match s.as_str() {
            "short" => LengthCategory::Short,
            "medium" => LengthCategory::Medium,
            _ => LengthCategory::Long,
        }),
        sentiment: sentiment.map(|s| match s.as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }),
        contains_business_keywords: row.get(13)?,
        is_question: row.get(14)?,
        contains_media: row.get(15)?,
        contains_links: row.get(16)?,
        content_category: content_category.map(|s| match s.as_str() {
            "business" => ContentCategory::Business,
            "technical" => ContentCategory::Technical,
            "social" => ContentCategory::Social,
            _ => ContentCategory::Casual,
        }),
    })
}

fn row_to_chat(row: &Row) -> rusqlite::Result<Chat> {
    let chat_type: String = row.get(1)?;
    Ok(Chat {
        chat_id: row.get(0)?,
        chat_type: match chat_type.as_str() {
            "group" => ChatType::Group,
            "supergroup" => ChatType::Supergroup,
            "channel" => ChatType::Channel,
            _ => ChatType::Private,
        },
        title: row.get(2)?,
        username: row.get(3)?,
        participant_count: row.get(4)?,
        first_message_date: parse_dt(row, 5)?,
        last_message_date: parse_dt(row, 6)?,
        total_messages: row.get(7)?,
    })
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let shared_interests: String = row.get(6)?;
    let conversation_topics: String = row.get(7)?;
    Ok(Conversation {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        message_count: row.get(2)?,
        business_relevance: row.get(3)?,
        first_date: parse_dt(row, 4)?,
        last_date: parse_dt(row, 5)?,
        shared_interests: parse_json_vec(&shared_interests),
        conversation_topics: parse_json_vec(&conversation_topics),
    })
}

fn row_to_follow_up(row: &Row) -> rusqlite::Result<FollowUp> {
    let priority: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(FollowUp {
        follow_up_id: row.get(0)?,
        lead_id: row.get(1)?,
        action_type: row.get(2)?,
        description: row.get(3)?,
        priority: match priority.as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        },
        due_date: parse_dt(row, 5)?,
        status: match status.as_str() {
            "sent" => FollowUpStatus::Sent,
            "done" => FollowUpStatus::Done,
            "failed" => FollowUpStatus::Failed,
            _ => FollowUpStatus::Pending,
        },
        created_at: parse_dt(row, 7)?,
    })
}

fn row_to_opportunity(row: &Row) -> rusqlite::Result<Opportunity> {
    let stage: String = row.get(6)?;
    let next_steps: String = row.get(7)?;
    Ok(Opportunity {
        opportunity_id: row.get(0)?,
        lead_id: row.get(1)?,
        opportunity_type: row.get(2)?,
        estimated_value: row.get(3)?,
        probability: row.get(4)?,
        timeline: row.get(5)?,
        stage: match stage.as_str() {
            "identified" => OpportunityStage::Identified,
            "proposal" => OpportunityStage::Proposal,
            "closing" => OpportunityStage::Closing,
            _ => OpportunityStage::Qualification,
        },
        next_steps: parse_json_vec(&next_steps),
    })
}

fn row_to_lead(row: &Row) -> rusqlite::Result<Lead> {
    let lead_quality: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let investment_capacity: String = row.get(8)?;
    let deal_size_category: String = row.get(9)?;
    let relationship_strength: String = row.get(10)?;
    let follow_up_timing: Option<String> = row.get(21)?;
    let engagement_quality: String = row.get(22)?;
    let referral_potential: String = row.get(23)?;
    let business_keywords: String = row.get(11)?;
    let investment_keywords: String = row.get(12)?;
    let technology_expertise: String = row.get(13)?;
    let decision_maker_signals: String = row.get(14)?;
    let network_influence: String = row.get(15)?;
    let trust_indicators: String = row.get(16)?;
    let financial_indicators: String = row.get(17)?;

    Ok(Lead {
        lead_id: row.get(0)?,
        user_id: row.get(1)?,
        bd_score: row.get(2)?,
        intelligence_score: row.get(3)?,
        conversion_likelihood: row.get(4)?,
        lead_quality: match lead_quality.as_str() {
            "hot" => LeadQuality::Hot,
            "warm" => LeadQuality::Warm,
            _ => LeadQuality::Cold,
        },
        priority: match priority.as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        },
        estimated_value: row.get(7)?,
        investment_capacity: match investment_capacity.as_str() {
            "high" => Capacity::High,
            "medium" => Capacity::Medium,
            _ => Capacity::Low,
        },
        deal_size_category: match deal_size_category.as_str() {
            "enterprise" => DealSizeCategory::Enterprise,
            "mid-market" => DealSizeCategory::MidMarket,
            _ => DealSizeCategory::Startup,
        },
        relationship_strength: match relationship_strength.as_str() {
            "strong" => RelationshipStrength::Strong,
            "moderate" => RelationshipStrength::Moderate,
            _ => RelationshipStrength::Weak,
        },
        business_keywords: parse_json_vec(&business_keywords),
        investment_keywords: parse_json_vec(&investment_keywords),
        technology_expertise: parse_json_vec(&technology_expertise),
        decision_maker_signals: parse_json_vec(&decision_maker_signals),
        network_influence: parse_json_vec(&network_influence),
        trust_indicators: parse_json_vec(&trust_indicators),
        financial_indicators: parse_json_vec(&financial_indicators),
        personalized_message: row.get(18)?,
        meeting_agenda: row.get(19)?,
        call_to_action: row.get(20)?,
        follow_up_timing: follow_up_timing.map(|s| match s.as_str() {
            "this week" => FollowUpTiming::ThisWeek,
            "next week" => FollowUpTiming::NextWeek,
            _ => FollowUpTiming::ComingWeeks,
        }),
        engagement_quality: match engagement_quality.as_str() {
            "deep" => EngagementQuality::Deep,
            "moderate" => EngagementQuality::Moderate,
            _ => EngagementQuality::Light,
        },
        referral_potential: match referral_potential.as_str() {
            "high" => ReferralPotential::High,
            "medium" => ReferralPotential::Medium,
            "low" => ReferralPotential::Low,
            _ => ReferralPotential::None,
        },
        response_rate: row.get(24)?,
        created_at: parse_dt(row, 25)?,
        updated_at: parse_dt(row, 26)?,
    })
}

fn row_to_sync_task(row: &Row) -> rusqlite::Result<SyncTask> {
    let operation: String = row.get(3)?;
    let state: String = row.get(4)?;
    let completed_at: Option<String> = row.get(8)?;
    Ok(SyncTask {
        sync_id: row.get(0)?,
        table_name: row.get(1)?,
        record_id: row.get(2)?,
        operation: SyncOperation::from_str(&operation).unwrap_or(SyncOperation::Upsert),
        state: SyncState::from_str(&state).unwrap_or(SyncState::Pending),
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        enqueued_at: parse_dt(row, 7)?,
        completed_at: completed_at.map(|s| s.parse_ts()).transpose()?,
    })
}

fn parse_dt(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse_ts()
}

trait ParseTimestamp {
    fn parse_ts(&self) -> rusqlite::Result<DateTime<Utc>>;
}

impl ParseTimestamp for str {
    fn parse_ts(&self) -> rusqlite::Result<DateTime<Utc>> {
        from_rfc3339(self).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

impl ParseTimestamp for String {
    fn parse_ts(&self) -> rusqlite::Result<DateTime<Utc>> {
        self.as_str().parse_ts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample_contact(user_id: i64) -> Contact {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Contact {
            user_id,
            username: Some("alice".into()),
            first_name: Some("Alice".into()),
            last_name: None,
            phone: None,
            is_bot: false,
            is_verified: false,
            is_premium: false,
            total_messages: 5,
            total_chats: 1,
            activity_level: ActivityLevel::Occasional,
            first_seen: now,
            last_seen: now,
        }
    }

    fn sample_message(chat_id: i64, message_id: i64) -> Message {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        Message {
            chat_id,
            message_id,
            from_user_id: Some(1),
            date: now,
            text_ciphertext: vec![1, 2, 3],
            message_type: MessageType::Text,
            is_reply: false,
            is_forwarded: false,
            edit_date: None,
            word_count: None,
            time_of_day: None,
            day_of_week: None,
            length_category: None,
            sentiment: None,
            contains_business_keywords: None,
            is_question: None,
            contains_media: None,
            contains_links: None,
            content_category: None,
        }
    }

    #[tokio::test]
    async fn upserting_a_contact_twice_keeps_one_row() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), 2).await.unwrap();
        store.upsert_contact(&sample_contact(1)).await.unwrap();
        let mut updated = sample_contact(1);
        updated.total_messages = 9;
        store.upsert_contact(&updated).await.unwrap();

        let fetched = store.get_contact(1).await.unwrap().unwrap();
        assert_eq!(fetched.total_messages, 9);
        assert_eq!(store.stats().await.unwrap().contacts, 1);
    }

    #[tokio::test]
    async fn re_ingesting_an_edited_message_keeps_prior_enrichment() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), 2).await.unwrap();

        store.upsert_messages(&[sample_message(10, 1)]).await.unwrap();
        let mut enriched = sample_message(10, 1);
        enriched.word_count = Some(3);
        enriched.sentiment = Some(Sentiment::Positive);
        store.upsert_messages(&[enriched]).await.unwrap();

        let mut edited = sample_message(10, 1);
        edited.edit_date = Some(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
        edited.text_ciphertext = vec![9, 9, 9];
        store.upsert_messages(&[edited]).await.unwrap();

        let pending = store.unenriched_messages(10).await.unwrap();
        assert!(pending.is_empty(), "edit must not wipe prior enrichment columns");
    }

    #[tokio::test]
    async fn pending_syncs_respects_state_transitions() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), 2).await.unwrap();
        let task = SyncTask {
            sync_id: "s1".into(),
            table_name: "leads".into(),
            record_id: "lead_1".into(),
            operation: SyncOperation::Upsert,
            state: SyncState::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            completed_at: None,
        };
        store.enqueue_sync(&task).await.unwrap();
        assert_eq!(store.pending_syncs(10).await.unwrap().len(), 1);

        store.mark_sync("s1", SyncState::Completed, None).await.unwrap();
        assert_eq!(store.pending_syncs(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn chat_watermark_tracks_max_message_id_and_digest() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), 2).await.unwrap();

        assert_eq!(store.chat_message_watermark(10).await.unwrap(), 0);
        assert_eq!(store.chat_batch_digest(10).await.unwrap(), None);

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store.set_chat_watermark(10, now, 5).await.unwrap();
        assert_eq!(store.chat_message_watermark(10).await.unwrap(), 5);

        // a later call with a lower id never regresses the watermark
        store.set_chat_watermark(10, now, 3).await.unwrap();
        assert_eq!(store.chat_message_watermark(10).await.unwrap(), 5);

        store.set_chat_batch_digest(10, "abc123").await.unwrap();
        assert_eq!(store.chat_batch_digest(10).await.unwrap(), Some("abc123".to_string()));
    }
}
