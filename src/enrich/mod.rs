//! The Enricher (C4): runs stages E1–E6 against the Store. Stateless across
//! runs — every intermediate value lives in a local variable for the
//! duration of one pass, never cached between invocations, so re-running
//! the whole pipeline on unchanged data is safe by construction.
//!
//! Stage order (E1 -> E2 -> E3 -> E4 -> E5 -> E6) is fixed within a single
//! pass; the Scheduler is responsible for never running two passes
//! concurrently.

pub mod aggregate;
pub mod followup;
pub mod scoring;
pub mod sentiment;
pub mod signals;
pub mod taxonomy;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::crypto::Crypto;
use crate::model::{Conversation, Lead, Opportunity, OpportunityStage, Priority, SyncOperation, SyncState, SyncTask};
use crate::store::{Store, StoreError};
use sentiment::{LexiconSentiment, SentimentStrategy};
use taxonomy::TaxonomyHits;

/// Messages-per-transaction batch size for E1.
const MESSAGE_BATCH_SIZE: i64 = 1000;

/// Most-recent-N messages considered for E3's taxonomy accumulation per
/// contact — bounds an otherwise window-unbounded scan.
const TAXONOMY_WINDOW: i64 = 200;

/// Minimum `intelligence_score` for the Opportunity pipeline (E6).
const OPPORTUNITY_SCORE_THRESHOLD: f64 = 60.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct EnrichStats {
    pub messages_enriched: u64,
    pub messages_poisoned: u64,
    pub contacts_aggregated: u64,
    pub leads_upserted: u64,
    pub follow_ups_created: u64,
    pub opportunities_created: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum EnrichError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compares two `Lead` snapshots ignoring `created_at`/`updated_at`, so an
/// unchanged re-run of E3–E4 is detected as a no-op: a `completed`
/// `SyncTask` is never re-enqueued unless the underlying row actually
/// advances.
fn lead_content_changed(old: &Lead, new: &Lead) -> bool {
    let mut adjusted = new.clone();
    adjusted.created_at = old.created_at;
    adjusted.updated_at = old.updated_at;
    &adjusted != old
}

pub struct Enricher {
    store: Arc<Store>,
    crypto: Arc<Crypto>,
    sentiment: Box<dyn SentimentStrategy>,
}

impl Enricher {
    pub fn new(store: Arc<Store>, crypto: Arc<Crypto>) -> Self {
        Self { store, crypto, sentiment: Box::new(LexiconSentiment) }
    }

    /// Swaps the sentiment strategy without touching any other stage.
    pub fn with_sentiment(mut self, strategy: Box<dyn SentimentStrategy>) -> Self {
        self.sentiment = strategy;
        self
    }

    /// Runs E1 through E6 once, in order, and returns counters for metrics.
    pub async fn run_pass(&self) -> Result<EnrichStats, EnrichError> {
        let mut stats = EnrichStats::default();
        self.stage_e1_message_signals(&mut stats).await?;
        self.stage_e2_contact_aggregation(&mut stats).await?;

        let user_ids = self.store.distinct_contact_ids_with_messages().await?;
        for user_id in user_ids {
            self.enrich_contact(user_id, &mut stats).await?;
        }

        info!(
            enriched = stats.messages_enriched,
            poisoned = stats.messages_poisoned,
            contacts = stats.contacts_aggregated,
            leads = stats.leads_upserted,
            follow_ups = stats.follow_ups_created,
            opportunities = stats.opportunities_created,
            "enrichment pass complete"
        );
        Ok(stats)
    }

    /// E1: decrypt + derive per-message columns, batched 1000 at a time.
    /// A poison row (decrypt failure) is written back with its sentinel so
    /// it is never retried, and the pass continues past it.
    async fn stage_e1_message_signals(&self, stats: &mut EnrichStats) -> Result<(), EnrichError> {
        loop {
            let mut batch = self.store.unenriched_messages(MESSAGE_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            for message in batch.iter_mut() {
                match signals::enrich_message(message, &self.crypto, self.sentiment.as_ref()) {
                    signals::SignalOutcome::Enriched => stats.messages_enriched += 1,
                    signals::SignalOutcome::DecryptFailed => {
                        stats.messages_poisoned += 1;
                        warn!(
                            chat_id = message.chat_id,
                            message_id = message.message_id,
                            "enrich_decrypt_failures"
                        );
                    }
                }
            }
            let batch_len = batch.len() as i64;
            self.store.upsert_messages(&batch).await?;
            if batch_len < MESSAGE_BATCH_SIZE {
                break;
            }
        }
        Ok(())
    }

    /// E2: rebuild every contact's totals/activity level and every
    /// `ChatParticipant` row from the enriched message corpus.
    async fn stage_e2_contact_aggregation(&self, stats: &mut EnrichStats) -> Result<(), EnrichError> {
        let user_ids = self.store.distinct_contact_ids_with_messages().await?;
        for user_id in user_ids {
            let Some(contact) = self.store.get_contact(user_id).await? else {
                continue;
            };
            let counts = self.store.chat_participant_counts(user_id).await?;
            let aggregate = aggregate::rebuild_contact(contact, &counts);
            self.store.upsert_contact(&aggregate.contact).await?;
            for participant in &aggregate.participants {
                self.store.upsert_chat_participant(participant).await?;
            }
            stats.contacts_aggregated += 1;
        }
        Ok(())
    }

    /// E3 + E4 + E5 + E6 for one contact: scans the taxonomy window,
    /// qualifies/tiers the lead, synthesizes a follow-up for high-priority
    /// leads, and emits an opportunity for qualified leads.
    async fn enrich_contact(&self, user_id: i64, stats: &mut EnrichStats) -> Result<(), EnrichError> {
        let Some(contact) = self.store.get_contact(user_id).await? else {
            return Ok(());
        };

        let recent = self.store.recent_messages_for_contact(user_id, TAXONOMY_WINDOW).await?;
        let mut hits = TaxonomyHits::default();
        for message in &recent {
            if signals::is_poison(message) {
                continue;
            }
            if let Ok(plaintext) = self.crypto.decrypt(&message.text_ciphertext) {
                let text = String::from_utf8_lossy(&plaintext);
                hits.merge(&TaxonomyHits::scan(&text));
            }
        }

        let msg_stats = self.store.contact_message_stats(user_id).await?;
        let now = Utc::now();
        let existing = self.store.get_lead(&crate::model::Lead::new_id(user_id)).await?;
        let created_at = existing.as_ref().map(|l| l.created_at).unwrap_or(now);

        let mut lead = match scoring::build_lead(user_id, &hits, &msg_stats, created_at, now) {
            Some(lead) => lead,
            None => {
                // I4: below threshold, demote an existing Lead rather than
                // deleting it; no Lead is created for a never-qualified contact.
                if let Some(mut lead) = existing {
                    let before = lead.clone();
                    scoring::demote_below_threshold(&mut lead);
                    if lead_content_changed(&before, &lead) {
                        lead.updated_at = now;
                        self.store.upsert_lead(&lead).await?;
                        self.enqueue_projection(&lead.lead_id, now).await?;
                    } else {
                        self.store.upsert_lead(&lead).await?;
                    }
                    stats.leads_upserted += 1;
                }
                self.upsert_conversation(user_id, &recent, &hits).await?;
                return Ok(());
            }
        };

        // E5: follow-up synthesis, only for critical/high priority leads.
        if matches!(lead.priority, Priority::Critical | Priority::High) {
            let follow_up = followup::synthesize(&contact, &mut lead, &hits, now);
            self.store.upsert_follow_up(&follow_up).await?;
            stats.follow_ups_created += 1;
        }

        let lead_changed = existing.as_ref().map_or(true, |old| lead_content_changed(old, &lead));
        if !lead_changed {
            // P4/P5: an unchanged lead keeps its prior `updated_at` and
            // does not re-enter the pending sync queue.
            lead.updated_at = existing.as_ref().map(|l| l.updated_at).unwrap_or(now);
        }
        self.store.upsert_lead(&lead).await?;
        if lead_changed {
            self.enqueue_projection(&lead.lead_id, now).await?;
        }
        stats.leads_upserted += 1;

        // E6: opportunity pipeline.
        if lead.intelligence_score > OPPORTUNITY_SCORE_THRESHOLD
            && matches!(lead.investment_capacity, crate::model::Capacity::High | crate::model::Capacity::Medium)
        {
            let opportunity = Opportunity {
                opportunity_id: format!("opp_{user_id}"),
                lead_id: lead.lead_id.clone(),
                opportunity_type: "business_development".to_string(),
                estimated_value: lead.estimated_value,
                probability: crate::model::clamp_probability(lead.intelligence_score / 100.0),
                timeline: "Q ahead".to_string(),
                stage: OpportunityStage::Qualification,
                next_steps: vec![
                    "Schedule an introductory call".to_string(),
                    "Share a tailored investment/partnership deck".to_string(),
                    "Confirm decision-maker and timeline".to_string(),
                ],
            };
            self.store.upsert_opportunity(&opportunity).await?;
            stats.opportunities_created += 1;
        }

        self.upsert_conversation(user_id, &recent, &hits).await?;
        debug!(user_id, score = lead.intelligence_score, quality = lead.lead_quality.as_str(), "lead enriched");
        Ok(())
    }

    /// Every Lead upsert is a unit of outbound projection work for the Sync
    /// Projector: the Enricher writes a `SyncTask` row against the
    /// `contacts`/`leads` tables (both rendered from the same
    /// `lead_id`-keyed row), letting the Sync Projector's incremental
    /// drain pick it up on its own schedule rather than calling the
    /// Projector directly.
    async fn enqueue_projection(&self, lead_id: &str, now: chrono::DateTime<Utc>) -> Result<(), EnrichError> {
        for table in ["contacts", "leads"] {
            self.store
                .enqueue_sync(&SyncTask {
                    sync_id: uuid::Uuid::new_v4().to_string(),
                    table_name: table.to_string(),
                    record_id: lead_id.to_string(),
                    operation: SyncOperation::Upsert,
                    state: SyncState::Pending,
                    attempts: 0,
                    last_error: None,
                    enqueued_at: now,
                    completed_at: None,
                })
                .await?;
        }
        Ok(())
    }

    /// Derived `Conversation` projection: a contact's per-chat presence
    /// with the supplemental `shared_interests`/`conversation_topics`
    /// slices the follow-up renderer and collaborators consume.
    async fn upsert_conversation(
        &self,
        user_id: i64,
        recent: &[crate::model::Message],
        hits: &TaxonomyHits,
    ) -> Result<(), EnrichError> {
        use std::collections::HashMap;

        let mut by_chat: HashMap<i64, (i64, i64, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> = HashMap::new();
        for message in recent {
            let entry = by_chat.entry(message.chat_id).or_insert((0, 0, message.date, message.date));
            entry.0 += 1;
            if message.contains_business_keywords == Some(true) {
                entry.1 += 1;
            }
            entry.2 = entry.2.min(message.date);
            entry.3 = entry.3.max(message.date);
        }

        let mut shared_interests: Vec<String> = taxonomy::Category::ALL
            .iter()
            .flat_map(|c| hits.phrases_for(*c).iter().cloned())
            .collect();
        shared_interests.dedup();
        shared_interests.truncate(5);

        let mut conversation_topics: Vec<String> = shared_interests.clone();
        conversation_topics.truncate(3);

        for (chat_id, (count, business_count, first, last)) in by_chat {
            let business_relevance = if count > 0 { business_count as f64 / count as f64 } else { 0.0 };
            self.store
                .upsert_conversation(&Conversation {
                    chat_id,
                    user_id,
                    message_count: count,
                    business_relevance,
                    first_date: first,
                    last_date: last,
                    shared_interests: shared_interests.clone(),
                    conversation_topics: conversation_topics.clone(),
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityLevel, Chat, ChatType, Contact, Message, MessageType};
    use tempfile::tempdir;

    async fn seeded_store() -> (Arc<Store>, Arc<Crypto>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let crypto = Arc::new(Crypto::from_key_bytes(&[5u8; 32]).unwrap());
        let now = Utc::now();

        store
            .upsert_chat(&Chat {
                chat_id: 1,
                chat_type: ChatType::Private,
                title: Some("Alice".into()),
                username: Some("alice".into()),
                participant_count: None,
                first_message_date: now,
                last_message_date: now,
                total_messages: 0,
            })
            .await
            .unwrap();

        store
            .upsert_contact(&Contact {
                user_id: 7,
                username: Some("alice".into()),
                first_name: Some("Alice".into()),
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
            })
            .await
            .unwrap();

        let texts = ["hi", "need investment urgently", "call me tomorrow"];
        let mut batch = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            batch.push(Message {
                chat_id: 1,
                message_id: i as i64 + 1,
                from_user_id: Some(7),
                date: now,
                text_ciphertext: crypto.encrypt(text.as_bytes()).unwrap(),
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
            });
        }
        store.upsert_messages(&batch).await.unwrap();
        (store, crypto)
    }

    #[tokio::test]
    async fn scenario_one_three_messages_stay_below_lead_threshold() {
        let (store, crypto) = seeded_store().await;
        let enricher = Enricher::new(store.clone(), crypto);
        let stats = enricher.run_pass().await.unwrap();

        assert_eq!(stats.messages_enriched, 3);
        assert_eq!(stats.messages_poisoned, 0);
        assert!(store.get_lead("lead_7").await.unwrap().is_none());

        let messages = store.recent_messages_for_contact(7, 10).await.unwrap();
        let business_msg = messages.iter().find(|m| m.message_id == 2).unwrap();
        assert_eq!(business_msg.contains_business_keywords, Some(true));
    }

    #[tokio::test]
    async fn scenario_six_poisoned_row_does_not_abort_the_pass() {
        let (store, crypto) = seeded_store().await;

        let mut poisoned = store.unenriched_messages(10).await.unwrap();
        let mut corrupt = poisoned.remove(0);
        let last = corrupt.text_ciphertext.len() - 1;
        corrupt.text_ciphertext[last] ^= 0xFF;
        store.upsert_messages(&[corrupt]).await.unwrap();

        let enricher = Enricher::new(store.clone(), crypto);
        let stats = enricher.run_pass().await.unwrap();

        assert_eq!(stats.messages_poisoned, 1);
        assert_eq!(stats.messages_enriched, 2);
    }

    #[tokio::test]
    async fn re_running_a_pass_on_unchanged_data_is_idempotent() {
        let (store, crypto) = seeded_store().await;
        let enricher = Enricher::new(store.clone(), crypto);
        enricher.run_pass().await.unwrap();
        let first = store.stats().await.unwrap();
        enricher.run_pass().await.unwrap();
        let second = store.stats().await.unwrap();
        assert_eq!(first.messages, second.messages);
        assert_eq!(first.contacts, second.contacts);
    }
}
