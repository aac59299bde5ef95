//! Stage E1 — per-message signals. Decrypts one message's ciphertext and
//! derives every enrichment column (word count, time of day, sentiment,
//! keyword flags, content category). A decrypt failure never aborts the
//! batch: the row is marked with the poison sentinel (`word_count =
//! Some(-1)`) so it is permanently excluded from later aggregate/taxonomy
//! queries while remaining distinguishable from "not yet enriched"
//! (`word_count IS NULL`).

use chrono::{Datelike, Timelike};

use crate::crypto::Crypto;
use crate::model::{ContentCategory, LengthCategory, Message, MessageType, TimeOfDay};

use super::sentiment::SentimentStrategy;
use super::taxonomy::{Category, TaxonomyHits};

/// Sentinel `word_count` written to a row whose ciphertext will never
/// decrypt. Always `>= 0` filters exclude it; `is_enriched()` still reports
/// `true` so the Enricher does not retry it every pass.
pub const POISON_WORD_COUNT: i64 = -1;

pub enum SignalOutcome {
    Enriched,
    DecryptFailed,
}

const SOCIAL_WORDS: &[&str] =
    &["hi", "hello", "hey", "good morning", "good night", "lol", "haha", "how are you", "what's up"];

const INTERROGATIVE_LEADS: &[&str] =
    &["who", "what", "when", "where", "why", "how", "did", "does", "do", "is", "are", "can", "could", "would", "should"];

/// Mutates `message` in place with every E1 column. Returns whether the
/// row decrypted successfully.
pub fn enrich_message(
    message: &mut Message,
    crypto: &Crypto,
    sentiment_strategy: &dyn SentimentStrategy,
) -> SignalOutcome {
    let plaintext = match crypto.decrypt(&message.text_ciphertext) {
        Ok(bytes) => bytes,
        Err(_) => {
            mark_poison(message);
            return SignalOutcome::DecryptFailed;
        }
    };
    let text = String::from_utf8_lossy(&plaintext);

    let hits = TaxonomyHits::scan(&text);
    let word_count = text.split_whitespace().count() as i64;
    let is_business_non_tech = Category::ALL
        .iter()
        .filter(|c| **c != Category::Technology)
        .any(|c| hits.has_any(*c));

    message.word_count = Some(word_count);
    message.length_category = Some(LengthCategory::from_word_count(word_count));
    message.time_of_day = Some(TimeOfDay::from_hour(message.date.hour()));
    message.day_of_week = Some(message.date.weekday().num_days_from_monday() as i64);
    message.contains_media = Some(message.message_type != MessageType::Text);
    message.contains_links = Some(contains_link(&text));
    message.is_question = Some(is_question(&text));
    message.contains_business_keywords = Some(hits.is_business());
    message.sentiment = Some(sentiment_strategy.classify(&text));
    message.content_category = Some(if is_business_non_tech {
        ContentCategory::Business
    } else if hits.has_any(Category::Technology) {
        ContentCategory::Technical
    } else if SOCIAL_WORDS.iter().any(|w| text.to_lowercase().contains(w)) {
        ContentCategory::Social
    } else {
        ContentCategory::Casual
    });

    SignalOutcome::Enriched
}

fn mark_poison(message: &mut Message) {
    message.word_count = Some(POISON_WORD_COUNT);
    message.length_category = Some(LengthCategory::Short);
    message.time_of_day = Some(TimeOfDay::from_hour(message.date.hour()));
    message.day_of_week = Some(message.date.weekday().num_days_from_monday() as i64);
    message.contains_media = Some(message.message_type != MessageType::Text);
    message.contains_links = Some(false);
    message.is_question = Some(false);
    message.contains_business_keywords = Some(false);
    message.sentiment = None;
    message.content_category = None;
}

fn contains_link(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("http://") || lower.contains("https://") || lower.contains("www.")
}

fn is_question(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    let first_word = trimmed.split_whitespace().next().unwrap_or("").trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    INTERROGATIVE_LEADS.contains(&first_word.as_str())
}

pub fn is_poison(message: &Message) -> bool {
    message.word_count == Some(POISON_WORD_COUNT)
}
