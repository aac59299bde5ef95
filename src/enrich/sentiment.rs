//! Sentiment as a named, substitutable strategy: the scoring contract in
//! `scoring.rs` consumes `dyn SentimentStrategy` rather than a free
//! function, so a future model-backed implementation can replace the
//! lexicon without touching E1–E6.

use crate::model::Sentiment;

pub trait SentimentStrategy: Send + Sync {
    fn classify(&self, text: &str) -> Sentiment;
}

/// Fixed-lexicon heuristic matching the source's scoring continuity
/// requirement: count positive/negative whole-word hits, net sign wins,
/// a tie (including zero hits) is neutral.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconSentiment;

const POSITIVE_WORDS: &[&str] = &[
    "great", "excellent", "amazing", "love", "happy", "good", "thanks", "thank you", "awesome",
    "wonderful", "perfect", "excited", "fantastic", "appreciate", "pleased",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "hate", "angry", "frustrated", "awful", "worried", "problem", "issue",
    "disappointed", "concerned", "unfortunately", "sorry", "difficult", "struggling",
];

impl SentimentStrategy for LexiconSentiment {
    fn classify(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
        let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_words_outweigh_negative() {
        assert_eq!(LexiconSentiment.classify("This is great, thanks so much!"), Sentiment::Positive);
    }

    #[test]
    fn negative_words_outweigh_positive() {
        assert_eq!(LexiconSentiment.classify("I'm frustrated, this is a terrible problem"), Sentiment::Negative);
    }

    #[test]
    fn no_lexicon_hits_is_neutral() {
        assert_eq!(LexiconSentiment.classify("call me tomorrow"), Sentiment::Neutral);
    }
}
