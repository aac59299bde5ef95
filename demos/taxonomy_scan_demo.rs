//! Walks a handful of representative message bodies through the
//! business-keyword taxonomy and prints the category hits, weighted score,
//! and derived signals for each — a quick way to sanity-check the phrase
//! lists without standing up the full pipeline.

use bd_intel_core::enrich::taxonomy::{Category, TaxonomyHits};

fn main() {
    tracing_subscriber::fmt::init();

    let samples = [
        "Our fund is looking to deploy series A capital into defi protocols this quarter",
        "Can we grab coffee sometime? Just catching up, nothing urgent",
        "As CEO I need a decision by end of week, this is time sensitive",
        "Thanks for the warm intro, my network includes a few LPs who might be interested",
        "See you at the conference next month, let's set up a meeting there",
    ];

    for text in samples {
        let hits = TaxonomyHits::scan(text);
        println!("---");
        println!("text: {text}");
        println!("weighted_score: {}", hits.weighted_score());
        println!("is_business: {}", hits.is_business());
        for category in [
            Category::InvestmentTier1,
            Category::InvestmentTier2,
            Category::CryptoDefi,
            Category::BusinessDevelopment,
            Category::DecisionMakers,
            Category::UrgencyTiming,
            Category::NetworkInfluence,
            Category::ConferenceEvents,
        ] {
            if hits.has_any(category) {
                println!("  {:?}: {:?}", category, hits.phrases_for(category));
            }
        }
        if let Some(first) = hits.first_hit() {
            println!("first_hit: {first}");
        }
    }
}
