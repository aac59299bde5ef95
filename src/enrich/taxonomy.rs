//! The fixed business-keyword taxonomy (E3). Thirteen categories, each a
//! set of lowercase phrases matched whole-phrase and case-insensitive
//! against decrypted message text. Category weights are per-hit and
//! additive to `intelligence_score` (clamped at 100 by the caller).
//!
//! "Whole-phrase" is word-boundary anchored, not a raw substring test —
//! otherwise short tokens like `api` would false-positive inside `rapid`,
//! and `invest` would double-count every `investment` hit.

use std::sync::OnceLock;

use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    InvestmentTier1,
    InvestmentTier2,
    CryptoDefi,
    BusinessDevelopment,
    Technology,
    FinancialServices,
    DecisionMakers,
    UrgencyTiming,
    WealthIndicators,
    NetworkInfluence,
    PainPoints,
    SolutionOriented,
    ConferenceEvents,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::InvestmentTier1 => "investment_tier1",
            Category::InvestmentTier2 => "investment_tier2",
            Category::CryptoDefi => "crypto_defi",
            Category::BusinessDevelopment => "business_development",
            Category::Technology => "technology",
            Category::FinancialServices => "financial_services",
            Category::DecisionMakers => "decision_makers",
            Category::UrgencyTiming => "urgency_timing",
            Category::WealthIndicators => "wealth_indicators",
            Category::NetworkInfluence => "network_influence",
            Category::PainPoints => "pain_points",
            Category::SolutionOriented => "solution_oriented",
            Category::ConferenceEvents => "conference_events",
        }
    }

    /// Per-hit weight added to `intelligence_score` (E3).
    pub fn weight(&self) -> i64 {
        match self {
            Category::InvestmentTier1 => 3,
            Category::DecisionMakers => 4,
            Category::WealthIndicators => 5,
            Category::NetworkInfluence => 3,
            Category::Technology => 2,
            _ => 1,
        }
    }

    pub const ALL: [Category; 13] = [
        Category::InvestmentTier1,
        Category::InvestmentTier2,
        Category::CryptoDefi,
        Category::BusinessDevelopment,
        Category::Technology,
        Category::FinancialServices,
        Category::DecisionMakers,
        Category::UrgencyTiming,
        Category::WealthIndicators,
        Category::NetworkInfluence,
        Category::PainPoints,
        Category::SolutionOriented,
        Category::ConferenceEvents,
    ];

    pub fn phrases(&self) -> &'static [&'static str] {
        match self {
            Category::InvestmentTier1 => &[
                "investment", "invest", "investor", "funding round", "series a", "series b",
                "venture capital", "capital raise", "portfolio company", "limited partner",
            ],
            Category::InvestmentTier2 => &[
                "angel investor", "seed round", "pre-seed", "term sheet", "cap table",
                "due diligence", "equity stake", "convertible note",
            ],
            Category::CryptoDefi => &[
                "crypto", "defi", "blockchain", "web3", "token", "nft", "smart contract",
                "liquidity pool", "yield farming", "stablecoin",
            ],
            Category::BusinessDevelopment => &[
                "partnership", "business development", "strategic alliance", "collaboration",
                "joint venture", "go to market", "revenue share", "deal",
            ],
            Category::Technology => &[
                "api", "infrastructure", "engineering team", "tech stack", "scalability",
                "architecture", "machine learning", "automation", "platform", "integration",
            ],
            Category::FinancialServices => &[
                "financial services", "asset management", "hedge fund", "private equity",
                "wealth management", "family office", "fund manager",
            ],
            Category::DecisionMakers => &[
                "ceo", "cfo", "cto", "founder", "managing director", "board member",
                "decision maker", "final say", "i approve", "my call",
            ],
            Category::UrgencyTiming => &[
                "urgently", "urgent", "asap", "right away", "this week", "deadline",
                "time sensitive", "call me tomorrow",
            ],
            Category::WealthIndicators => &[
                "net worth", "high net worth", "family wealth", "private jet", "yacht",
                "eight figures", "nine figures", "generational wealth",
            ],
            Category::NetworkInfluence => &[
                "my network", "i know", "introduce you to", "well connected", "my contacts",
                "industry connections", "advisory board",
            ],
            Category::PainPoints => &[
                "struggling with", "biggest challenge", "bottleneck", "not working",
                "losing money", "frustrated with", "pain point",
            ],
            Category::SolutionOriented => &[
                "solution", "we can help", "here's how", "roadmap", "next steps",
                "implementation plan", "proposal",
            ],
            Category::ConferenceEvents => &[
                "conference", "summit", "demo day", "networking event", "pitch night",
                "meetup", "trade show",
            ],
        }
    }
}

struct CompiledCategory {
    category: Category,
    phrases: &'static [&'static str],
    set: RegexSet,
}

/// One `RegexSet` per category, built once. Each phrase becomes a
/// `\b<phrase>\b` pattern so "invest" doesn't fire on every "investment"
/// and "api" doesn't fire inside "rapid".
fn compiled_categories() -> &'static [CompiledCategory] {
    static CACHE: OnceLock<Vec<CompiledCategory>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Category::ALL
            .iter()
            .map(|&category| {
                let phrases = category.phrases();
                let patterns: Vec<String> =
                    phrases.iter().map(|p| format!(r"\b{}\b", regex::escape(p))).collect();
                let set = RegexSet::new(&patterns).expect("static taxonomy patterns compile");
                CompiledCategory { category, phrases, set }
            })
            .collect()
    })
}

/// Accumulated hit counts across one contact's scanned corpus, one
/// multiset entry per category. Built fresh per enrichment pass and never
/// shared across contacts (Design Note: no shared list identity).
#[derive(Debug, Clone, Default)]
pub struct TaxonomyHits {
    counts: std::collections::BTreeMap<Category, i64>,
    /// Matched phrases in first-seen order, per category — `shared_topic`
    /// and the keyword-list Lead fields read straight off this.
    phrases: std::collections::BTreeMap<Category, Vec<String>>,
}

impl TaxonomyHits {
    pub fn scan(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut hits = Self::default();
        for compiled in compiled_categories() {
            for idx in compiled.set.matches(&lower).iter() {
                let phrase = compiled.phrases[idx];
                *hits.counts.entry(compiled.category).or_insert(0) += 1;
                let seen = hits.phrases.entry(compiled.category).or_default();
                if !seen.iter().any(|p| p == phrase) {
                    seen.push(phrase.to_string());
                }
            }
        }
        hits
    }

    pub fn merge(&mut self, other: &TaxonomyHits) {
        for (cat, count) in &other.counts {
            *self.counts.entry(*cat).or_insert(0) += count;
        }
        for (cat, phrases) in &other.phrases {
            let existing = self.phrases.entry(*cat).or_default();
            for phrase in phrases {
                if !existing.iter().any(|p| p == phrase) {
                    existing.push(phrase.clone());
                }
            }
        }
    }

    pub fn count(&self, category: Category) -> i64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn has_any(&self, category: Category) -> bool {
        self.count(category) > 0
    }

    pub fn phrases_for(&self, category: Category) -> &[String] {
        self.phrases.get(&category).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Additive `intelligence_score` contribution from hit counts alone,
    /// integer arithmetic per the Design Note (floats only at final cast).
    pub fn weighted_score(&self) -> i64 {
        self.counts.iter().map(|(cat, count)| cat.weight() * count).sum()
    }

    /// Business keyword: a whole-phrase hit in any business-relevant
    /// category except the taxonomy's non-commercial categories
    /// (conference/events is borderline-social, kept in since the source
    /// treats conference mentions as business signal).
    pub fn is_business(&self) -> bool {
        Category::ALL.iter().any(|c| self.has_any(*c))
    }

    /// First taxonomy hit across all categories, in `Category::ALL` order —
    /// the `shared_topic` slot for follow-up rendering.
    pub fn first_hit(&self) -> Option<String> {
        Category::ALL.iter().find_map(|c| self.phrases_for(*c).first().cloned())
    }

    pub fn any_investment_keyword(&self) -> bool {
        self.has_any(Category::InvestmentTier1) || self.has_any(Category::InvestmentTier2)
    }

    /// Deduplicated lists for the Lead record's keyword columns.
    pub fn business_keywords(&self) -> Vec<String> {
        collect(self, &[
            Category::BusinessDevelopment,
            Category::FinancialServices,
            Category::PainPoints,
            Category::SolutionOriented,
            Category::UrgencyTiming,
            Category::ConferenceEvents,
        ])
    }

    pub fn investment_keywords(&self) -> Vec<String> {
        collect(self, &[Category::InvestmentTier1, Category::InvestmentTier2])
    }

    pub fn technology_expertise(&self) -> Vec<String> {
        collect(self, &[Category::Technology])
    }

    pub fn decision_maker_signals(&self) -> Vec<String> {
        collect(self, &[Category::DecisionMakers])
    }

    pub fn network_influence(&self) -> Vec<String> {
        collect(self, &[Category::NetworkInfluence])
    }

    pub fn trust_indicators(&self) -> Vec<String> {
        collect(self, &[Category::NetworkInfluence, Category::DecisionMakers])
    }

    pub fn financial_indicators(&self) -> Vec<String> {
        collect(self, &[Category::WealthIndicators, Category::FinancialServices])
    }
}

fn collect(hits: &TaxonomyHits, categories: &[Category]) -> Vec<String> {
    let mut out = Vec::new();
    for category in categories {
        for phrase in hits.phrases_for(*category) {
            if !out.contains(phrase) {
                out.push(phrase.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_one_message_hits_investment_and_urgency() {
        let hits = TaxonomyHits::scan("need investment urgently");
        assert!(hits.has_any(Category::InvestmentTier1));
        assert!(hits.has_any(Category::UrgencyTiming));
        assert_eq!(hits.weighted_score(), Category::InvestmentTier1.weight() + Category::UrgencyTiming.weight());
    }

    #[test]
    fn matching_is_case_insensitive_and_whole_phrase() {
        let hits = TaxonomyHits::scan("Our CEO wants to discuss a Partnership");
        assert!(hits.has_any(Category::DecisionMakers));
        assert!(hits.has_any(Category::BusinessDevelopment));
    }

    #[test]
    fn merge_accumulates_across_messages_without_double_counting_phrases() {
        let mut total = TaxonomyHits::scan("investment opportunity");
        total.merge(&TaxonomyHits::scan("another investment opportunity"));
        assert_eq!(total.count(Category::InvestmentTier1), 2);
        assert_eq!(total.phrases_for(Category::InvestmentTier1).len(), 1);
    }
}
