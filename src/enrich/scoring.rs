//! Stages E3 (business-keyword taxonomy accumulation) and E4 (lead
//! qualification & tiering). Hit-count × weight accumulation and every
//! bonus are integer arithmetic; the running total is cast to `f64` only
//! at the final clamp, so identical inputs always produce a bit-identical
//! score on re-run.

use chrono::{DateTime, Utc};

use crate::model::{
    self, Capacity, DealSizeCategory, EngagementQuality, Lead, LeadQuality, Priority,
    ReferralPotential, RelationshipStrength,
};
use crate::store::ContactMessageStats;

use super::taxonomy::{Category, TaxonomyHits};

/// Minimum `intelligence_score` for a `Lead` to exist at all.
pub const LEAD_THRESHOLD: f64 = 25.0;

/// E3: raw `intelligence_score`, hit-weights plus every volume/ratio bonus,
/// clamped to `[0, 100]` only at the end.
pub fn intelligence_score(hits: &TaxonomyHits, stats: &ContactMessageStats) -> f64 {
    let mut raw: i64 = hits.weighted_score();

    raw += if stats.total_messages > 200 {
        25
    } else if stats.total_messages > 50 {
        15
    } else if stats.total_messages > 10 {
        5
    } else {
        0
    };

    if stats.total_messages > 0 {
        let positive_ratio = stats.positive_count as f64 / stats.total_messages as f64;
        if positive_ratio > 0.6 {
            raw += 10;
        }
        let business_ratio = stats.business_count as f64 / stats.total_messages as f64;
        if business_ratio > 0.3 {
            raw += 15;
        } else if business_ratio > 0.1 {
            raw += 8;
        }
    }

    if stats.mean_word_count > 20.0 {
        raw += 10;
    }

    raw += if stats.recent_30d_count > 10 {
        15
    } else if stats.recent_30d_count > 0 {
        8
    } else {
        0
    };

    raw += (stats.total_chats * 2).min(20);

    model::clamp_score(raw as f64)
}

struct Tier {
    lead_quality: LeadQuality,
    priority: Priority,
    investment_capacity: Capacity,
    deal_size_category: DealSizeCategory,
}

/// Score-band tiering table, evaluated top-down; the `40–59` band keeps
/// `deal_size_category` the same as the band above it (`mid-market`)
/// rather than leaving it unset.
fn tier_for(intelligence_score: f64) -> Option<Tier> {
    if intelligence_score >= 80.0 {
        Some(Tier {
            lead_quality: LeadQuality::Hot,
            priority: Priority::Critical,
            investment_capacity: Capacity::High,
            deal_size_category: DealSizeCategory::Enterprise,
        })
    } else if intelligence_score >= 60.0 {
        Some(Tier {
            lead_quality: LeadQuality::Warm,
            priority: Priority::High,
            investment_capacity: Capacity::Medium,
            deal_size_category: DealSizeCategory::MidMarket,
        })
    } else if intelligence_score >= 40.0 {
        Some(Tier {
            lead_quality: LeadQuality::Warm,
            priority: Priority::Medium,
            investment_capacity: Capacity::Medium,
            deal_size_category: DealSizeCategory::MidMarket,
        })
    } else if intelligence_score >= LEAD_THRESHOLD {
        Some(Tier {
            lead_quality: LeadQuality::Cold,
            priority: Priority::Low,
            investment_capacity: Capacity::Low,
            deal_size_category: DealSizeCategory::Startup,
        })
    } else {
        None
    }
}

/// `estimated_value = intelligence_score * 100`, multiplied cumulatively by
/// every applicable keyword-presence multiplier, capped at 100,000.
fn estimated_value(intelligence_score: f64, hits: &TaxonomyHits) -> f64 {
    let mut value = intelligence_score * 100.0;
    if hits.any_investment_keyword() {
        value *= 3.0;
    }
    if hits.has_any(Category::WealthIndicators) {
        value *= 2.5;
    }
    if hits.has_any(Category::DecisionMakers) {
        value *= 2.0;
    }
    if hits.has_any(Category::NetworkInfluence) {
        value *= 1.8;
    }
    value.min(100_000.0)
}

/// Not specified numerically by the source (an E4 open question resolved
/// here, documented in DESIGN.md): ties relationship depth to the same
/// multi-chat-presence and volume signals E3 already uses for its bonus,
/// rather than inventing an unrelated metric.
fn relationship_strength(stats: &ContactMessageStats) -> RelationshipStrength {
    if stats.total_chats >= 2 && stats.total_messages > 50 {
        RelationshipStrength::Strong
    } else if stats.total_messages > 10 {
        RelationshipStrength::Moderate
    } else {
        RelationshipStrength::Weak
    }
}

/// Mirrors the `total_messages` volume-bonus tier.
fn engagement_quality(stats: &ContactMessageStats) -> EngagementQuality {
    if stats.total_messages > 200 {
        EngagementQuality::Deep
    } else if stats.total_messages > 50 {
        EngagementQuality::Moderate
    } else {
        EngagementQuality::Light
    }
}

fn referral_potential(hits: &TaxonomyHits, relationship: RelationshipStrength) -> ReferralPotential {
    let has_network = hits.has_any(Category::NetworkInfluence);
    let has_any_indicator = has_network || hits.has_any(Category::DecisionMakers);
    if has_network {
        if matches!(relationship, RelationshipStrength::Strong | RelationshipStrength::Moderate) {
            ReferralPotential::High
        } else {
            ReferralPotential::Medium
        }
    } else if has_any_indicator {
        ReferralPotential::Low
    } else {
        ReferralPotential::None
    }
}

/// E4: builds (or re-derives) the full `Lead` for one contact. Returns
/// `None` below the qualification threshold so the caller can decide
/// whether to leave an existing Lead row untouched-but-demoted (never
/// deleted) or skip creating a new one.
pub fn build_lead(
    user_id: i64,
    hits: &TaxonomyHits,
    stats: &ContactMessageStats,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<Lead> {
    let score = intelligence_score(hits, stats);
    let tier = tier_for(score)?;
    let relationship = relationship_strength(stats);

    Some(Lead {
        lead_id: Lead::new_id(user_id),
        user_id,
        bd_score: model::clamp_score(score * 0.8),
        intelligence_score: score,
        conversion_likelihood: model::clamp_score(score * 0.7),
        lead_quality: tier.lead_quality,
        priority: tier.priority,
        estimated_value: estimated_value(score, hits),
        investment_capacity: tier.investment_capacity,
        deal_size_category: tier.deal_size_category,
        relationship_strength: relationship,

        business_keywords: hits.business_keywords(),
        investment_keywords: hits.investment_keywords(),
        technology_expertise: hits.technology_expertise(),
        decision_maker_signals: hits.decision_maker_signals(),
        network_influence: hits.network_influence(),
        trust_indicators: hits.trust_indicators(),
        financial_indicators: hits.financial_indicators(),

        personalized_message: None,
        meeting_agenda: None,
        call_to_action: None,
        follow_up_timing: None,

        engagement_quality: engagement_quality(stats),
        referral_potential: referral_potential(hits, relationship),
        response_rate: (stats.total_messages as f64 * 2.0).min(100.0),

        created_at,
        updated_at: now,
    })
}

/// I4: below the threshold an existing Lead is demoted, never deleted.
pub fn demote_below_threshold(lead: &mut Lead) {
    lead.lead_quality = LeadQuality::Cold;
    lead.priority = Priority::Low;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stats(total_messages: i64) -> ContactMessageStats {
        ContactMessageStats {
            total_messages,
            total_chats: 1,
            positive_count: 0,
            business_count: 0,
            recent_30d_count: 0,
            mean_word_count: 0.0,
        }
    }

    #[test]
    fn scenario_one_small_volume_stays_below_threshold() {
        let hits = {
            let mut h = TaxonomyHits::scan("need investment urgently");
            h.merge(&TaxonomyHits::scan("hi"));
            h.merge(&TaxonomyHits::scan("call me tomorrow"));
            h
        };
        let score = intelligence_score(&hits, &stats(3));
        assert!(score < LEAD_THRESHOLD, "score {score} should stay below the Lead threshold");
        assert!(build_lead(1, &hits, &stats(3), Utc::now(), Utc::now()).is_none());
    }

    #[test]
    fn scenario_two_bonuses_cross_threshold_into_warm() {
        let hits = TaxonomyHits::scan("partnership");
        let heavy_stats = ContactMessageStats {
            total_messages: 203,
            total_chats: 1,
            positive_count: 0,
            business_count: 70,
            recent_30d_count: 15,
            mean_word_count: 5.0,
        };
        let lead = build_lead(1, &hits, &heavy_stats, Utc::now(), Utc::now()).expect("should qualify");
        assert!(lead.intelligence_score >= 55.0);
        assert_eq!(lead.lead_quality, LeadQuality::Warm);
        assert_eq!(lead.priority, Priority::Medium);
    }

    #[test]
    fn boundary_b3_score_80_is_hot_not_warm() {
        let tier = tier_for(80.0).unwrap();
        assert_eq!(tier.lead_quality, LeadQuality::Hot);
    }

    #[test]
    fn estimated_value_multipliers_are_cumulative_and_capped() {
        let hits = TaxonomyHits::scan("investment net worth ceo my network");
        let value = estimated_value(100.0, &hits);
        assert_eq!(value, 100_000.0, "multipliers should saturate the cap");
    }

    #[test]
    fn demoting_below_threshold_never_deletes_the_lead() {
        let mut lead = build_lead(
            1,
            &TaxonomyHits::scan("investment ceo net worth"),
            &ContactMessageStats {
                total_messages: 220,
                total_chats: 2,
                positive_count: 0,
                business_count: 100,
                recent_30d_count: 20,
                mean_word_count: 30.0,
            },
            Utc::now(),
            Utc::now(),
        )
        .unwrap();
        demote_below_threshold(&mut lead);
        assert_eq!(lead.lead_quality, LeadQuality::Cold);
        assert_eq!(lead.priority, Priority::Low);
    }
}
