//! Stage E5 — follow-up synthesis. A three-way flag —
//! `has_investment_keywords`, `has_partnership_signal`,
//! `has_technical_signal` — resolves to one of three named templates,
//! default `high_value_investor`.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Contact, FollowUp, FollowUpStatus, FollowUpTiming, Lead, Priority};

use super::taxonomy::{Category, TaxonomyHits};

struct Template {
    opener: &'static str,
    value_prop: &'static str,
    call_to_action: &'static str,
    meeting_agenda: &'static str,
}

fn template_for(has_investment: bool, has_partnership: bool, has_technical: bool) -> &'static Template {
    const HIGH_VALUE_INVESTOR: Template = Template {
        opener: "I wanted to follow up given your interest in high-value investment opportunities",
        value_prop: "a curated deal flow tailored to your investment thesis",
        call_to_action: "Would you be open to a short call this week to discuss specifics?",
        meeting_agenda: "Review current deal flow, investment thesis fit, and next steps",
    };
    const STRATEGIC_PARTNER: Template = Template {
        opener: "Following up on the partnership opportunity we discussed",
        value_prop: "a collaboration that complements your existing business development efforts",
        call_to_action: "Can we set up time to explore how a partnership could work?",
        meeting_agenda: "Discuss partnership structure, mutual value, and a pilot scope",
    };
    const TECHNICAL_LEADER: Template = Template {
        opener: "Circling back on the technical direction we touched on",
        value_prop: "an integration path that fits your existing architecture",
        call_to_action: "Open to a technical deep-dive this week?",
        meeting_agenda: "Walk through architecture fit, integration plan, and timeline",
    };

    if has_investment {
        &HIGH_VALUE_INVESTOR
    } else if has_partnership {
        &STRATEGIC_PARTNER
    } else if has_technical {
        &TECHNICAL_LEADER
    } else {
        &HIGH_VALUE_INVESTOR
    }
}

fn conference_connection(hits: &TaxonomyHits) -> &'static str {
    if hits.has_any(Category::CryptoDefi) {
        "Crypto/DeFi Summit"
    } else if hits.has_any(Category::Technology) {
        "Tech Innovation Conference"
    } else if hits.any_investment_keyword() {
        "Investment & VC Summit"
    } else {
        "Business Networking Event"
    }
}

fn follow_up_timing_for(intelligence_score: f64) -> FollowUpTiming {
    if intelligence_score > 70.0 {
        FollowUpTiming::ThisWeek
    } else if intelligence_score > 50.0 {
        FollowUpTiming::NextWeek
    } else {
        FollowUpTiming::ComingWeeks
    }
}

fn due_date_for(priority: Priority, now: DateTime<Utc>) -> DateTime<Utc> {
    now + match priority {
        Priority::Critical => Duration::days(1),
        Priority::High => Duration::days(7),
        Priority::Medium => Duration::days(30),
        Priority::Low => Duration::days(30),
    }
}

/// Mutates `lead`'s follow-up fields in place and returns the `FollowUp` row
/// to emit. Only called for leads with `priority` in `{critical, high}` —
/// callers are expected to have filtered already.
pub fn synthesize(contact: &Contact, lead: &mut Lead, hits: &TaxonomyHits, now: DateTime<Utc>) -> FollowUp {
    let has_investment = hits.any_investment_keyword();
    let has_partnership = hits.has_any(Category::BusinessDevelopment);
    let has_technical = hits.has_any(Category::Technology);
    let template = template_for(has_investment, has_partnership, has_technical);

    let name = contact.first_name.clone().unwrap_or_else(|| "there".to_string());
    let shared_topic = hits.first_hit().unwrap_or_else(|| "your recent message".to_string());
    let connection = conference_connection(hits);

    let personalized_message = format!(
        "Hi {name}, {opener} — particularly around {topic}. We offer {value_prop}. \
         Hope to connect at an upcoming {connection}.",
        opener = template.opener,
        topic = shared_topic,
        value_prop = template.value_prop,
    );

    lead.personalized_message = Some(personalized_message);
    lead.meeting_agenda = Some(template.meeting_agenda.to_string());
    lead.call_to_action = Some(template.call_to_action.to_string());
    lead.follow_up_timing = Some(follow_up_timing_for(lead.intelligence_score));

    FollowUp {
        follow_up_id: format!("followup_{}", lead.user_id),
        lead_id: lead.lead_id.clone(),
        action_type: "personalized_outreach".to_string(),
        description: template.call_to_action.to_string(),
        priority: lead.priority,
        due_date: due_date_for(lead.priority, now),
        status: FollowUpStatus::Pending,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityLevel, Capacity, DealSizeCategory, EngagementQuality, LeadQuality, ReferralPotential, RelationshipStrength};

    fn contact() -> Contact {
        Contact {
            user_id: 1,
            username: Some("alice".into()),
            first_name: Some("Alice".into()),
            last_name: None,
            phone: None,
            is_bot: false,
            is_verified: false,
            is_premium: false,
            total_messages: 10,
            total_chats: 1,
            activity_level: ActivityLevel::Moderate,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    fn lead(intelligence_score: f64, priority: Priority) -> Lead {
        Lead {
            lead_id: "lead_1".into(),
            user_id: 1,
            bd_score: intelligence_score * 0.8,
            intelligence_score,
            conversion_likelihood: intelligence_score * 0.7,
            lead_quality: LeadQuality::Hot,
            priority,
            estimated_value: 1000.0,
            investment_capacity: Capacity::High,
            deal_size_category: DealSizeCategory::Enterprise,
            relationship_strength: RelationshipStrength::Strong,
            business_keywords: vec![],
            investment_keywords: vec![],
            technology_expertise: vec![],
            decision_maker_signals: vec![],
            network_influence: vec![],
            trust_indicators: vec![],
            financial_indicators: vec![],
            personalized_message: None,
            meeting_agenda: None,
            call_to_action: None,
            follow_up_timing: None,
            engagement_quality: EngagementQuality::Light,
            referral_potential: ReferralPotential::None,
            response_rate: 20.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn investment_keywords_select_the_investor_template_and_this_week_timing() {
        let hits = TaxonomyHits::scan("looking for an investment opportunity");
        let mut l = lead(85.0, Priority::Critical);
        let follow_up = synthesize(&contact(), &mut l, &hits, Utc::now());
        assert!(l.personalized_message.unwrap().contains("investment"));
        assert_eq!(l.follow_up_timing, Some(FollowUpTiming::ThisWeek));
        assert_eq!(follow_up.due_date - Utc::now() < Duration::hours(25), true);
    }

    #[test]
    fn partnership_only_selects_strategic_partner_template() {
        let hits = TaxonomyHits::scan("let's discuss a partnership");
        let mut l = lead(65.0, Priority::High);
        synthesize(&contact(), &mut l, &hits, Utc::now());
        assert!(l.meeting_agenda.unwrap().contains("partnership"));
        assert_eq!(l.follow_up_timing, Some(FollowUpTiming::NextWeek));
    }
}
