//! Seeds a throwaway store with one contact and one lead, then runs a full
//! projector sync against a CSV destination under a temp directory and
//! prints where the worksheets landed. Useful for eyeballing the CSV
//! headers/row shape without wiring up real Telegram credentials.

use std::sync::Arc;

use chrono::Utc;
use tempfile::tempdir;
use tracing::info;

use bd_intel_core::config::SyncConfig;
use bd_intel_core::model::{
    ActivityLevel, Capacity, Contact, DealSizeCategory, EngagementQuality, Lead, LeadQuality,
    Priority, ReferralPotential, RelationshipStrength,
};
use bd_intel_core::store::Store;
use bd_intel_core::sync::{CsvDestination, SyncProjector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let data_dir = tempdir()?;
    let export_dir = tempdir()?;
    let store = Arc::new(Store::open(data_dir.path(), 4).await?);

    let now = Utc::now();
    store
        .upsert_contact(&Contact {
            user_id: 42,
            username: Some("ada".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            phone: None,
            is_bot: false,
            is_verified: false,
            is_premium: true,
            total_messages: 12,
            total_chats: 2,
            activity_level: ActivityLevel::VeryActive,
            first_seen: now,
            last_seen: now,
        })
        .await?;

    store
        .upsert_lead(&Lead {
            lead_id: Lead::new_id(42),
            user_id: 42,
            bd_score: 82.0,
            intelligence_score: 76.0,
            conversion_likelihood: 0.61,
            lead_quality: LeadQuality::Hot,
            priority: Priority::High,
            estimated_value: 50_000.0,
            investment_capacity: Capacity::High,
            deal_size_category: DealSizeCategory::Enterprise,
            relationship_strength: RelationshipStrength::Strong,
            business_keywords: vec!["series a".to_string()],
            investment_keywords: vec!["capital deployment".to_string()],
            technology_expertise: vec![],
            decision_maker_signals: vec!["ceo".to_string()],
            network_influence: vec![],
            trust_indicators: vec![],
            financial_indicators: vec![],
            personalized_message: Some("Great catching up on the fund's defi thesis.".to_string()),
            meeting_agenda: None,
            call_to_action: None,
            follow_up_timing: None,
            engagement_quality: EngagementQuality::Deep,
            referral_potential: ReferralPotential::High,
            response_rate: 0.8,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let destination = CsvDestination::new(export_dir.path().to_path_buf());
    let projector = SyncProjector::new(store.clone(), destination, SyncConfig {
        sync_time: "03:00".to_string(),
        sync_limit: 500,
        destination_kind: bd_intel_core::config::DestinationKind::Csv,
        destination_id: None,
        service_account_file: None,
        followup_deny_usernames: vec![],
    });

    projector.sync_full().await?;
    info!(dir = %export_dir.path().display(), "full sync complete, worksheets written");

    for entry in std::fs::read_dir(export_dir.path())? {
        let entry = entry?;
        println!("{}", entry.path().display());
    }

    Ok(())
}
