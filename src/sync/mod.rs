//! The Sync Projector (C6): maps Store rows onto an external tabular sink
//! through a `Destination` port, in full and incremental modes. `csv` is
//! the one fully implemented destination; `sheets` is a documented
//! integration point with no vendored Google client; `none` is a no-op
//! used in tests and when `DESTINATION_KIND=none`.

pub mod csv_destination;
pub mod none_destination;
pub mod rows;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::model::{SyncOperation, SyncState, SyncTask};
use crate::store::{Store, StoreError};

pub use csv_destination::CsvDestination;
pub use none_destination::NoneDestination;

/// The fixed set of projected tables.
pub const PROJECTED_TABLES: &[&str] =
    &["contacts", "organizations", "interactions", "leads", "messages", "chat_groups", "dashboard"];

#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("destination rejected the write: {0}")]
    Rejected(String),
}

impl DestinationError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, DestinationError::Authorization(_))
    }
}

/// One row, rendered per the fixed formatting rules: complex columns as
/// JSON text, timestamps as `YYYY-MM-DD HH:MM:SS`, booleans as `true`/
/// `false` text. `record_id` is the first column by convention and is what
/// `SyncTask.record_id` correlates against.
pub type Row = Vec<String>;

/// Abstracts over the fixed `DESTINATION_KIND` choices so the Projector's
/// full/incremental logic never branches on a destination enum.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Atomically replaces the destination worksheet's content (full sync).
    async fn replace_worksheet(
        &self,
        table: &str,
        header: &[&str],
        rows: Vec<Row>,
    ) -> Result<(), DestinationError>;

    /// Upserts a single row keyed on its first column (incremental sync).
    async fn upsert_row(&self, table: &str, header: &[&str], row: Row) -> Result<(), DestinationError>;

    /// Returns the destination's last-modified timestamp for `record_id`,
    /// if the destination tracks one. `Ok(None)` means "never edited
    /// externally" (or the destination doesn't track edits, e.g. `csv`).
    async fn last_modified(&self, table: &str, record_id: &str) -> Result<Option<DateTime<Utc>>, DestinationError>;
}

/// Lets the composition root pick a concrete destination at runtime (from
/// `DESTINATION_KIND`) while `SyncProjector`/`Scheduler` stay generic over a
/// single `Destination` type parameter.
#[async_trait]
impl Destination for Box<dyn Destination> {
    async fn replace_worksheet(&self, table: &str, header: &[&str], rows: Vec<Row>) -> Result<(), DestinationError> {
        (**self).replace_worksheet(table, header, rows).await
    }

    async fn upsert_row(&self, table: &str, header: &[&str], row: Row) -> Result<(), DestinationError> {
        (**self).upsert_row(table, header, row).await
    }

    async fn last_modified(&self, table: &str, record_id: &str) -> Result<Option<DateTime<Utc>>, DestinationError> {
        (**self).last_modified(table, record_id).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementalOutcome {
    pub completed: u64,
    pub failed: u64,
    pub conflicted: u64,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SyncProjector<D: Destination> {
    store: Arc<Store>,
    destination: D,
    config: SyncConfig,
}

impl<D: Destination> SyncProjector<D> {
    pub fn new(store: Arc<Store>, destination: D, config: SyncConfig) -> Self {
        Self { store, destination, config }
    }

    /// Full sync: enumerate every projected table, render every row, and
    /// atomically replace the destination's content for that table.
    pub async fn sync_full(&self) -> Result<(), SyncError> {
        for &table in PROJECTED_TABLES {
            let (header, body) = self.render_table(table).await?;
            if let Err(err) = self.destination.replace_worksheet(table, header, body).await {
                warn!(table, %err, "full sync failed for table");
            }
        }
        info!(tables = PROJECTED_TABLES.len(), "full sync complete");
        Ok(())
    }

    async fn render_table(&self, table: &str) -> Result<(&'static [&'static str], Vec<Row>), SyncError> {
        Ok(match table {
            "contacts" => (rows::CONTACT_HEADER, {
                let leads = self.store.all_leads(i64::MAX).await?;
                let mut by_user: std::collections::HashMap<i64, _> =
                    leads.into_iter().map(|l| (l.user_id, l)).collect();
                let mut out = Vec::new();
                for contact in self.store.all_contacts(i64::MAX).await? {
                    let lead = by_user.remove(&contact.user_id);
                    out.push(rows::contact_row(&contact, lead.as_ref()));
                }
                out
            }),
            "leads" => (rows::CONTACT_HEADER, {
                let contacts: std::collections::HashMap<i64, _> = self
                    .store
                    .all_contacts(i64::MAX)
                    .await?
                    .into_iter()
                    .map(|c| (c.user_id, c))
                    .collect();
                self.store
                    .all_leads(i64::MAX)
                    .await?
                    .into_iter()
                    .filter_map(|lead| contacts.get(&lead.user_id).map(|c| rows::contact_row(c, Some(&lead))))
                    .collect()
            }),
            "messages" => (rows::MESSAGE_HEADER, {
                self.store
                    .messages_for_export(0, i64::MAX)
                    .await?
                    .iter()
                    .map(rows::message_row)
                    .collect()
            }),
            "chat_groups" => (rows::CHAT_HEADER, {
                self.store.all_chats(i64::MAX).await?.iter().map(rows::chat_row).collect()
            }),
            "organizations" => (rows::CHAT_HEADER, {
                // Group/supergroup/channel dialogs double as the closest
                // analogue to an "organization" this data model carries —
                // there is no separate Organization entity.
                self.store
                    .all_chats(i64::MAX)
                    .await?
                    .iter()
                    .filter(|c| !matches!(c.chat_type, crate::model::ChatType::Private))
                    .map(rows::chat_row)
                    .collect()
            }),
            "interactions" => (rows::INTERACTION_HEADER, {
                self.store.all_conversations(i64::MAX).await?.iter().map(rows::interaction_row).collect()
            }),
            "dashboard" => (rows::DASHBOARD_HEADER, {
                let stats = self.store.stats().await?;
                let leads_value = self.store.leads_sum_estimated_value().await?;
                let opportunity_value = self.store.opportunities_sum_expected_value().await?;
                vec![rows::dashboard_row(&stats, leads_value, opportunity_value)]
            }),
            other => {
                warn!(table = other, "unknown projected table; rendering empty");
                (&[][..], Vec::new())
            }
        })
    }

    /// Incremental sync: drains `pending` `SyncTask` rows FIFO, grouped by
    /// table (cross-table ordering is not guaranteed, per-table FIFO is).
    pub async fn sync_incremental(&self) -> Result<IncrementalOutcome, SyncError> {
        let mut outcome = IncrementalOutcome::default();
        let pending = self.store.pending_syncs(1000).await?;

        let mut by_table: std::collections::BTreeMap<String, Vec<SyncTask>> = std::collections::BTreeMap::new();
        for task in pending {
            by_table.entry(task.table_name.clone()).or_default().push(task);
        }

        for (table, tasks) in by_table {
            for task in tasks {
                self.process_one(&table, task, &mut outcome).await?;
            }
        }
        Ok(outcome)
    }

    async fn process_one(&self, table: &str, mut task: SyncTask, outcome: &mut IncrementalOutcome) -> Result<(), SyncError> {
        if self.is_denied(&task).await? {
            self.store.mark_sync(&task.sync_id, SyncState::Completed, None).await?;
            return Ok(());
        }

        if let Ok(Some(remote_modified)) = self.destination.last_modified(table, &task.record_id).await {
            // Conflict detection: if the destination reports an edit after
            // this task was enqueued, never overwrite.
            if remote_modified > task.enqueued_at {
                self.store
                    .mark_sync(&task.sync_id, SyncState::Conflict, Some(&remote_modified.to_rfc3339()))
                    .await?;
                outcome.conflicted += 1;
                return Ok(());
            }
        }

        let (header, row) = match self.render_one(table, &task.record_id).await? {
            Some(pair) => pair,
            None => {
                // Source row is gone; treat as a delete-equivalent success.
                self.store.mark_sync(&task.sync_id, SyncState::Completed, None).await?;
                outcome.completed += 1;
                return Ok(());
            }
        };

        match self.destination.upsert_row(table, header, row).await {
            Ok(()) => {
                self.store.mark_sync(&task.sync_id, SyncState::Completed, None).await?;
                outcome.completed += 1;
            }
            Err(err) if err.is_authorization() => {
                // Authorization errors: immediate terminal failure; the
                // Scheduler is responsible for suppressing further sync
                // jobs until the operator acknowledges.
                self.store.mark_sync(&task.sync_id, SyncState::Failed, Some(&err.to_string())).await?;
                outcome.failed += 1;
            }
            Err(err) => {
                task.attempts += 1;
                if task.attempts >= 3 {
                    self.store.mark_sync(&task.sync_id, SyncState::Failed, Some(&err.to_string())).await?;
                    outcome.failed += 1;
                } else {
                    self.store.mark_sync(&task.sync_id, SyncState::Failed, Some(&err.to_string())).await?;
                    self.store
                        .enqueue_sync(&SyncTask {
                            sync_id: task.sync_id.clone(),
                            table_name: task.table_name.clone(),
                            record_id: task.record_id.clone(),
                            operation: task.operation,
                            state: SyncState::Pending,
                            attempts: task.attempts,
                            last_error: Some(err.to_string()),
                            enqueued_at: Utc::now(),
                            completed_at: None,
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Configurable deny list (`FOLLOWUP_DENY_USERNAMES`) rather than a
    /// hard-coded exclusion. There is no standalone `follow_ups` projected
    /// table — synthesized follow-up content rides on the `contacts`/
    /// `leads` rows — so the deny list gates both.
    async fn is_denied(&self, task: &SyncTask) -> Result<bool, SyncError> {
        if self.config.followup_deny_usernames.is_empty()
            || !matches!(task.table_name.as_str(), "contacts" | "leads")
        {
            return Ok(false);
        }
        if let Ok(user_id) = task.record_id.trim_start_matches("lead_").parse::<i64>() {
            if let Some(contact) = self.store.get_contact(user_id).await? {
                if let Some(username) = &contact.username {
                    return Ok(self.config.followup_deny_usernames.iter().any(|d| d == username));
                }
            }
        }
        Ok(false)
    }

    async fn render_one(&self, table: &str, record_id: &str) -> Result<Option<(&'static [&'static str], Row)>, SyncError> {
        Ok(match table {
            "contacts" | "leads" => {
                let user_id: i64 = match record_id.trim_start_matches("lead_").parse() {
                    Ok(id) => id,
                    Err(_) => return Ok(None),
                };
                let contact = self.store.get_contact(user_id).await?;
                let lead = self.store.get_lead(&crate::model::Lead::new_id(user_id)).await?;
                match contact {
                    Some(contact) => Some((rows::CONTACT_HEADER, rows::contact_row(&contact, lead.as_ref()))),
                    None => None,
                }
            }
            _ => None,
        })
    }
}

pub fn sync_task_for(table: &str, record_id: &str, operation: SyncOperation, now: DateTime<Utc>) -> SyncTask {
    SyncTask {
        sync_id: uuid::Uuid::new_v4().to_string(),
        table_name: table.to_string(),
        record_id: record_id.to_string(),
        operation,
        state: SyncState::Pending,
        attempts: 0,
        last_error: None,
        enqueued_at: now,
        completed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestinationKind;
    use crate::model::{ActivityLevel, Contact};
    use tempfile::tempdir;

    fn cfg() -> SyncConfig {
        SyncConfig {
            sync_time: "03:00".into(),
            sync_limit: 1000,
            destination_kind: DestinationKind::None,
            destination_id: None,
            service_account_file: None,
            followup_deny_usernames: vec![],
        }
    }

    #[tokio::test]
    async fn full_sync_against_a_none_destination_never_errors() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let now = Utc::now();
        store
            .upsert_contact(&Contact {
                user_id: 1,
                username: Some("alice".into()),
                first_name: Some("Alice".into()),
                last_name: None,
                phone: None,
                is_bot: false,
                is_verified: false,
                is_premium: false,
                total_messages: 1,
                total_chats: 1,
                activity_level: ActivityLevel::Occasional,
                first_seen: now,
                last_seen: now,
            })
            .await
            .unwrap();

        let projector = SyncProjector::new(store, NoneDestination, cfg());
        projector.sync_full().await.unwrap();
    }

    #[tokio::test]
    async fn incremental_sync_drains_pending_tasks_fifo() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let now = Utc::now();
        store
            .upsert_contact(&Contact {
                user_id: 1,
                username: Some("alice".into()),
                first_name: Some("Alice".into()),
                last_name: None,
                phone: None,
                is_bot: false,
                is_verified: false,
                is_premium: false,
                total_messages: 1,
                total_chats: 1,
                activity_level: ActivityLevel::Occasional,
                first_seen: now,
                last_seen: now,
            })
            .await
            .unwrap();
        store.enqueue_sync(&sync_task_for("contacts", "lead_1", SyncOperation::Upsert, now)).await.unwrap();

        let projector = SyncProjector::new(store.clone(), NoneDestination, cfg());
        let outcome = projector.sync_incremental().await.unwrap();
        assert_eq!(outcome.completed, 1);
        assert_eq!(store.pending_syncs(10).await.unwrap().len(), 0);
    }
}
