//! The `none` destination: accepts and discards every write. Used in tests
//! and whenever `DESTINATION_KIND=none` — e.g. running the core purely for
//! its local intelligence store, with no outbound projection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Destination, DestinationError, Row};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoneDestination;

#[async_trait]
impl Destination for NoneDestination {
    async fn replace_worksheet(&self, _table: &str, _header: &[&str], _rows: Vec<Row>) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn upsert_row(&self, _table: &str, _header: &[&str], _row: Row) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn last_modified(&self, _table: &str, _record_id: &str) -> Result<Option<DateTime<Utc>>, DestinationError> {
        Ok(None)
    }
}
