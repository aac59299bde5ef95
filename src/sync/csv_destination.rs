//! The `csv` destination: one file per projected table under
//! `DESTINATION_ID` (a directory path). Writes are atomic — rendered to a
//! temp file in the same directory, then renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Destination, DestinationError, Row};

pub struct CsvDestination {
    dir: PathBuf,
}

impl CsvDestination {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    fn read_rows(&self, path: &Path) -> Result<(Vec<String>, Vec<Row>), DestinationError> {
        if !path.exists() {
            return Ok((Vec::new(), Vec::new()));
        }
        let mut reader = csv::Reader::from_path(path).map_err(|e| DestinationError::Network(e.to_string()))?;
        let header = reader.headers().map_err(|e| DestinationError::Network(e.to_string()))?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DestinationError::Network(e.to_string()))?;
            rows.push(record.iter().map(String::from).collect());
        }
        Ok((header, rows))
    }

    fn write_atomic(&self, table: &str, header: &[&str], rows: &[Row]) -> Result<(), DestinationError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DestinationError::Network(e.to_string()))?;
        let final_path = self.table_path(table);
        let tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| DestinationError::Network(e.to_string()))?;

        {
            let mut writer = csv::Writer::from_writer(&tmp);
            writer.write_record(header).map_err(|e| DestinationError::Network(e.to_string()))?;
            for row in rows {
                writer.write_record(row).map_err(|e| DestinationError::Network(e.to_string()))?;
            }
            writer.flush().map_err(|e| DestinationError::Network(e.to_string()))?;
        }

        tmp.persist(&final_path).map_err(|e| DestinationError::Network(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Destination for CsvDestination {
    async fn replace_worksheet(&self, table: &str, header: &[&str], rows: Vec<Row>) -> Result<(), DestinationError> {
        self.write_atomic(table, header, &rows)
    }

    async fn upsert_row(&self, table: &str, header: &[&str], row: Row) -> Result<(), DestinationError> {
        let path = self.table_path(table);
        let (existing_header, mut rows) = self.read_rows(&path)?;
        let record_id = row.first().cloned().unwrap_or_default();

        if let Some(existing) = rows.iter_mut().find(|r| r.first() == Some(&record_id)) {
            *existing = row;
        } else {
            rows.push(row);
        }

        let header: Vec<&str> = if existing_header.is_empty() {
            header.to_vec()
        } else {
            existing_header.iter().map(String::as_str).collect()
        };
        self.write_atomic(table, &header, &rows)
    }

    /// The CSV destination has no independent notion of an external edit —
    /// it is only ever written by this process — so it never reports a
    /// conflict.
    async fn last_modified(&self, _table: &str, _record_id: &str) -> Result<Option<DateTime<Utc>>, DestinationError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replace_worksheet_then_read_back_round_trips() {
        let dir = tempdir().unwrap();
        let dest = CsvDestination::new(dir.path());
        dest.replace_worksheet("contacts", &["user_id", "name"], vec![vec!["1".into(), "Alice".into()]])
            .await
            .unwrap();

        let (header, rows) = dest.read_rows(&dest.table_path("contacts")).unwrap();
        assert_eq!(header, vec!["user_id", "name"]);
        assert_eq!(rows, vec![vec!["1".to_string(), "Alice".to_string()]]);
    }

    #[tokio::test]
    async fn upsert_row_updates_an_existing_record_by_first_column() {
        let dir = tempdir().unwrap();
        let dest = CsvDestination::new(dir.path());
        dest.upsert_row("contacts", &["user_id", "name"], vec!["1".into(), "Alice".into()]).await.unwrap();
        dest.upsert_row("contacts", &["user_id", "name"], vec!["1".into(), "Alice B".into()]).await.unwrap();

        let (_, rows) = dest.read_rows(&dest.table_path("contacts")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "Alice B");
    }
}
