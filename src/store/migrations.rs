//! Forward-only schema migrations, applied at startup inside one
//! transaction, gated by a `schema_version` row. An older binary refusing
//! to run against a newer schema fails fast with `ErrSchemaAhead`.

use rusqlite::Transaction;

use super::StoreError;

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub apply: fn(&Transaction) -> Result<(), StoreError>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema: contacts, chats, participants, messages, leads, follow_ups, opportunities, sync_tasks",
        apply: migration_1,
    },
    Migration {
        version: 2,
        description: "conversation projection table",
        apply: migration_2,
    },
];

fn migration_1(tx: &Transaction) -> Result<(), StoreError> {
    tx.execute_batch(
        r#"
        CREATE TABLE contacts (
            user_id INTEGER PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            phone TEXT,
            is_bot INTEGER NOT NULL DEFAULT 0,
            is_verified INTEGER NOT NULL DEFAULT 0,
            is_premium INTEGER NOT NULL DEFAULT 0,
            total_messages INTEGER NOT NULL DEFAULT 0,
            total_chats INTEGER NOT NULL DEFAULT 0,
            activity_level TEXT NOT NULL DEFAULT 'occasional',
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        );

        CREATE TABLE chats (
            chat_id INTEGER PRIMARY KEY,
            chat_type TEXT NOT NULL,
            title TEXT,
            username TEXT,
            participant_count INTEGER,
            first_message_date TEXT NOT NULL,
            last_message_date TEXT NOT NULL,
            total_messages INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE chat_participants (
            chat_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            engagement_level TEXT NOT NULL DEFAULT 'low',
            PRIMARY KEY (chat_id, user_id),
            FOREIGN KEY (chat_id) REFERENCES chats(chat_id),
            FOREIGN KEY (user_id) REFERENCES contacts(user_id)
        );

        CREATE TABLE messages (
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            from_user_id INTEGER,
            date TEXT NOT NULL,
            text_ciphertext BLOB NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'text',
            is_reply INTEGER NOT NULL DEFAULT 0,
            is_forwarded INTEGER NOT NULL DEFAULT 0,
            edit_date TEXT,
            word_count INTEGER,
            time_of_day TEXT,
            day_of_week INTEGER,
            length_category TEXT,
            sentiment TEXT,
            contains_business_keywords INTEGER,
            is_question INTEGER,
            contains_media INTEGER,
            contains_links INTEGER,
            content_category TEXT,
            PRIMARY KEY (chat_id, message_id)
        );

        CREATE INDEX idx_messages_chat_date ON messages(chat_id, date);
        CREATE INDEX idx_messages_from_user ON messages(from_user_id);
        CREATE INDEX idx_messages_business_keywords ON messages(contains_business_keywords);
        CREATE INDEX idx_messages_sentiment ON messages(sentiment);

        CREATE TABLE leads (
            lead_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL UNIQUE,
            bd_score REAL NOT NULL,
            intelligence_score REAL NOT NULL,
            conversion_likelihood REAL NOT NULL,
            lead_quality TEXT NOT NULL,
            priority TEXT NOT NULL,
            estimated_value REAL NOT NULL,
            investment_capacity TEXT NOT NULL,
            deal_size_category TEXT NOT NULL,
            relationship_strength TEXT NOT NULL,
            business_keywords TEXT NOT NULL DEFAULT '[]',
            investment_keywords TEXT NOT NULL DEFAULT '[]',
            technology_expertise TEXT NOT NULL DEFAULT '[]',
            decision_maker_signals TEXT NOT NULL DEFAULT '[]',
            network_influence TEXT NOT NULL DEFAULT '[]',
            trust_indicators TEXT NOT NULL DEFAULT '[]',
            financial_indicators TEXT NOT NULL DEFAULT '[]',
            personalized_message TEXT,
            meeting_agenda TEXT,
            call_to_action TEXT,
            follow_up_timing TEXT,
            engagement_quality TEXT NOT NULL DEFAULT 'light',
            referral_potential TEXT NOT NULL DEFAULT 'none',
            response_rate REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES contacts(user_id)
        );

        CREATE INDEX idx_leads_intelligence_score ON leads(intelligence_score);

        CREATE TABLE follow_ups (
            follow_up_id TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            description TEXT NOT NULL,
            priority TEXT NOT NULL,
            due_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            FOREIGN KEY (lead_id) REFERENCES leads(lead_id)
        );

        CREATE TABLE opportunities (
            opportunity_id TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL,
            opportunity_type TEXT NOT NULL,
            estimated_value REAL NOT NULL,
            probability REAL NOT NULL,
            timeline TEXT NOT NULL,
            stage TEXT NOT NULL,
            next_steps TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY (lead_id) REFERENCES leads(lead_id)
        );

        CREATE TABLE sync_tasks (
            sync_id TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            enqueued_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX idx_sync_tasks_state ON sync_tasks(state);
        CREATE INDEX idx_sync_tasks_table ON sync_tasks(table_name, enqueued_at);

        CREATE TABLE chat_watermarks (
            chat_id INTEGER PRIMARY KEY,
            max_date TEXT NOT NULL,
            max_message_id INTEGER NOT NULL DEFAULT 0,
            batch_digest TEXT
        );
        "#,
    )?;
    Ok(())
}

fn migration_2(tx: &Transaction) -> Result<(), StoreError> {
    tx.execute_batch(
        r#"
        CREATE TABLE conversations (
            chat_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            business_relevance REAL NOT NULL DEFAULT 0,
            first_date TEXT NOT NULL,
            last_date TEXT NOT NULL,
            shared_interests TEXT NOT NULL DEFAULT '[]',
            conversation_topics TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (chat_id, user_id)
        );
        "#,
    )?;
    Ok(())
}

pub fn highest_known_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Applies any migrations with `version` greater than the schema's current
/// `user_version`, in order, inside one transaction, then records the new
/// version. Rejects running against a schema newer than this binary knows.
pub fn apply_pending(conn: &mut rusqlite::Connection) -> Result<(), StoreError> {
    let current_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let known = highest_known_version();

    if current_version > known {
        return Err(StoreError::SchemaAhead { found: current_version, known });
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        (migration.apply)(&tx)?;
        tracing::info!(version = migration.version, description = migration.description, "applied migration");
    }
    tx.pragma_update(None, "user_version", known)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn applies_all_migrations_on_fresh_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, highest_known_version());
    }

    #[test]
    fn rejects_schema_from_the_future() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", highest_known_version() + 1).unwrap();
        assert!(matches!(apply_pending(&mut conn), Err(StoreError::SchemaAhead { .. })));
    }

    #[test]
    fn is_idempotent_on_an_already_migrated_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();
        apply_pending(&mut conn).unwrap();
    }
}
