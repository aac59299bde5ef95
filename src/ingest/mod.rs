//! C3 — Ingestor: pulls contacts, chats and messages from Telegram through
//! a `TelegramClient` port, encrypts message text, and upserts everything
//! into the Store. Interactive auth and the bulk pull are the only two
//! operations this component exposes; scheduling when they run belongs to
//! the Scheduler.

pub mod client;
pub mod rate_limit;
pub mod retry;

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::crypto::Crypto;
use crate::model::{ActivityLevel, Chat, Contact, Message};
use crate::store::{Store, StoreError};
use client::{RemoteChat, RemoteMessage, SignInOutcome, TelegramClient, TelegramError};
use rate_limit::RateLimiter;
use retry::RetryHandler;

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub chats_seen: u64,
    pub messages_ingested: u64,
    pub messages_failed: u64,
    /// Dialogs that exhausted their retry budget (`ErrDialogFailed`) —
    /// isolated so one bad dialog never aborts the rest of the run.
    pub dialogs_failed: u64,
    /// Cumulative seconds slept honoring a Telegram `FLOOD_WAIT` response
    /// during this pass.
    pub flood_wait_seconds: u64,
}

pub struct Ingestor<C: TelegramClient> {
    client: Arc<C>,
    store: Arc<Store>,
    crypto: Arc<Crypto>,
    retry: RetryHandler,
    rate_limiter: RateLimiter,
    /// Messages pulled per dialog per run (`SYNC_LIMIT`, reused here as
    /// the ingest page size).
    page_size: u32,
}

impl<C: TelegramClient> Ingestor<C> {
    pub fn new(client: Arc<C>, store: Arc<Store>, crypto: Arc<Crypto>, page_size: u32) -> Self {
        Self {
            client,
            store,
            crypto,
            retry: RetryHandler::new(),
            rate_limiter: RateLimiter::new(rate_limit::RateLimiterConfig::default()),
            page_size,
        }
    }

    /// Drives the login-code + optional-2FA handshake. Returns once the
    /// session is authorized; a caller with no TTY just surfaces the error.
    pub async fn authenticate_interactive(
        &self,
        phone: &str,
        code_prompt: impl Fn() -> String,
        password_prompt: impl Fn() -> String,
    ) -> Result<(), IngestError> {
        if self.client.is_authenticated().await? {
            return Ok(());
        }

        self.client.request_login_code(phone).await?;
        let code = code_prompt();
        match self.client.sign_in(&code).await? {
            SignInOutcome::Success => {}
            SignInOutcome::PasswordRequired => {
                let password = password_prompt();
                self.client.check_password(&password).await?;
            }
        }
        info!("telegram session authorized");
        Ok(())
    }

    /// Fetches every dialog's contact/chat metadata and upserts it, without
    /// pulling message history. Used to seed `contacts`/`chats` cheaply.
    pub async fn fetch_dialogs(&self) -> Result<Vec<RemoteChat>, IngestError> {
        let dialogs = self.retry.execute(|| self.client.dialogs()).await?;
        for remote in &dialogs {
            self.upsert_chat_shell(remote).await?;
        }
        Ok(dialogs)
    }

    /// Incremental pull: every dialog, every message newer than its stored
    /// watermark, encrypted and upserted in batches. A single row's
    /// decrypt/encrypt failure is logged and skipped, never aborts the
    /// batch. This is the hourly periodic job.
    pub async fn fetch_all(&self) -> Result<IngestStats, IngestError> {
        self.fetch_all_from(false).await
    }

    /// Full-history pull: ignores each dialog's stored watermark and walks
    /// its entire history, same per-row isolation as `fetch_all`. This is
    /// the `SYNC_TIME`-driven daily job, which exists to backfill anything
    /// an hourly incremental pass could have missed (e.g. a dialog that
    /// went quiet and was never revisited).
    pub async fn fetch_all_full_history(&self) -> Result<IngestStats, IngestError> {
        self.fetch_all_from(true).await
    }

    async fn fetch_all_from(&self, full_history: bool) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        let dialogs = self.fetch_dialogs().await?;
        stats.chats_seen = dialogs.len() as u64;

        for chat in &dialogs {
            self.rate_limiter.acquire(chat.chat_id).await;

            let after_id = if full_history {
                0
            } else {
                self.store.chat_message_watermark(chat.chat_id).await?
            };

            // One bad dialog never aborts the run: a retry-exhausted
            // fetch is isolated to this dialog only.
            let remote_messages = match self
                .retry
                .execute(|| self.client.messages(chat.chat_id, after_id, self.page_size))
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(chat_id = chat.chat_id, %err, "dialog exhausted its retry budget; skipping");
                    stats.dialogs_failed += 1;
                    continue;
                }
            };

            // The nightly full pull walks every dialog's entire history
            // regardless of watermark; most of the time none of it changed
            // since yesterday. A content digest over the plaintext lets us
            // skip re-encrypting and re-upserting an unchanged dialog
            // entirely rather than paying that cost every night.
            let new_digest = (full_history && !remote_messages.is_empty()).then(|| content_digest(&remote_messages));
            if let Some(digest) = &new_digest {
                if self.store.chat_batch_digest(chat.chat_id).await?.as_deref() == Some(digest.as_str()) {
                    continue;
                }
            }

            let mut batch = Vec::with_capacity(remote_messages.len());
            let mut max_date = None;
            let mut max_message_id = after_id;
            for remote in remote_messages {
                match self.crypto.encrypt(remote.text.as_bytes()) {
                    Ok(ciphertext) => {
                        max_date = Some(max_date.map_or(remote.date, |m: chrono::DateTime<Utc>| m.max(remote.date)));
                        max_message_id = max_message_id.max(remote.message_id);
                        batch.push(to_message(remote, ciphertext));
                        stats.messages_ingested += 1;
                    }
                    Err(err) => {
                        warn!(chat_id = chat.chat_id, %err, "failed to encrypt message; skipping row");
                        stats.messages_failed += 1;
                    }
                }
            }

            if !batch.is_empty() {
                self.store.upsert_messages(&batch).await?;
            }
            if let Some(date) = max_date {
                self.store.set_chat_watermark(chat.chat_id, date, max_message_id).await?;
            }
            if let Some(digest) = new_digest {
                self.store.set_chat_batch_digest(chat.chat_id, &digest).await?;
            }
        }

        stats.flood_wait_seconds = self.retry.take_flood_wait_seconds();

        info!(
            chats = stats.chats_seen,
            ingested = stats.messages_ingested,
            failed = stats.messages_failed,
            flood_wait_seconds = stats.flood_wait_seconds,
            "ingest pass complete"
        );
        Ok(stats)
    }

    async fn upsert_chat_shell(&self, remote: &RemoteChat) -> Result<(), IngestError> {
        let now = Utc::now();
        self.store
            .upsert_chat(&Chat {
                chat_id: remote.chat_id,
                chat_type: remote.chat_type,
                title: remote.title.clone(),
                username: remote.username.clone(),
                participant_count: remote.participant_count,
                first_message_date: now,
                last_message_date: now,
                total_messages: 0,
            })
            .await?;

        for user in self.retry.execute(|| self.client.participants(remote.chat_id)).await? {
            self.store
                .upsert_contact(&Contact {
                    user_id: user.user_id,
                    username: user.username,
                    first_name: user.first_name,
                    last_name: user.last_name,
                    phone: user.phone,
                    is_bot: user.is_bot,
                    is_verified: user.is_verified,
                    is_premium: user.is_premium,
                    total_messages: 0,
                    total_chats: 1,
                    activity_level: ActivityLevel::Occasional,
                    first_seen: now,
                    last_seen: now,
                })
                .await?;
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 over a dialog's plaintext page, in the order the
/// client returned it. Hashed before encryption since `Crypto::encrypt`
/// mixes in a fresh nonce per call, so ciphertext bytes never repeat even
/// for identical plaintext.
fn content_digest(messages: &[RemoteMessage]) -> String {
    let mut hasher = Sha256::new();
    for m in messages {
        hasher.update(m.message_id.to_le_bytes());
        hasher.update(m.text.as_bytes());
        hasher.update(m.edit_date.map(|d| d.timestamp()).unwrap_or(0).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn to_message(remote: RemoteMessage, ciphertext: Vec<u8>) -> Message {
    Message {
        chat_id: remote.chat_id,
        message_id: remote.message_id,
        from_user_id: remote.from_user_id,
        date: remote.date,
        text_ciphertext: ciphertext,
        message_type: remote.message_type,
        is_reply: remote.is_reply,
        is_forwarded: remote.is_forwarded,
        edit_date: remote.edit_date,
        word_count: None,
        time_of_day: None,
        day_of_week: None,
        length_category: None,
        sentiment: None,
        contains_business_keywords: None,
        is_question: None,
        contains_media: None,
        contains_links: None,
        content_category: None,
    }
}

#[cfg(test)]
mod tests {
    use super::client::fakes::FakeTelegramClient;
    use super::*;
    use crate::model::{ChatType, MessageType};
    use tempfile::tempdir;

    fn remote_message(chat_id: i64, id: i64, text: &str) -> RemoteMessage {
        RemoteMessage {
            chat_id,
            message_id: id,
            from_user_id: Some(1),
            date: Utc::now(),
            text: text.to_string(),
            message_type: MessageType::Text,
            is_reply: false,
            is_forwarded: false,
            edit_date: None,
        }
    }

    #[tokio::test]
    async fn fetch_all_encrypts_and_persists_messages() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let crypto = Arc::new(Crypto::from_key_bytes(&[3u8; 32]).unwrap());

        let client = Arc::new(FakeTelegramClient::default());
        *client.authenticated.lock().unwrap() = true;
        client.chats.lock().unwrap().push(RemoteChat {
            chat_id: 100,
            chat_type: ChatType::Private,
            title: Some("Alice".into()),
            username: Some("alice".into()),
            participant_count: None,
        });
        client
            .messages_by_chat
            .lock()
            .unwrap()
            .insert(100, vec![remote_message(100, 1, "hello"), remote_message(100, 2, "business inquiry")]);

        let ingestor = Ingestor::new(client, store.clone(), crypto, 1000);
        let stats = ingestor.fetch_all().await.unwrap();

        assert_eq!(stats.messages_ingested, 2);
        assert_eq!(stats.messages_failed, 0);
        assert_eq!(store.stats().await.unwrap().messages, 2);
    }

    #[tokio::test]
    async fn repeat_fetch_all_only_pulls_messages_past_the_watermark() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let crypto = Arc::new(Crypto::from_key_bytes(&[5u8; 32]).unwrap());

        let client = Arc::new(FakeTelegramClient::default());
        *client.authenticated.lock().unwrap() = true;
        client.chats.lock().unwrap().push(RemoteChat {
            chat_id: 200,
            chat_type: ChatType::Private,
            title: Some("Bob".into()),
            username: Some("bob".into()),
            participant_count: None,
        });
        client.messages_by_chat.lock().unwrap().insert(200, vec![remote_message(200, 1, "first")]);

        let ingestor = Ingestor::new(client.clone(), store.clone(), crypto, 1000);
        let first_pass = ingestor.fetch_all().await.unwrap();
        assert_eq!(first_pass.messages_ingested, 1);

        let second_pass = ingestor.fetch_all().await.unwrap();
        assert_eq!(second_pass.messages_ingested, 0, "nothing new since the watermark advanced");

        client.messages_by_chat.lock().unwrap().get_mut(&200).unwrap().push(remote_message(200, 2, "second"));
        let third_pass = ingestor.fetch_all().await.unwrap();
        assert_eq!(third_pass.messages_ingested, 1, "only the message past the watermark is pulled");
        assert_eq!(store.stats().await.unwrap().messages, 2);
    }

    #[tokio::test]
    async fn full_history_pull_skips_an_unchanged_dialog_on_repeat() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 2).await.unwrap());
        let crypto = Arc::new(Crypto::from_key_bytes(&[7u8; 32]).unwrap());

        let client = Arc::new(FakeTelegramClient::default());
        *client.authenticated.lock().unwrap() = true;
        client.chats.lock().unwrap().push(RemoteChat {
            chat_id: 300,
            chat_type: ChatType::Private,
            title: Some("Carol".into()),
            username: Some("carol".into()),
            participant_count: None,
        });
        client
            .messages_by_chat
            .lock()
            .unwrap()
            .insert(300, vec![remote_message(300, 1, "hello"), remote_message(300, 2, "world")]);

        let ingestor = Ingestor::new(client.clone(), store.clone(), crypto, 1000);
        let first_pass = ingestor.fetch_all_full_history().await.unwrap();
        assert_eq!(first_pass.messages_ingested, 2);

        let second_pass = ingestor.fetch_all_full_history().await.unwrap();
        assert_eq!(second_pass.messages_ingested, 0, "unchanged dialog content is skipped via digest match");

        client.messages_by_chat.lock().unwrap().get_mut(&300).unwrap().push(remote_message(300, 3, "new message"));
        let third_pass = ingestor.fetch_all_full_history().await.unwrap();
        assert_eq!(third_pass.messages_ingested, 3, "a changed dialog re-walks its whole history");
    }
}
