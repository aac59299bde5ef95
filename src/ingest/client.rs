//! The port between the Ingestor and Telegram's MTProto user API. Mirrors
//! the outbound gateway shape from a Telegram-archival CLI in the example
//! pack: one trait the orchestration code depends on, one `grammers`-backed
//! adapter behind it, so a test double can stand in without touching a
//! real account.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use grammers_client::types::{Chat as GrammersChat, PasswordToken};
use grammers_client::{Client, Config as GrammersConfig, InitParams, SignInError};
use grammers_session::Session;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RemoteChat {
    pub chat_id: i64,
    pub chat_type: crate::model::ChatType,
    pub title: Option<String>,
    pub username: Option<String>,
    pub participant_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RemoteUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_bot: bool,
    pub is_verified: bool,
    pub is_premium: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub date: chrono::DateTime<chrono::Utc>,
    pub text: String,
    pub message_type: crate::model::MessageType,
    pub is_reply: bool,
    pub is_forwarded: bool,
    pub edit_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("not authenticated; run the interactive login flow first")]
    AuthRequired,

    #[error("sign-in failed: {0}")]
    SignIn(String),

    #[error("flood wait: retry after {0}s")]
    FloodWait(i32),

    #[error("transport error: {0}")]
    Transport(String),
}

impl TelegramError {
    /// Flood waits and transport hiccups are retryable; a rejected sign-in
    /// is not (the operator needs to act).
    pub fn is_retryable(&self) -> bool {
        matches!(self, TelegramError::FloodWait(_) | TelegramError::Transport(_))
    }
}

/// Everything the Ingestor needs from the Telegram user API. Kept narrow
/// on purpose: fetching dialogs/messages and driving the login code/2FA
/// handshake, nothing about what the Enricher or Store do with the data.
#[async_trait]
pub trait TelegramClient: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool, TelegramError>;
    async fn request_login_code(&self, phone: &str) -> Result<(), TelegramError>;
    async fn sign_in(&self, code: &str) -> Result<SignInOutcome, TelegramError>;
    async fn check_password(&self, password: &str) -> Result<(), TelegramError>;

    async fn dialogs(&self) -> Result<Vec<RemoteChat>, TelegramError>;
    async fn participants(&self, chat_id: i64) -> Result<Vec<RemoteUser>, TelegramError>;

    /// Fetches at most `limit` messages newer than `after_message_id` (0 =
    /// from the start of history) in ascending order.
    async fn messages(
        &self,
        chat_id: i64,
        after_message_id: i64,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, TelegramError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Success,
    PasswordRequired,
}

pub struct GrammersTelegramClient {
    client: Client,
    /// Dialogs are resolved by id elsewhere (`participants`/`messages`),
    /// but grammers only hands back a `Chat` while iterating dialogs —
    /// cache the last `dialogs()` call's results rather than re-walking
    /// the whole dialog list per chat.
    chat_cache: Mutex<HashMap<i64, GrammersChat>>,
    /// Set by `sign_in` when the account requires 2FA; consumed by the
    /// following `check_password` call, which needs the token `sign_in`
    /// received, not just the password text.
    password_token: Mutex<Option<PasswordToken>>,
}

impl GrammersTelegramClient {
    pub async fn connect(api_id: i32, api_hash: &str, session_path: &std::path::Path) -> Result<Self, TelegramError> {
        let session = Session::load_file_or_create(session_path)
            .map_err(|e| TelegramError::Transport(e.to_string()))?;

        let client = Client::connect(GrammersConfig {
            session,
            api_id,
            api_hash: api_hash.to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| TelegramError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            chat_cache: Mutex::new(HashMap::new()),
            password_token: Mutex::new(None),
        })
    }

    async fn cached_chat(&self, chat_id: i64) -> Result<GrammersChat, TelegramError> {
        self.chat_cache
            .lock()
            .await
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| TelegramError::Transport(format!("chat {chat_id} not seen by a prior dialogs() call")))
    }

    pub fn save_session(&self, session_path: &std::path::Path) -> Result<(), TelegramError> {
        self.client
            .session()
            .save_to_file(session_path)
            .map_err(|e| TelegramError::Transport(e.to_string()))
    }
}

#[async_trait]
impl TelegramClient for GrammersTelegramClient {
    async fn is_authenticated(&self) -> Result<bool, TelegramError> {
        self.client.is_authorized().await.map_err(|e| TelegramError::Transport(e.to_string()))
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), TelegramError> {
        self.client
            .request_login_code(phone)
            .await
            .map(|_| ())
            .map_err(|e| TelegramError::Transport(e.to_string()))
    }

    async fn sign_in(&self, code: &str) -> Result<SignInOutcome, TelegramError> {
        // grammers distinguishes the 2FA branch by error variant rather
        // than return value; surface that as an explicit outcome so the
        // Ingestor can drive the password step without matching on errors.
        // The error variant carries the token `check_password` needs, so
        // it's stashed here rather than discarded.
        match self.client.sign_in(code).await {
            Ok(_) => Ok(SignInOutcome::Success),
            Err(SignInError::PasswordRequired(token)) => {
                *self.password_token.lock().await = Some(token);
                Ok(SignInOutcome::PasswordRequired)
            }
            Err(e) => Err(TelegramError::SignIn(e.to_string())),
        }
    }

    async fn check_password(&self, password: &str) -> Result<(), TelegramError> {
        let token = self
            .password_token
            .lock()
            .await
            .take()
            .ok_or_else(|| TelegramError::SignIn("check_password called without a prior PasswordRequired sign_in".into()))?;
        self.client
            .check_password(token, password)
            .await
            .map(|_| ())
            .map_err(|e| TelegramError::SignIn(e.to_string()))
    }

    async fn dialogs(&self) -> Result<Vec<RemoteChat>, TelegramError> {
        let mut iter = self.client.iter_dialogs();
        let mut out = Vec::new();
        let mut cache = self.chat_cache.lock().await;
        while let Some(dialog) = iter.next().await.map_err(|e| TelegramError::Transport(e.to_string()))? {
            let chat = dialog.chat().clone();
            let remote = remote_chat_from(&chat);
            cache.insert(remote.chat_id, chat);
            out.push(remote);
        }
        Ok(out)
    }

    async fn participants(&self, chat_id: i64) -> Result<Vec<RemoteUser>, TelegramError> {
        let chat = self.cached_chat(chat_id).await?;
        let mut iter = self.client.iter_participants(&chat);
        let mut out = Vec::new();
        while let Some(participant) = iter.next().await.map_err(|e| TelegramError::Transport(e.to_string()))? {
            out.push(remote_user_from(&participant.user));
        }
        Ok(out)
    }

    async fn messages(
        &self,
        chat_id: i64,
        after_message_id: i64,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, TelegramError> {
        let chat = self.cached_chat(chat_id).await?;
        // grammers walks history newest-first; pull up to `limit` and keep
        // only what's past the stored watermark, then hand back ascending
        // so the Ingestor's batch upsert sees them in chat order.
        let mut iter = self.client.iter_messages(&chat).limit(limit as usize);
        let mut out = Vec::new();
        while let Some(message) = iter.next().await.map_err(|e| TelegramError::Transport(e.to_string()))? {
            if message.id() as i64 <= after_message_id {
                break;
            }
            out.push(remote_message_from(chat_id, &message));
        }
        out.reverse();
        Ok(out)
    }
}

fn remote_chat_from(chat: &GrammersChat) -> RemoteChat {
    match chat {
        GrammersChat::User(user) => RemoteChat {
            chat_id: user.id(),
            chat_type: crate::model::ChatType::Private,
            title: Some(display_name(user.first_name(), user.last_name())),
            username: user.username().map(str::to_string),
            participant_count: None,
        },
        GrammersChat::Group(group) => RemoteChat {
            chat_id: group.id(),
            chat_type: crate::model::ChatType::Group,
            title: Some(group.title().to_string()),
            username: group.username().map(str::to_string),
            participant_count: None,
        },
        GrammersChat::Channel(channel) => RemoteChat {
            chat_id: channel.id(),
            chat_type: if channel.is_megagroup() {
                crate::model::ChatType::Supergroup
            } else {
                crate::model::ChatType::Channel
            },
            title: Some(channel.title().to_string()),
            username: channel.username().map(str::to_string),
            participant_count: None,
        },
    }
}

fn remote_user_from(user: &grammers_client::types::User) -> RemoteUser {
    RemoteUser {
        user_id: user.id(),
        username: user.username().map(str::to_string),
        first_name: Some(user.first_name().to_string()),
        last_name: user.last_name().map(str::to_string),
        phone: user.phone().map(str::to_string),
        is_bot: user.is_bot(),
        is_verified: user.verified(),
        is_premium: user.premium(),
    }
}

fn remote_message_from(chat_id: i64, message: &grammers_client::types::Message) -> RemoteMessage {
    let message_type = if message.photo().is_some() {
        crate::model::MessageType::Photo
    } else if message.video().is_some() {
        crate::model::MessageType::Video
    } else if message.document().is_some() {
        crate::model::MessageType::Document
    } else if message.voice().is_some() {
        crate::model::MessageType::Voice
    } else if message.sticker().is_some() {
        crate::model::MessageType::Sticker
    } else if message.media().is_some() {
        crate::model::MessageType::Other
    } else {
        crate::model::MessageType::Text
    };

    RemoteMessage {
        chat_id,
        message_id: message.id() as i64,
        from_user_id: message.sender().map(|s| s.id()),
        date: Utc.timestamp_opt(message.date().timestamp(), 0).single().unwrap_or_else(Utc::now),
        text: message.text().to_string(),
        message_type,
        is_reply: message.reply_to_message_id().is_some(),
        is_forwarded: message.forward_header().is_some(),
        edit_date: message.edit_date().map(|d| Utc.timestamp_opt(d.timestamp(), 0).single().unwrap_or_else(Utc::now)),
    }
}

fn display_name(first: &str, last: Option<&str>) -> String {
    match last {
        Some(last) if !last.is_empty() => format!("{first} {last}"),
        _ => first.to_string(),
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory stand-in for `TelegramClient` used by Ingestor tests.
    #[derive(Default)]
    pub struct FakeTelegramClient {
        pub authenticated: Mutex<bool>,
        pub chats: Mutex<Vec<RemoteChat>>,
        pub messages_by_chat: Mutex<std::collections::HashMap<i64, Vec<RemoteMessage>>>,
    }

    #[async_trait]
    impl TelegramClient for FakeTelegramClient {
        async fn is_authenticated(&self) -> Result<bool, TelegramError> {
            Ok(*self.authenticated.lock().unwrap())
        }

        async fn request_login_code(&self, _phone: &str) -> Result<(), TelegramError> {
            Ok(())
        }

        async fn sign_in(&self, _code: &str) -> Result<SignInOutcome, TelegramError> {
            *self.authenticated.lock().unwrap() = true;
            Ok(SignInOutcome::Success)
        }

        async fn check_password(&self, _password: &str) -> Result<(), TelegramError> {
            Ok(())
        }

        async fn dialogs(&self) -> Result<Vec<RemoteChat>, TelegramError> {
            Ok(self.chats.lock().unwrap().clone())
        }

        async fn participants(&self, _chat_id: i64) -> Result<Vec<RemoteUser>, TelegramError> {
            Ok(Vec::new())
        }

        async fn messages(
            &self,
            chat_id: i64,
            after_message_id: i64,
            limit: u32,
        ) -> Result<Vec<RemoteMessage>, TelegramError> {
            let all = self.messages_by_chat.lock().unwrap().get(&chat_id).cloned().unwrap_or_default();
            Ok(all
                .into_iter()
                .filter(|m| m.message_id > after_message_id)
                .take(limit as usize)
                .collect())
        }
    }
}
