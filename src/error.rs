//! Process-wide error taxonomy.
//!
//! Mirrors the error kinds in the propagation policy: row/batch errors stay
//! local to the component that raised them (see `store`, `ingest`, `sync`),
//! while `CoreError` is reserved for configuration, invariant, and
//! process-level failures that the Scheduler surfaces with a distinct exit
//! code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("another instance is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("schema version {found} is ahead of the highest known migration {known}")]
    SchemaAhead { found: i64, known: i64 },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecoverable internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps to the exit codes documented for CLI collaborators wrapping the core.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Config(_) => 2,
            CoreError::AlreadyRunning(_) => 3,
            CoreError::AuthRequired(_) => 4,
            CoreError::SchemaAhead { .. } => 5,
            _ => 10,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
