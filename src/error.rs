// src/error.rs

//! Storage and startup errors shared across the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure in the ledger
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failed
    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    /// Ledger used after `close`
    #[error("ledger is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
