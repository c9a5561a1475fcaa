// src/config.rs
//! Service configuration: TOML tunables plus environment credentials.
//!
//! Resolution order for the tunables file:
//! 1) $HN30_CONFIG_PATH (must exist)
//! 2) config/hn30.toml
//! 3) built-in defaults
//!
//! Credentials for optional integrations come from the environment only; a
//! missing or blank value disables that integration.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ledger::EligibilityPolicy;

pub const ENV_CONFIG_PATH: &str = "HN30_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/hn30.toml";
pub const DEFAULT_SQLITE_PATH: &str = "./data/hn30.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_secs: u64,
    pub top_n: usize,
    pub item_delay_ms: u64,
    pub notify_min_age_secs: i64,
    pub notify_min_score: i64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            top_n: 30,
            item_delay_ms: 500,
            notify_min_age_secs: 3600,
            notify_min_score: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            shutdown_grace_secs: 5,
        }
    }
}

/// Shape of the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub refresh: RefreshSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone)]
pub struct OneSignalCredentials {
    pub app_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct TursoCredentials {
    pub url: String,
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub refresh: RefreshSettings,
    pub server: ServerSettings,
    pub sqlite_path: PathBuf,
    pub onesignal: Option<OneSignalCredentials>,
    pub turso: Option<TursoCredentials>,
    pub gemini_api_key: Option<String>,
}

impl Config {
    /// Load `.env` (if any), the tunables file and the environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Like [`Config::load`], reading an explicit env file instead of `.env`.
    pub fn load_with_env_file(path: &Path) -> Result<Self> {
        dotenvy::from_path(path)
            .map_err(|e| Error::config(format!("env file {}: {e}", path.display())))?;
        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        let file = load_file_default()?;
        Ok(Self::from_parts(file, |k| std::env::var(k).ok()))
    }

    /// Merge file tunables with values looked up through `env`.
    pub fn from_parts<F>(file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut server = file.server;
        if let Some(addr) = non_blank("BIND_ADDR") {
            server.bind_addr = addr;
        }

        let onesignal = match (non_blank("ONESIGNAL_APP_ID"), non_blank("ONESIGNAL_KEY")) {
            (Some(app_id), Some(api_key)) => Some(OneSignalCredentials { app_id, api_key }),
            _ => None,
        };
        let turso = match (non_blank("TURSO_DATABASE_URL"), non_blank("TURSO_AUTH_TOKEN")) {
            (Some(url), Some(auth_token)) => Some(TursoCredentials { url, auth_token }),
            _ => None,
        };

        Self {
            refresh: file.refresh,
            server,
            sqlite_path: non_blank("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            onesignal,
            turso,
            gemini_api_key: non_blank("GEMINI_API_KEY"),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address {}: {e}", self.server.bind_addr)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    pub fn eligibility(&self) -> EligibilityPolicy {
        EligibilityPolicy {
            min_age_secs: self.refresh.notify_min_age_secs,
            min_score: self.refresh.notify_min_score,
        }
    }
}

pub fn load_file_from(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn load_file_default() -> Result<FileConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(Error::config(format!(
                "{ENV_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            )));
        }
        return load_file_from(&pb);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return load_file_from(&default);
    }
    Ok(FileConfig::default())
}
