use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const MIN_SECRET_LEN: usize = 32;

/// Used when `RUST_LOG` is unset. Every workspace crate logs.
pub const DEFAULT_LOG_FILTER: &str =
    "appshelf=debug,appshelf_api=debug,appshelf_db=debug,tower_http=debug";

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_ttl_hours: u64 = parsed("APPSHELF_SESSION_TTL_HOURS", 24)?;
        let max_upload_mb: usize = parsed("APPSHELF_MAX_UPLOAD_MB", 256)?;
        let timeout_secs: u64 = parsed("APPSHELF_REQUEST_TIMEOUT_SECS", 60)?;

        Ok(Self {
            host: var_or("APPSHELF_HOST", "0.0.0.0"),
            port: parsed("APPSHELF_PORT", 3000)?,
            db_path: var_or("APPSHELF_DB_PATH", "appshelf.db").into(),
            upload_dir: var_or("APPSHELF_UPLOAD_DIR", "./public/uploads").into(),
            session_secret: std::env::var("APPSHELF_SESSION_SECRET").unwrap_or_default(),
            session_ttl: Duration::from_secs(session_ttl_hours * 3600),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Why the configured session secret is unusable, if it is.
    pub fn secret_problem(&self) -> Option<&'static str> {
        let secret = self.session_secret.as_str();
        if secret.is_empty() {
            Some("is unset")
        } else if PLACEHOLDER_SECRETS.contains(&secret) {
            Some("is still a placeholder")
        } else if secret.len() < MIN_SECRET_LEN {
            Some("is shorter than 32 bytes")
        } else {
            None
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
