use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{error, warn};

use appshelf_db::Database;

use crate::credentials::CredentialStore;
use crate::error::{AppError, Result};
use crate::lifecycle::LifecycleManager;
use crate::session::SessionStore;
use crate::storage::Storage;
use crate::upload::{UploadPipeline, UploadPolicy};

pub type AppState = Arc<AppStateInner>;

/// Everything a handler can reach. Each component holds its own handle to
/// the database and storage rather than reaching for shared globals.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: Arc<Storage>,
    pub credentials: CredentialStore,
    pub sessions: SessionStore,
    pub uploads: UploadPipeline,
    pub lifecycle: LifecycleManager,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>, sessions: SessionStore) -> Self {
        Self {
            credentials: CredentialStore::new(db.clone()),
            uploads: UploadPipeline::new(storage.clone(), UploadPolicy::default()),
            lifecycle: LifecycleManager::new(db.clone(), storage.clone()),
            db,
            storage,
            sessions,
        }
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::PersistenceFailure(anyhow::anyhow!("background task failed"))
        })?
        .map_err(AppError::from)
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without a zone.
pub(crate) fn parse_sqlite_time(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
