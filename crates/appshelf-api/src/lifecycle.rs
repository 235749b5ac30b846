use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use appshelf_db::Database;
use appshelf_types::models::{Application, Manifest, User};

use crate::apps::app_from_row;
use crate::error::{AppError, Result};
use crate::state::blocking;
use crate::storage::Storage;
use crate::upload::manifest_files;

/// Steps of the delete workflow, in order. `Rejected` ends it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
    Requested,
    Authorized,
    FilesPurged,
    RecordPurged,
    Done,
    Rejected,
}

/// Outcome of a completed delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub app_id: Uuid,
    pub files_removed: usize,
    pub files_failed: usize,
}

/// Owner-only deletion of an application and its files.
pub struct LifecycleManager {
    db: Arc<Database>,
    storage: Arc<Storage>,
}

impl LifecycleManager {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self { db, storage }
    }

    /// Delete `app_id` on behalf of `requester`.
    ///
    /// Files are removed first, one at a time; a file that cannot be
    /// removed is logged and skipped. The row is deleted afterwards
    /// regardless. A crash between the two steps leaves a row whose files
    /// are (partly) gone.
    pub async fn delete(&self, app_id: Uuid, requester: &User) -> Result<DeleteReport> {
        let mut stage = DeleteStage::Requested;
        debug!("Delete {}: {:?}", app_id, stage);

        let db = self.db.clone();
        let id = app_id.to_string();
        let row = blocking(move || db.get_app(&id)).await?;

        let app = match row {
            Some(row) => app_from_row(row)?,
            None => {
                stage = DeleteStage::Rejected;
                debug!("Delete {}: {:?} (not found)", app_id, stage);
                return Err(AppError::NotFound);
            }
        };

        if !app.is_owned_by(requester) {
            stage = DeleteStage::Rejected;
            warn!(
                "Delete {}: {:?}, {} is not the owner",
                app_id, stage, requester.username
            );
            return Err(AppError::Forbidden);
        }
        stage = DeleteStage::Authorized;
        debug!("Delete {}: {:?}", app_id, stage);

        let manifest = manifest_of(&app);
        let files = manifest_files(&manifest);
        let attempted = files.len();
        let files_removed = self.storage.remove_all(files).await;
        stage = DeleteStage::FilesPurged;
        debug!(
            "Delete {}: {:?} ({}/{} removed)",
            app_id, stage, files_removed, attempted
        );

        let db = self.db.clone();
        let id = app_id.to_string();
        let deleted = blocking(move || db.delete_app(&id)).await?;
        if !deleted {
            // Someone else got there between our read and delete
            warn!("Delete {}: row already gone", app_id);
        }
        stage = DeleteStage::RecordPurged;
        debug!("Delete {}: {:?}", app_id, stage);

        stage = DeleteStage::Done;
        info!(
            "App {} ({}) deleted by {}: {:?}",
            app.name, app_id, requester.username, stage
        );

        Ok(DeleteReport {
            app_id,
            files_removed,
            files_failed: attempted - files_removed,
        })
    }
}

fn manifest_of(app: &Application) -> Manifest {
    Manifest {
        icon: app.icon.clone(),
        screenshots: app.screenshots.clone(),
        app_file: app.file.clone(),
    }
}
