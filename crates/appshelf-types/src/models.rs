use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account as seen outside the credential store.
/// Deliberately has no password field: the hash never leaves the db row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A listed application. File references are bare generated filenames;
/// the directory is implied by the category (icon, screenshot, app file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub screenshots: Vec<String>,
    pub file: String,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.owner_id == user.id
    }
}

/// Filenames produced for one upload submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub icon: Option<String>,
    pub screenshots: Vec<String>,
    pub app_file: String,
}
