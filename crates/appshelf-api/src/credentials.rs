use std::sync::{Arc, OnceLock};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use appshelf_db::Database;
use appshelf_db::models::UserRow;
use appshelf_types::models::User;

use crate::error::{AppError, Result};
use crate::state::blocking;

const MAX_USERNAME_LEN: usize = 64;

/// Password hashing and verification over the `users` table.
pub struct CredentialStore {
    db: Arc<Database>,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create an account. Returns the new user's id.
    pub async fn register(&self, username: &str, password: &str) -> Result<Uuid> {
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::Validation(format!(
                "Username must be at most {} characters",
                MAX_USERNAME_LEN
            )));
        }
        if password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }

        let db = self.db.clone();
        let password = password.to_string();
        let user_id = Uuid::new_v4();

        let created = blocking(move || {
            if db.get_user_by_username(&username)?.is_some() {
                return Ok(None);
            }

            let password_hash = hash_password(&password)?;

            match db.create_user(&user_id.to_string(), &username, &password_hash) {
                Ok(()) => Ok(Some(username)),
                // Lost a race with a concurrent registration
                Err(e) if appshelf_db::is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?;

        let username = created.ok_or(AppError::DuplicateUsername)?;
        info!("Registered user {} ({})", username, user_id);
        Ok(user_id)
    }

    /// Check a username/password pair.
    pub async fn verify(&self, username: &str, password: &str) -> Result<User> {
        let db = self.db.clone();
        let username = username.trim().to_string();
        let password = password.to_string();

        let row = blocking(move || {
            let row = db.get_user_by_username(&username)?;
            let hash = match &row {
                Some(r) => r.password.as_str(),
                None => dummy_hash(),
            };
            // Verify even for unknown users so both paths take as long
            let matches = verify_password(&password, hash);
            Ok(row.filter(|_| matches))
        })
        .await?;

        let row = row.ok_or(AppError::AuthFailure)?;
        user_from_row(row)
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_password("appshelf-timing-dummy").unwrap_or_default()
    })
}

pub(crate) fn user_from_row(row: UserRow) -> Result<User> {
    let id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", row.id, e))?;
    Ok(User {
        id,
        username: row.username,
        created_at: crate::state::parse_sqlite_time(&row.created_at),
    })
}
