use crate::models::{AppRow, NewApp, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Row;

const APP_COLUMNS: &str =
    "a.id, a.name, a.description, a.icon, a.screenshots, a.file, a.user_id, u.username, a.created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, created_at FROM users WHERE username = ?1",
            )?;

            let row = stmt
                .query_row([username], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    // -- Apps --

    pub fn insert_app(&self, app: &NewApp<'_>) -> Result<()> {
        let screenshots = serde_json::to_string(app.screenshots)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO apps (id, name, description, icon, screenshots, file, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    app.id,
                    app.name,
                    app.description,
                    app.icon,
                    screenshots,
                    app.file,
                    app.user_id,
                ],
            )?;
            Ok(())
        })
    }

    /// Every listing, newest first.
    pub fn list_apps(&self) -> Result<Vec<AppRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APP_COLUMNS}
                 FROM apps a
                 JOIN users u ON a.user_id = u.id
                 ORDER BY a.created_at DESC, a.rowid DESC"
            ))?;

            let rows = stmt
                .query_map([], map_app_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_app(&self, id: &str) -> Result<Option<AppRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APP_COLUMNS}
                 FROM apps a
                 JOIN users u ON a.user_id = u.id
                 WHERE a.id = ?1"
            ))?;

            stmt.query_row([id], map_app_row).optional()
        })
    }

    /// Removes the row only. Returns false if no row matched.
    pub fn delete_app(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM apps WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }
}

fn map_app_row(row: &Row<'_>) -> rusqlite::Result<AppRow> {
    let screenshots_json: String = row.get(4)?;
    let screenshots: Vec<String> = serde_json::from_str(&screenshots_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AppRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        screenshots,
        file: row.get(5)?,
        user_id: row.get(6)?,
        owner_username: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
