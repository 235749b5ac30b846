/// Database row types. These map directly to SQLite rows.
/// Distinct from appshelf-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// An `apps` row joined with its owner's username.
/// `screenshots` is already decoded from its JSON column.
pub struct AppRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub screenshots: Vec<String>,
    pub file: String,
    pub user_id: String,
    pub owner_username: String,
    pub created_at: String,
}

/// Values for a new `apps` row.
pub struct NewApp<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub icon: Option<&'a str>,
    pub screenshots: &'a [String],
    pub file: &'a str,
    pub user_id: &'a str,
}
