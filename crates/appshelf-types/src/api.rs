use serde::Deserialize;

// -- Auth forms --

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// -- Upload form --

/// Multipart field names accepted by `POST /upload`.
pub mod upload_fields {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const ICON: &str = "icon";
    pub const SCREENSHOTS: &str = "screenshots";
    pub const APP_FILE: &str = "appFile";
}
