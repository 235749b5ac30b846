//! HTML pages. Each function takes plain data and returns a whole document.
//! Every interpolated value goes through [`escape`].

use std::fmt::Write;

use axum::http::StatusCode;

use appshelf_types::api::upload_fields;
use appshelf_types::models::{Application, User};

use crate::storage::UploadCategory;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Public URL of a stored file.
pub fn file_url(category: UploadCategory, name: &str) -> String {
    format!("/uploads/{}/{}", category.dir_name(), escape(name))
}

fn layout(title: &str, user: Option<&User>, body: &str) -> String {
    let nav = match user {
        Some(u) => format!(
            r#"<span>Signed in as {}</span> <a href="/upload">Upload</a> <a href="/logout">Log out</a>"#,
            escape(&u.username)
        ),
        None => r#"<a href="/login">Log in</a> <a href="/register">Register</a>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} · AppShelf</title>
</head>
<body>
<header><a href="/"><strong>AppShelf</strong></a> <nav>{nav}</nav></header>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

fn error_banner(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default()
}

pub fn home(user: Option<&User>, apps: &[Application]) -> String {
    let mut body = String::from("<h1>Applications</h1>\n");
    if apps.is_empty() {
        body.push_str("<p>No applications yet.</p>\n");
    } else {
        body.push_str("<ul class=\"apps\">\n");
        for app in apps {
            let icon = app
                .icon
                .as_deref()
                .map(|i| {
                    format!(
                        r#"<img src="{}" alt="" width="48" height="48"> "#,
                        file_url(UploadCategory::Icon, i)
                    )
                })
                .unwrap_or_default();
            let _ = writeln!(
                body,
                r#"<li>{icon}<a href="/app/{id}">{name}</a> by {owner}</li>"#,
                id = app.id,
                name = escape(&app.name),
                owner = escape(&app.owner_username),
            );
        }
        body.push_str("</ul>\n");
    }
    layout("Applications", user, &body)
}

pub fn app_detail(user: Option<&User>, app: &Application) -> String {
    let mut body = String::new();
    if let Some(icon) = &app.icon {
        let _ = writeln!(
            body,
            r#"<img src="{}" alt="icon" width="96" height="96">"#,
            file_url(UploadCategory::Icon, icon)
        );
    }
    let _ = writeln!(body, "<h1>{}</h1>", escape(&app.name));
    let _ = writeln!(
        body,
        "<p>Uploaded by {} on {}</p>",
        escape(&app.owner_username),
        app.created_at.format("%Y-%m-%d")
    );
    if let Some(description) = &app.description {
        let _ = writeln!(body, "<p>{}</p>", escape(description));
    }
    let _ = writeln!(
        body,
        r#"<p><a href="{}" download>Download</a></p>"#,
        file_url(UploadCategory::AppFile, &app.file)
    );

    if !app.screenshots.is_empty() {
        body.push_str("<section class=\"screenshots\">\n");
        for (i, shot) in app.screenshots.iter().enumerate() {
            let _ = writeln!(
                body,
                r#"<img src="{}" alt="Screenshot {}">"#,
                file_url(UploadCategory::Screenshot, shot),
                i + 1
            );
        }
        body.push_str("</section>\n");
    }

    if user.is_some_and(|u| app.is_owned_by(u)) {
        let _ = writeln!(
            body,
            r#"<form method="post" action="/app/{}/delete"><button type="submit">Delete</button></form>"#,
            app.id
        );
    }

    layout(&app.name, user, &body)
}

pub fn upload_form(user: &User, error: Option<&str>) -> String {
    let body = format!(
        r#"<h1>Upload an application</h1>
{banner}<form method="post" action="/upload" enctype="multipart/form-data">
<label>Name <input type="text" name="{name}" required></label>
<label>Description <textarea name="{description}"></textarea></label>
<label>Icon <input type="file" name="{icon}" accept="image/*"></label>
<label>Screenshots (up to 5) <input type="file" name="{screenshots}" accept="image/*" multiple></label>
<label>Application file <input type="file" name="{app_file}" required></label>
<button type="submit">Upload</button>
</form>
"#,
        banner = error_banner(error),
        name = upload_fields::NAME,
        description = upload_fields::DESCRIPTION,
        icon = upload_fields::ICON,
        screenshots = upload_fields::SCREENSHOTS,
        app_file = upload_fields::APP_FILE,
    );
    layout("Upload", Some(user), &body)
}

fn credentials_form(heading: &str, action: &str, error: Option<&str>) -> String {
    format!(
        r#"<h1>{heading}</h1>
{banner}<form method="post" action="{action}">
<label>Username <input type="text" name="username" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">{heading}</button>
</form>
"#,
        banner = error_banner(error),
    )
}

pub fn login_form(user: Option<&User>, error: Option<&str>) -> String {
    layout("Log in", user, &credentials_form("Log in", "/login", error))
}

pub fn register_form(user: Option<&User>, error: Option<&str>) -> String {
    layout("Register", user, &credentials_form("Register", "/register", error))
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to the list</a></p>\n",
        status.as_u16(),
        escape(message)
    );
    layout(status.canonical_reason().unwrap_or("Error"), None, &body)
}
