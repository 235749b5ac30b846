use axum::{
    extract::{Multipart, Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::{info, warn};
use uuid::Uuid;

use appshelf_db::models::{AppRow, NewApp};
use appshelf_types::models::Application;

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, MaybeUser};
use crate::state::{AppState, blocking, parse_sqlite_time};
use crate::views;

/// GET / — every listing.
pub async fn list_apps(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>> {
    let db = state.db.clone();
    let rows = blocking(move || db.list_apps()).await?;

    let apps = rows
        .into_iter()
        .map(app_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Html(views::home(user.as_ref(), &apps)))
}

/// GET /app/{id} — one listing.
pub async fn show_app(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> Result<Html<String>> {
    let app = load_app(&state, &id).await?;
    Ok(Html(views::app_detail(user.as_ref(), &app)))
}

/// GET /upload
pub async fn upload_page(CurrentUser(user): CurrentUser) -> Html<String> {
    Html(views::upload_form(&user, None))
}

/// POST /upload — store the files, then the record. If the record cannot
/// be saved the files are removed again. Rejected submissions get the form
/// back with the reason.
pub async fn upload_app(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Response> {
    let form = match state.uploads.accept(&mut multipart).await {
        Ok(form) => form,
        Err(e) if e.status().is_client_error() => {
            info!("Upload by {} rejected: {}", user.username, e);
            let page = views::upload_form(&user, Some(&e.to_string()));
            return Ok((e.status(), Html(page)).into_response());
        }
        Err(e) => return Err(e),
    };

    let app_id = Uuid::new_v4();
    let db = state.db.clone();
    let owner_id = user.id.to_string();
    let record = (app_id.to_string(), form.name.clone(), form.description.clone(), form.manifest.clone());

    let saved = blocking(move || {
        let (id, name, description, manifest) = record;
        db.insert_app(&NewApp {
            id: &id,
            name: &name,
            description: description.as_deref(),
            icon: manifest.icon.as_deref(),
            screenshots: &manifest.screenshots,
            file: &manifest.app_file,
            user_id: &owner_id,
        })
    })
    .await;

    if let Err(e) = saved {
        warn!("Discarding files of unsaved upload {}: {}", app_id, e);
        state.uploads.discard(&form.manifest).await;
        return Err(e);
    }

    info!(
        "App {} ({}) uploaded by {} with {} screenshots",
        form.name,
        app_id,
        user.username,
        form.manifest.screenshots.len()
    );
    Ok(Redirect::to(&format!("/app/{}", app_id)).into_response())
}

/// POST /app/{id}/delete
pub async fn delete_app(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let app_id: Uuid = id.parse().map_err(|_| AppError::NotFound)?;
    state.lifecycle.delete(app_id, &user).await?;
    Ok(Redirect::to("/"))
}

async fn load_app(state: &AppState, id: &str) -> Result<Application> {
    // Anything that is not a UUID cannot name a row
    let app_id: Uuid = id.parse().map_err(|_| AppError::NotFound)?;

    let db = state.db.clone();
    let row = blocking(move || db.get_app(&app_id.to_string())).await?;

    row.map(app_from_row).transpose()?.ok_or(AppError::NotFound)
}

pub(crate) fn app_from_row(row: AppRow) -> Result<Application> {
    let id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt app id '{}': {}", row.id, e))?;
    let owner_id: Uuid = row
        .user_id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user_id '{}' on app '{}': {}", row.user_id, row.id, e))?;

    Ok(Application {
        id,
        name: row.name,
        description: row.description,
        icon: row.icon,
        screenshots: row.screenshots,
        file: row.file,
        owner_id,
        owner_username: row.owner_username,
        created_at: parse_sqlite_time(&row.created_at),
    })
}
