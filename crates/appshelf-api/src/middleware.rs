use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{Redirect, Response},
};
use axum_extra::extract::CookieJar;

use appshelf_types::models::User;

use crate::session::SESSION_COOKIE;
use crate::state::AppState;

pub const LOGIN_PATH: &str = "/login";

/// Where stored files are served from.
pub const UPLOADS_PREFIX: &str = "/uploads/";
const APP_FILES_PREFIX: &str = "/uploads/apps/";

/// The logged-in user of a protected route.
///
/// Add `CurrentUser(user): CurrentUser` to a handler and requests without a
/// valid session are sent to the login page before the handler runs (and
/// before any request body is read).
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        session_user(parts, state)
            .await
            .map(CurrentUser)
            .ok_or_else(|| Redirect::to(LOGIN_PATH))
    }
}

/// The logged-in user, if any. Used by public pages to render the nav bar.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_user(parts, state).await))
    }
}

async fn session_user(parts: &Parts, state: &AppState) -> Option<User> {
    let jar = CookieJar::from_headers(&parts.headers);
    let cookie = jar.get(SESSION_COOKIE)?;
    state.sessions.lookup(cookie.value()).await
}

/// Headers for files served from the upload root.
///
/// Uploaded files are user content on our own origin. They must never be
/// sniffed into HTML, never run script when opened directly, and the app
/// binaries are always downloaded rather than rendered.
pub async fn upload_headers(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let is_upload = path.starts_with(UPLOADS_PREFIX);
    let is_app_file = path.starts_with(APP_FILES_PREFIX);

    let mut response = next.run(request).await;
    if !is_upload {
        return response;
    }

    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("sandbox; default-src 'none'; img-src 'self'"),
    );
    if is_app_file {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        );
    }

    response
}
