use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use appshelf_types::api::{LoginForm, RegisterForm};

use crate::error::AppError;
use crate::middleware::{LOGIN_PATH, MaybeUser};
use crate::session::{SESSION_COOKIE, removal_cookie, session_cookie};
use crate::state::AppState;
use crate::views;

pub async fn register_page(MaybeUser(user): MaybeUser) -> Html<String> {
    Html(views::register_form(user.as_ref(), None))
}

/// POST /register — on success, continue to the login page. Input problems
/// re-render the form with the reason.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    match state.credentials.register(&form.username, &form.password).await {
        Ok(_) => Redirect::to(LOGIN_PATH).into_response(),
        Err(e @ (AppError::DuplicateUsername | AppError::Validation(_))) => {
            info!("Registration refused for {:?}: {}", form.username, e);
            (e.status(), Html(views::register_form(None, Some(&e.to_string())))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn login_page(MaybeUser(user): MaybeUser) -> Html<String> {
    Html(views::login_form(user.as_ref(), None))
}

/// POST /login — verify, start a session, set the cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.credentials.verify(&form.username, &form.password).await {
        Ok(user) => {
            let session = state.sessions.login(user).await;
            let jar = jar.add(session_cookie(session.cookie_value));
            (jar, Redirect::to("/")).into_response()
        }
        Err(e @ AppError::AuthFailure) => {
            warn!("Failed login for {:?}", form.username);
            (e.status(), Html(views::login_form(None, Some(&e.to_string())))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /logout — always succeeds, with or without a live session.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.logout(cookie.value()).await;
    }
    (jar.remove(removal_cookie()), Redirect::to("/"))
}
