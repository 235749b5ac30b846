use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::middleware::upload_headers;
use crate::state::AppState;
use crate::{apps, auth};

/// All application routes. `max_body_bytes` caps upload requests.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let uploads = ServeDir::new(state.storage.root());

    Router::new()
        .route("/", get(apps::list_apps))
        .route("/app/{id}", get(apps::show_app))
        .route("/app/{id}/delete", post(apps::delete_app))
        .route(
            "/upload",
            get(apps::upload_page)
                .post(apps::upload_app)
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/health", get(health))
        .nest_service("/uploads", uploads)
        .layer(middleware::from_fn(upload_headers))
        .with_state(state)
}

/// GET /health — liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}
