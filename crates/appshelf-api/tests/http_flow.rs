//! End-to-end tests through the full router: auth gate, upload pipeline,
//! listing and the owner-only delete workflow.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use futures_util::stream::{self, StreamExt};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use appshelf_api::routes;
use appshelf_api::session::SessionStore;
use appshelf_api::state::{AppState, AppStateInner};
use appshelf_api::storage::{Storage, UploadCategory};
use appshelf_db::Database;

const BOUNDARY: &str = "appshelf-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let storage = Arc::new(Storage::new(dir.path().join("uploads")).await.unwrap());
        let sessions =
            SessionStore::new(b"test-secret-test-secret-test-sec", Duration::from_secs(3600)).unwrap();
        let state: AppState = Arc::new(AppStateInner::new(db, storage, sessions));
        let router = routes::router(state.clone(), 8 * 1024 * 1024);
        Self {
            router,
            state,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn post_multipart(&self, body: Vec<u8>, cookie: Option<&str>) -> Response {
        let mut req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::from(body)).unwrap()).await
    }

    /// Register and log in; returns a `Cookie` header value.
    async fn signup(&self, username: &str, password: &str) -> String {
        let form = format!("username={}&password={}", username, password);
        let resp = self.post_form("/register", &form, None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        self.login(username, password).await.expect("login after signup")
    }

    async fn login(&self, username: &str, password: &str) -> Option<String> {
        let form = format!("username={}&password={}", username, password);
        let resp = self.post_form("/login", &form, None).await;
        if resp.status() != StatusCode::SEE_OTHER {
            return None;
        }
        session_cookie(&resp)
    }

    fn stored_file_count(&self) -> usize {
        UploadCategory::ALL
            .iter()
            .map(|c| {
                std::fs::read_dir(self.state.storage.root().join(c.dir_name()))
                    .unwrap()
                    .count()
            })
            .sum()
    }

    async fn upload_foo(&self, cookie: &str) -> String {
        let body = Multipart::new()
            .text("name", "Foo")
            .text("description", "bar")
            .file("icon", "icon.png", "image/png", b"icon-bytes")
            .file("screenshots", "first.png", "image/png", b"shot-one")
            .file("screenshots", "second.jpg", "image/jpeg", b"shot-two")
            .file("appFile", "foo.apk", "application/octet-stream", b"binary")
            .finish();
        let resp = self.post_multipart(body, Some(cookie)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = location(&resp);
        location
            .strip_prefix("/app/")
            .expect("redirect to the new app")
            .to_string()
    }
}

/// Hand-built multipart/form-data body.
struct Multipart {
    buf: Vec<u8>,
}

impl Multipart {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.buf
    }
}

fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("appshelf_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn location(resp: &Response) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn body_text(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn duplicate_registration_is_refused_and_first_account_survives() {
    let app = TestApp::new().await;
    app.signup("alice", "first").await;

    let resp = app.post_form("/register", "username=alice&password=second", None).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(body_text(resp).await.contains("Username already exists"));

    assert!(app.login("alice", "first").await.is_some());
    assert!(app.login("alice", "second").await.is_none());
}

#[tokio::test]
async fn login_requires_the_right_password() {
    let app = TestApp::new().await;
    app.signup("alice", "secret").await;

    let resp = app.post_form("/login", "username=alice&password=wrong", None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&resp).is_none());
    assert!(body_text(resp).await.contains("Invalid credentials"));

    let cookie = app.login("alice", "secret").await.unwrap();
    let resp = app.get("/upload", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Signed in as alice"));
}

#[tokio::test]
async fn upload_routes_redirect_anonymous_users() {
    let app = TestApp::new().await;

    let resp = app.get("/upload", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    let body = Multipart::new()
        .text("name", "Sneaky")
        .file("appFile", "x.bin", "application/octet-stream", b"data")
        .finish();
    let resp = app.post_multipart(body, None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    // A forged cookie is no better than none
    let resp = app.get("/upload", Some("appshelf_session=abc.def")).await;
    assert_eq!(location(&resp), "/login");

    assert!(app.state.db.list_apps().unwrap().is_empty());
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn upload_without_app_file_leaves_nothing_behind() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let body = Multipart::new()
        .text("name", "Foo")
        .file("icon", "icon.png", "image/png", b"icon-bytes")
        .file("screenshots", "s.png", "image/png", b"shot")
        .finish();
    let resp = app.post_multipart(body, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("An application file is required"));

    assert!(app.state.db.list_apps().unwrap().is_empty());
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn unselected_file_inputs_count_as_missing() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let body = Multipart::new()
        .text("name", "Foo")
        .file("icon", "", "application/octet-stream", b"")
        .file("appFile", "", "application/octet-stream", b"")
        .finish();
    let resp = app.post_multipart(body, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn successful_upload_keeps_screenshot_order() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;
    let id = app.upload_foo(&cookie).await;

    let rows = app.state.db.list_apps().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.id, id);
    assert_eq!(row.name, "Foo");
    assert_eq!(row.description.as_deref(), Some("bar"));
    assert_eq!(row.owner_username, "alice");
    assert_eq!(row.screenshots.len(), 2);
    assert!(row.file.ends_with(".apk"));

    let storage = &app.state.storage;
    let first = storage.file_path(UploadCategory::Screenshot, &row.screenshots[0]).unwrap();
    let second = storage.file_path(UploadCategory::Screenshot, &row.screenshots[1]).unwrap();
    assert_eq!(std::fs::read(first).unwrap(), b"shot-one");
    assert_eq!(std::fs::read(second).unwrap(), b"shot-two");
    assert_eq!(app.stored_file_count(), 4);

    let resp = app.get(&format!("/app/{}", id), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("bar"));

    let resp = app.get("/", None).await;
    assert!(body_text(resp).await.contains(">Foo</a>"));

    let resp = app.get(&format!("/uploads/apps/{}", row.file), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "binary");
}

#[tokio::test]
async fn non_image_icon_is_rejected_and_cleaned_up() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let body = Multipart::new()
        .text("name", "Foo")
        .file("appFile", "foo.apk", "application/octet-stream", b"binary")
        .file("icon", "icon.txt", "text/plain", b"not an image")
        .finish();
    let resp = app.post_multipart(body, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert!(app.state.db.list_apps().unwrap().is_empty());
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn unknown_fields_and_extra_files_are_rejected() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let body = Multipart::new()
        .text("name", "Foo")
        .file("appFile", "foo.apk", "application/octet-stream", b"binary")
        .file("avatar", "me.png", "image/png", b"png")
        .finish();
    let resp = app.post_multipart(body, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_file_count(), 0);

    let mut body = Multipart::new()
        .text("name", "Foo")
        .file("appFile", "foo.apk", "application/octet-stream", b"binary");
    for i in 0..6 {
        body = body.file("screenshots", &format!("s{}.png", i), "image/png", b"png");
    }
    let resp = app.post_multipart(body.finish(), Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("Too many files"));
    assert_eq!(app.stored_file_count(), 0);
    assert!(app.state.db.list_apps().unwrap().is_empty());
}

#[tokio::test]
async fn non_owner_cannot_delete() {
    let app = TestApp::new().await;
    let owner = app.signup("alice", "pw").await;
    let stranger = app.signup("mallory", "pw").await;
    let id = app.upload_foo(&owner).await;

    let resp = app
        .post_form(&format!("/app/{}/delete", id), "", Some(&stranger))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert!(app.state.db.get_app(&id).unwrap().is_some());
    assert_eq!(app.stored_file_count(), 4);
}

#[tokio::test]
async fn owner_delete_removes_row_and_files() {
    let app = TestApp::new().await;
    let owner = app.signup("alice", "pw").await;
    let id = app.upload_foo(&owner).await;

    // A file that vanished on its own must not stop the delete
    let row = app.state.db.get_app(&id).unwrap().unwrap();
    let icon = app
        .state
        .storage
        .file_path(UploadCategory::Icon, row.icon.as_deref().unwrap())
        .unwrap();
    std::fs::remove_file(icon).unwrap();

    let resp = app
        .post_form(&format!("/app/{}/delete", id), "", Some(&owner))
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = app.get(&format!("/app/{}", id), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(app.state.db.get_app(&id).unwrap().is_none());
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn delete_requires_login_and_an_existing_app() {
    let app = TestApp::new().await;
    let owner = app.signup("alice", "pw").await;
    let id = app.upload_foo(&owner).await;

    let resp = app.post_form(&format!("/app/{}/delete", id), "", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert!(app.state.db.get_app(&id).unwrap().is_some());

    let resp = app
        .post_form(&format!("/app/{}/delete", uuid::Uuid::new_v4()), "", Some(&owner))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_app_pages_are_404() {
    let app = TestApp::new().await;
    assert_eq!(app.get("/app/not-a-uuid", None).await.status(), StatusCode::NOT_FOUND);
    let resp = app.get(&format!("/app/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_twice_is_a_no_op() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let first = app.get("/logout", Some(&cookie)).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    let second = app.get("/logout", Some(&cookie)).await;
    assert_eq!(second.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&second), "/");

    let resp = app.get("/upload", Some(&cookie)).await;
    assert_eq!(location(&resp), "/login");
    assert_eq!(app.state.sessions.len().await, 0);
}

#[tokio::test]
async fn cancelled_upload_leaves_no_files() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    // An app file part whose body never finishes
    let head = Multipart::new()
        .text("name", "Foo")
        .file("appFile", "foo.apk", "application/octet-stream", b"partial data")
        .buf;
    let body = Body::from_stream(
        stream::iter([Ok::<_, std::io::Error>(head)]).chain(stream::pending()),
    );
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::COOKIE, &cookie)
        .body(body)
        .unwrap();

    let router = app.router.clone();
    let upload = tokio::spawn(async move { router.oneshot(req).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while app.stored_file_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upload never started writing");

    upload.abort();
    assert!(upload.await.unwrap_err().is_cancelled());

    assert_eq!(app.stored_file_count(), 0);
    assert!(app.state.db.list_apps().unwrap().is_empty());
}

#[tokio::test]
async fn uploaded_html_is_served_as_a_sandboxed_download() {
    let app = TestApp::new().await;
    let cookie = app.signup("alice", "pw").await;

    let body = Multipart::new()
        .text("name", "Evil")
        .file("appFile", "evil.html", "text/html", b"<script>alert(1)</script>")
        .finish();
    let resp = app.post_multipart(body, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let row = app.state.db.list_apps().unwrap().remove(0);
    assert!(row.file.ends_with(".html"));

    let resp = app.get(&format!("/uploads/apps/{}", row.file), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers.get(header::CONTENT_DISPOSITION).unwrap(), "attachment");
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    let csp = headers.get(header::CONTENT_SECURITY_POLICY).unwrap();
    assert!(csp.to_str().unwrap().starts_with("sandbox"));
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let resp = app.get("/health", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "ok");
}
