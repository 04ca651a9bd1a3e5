#![allow(dead_code)]

use church_cms::config::database::{connect, DatabaseSettings};
use church_cms::config::upload::UploadConfig;
use church_cms::middleware::auth::Role;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Once,
};
use tempfile::TempDir;

static INIT: Once = Once::new();
static BOARD_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn init_env() {
    INIT.call_once(|| {
        std::env::set_var(
            "JWT_SECRET",
            "integration_test_secret_that_is_at_least_32_characters_long",
        );
        std::env::set_var("RATE_LIMIT_ENABLED", "false");
        std::env::set_var("ENABLE_HSTS", "false");
        let config = church_cms::config::jwt::JwtConfig::from_env().unwrap();
        let _ = church_cms::utils::jwt::init_jwt_config(config);
    });
}

/// A fresh in-memory database with the schema applied.
pub async fn test_db() -> DatabaseConnection {
    init_env();
    let db = connect(DatabaseSettings::in_memory_sqlite())
        .await
        .expect("Failed to open in-memory database");
    church_cms::migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    pub client: Client,
    pub upload: UploadConfig,
    uploads: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }

    pub fn upload_root(&self) -> &std::path::Path {
        self.uploads.path()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|config| config).await
}

/// Like `spawn_app` but lets a test tweak the upload settings.
pub async fn spawn_app_with(tweak: impl FnOnce(UploadConfig) -> UploadConfig) -> TestApp {
    let db = test_db().await;
    let uploads = TempDir::new().expect("Failed to create upload dir");
    let upload = tweak(UploadConfig::new(uploads.path()));

    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "ok" }))
        .merge(church_cms::routes::create_routes())
        .layer(axum::middleware::from_fn(
            church_cms::middleware::security::security_headers_middleware,
        ))
        .layer(axum::extract::Extension(db.clone()))
        .layer(axum::extract::Extension(upload.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        db,
        client: Client::new(),
        upload,
        uploads,
    }
}

pub fn editor_token() -> String {
    init_env();
    church_cms::utils::jwt::encode_access_token("editor-1", Role::Editor, Some("편집자")).unwrap()
}

pub fn viewer_token() -> String {
    init_env();
    church_cms::utils::jwt::encode_access_token("member-1", Role::Viewer, Some("성도")).unwrap()
}

/// Creates a board through the API and returns its JSON.
pub async fn create_board(app: &TestApp, fields: Value) -> Value {
    let counter = BOARD_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut body = serde_json::json!({
        "code": format!("board-{}", counter),
        "name": format!("Board {}", counter),
        "board_type": "general",
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }

    let resp = app
        .client
        .post(app.url("/admin/boards"))
        .bearer_auth(editor_token())
        .json(&body)
        .send()
        .await
        .expect("Failed to create board");
    assert_eq!(resp.status(), 200, "board creation failed");
    let body: Value = resp.json().await.unwrap();
    body["data"].clone()
}

/// Creates a post through the API and returns its JSON.
pub async fn create_post(app: &TestApp, board_id: i64, fields: Value) -> Value {
    let mut body = serde_json::json!({
        "board_id": board_id,
        "title": "주일 설교",
        "content": "<p>본문</p>",
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }

    let resp = app
        .client
        .post(app.url("/admin/posts"))
        .bearer_auth(editor_token())
        .json(&body)
        .send()
        .await
        .expect("Failed to create post");
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(status, 200, "post creation failed: {}", body);
    body["data"].clone()
}

/// Smallest valid PNG: 1x1, one transparent pixel.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n1 0 obj<</Type/Catalog>>endobj\ntrailer<</Root 1 0 R>>\n%%EOF\n";
