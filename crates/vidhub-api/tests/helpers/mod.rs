//! Shared setup for integration tests.
//!
//! These tests need a reachable Postgres; set `TEST_DATABASE_URL` to
//! run them. Without it every test returns early so the suite stays
//! green on machines without a database.

use axum_test::TestServer;
use std::sync::Arc;

use vidhub_api::AppState;
use vidhub_core::config::{
    AuthConfig, Config, MediaConfig, QueueConfig, RateLimitConfig, ServerConfig, StorageBackend,
    StorageConfig,
};

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    // dropped with the app; keeps blob storage alive for its lifetime
    _storage_dir: tempfile::TempDir,
}

fn test_config(database_url: String, storage_path: String) -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            environment: "test".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            db_max_connections: 5,
            db_timeout_seconds: 10,
        },
        database_url,
        auth: AuthConfig {
            access_token_secret: "test-access-secret-0123456789abcdef".to_string(),
            refresh_token_secret: "test-refresh-secret-0123456789abcde".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            bcrypt_cost: 4,
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_path: Some(storage_path),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
        },
        media: MediaConfig {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            max_video_size_bytes: 50 * 1024 * 1024,
            allowed_formats: vec!["mp4".to_string(), "webm".to_string()],
        },
        queue: QueueConfig {
            database_url: None,
            worker_concurrency: 1,
            poll_interval_ms: 200,
            max_attempts: 3,
            backoff_base_secs: 5,
            processing_timeout_seconds: 60,
            stalled_reap_interval_secs: 0,
            stalled_grace_period_secs: 60,
            retain_completed: 100,
            retain_failed: 200,
        },
        rate_limit: RateLimitConfig {
            per_minute: 10_000,
            auth_attempts: 10_000,
            auth_window_secs: 900,
            uploads_per_hour: 10_000,
        },
    }
}

/// Build the app against `TEST_DATABASE_URL`, or `None` to skip.
pub async fn setup_test_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping integration test");
        return None;
    };

    let storage_dir = tempfile::tempdir().expect("Failed to create temp storage dir");
    let config = test_config(
        database_url,
        storage_dir.path().to_string_lossy().to_string(),
    );

    let (state, router) = vidhub_api::setup::initialize_app(config)
        .await
        .expect("Failed to initialize test app");

    let server = TestServer::new(router).expect("Failed to start test server");
    Some(TestApp {
        server,
        state,
        _storage_dir: storage_dir,
    })
}

/// Registered user with its organization and bearer token.
pub struct TestUser {
    pub access_token: String,
    pub user_id: uuid::Uuid,
    pub organization_id: uuid::Uuid,
}

/// Register a fresh admin with a fresh organization.
pub async fn register_admin(server: &TestServer, org_name: &str) -> TestUser {
    let email = format!("{}@example.com", uuid::Uuid::new_v4());
    let response = server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": email,
            "password": "Abcdef12",
            "name": "Test Admin",
            "organizationName": org_name,
        }))
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());

    let body: serde_json::Value = response.json();
    TestUser {
        access_token: body["access_token"].as_str().unwrap().to_string(),
        user_id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        organization_id: body["user"]["organization_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap(),
    }
}

/// Unique organization name per test run.
pub fn unique_org_name(prefix: &str) -> String {
    format!("{} {}", prefix, uuid::Uuid::new_v4())
}
