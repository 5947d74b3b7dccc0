mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::EnvGuard;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use phishscan::{app, build_state_from_env, AppConfig};
use tokio::sync::Mutex;
use tower::ServiceExt;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const VARS: &[&str] = &[
    "PHISHSCAN_SERVICE_CONFIG",
    "VIRUSTOTAL_API_KEY",
    "GOOGLE_SAFEBROWSING_API_KEY",
    "OPENAI_API_KEY",
    "PHISHSCAN_RATE_LIMIT_PER_MINUTE",
    "PHISHSCAN_CALL_TIMEOUT_MS",
    "PHISHSCAN_REQUEST_BUDGET_MS",
    "PHISHSCAN_URL_CONCURRENCY",
    "PHISHSCAN_MAX_REQUEST_BYTES",
    "PHISHSCAN_ALLOWED_ORIGINS",
];

fn clean_env() -> EnvGuard {
    let mut env = EnvGuard::new();
    for var in VARS {
        env.remove(var);
    }
    env
}

#[tokio::test]
async fn rejects_non_numeric_limits() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = clean_env();
    env.set("PHISHSCAN_RATE_LIMIT_PER_MINUTE", "lots");

    let err = AppConfig::from_env().expect_err("expected invalid number to error");
    assert!(format!("{}", err).contains("PHISHSCAN_RATE_LIMIT_PER_MINUTE"));
    assert!(build_state_from_env().await.is_err());
}

#[tokio::test]
async fn rejects_malformed_service_config() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = clean_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");
    std::fs::write(&path, "{ \"virustotal\": ").unwrap();
    env.set("PHISHSCAN_SERVICE_CONFIG", path.to_str().unwrap());

    let err = AppConfig::from_env().expect_err("expected invalid JSON to error");
    assert!(format!("{:#}", err).contains("invalid JSON configuration"));
}

#[tokio::test]
async fn environment_drives_served_limits() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = clean_env();
    env.set_many(&[
        ("PHISHSCAN_RATE_LIMIT_PER_MINUTE", "12"),
        ("PHISHSCAN_REQUEST_BUDGET_MS", "9000"),
    ]);

    let router = app(build_state_from_env().await.unwrap());
    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(raw["rateLimitPerMinute"], 12);
    assert_eq!(raw["requestBudgetMs"], 9000);
}

#[tokio::test]
async fn blank_credentials_are_treated_as_missing() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = clean_env();
    env.set("VIRUSTOTAL_API_KEY", "   ");
    env.set("OPENAI_API_KEY", "sk-test");

    let cfg = AppConfig::from_env().unwrap();
    assert!(cfg.service.virustotal.api_key.is_none());
    assert_eq!(cfg.service.text_generation.api_key.as_deref(), Some("sk-test"));
}
