//! Shared helpers for the HTTP-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use ytmp3::api::AppState;
use ytmp3::api::routes::create_router;
use ytmp3::config::ConverterConfig;
use ytmp3::converter::TitleLookup;

/// Title lookup that answers every URL except those containing `no-title`.
pub struct FakeTitleLookup;

#[async_trait]
impl TitleLookup for FakeTitleLookup {
    async fn lookup_title(&self, url: &str) -> Option<String> {
        if url.contains("no-title") {
            None
        } else {
            Some("Fake Title".to_string())
        }
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Router plus the directories it writes to.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub shutdown: CancellationToken,
    pub root: TempDir,
}

impl TestApp {
    /// Build an app whose converter writes below a fresh temp dir.
    pub fn new(configure: impl FnOnce(&mut ConverterConfig)) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let mut config = ConverterConfig {
            artifact_dir: root.path().join("artifacts"),
            work_dir: root.path().join("work"),
            progress_interval: Duration::from_millis(20),
            job_timeout: Some(Duration::from_secs(30)),
            ..ConverterConfig::default()
        };
        configure(&mut config);

        let shutdown = CancellationToken::new();
        let state = AppState::new(config, Arc::new(FakeTitleLookup), shutdown.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            shutdown,
            root,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    /// `POST /start` with a form-encoded `url`.
    pub async fn start(&self, url: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/start")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("url={}", urlencoding::encode(url))))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// `GET /progress`, read until the stream ends.
    pub async fn progress(&self, job_id: &str) -> Vec<SseEvent> {
        let request = Request::builder()
            .uri(format!("/progress?jobId={}", job_id))
            .body(Body::empty())
            .unwrap();
        let response = self.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = tokio::time::timeout(
            Duration::from_secs(30),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("Progress stream did not end")
        .unwrap();
        parse_sse(&String::from_utf8_lossy(&bytes))
    }

    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub fn artifact_dir(&self) -> std::path::PathBuf {
        self.root.path().join("artifacts")
    }

    pub fn work_dir(&self) -> std::path::PathBuf {
        self.root.path().join("work")
    }
}

/// Parse an SSE body into events; comments (keep-alives) are skipped.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
            }
            (event.is_some() || !data.is_empty()).then(|| SseEvent {
                event,
                data: data.join("\n"),
            })
        })
        .collect()
}

/// Percentages from the plain `data:` events.
pub fn percents(events: &[SseEvent]) -> Vec<f64> {
    events
        .iter()
        .filter(|e| e.event.is_none())
        .map(|e| e.data.parse::<f64>().expect("Progress data is a number"))
        .collect()
}

pub fn assert_non_decreasing(values: &[f64]) {
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "progress regressed: {:?}", values);
    }
}

pub fn dir_is_empty(path: &std::path::Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
