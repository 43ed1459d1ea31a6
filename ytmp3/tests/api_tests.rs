//! HTTP-level tests that never reach an external tool.

mod common;

use axum::body::to_bytes;
use axum::http::StatusCode;
use common::TestApp;

mod start_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_is_rejected_without_creating_a_job() {
        let app = TestApp::new(|_| {});

        let (status, body) = app.start("").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(app.state.registry.is_empty());

        let (status, _) = app.start("   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_is_rejected() {
        let app = TestApp::new(|_| {});

        let (status, body) = app.start("https://example.com/no-title").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("title"));
        assert!(app.state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_valid_url_creates_job() {
        // The acquisition tool does not exist, so the job fails right away.
        let app = TestApp::new(|config| {
            config.ytdlp_path = "/nonexistent/yt-dlp".to_string();
        });

        let (status, body) = app.start("https://example.com/watch?v=1").await;
        assert_eq!(status, StatusCode::OK);
        let job_id = body["jobId"].as_str().unwrap();
        assert!(!job_id.is_empty());
        assert_eq!(body["title"], "Fake Title");

        let events = app.progress(job_id).await;
        let last = events.last().unwrap();
        assert_eq!(last.event.as_deref(), Some("error"));
        assert!(last.data.contains("yt-dlp"));
    }
}

mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_job_progress_is_empty() {
        let app = TestApp::new(|_| {});
        assert!(app.progress("does-not-exist").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_job_id_progress_is_empty() {
        let app = TestApp::new(|_| {});
        assert!(app.progress("").await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_file_is_not_found() {
        let app = TestApp::new(|_| {});
        let response = app.get("/file?jobId=does-not-exist").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unfinished_job_file_is_not_found_and_job_survives() {
        let app = TestApp::new(|_| {});
        let job = app.state.registry.create("Song");

        let response = app.get(&format!("/file?jobId={}", job.id())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(app.state.registry.get(job.id()).is_some());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let app = TestApp::new(|_| {});
        let job = app.state.registry.create("Song");
        app.state.registry.start(job.id());
        app.state.registry.advance(job.id(), 42.0);

        let response = app.get(&format!("/status?jobId={}", job.id())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["jobId"], job.id());
        assert_eq!(json["percent"], 42.0);
        assert_eq!(json["status"], "running");

        let response = app.get("/status?jobId=missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new(|_| {});
        app.state.registry.create("Song");

        let response = app.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_jobs"], 1);
    }
}
