//! Conversion routes.
//!
//! | Method | Path        | Purpose                                   |
//! |--------|-------------|-------------------------------------------|
//! | POST   | `/start`    | create a job from a form-encoded `url`    |
//! | GET    | `/progress` | server-sent progress events for `jobId`   |
//! | GET    | `/status`   | current snapshot of `jobId`               |
//! | GET    | `/file`     | one-time download of the finished MP3     |
//! | HEAD   | `/file`     | artifact headers, without claiming it     |

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeFile;
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::converter::artifact::{ARTIFACT_EXTENSION, ArtifactGuard};
use crate::converter::stream::display_percent;
use crate::converter::{Job, JobStatus, ProgressEvent, progress_events};
use crate::error::Error;
use crate::utils::filename::{ascii_fallback, download_filename, rfc5987_encode};

/// Create the conversion router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_job))
        .route("/progress", get(job_progress))
        .route("/status", get(job_status))
        .route("/file", get(download_file))
}

/// Form body of `POST /start`.
#[derive(Debug, Deserialize)]
pub struct StartJobForm {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub job_id: String,
    pub title: String,
}

/// `?jobId=` query. A missing id behaves like an unknown one.
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    #[serde(default, rename = "jobId")]
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub title: String,
    pub status: JobStatus,
    pub percent: f64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().to_string(),
            title: job.title().to_string(),
            status: job.status(),
            percent: display_percent(job.percent()),
            completed: job.is_completed(),
            error: job.error().map(str::to_string),
            created_at: job.created_at(),
            updated_at: job.updated_at(),
        }
    }
}

/// Validate the URL, resolve its title, register the job and start it.
async fn start_job(
    State(state): State<AppState>,
    Form(form): Form<StartJobForm>,
) -> ApiResult<Json<StartJobResponse>> {
    let url = form.url.trim();
    if url.is_empty() {
        return Err(Error::validation("url is required").into());
    }

    let title = state
        .title_lookup
        .lookup_title(url)
        .await
        .ok_or_else(|| ApiError::bad_request("Could not resolve a title for this URL"))?;

    let job = state.registry.create(title);
    info!(job_id = job.id(), url, title = job.title(), "Job created");
    state.runner.spawn(job.id().to_string(), url.to_string());

    Ok(Json(StartJobResponse {
        job_id: job.id().to_string(),
        title: job.title().to_string(),
    }))
}

/// Stream progress as server-sent events.
///
/// Progress events carry only `data: <percent>`; the stream ends after one
/// `complete` (data: job id) or `error` (data: message) event.
async fn job_progress(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(job_id = %query.job_id, "Progress subscriber connected");
    let events = progress_events(
        &state.registry,
        &query.job_id,
        state.config.progress_interval,
    )
    .map(|event| Ok(sse_event(event)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn sse_event(event: ProgressEvent) -> Event {
    match event {
        ProgressEvent::Progress(percent) => {
            Event::default().data(display_percent(percent).to_string())
        }
        ProgressEvent::Complete(job_id) => Event::default().event("complete").data(job_id),
        ProgressEvent::Error(message) => Event::default().event("error").data(message),
    }
}

async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<JobStatusResponse>> {
    state
        .registry
        .get(&query.job_id)
        .map(|job| Json(JobStatusResponse::from(&job)))
        .ok_or_else(|| Error::not_found("Job", query.job_id).into())
}

/// Serve a completed job's artifact exactly once.
///
/// Only a successful `GET` claims the delivery: the job leaves the registry,
/// so concurrent or repeated requests get 404, and the file is deleted when
/// the response body is dropped. `HEAD` and non-2xx answers such as 416
/// leave the job retrievable.
async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let job = state
        .registry
        .get(&query.job_id)
        .filter(Job::is_completed)
        .ok_or_else(|| ApiError::not_found(format!("No file for job '{}'", query.job_id)))?;

    let path = job
        .file_path()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| ApiError::not_found(format!("No file for job '{}'", job.id())))?;

    if !path.exists() {
        return Err(ApiError::not_found(format!(
            "File for job '{}' is missing",
            job.id()
        )));
    }

    // Only range negotiation is forwarded to the file service.
    let mut builder = Request::builder().method(method.clone());
    for name in [header::RANGE, header::IF_RANGE] {
        if let Some(value) = headers.get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    let req = builder
        .body(Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let response = ServeFile::new(&path)
        .try_call(req)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to serve file: {}", e)))?;

    let (mut parts, body) = response.into_parts();
    let filename = download_filename(job.title(), ARTIFACT_EXTENSION);
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(&filename),
        rfc5987_encode(&filename)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        parts.headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if method == Method::HEAD || !parts.status.is_success() {
        debug!(job_id = job.id(), %method, status = %parts.status, "Artifact not claimed");
        return Ok(Response::from_parts(parts, Body::new(body)));
    }

    // A concurrent request may have claimed it while this one was being prepared.
    if state.registry.take_completed(job.id()).is_none() {
        return Err(ApiError::not_found(format!(
            "No file for job '{}'",
            job.id()
        )));
    }
    let guard = ArtifactGuard::new(&path);

    info!(job_id = job.id(), status = %parts.status, filename = %filename, "Serving artifact");

    let body = Body::from_stream(GuardedStream {
        inner: Body::new(body).into_data_stream(),
        _guard: guard,
    });
    Ok(Response::from_parts(parts, body).into_response())
}

/// Body stream that keeps an [`ArtifactGuard`] alive until it is dropped.
struct GuardedStream<S> {
    inner: S,
    _guard: ArtifactGuard,
}

impl<S> Stream for GuardedStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_shape() {
        let mut job = Job::new("abc", "Song");
        job.start();
        job.advance(33.333);
        let json = serde_json::to_value(JobStatusResponse::from(&job)).unwrap();
        assert_eq!(json["jobId"], "abc");
        assert_eq!(json["status"], "running");
        assert_eq!(json["percent"], 33.3);
        assert_eq!(json["completed"], false);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_start_response_is_camel_case() {
        let json = serde_json::to_value(StartJobResponse {
            job_id: "abc".to_string(),
            title: "Song".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"jobId": "abc", "title": "Song"}));
    }
}
