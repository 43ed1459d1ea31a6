//! HTTP API.
//!
//! Thin axum layer over the converter: request validation, job creation, the
//! progress event stream and one-shot artifact delivery.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
