//! ytmp3 library crate.
//!
//! Converts remote media URLs into MP3 files by running yt-dlp and ffmpeg as
//! background jobs, with live progress over server-sent events. This module
//! exposes the core functionality for integration testing.

pub mod api;
pub mod config;
pub mod converter;
pub mod error;
pub mod logging;
pub mod utils;

pub use error::{Error, Result};
