//! HTTP download client
//!
//! This module provides the network side of the installer: a tuned HTTP
//! client with rate limiting, the streaming download engine with mandatory
//! digest verification, and the retry coordinator that walks mirror
//! candidates with exponential backoff.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with rate limiting and status mapping
//! - `download`: Streaming downloads with staging and atomic promotion
//! - `retry`: Bounded retries with mirror fallback

pub mod config;
pub mod download;
pub mod http;
pub mod retry;

pub use config::ClientConfig;
pub use download::{DownloadEngine, FetchSummary};
pub use http::HttpHandler;
pub use retry::{RetryConfig, RetryCoordinator};
