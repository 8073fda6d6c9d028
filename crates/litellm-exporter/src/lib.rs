//! # LiteLLM Exporter
//!
//! Binary support: configuration loading, logging setup and the HTTP pull
//! endpoint. Collection itself lives in `litellm-exporter-collector`.

pub mod app;
pub mod config;
pub mod server;
pub mod telemetry;

pub use litellm_exporter_common::VERSION;
