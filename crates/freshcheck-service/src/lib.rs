//! freshcheck Service
//!
//! The serving facade over a model registry, its configuration and the
//! `freshcheck` command-line interface.

pub mod config;
pub mod service;

pub use config::{ConfigOverrides, ServiceConfig};
pub use service::{describe_metrics, Classification, FreshnessService};
