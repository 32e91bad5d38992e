//! Risk scorer service
//!
//! Loads model artifacts once at startup and serves health, readiness,
//! Prometheus metrics and a small scoring API over one shared pipeline.

pub mod api;
pub mod config;
