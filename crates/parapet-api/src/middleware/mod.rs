//! # Middleware
//!
//! Tower/Axum middleware for the API surface. Auth lives in
//! `crate::auth`; this module carries the Prometheus metrics layer.

pub mod metrics;
