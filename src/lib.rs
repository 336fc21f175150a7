//! Quotagate - Per-key Request Admission Control
//!
//! This crate decides how much of a request-count limit and a time quota
//! remains for a caller identified by a key, and persists the updated window
//! through a pluggable storage backend. Gateways call
//! [`RateLimiterBackend::consume`](ratelimit::RateLimiterBackend::consume)
//! once per request and turn a negative counter into a deny.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod storage;
