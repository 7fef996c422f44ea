//! cvguard - request throttling for the CV builder web application
//!
//! This crate implements an in-memory, fixed-window rate limiter keyed by
//! client identifier and protected resource, together with the axum
//! middleware and decision service that put it in front of request handlers.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
