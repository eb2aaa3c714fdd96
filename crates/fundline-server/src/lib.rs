//! Fundline HTTP server.
//!
//! Serves the built marketing frontend (static assets plus SPA fallback)
//! and the JSON endpoints behind it: lead capture and the analytics tracker.
//! Security headers, a per-IP rate limit on writes, and a concurrency
//! ceiling with load shedding wrap every request.

pub mod artifact;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod webhook;
