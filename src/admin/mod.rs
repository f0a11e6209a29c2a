//! Admin JSON surface: health/metrics/stats, route and circuit inspection,
//! and a handful of mutating endpoints (reload, resets, config update).
//!
//! Disabled by default; see [`auth::authenticate`] for the auth rules and
//! [`handlers::dispatch`] for the endpoint table.

pub mod auth;
pub mod handlers;
