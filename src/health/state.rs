//! Backend health state machine.
//!
//! The hysteresis counters and the healthy/unhealthy flag themselves live on
//! [`crate::load_balancer::backend::Backend`] so load-balancer selection and
//! health reporting read the same state without a second source of truth.
//! This module provides the read-only view used by health checking and the
//! admin surface.
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= failure_threshold
//! Unhealthy → Healthy: consecutive successes >= success_threshold
//! ```

use crate::load_balancer::backend::Backend;

/// Point-in-time health view of one backend, suitable for JSON rendering.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendHealthSnapshot {
    pub url: String,
    pub healthy: bool,
    pub active_connections: usize,
}

pub fn snapshot(backend: &Backend) -> BackendHealthSnapshot {
    BackendHealthSnapshot {
        url: backend.url.clone(),
        healthy: backend.is_healthy(),
        active_connections: backend.active_connections(),
    }
}
