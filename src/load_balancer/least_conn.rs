//! Least-connections load balancing strategy.

use std::net::IpAddr;
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, healthy_or_all, LoadBalancer};

/// Selects the healthy backend with the fewest active connections. Ties
/// break on list order (lowest index wins) for stable, testable behavior.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn select(&self, _route_key: &str, backends: &[Arc<Backend>], _client_ip: IpAddr) -> Option<Arc<Backend>> {
        let candidates = healthy_or_all(backends);
        candidates.into_iter().min_by_key(|b| b.active_connections())
    }
}
