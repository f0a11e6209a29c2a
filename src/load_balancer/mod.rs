//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → candidate backend URLs resolved to `Arc<Backend>`
//!     → healthy_or_all() filters out unhealthy backends, falling back to
//!       the full list if every backend is currently unhealthy
//!     → Selector::select() applies the configured algorithm:
//!         - round_robin.rs   (rotate through backends)
//!         - weighted.rs      (rotate, weighted by backend_weights)
//!         - least_conn.rs    (pick backend with fewest active connections)
//!         - ip_hash.rs       (stable hash of client IP)
//!     → backend.connection_guard() tracks the in-flight request
//! ```

pub mod backend;
pub mod ip_hash;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;

use backend::Backend;

use crate::config::schema::LoadBalancerStrategy;

/// Interface for load balancing algorithms.
///
/// `route_key` identifies the route the selection is for (a path prefix or
/// a host name), so stateful algorithms (round-robin, weighted) can keep a
/// separate rotation per route instead of sharing one counter across every
/// route that happens to share a backend.
pub trait LoadBalancer: Send + Sync + Debug {
    fn select(&self, route_key: &str, backends: &[Arc<Backend>], client_ip: IpAddr) -> Option<Arc<Backend>>;
}

/// Filter to healthy backends; if none are healthy, fall back to the full
/// list rather than failing the request outright (per health-check spec).
pub fn healthy_or_all(backends: &[Arc<Backend>]) -> Vec<Arc<Backend>> {
    let healthy: Vec<Arc<Backend>> = backends.iter().filter(|b| b.is_healthy()).cloned().collect();
    if healthy.is_empty() {
        backends.to_vec()
    } else {
        healthy
    }
}

/// Dispatches to the configured load-balancing algorithm.
#[derive(Debug)]
pub enum Selector {
    RoundRobin(round_robin::RoundRobin),
    WeightedRoundRobin(weighted::WeightedRoundRobin),
    LeastConnections(least_conn::LeastConnections),
    IpHash(ip_hash::IpHash),
}

impl Selector {
    pub fn new(strategy: LoadBalancerStrategy) -> Self {
        match strategy {
            LoadBalancerStrategy::RoundRobin => Selector::RoundRobin(round_robin::RoundRobin::new()),
            LoadBalancerStrategy::WeightedRoundRobin => {
                Selector::WeightedRoundRobin(weighted::WeightedRoundRobin::new())
            }
            LoadBalancerStrategy::LeastConnections => Selector::LeastConnections(least_conn::LeastConnections::new()),
            LoadBalancerStrategy::IpHash => Selector::IpHash(ip_hash::IpHash::new()),
        }
    }

    pub fn select(&self, route_key: &str, backends: &[Arc<Backend>], client_ip: IpAddr) -> Option<Arc<Backend>> {
        match self {
            Selector::RoundRobin(lb) => lb.select(route_key, backends, client_ip),
            Selector::WeightedRoundRobin(lb) => lb.select(route_key, backends, client_ip),
            Selector::LeastConnections(lb) => lb.select(route_key, backends, client_ip),
            Selector::IpHash(lb) => lb.select(route_key, backends, client_ip),
        }
    }
}
