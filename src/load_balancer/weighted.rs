//! Weighted round-robin load balancing strategy.
//!
//! Uses counter-mod-total-weight scheduling: each route keeps a single
//! rotating counter; selection walks the candidates' cumulative weight to
//! find which backend the counter's position falls into. Over many calls
//! this visits each backend in proportion to its weight without needing to
//! track per-backend "current weight" state across reloads.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::{backend::Backend, healthy_or_all, LoadBalancer};

#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    counters: DashMap<String, AtomicU64>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn select(&self, route_key: &str, backends: &[Arc<Backend>], _client_ip: IpAddr) -> Option<Arc<Backend>> {
        let candidates = healthy_or_all(backends);
        if candidates.is_empty() {
            return None;
        }
        let total_weight: u64 = candidates.iter().map(|b| b.weight.max(1) as u64).sum();
        let counter = self
            .counters
            .entry(route_key.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let target = counter.fetch_add(1, Ordering::Relaxed) % total_weight;

        let mut cumulative = 0u64;
        for backend in &candidates {
            cumulative += backend.weight.max(1) as u64;
            if target < cumulative {
                return Some(backend.clone());
            }
        }
        candidates.last().cloned()
    }
}
