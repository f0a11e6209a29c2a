//! Round-robin load balancing strategy.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::{backend::Backend, healthy_or_all, LoadBalancer};

/// Round-robin selector. Keeps one rotation counter per route so unrelated
/// routes sharing a backend don't perturb each other's rotation.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, route_key: &str, backends: &[Arc<Backend>], _client_ip: IpAddr) -> Option<Arc<Backend>> {
        let candidates = healthy_or_all(backends);
        if candidates.is_empty() {
            return None;
        }
        let counter = self
            .counters
            .entry(route_key.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let idx = counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_backends() {
        let lb = RoundRobin::new();
        let b1 = Arc::new(Backend::new("http://127.0.0.1:8080", 1).unwrap());
        let b2 = Arc::new(Backend::new("http://127.0.0.1:8081", 1).unwrap());
        let backends = vec![b1.clone(), b2.clone()];
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        let s1 = lb.select("/", &backends, ip).unwrap();
        assert_eq!(s1.url, b1.url);
        let s2 = lb.select("/", &backends, ip).unwrap();
        assert_eq!(s2.url, b2.url);
        let s3 = lb.select("/", &backends, ip).unwrap();
        assert_eq!(s3.url, b1.url);
    }

    #[test]
    fn skips_unhealthy_backends() {
        let lb = RoundRobin::new();
        let b1 = Arc::new(Backend::new("http://127.0.0.1:8080", 1).unwrap());
        let b2 = Arc::new(Backend::new("http://127.0.0.1:8081", 1).unwrap());
        b1.mark_failure(1);
        let backends = vec![b1.clone(), b2.clone()];
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..4 {
            let s = lb.select("/", &backends, ip).unwrap();
            assert_eq!(s.url, b2.url);
        }
    }

    #[test]
    fn falls_back_to_full_list_when_all_unhealthy() {
        let lb = RoundRobin::new();
        let b1 = Arc::new(Backend::new("http://127.0.0.1:8080", 1).unwrap());
        b1.mark_failure(1);
        let backends = vec![b1.clone()];
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(lb.select("/", &backends, ip).is_some());
    }
}
