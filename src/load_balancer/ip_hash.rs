//! IP-hash load balancing strategy: a given client IP always lands on the
//! same backend among the currently healthy set (sticky until health
//! status or the backend list itself changes).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, healthy_or_all, LoadBalancer};

#[derive(Debug, Default)]
pub struct IpHash;

impl IpHash {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for IpHash {
    fn select(&self, _route_key: &str, backends: &[Arc<Backend>], client_ip: IpAddr) -> Option<Arc<Backend>> {
        let candidates = healthy_or_all(backends);
        if candidates.is_empty() {
            return None;
        }
        let mut hasher = DefaultHasher::new();
        client_ip.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % candidates.len();
        Some(candidates[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_ip_always_maps_to_same_backend() {
        let lb = IpHash::new();
        let b1 = Arc::new(Backend::new("http://127.0.0.1:8080", 1).unwrap());
        let b2 = Arc::new(Backend::new("http://127.0.0.1:8081", 1).unwrap());
        let backends = vec![b1, b2];
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        let first = lb.select("/", &backends, ip).unwrap().url.clone();
        for _ in 0..5 {
            let again = lb.select("/", &backends, ip).unwrap();
            assert_eq!(again.url, first);
        }
    }
}
