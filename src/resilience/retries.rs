//! Retry logic and retry budget management.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A simple token-bucket-like retry budget.
///
/// Prevents retry storms by limiting the ratio of retried requests to total
/// requests once enough traffic has been seen to make that ratio meaningful.
#[derive(Debug)]
pub struct RetryBudget {
    total_requests: AtomicUsize,
    total_retries: AtomicUsize,
    buffer_ratio: f32,
    min_requests: usize,
}

impl RetryBudget {
    pub fn new(buffer_ratio: f32, min_requests: usize) -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
            total_retries: AtomicUsize::new(0),
            buffer_ratio,
            min_requests,
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Try to acquire a retry token. Returns true if the retry is allowed.
    pub fn can_retry(&self) -> bool {
        let total = self.total_requests.load(Ordering::Relaxed);
        let retries = self.total_retries.load(Ordering::Relaxed);

        if total < self.min_requests {
            self.total_retries.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let current_ratio = retries as f32 / total as f32;
        if current_ratio < self.buffer_ratio {
            self.total_retries.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        false
    }
}

/// Whether a request may be retried against an alternate backend.
///
/// `method` is the raw HTTP method string; `status` is the upstream's
/// response status if one was received at all; `connection_error` is true
/// when the attempt failed before a status line was ever read.
pub fn is_retryable(method: &str, status: Option<u16>, connection_error: bool) -> bool {
    let idempotent = matches!(method, "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS");
    if !idempotent {
        return false;
    }

    if connection_error {
        return true;
    }

    matches!(status, Some(502) | Some(503) | Some(504))
}
