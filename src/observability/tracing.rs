//! Request correlation IDs.
//!
//! Every accepted connection gets a fresh UUID v4 the dispatch loop can
//! attach to its log lines and, on the proxy path, forward to the backend
//! as `X-Request-Id` so a single request can be traced across both sides.

use uuid::Uuid;

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
