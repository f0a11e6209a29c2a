//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loop, per-connection dispatch)
//!     → http1 (shared framing: parse headers, relay bodies)
//!     → [routing layer decides backend or file root]
//!     → [load balancer picks a backend, if more than one]
//!     → proxy.rs / static_handler.rs / websocket.rs (dispatch target)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Hand-rolled HTTP/1.1 framing, no HTTP/2 (see DESIGN.md)
//! - Request size limits enforced before full parse
//! - Request ID generated for every request (correlation)

pub mod proxy;
pub mod server;
pub mod static_handler;
pub mod websocket;
