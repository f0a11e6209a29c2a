//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (host routes checked first, then longest path prefix)
//!     → matcher.rs (host normalization, longest-prefix matching)
//!     → Return: ResolvedRoute or None
//!
//! Route Compilation (at startup and on reload):
//!     ProxyConfig.{path_routes, domain_routes}
//!     → build backend/alternate lists per route via BackendRegistry
//!     → freeze as an immutable snapshot, published via ArcSwap
//! ```

pub mod matcher;
pub mod router;

pub use router::Router;
