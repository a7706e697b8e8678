//! Tool routing
//!
//! The conversation engine sees tools only through the [`ToolRouter`]
//! capability: a catalog plus name-based invocation. Two routers implement it:
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────────────────┐
//! │ SingleBackendRouter  │      │ AggregatedRouter                     │
//! │                      │      │                                      │
//! │  one ToolBackend     │      │  DiscoveryResolver ─► address set    │
//! │  (stdio or http)     │      │  BackendConnector  ─► ToolBackends   │
//! └──────────────────────┘      │  tool index rebuilt every interval   │
//!                               └──────────────────────────────────────┘
//! ```
//!
//! Backends are MCP connections (`McpClient`) in production and
//! `LocalBackend`s in tests.

mod aggregated;
mod backend;
mod error;
mod local;
mod router;
mod single;

pub use aggregated::AggregatedRouter;
pub use backend::{BackendConnector, McpConnector, ToolBackend};
pub use error::{RouterError, RouterResult};
pub use local::{LocalBackend, LocalConnector};
pub use router::ToolRouter;
pub use single::SingleBackendRouter;
