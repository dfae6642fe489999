//! # NoteFabric Gateway
//!
//! Client transport over HTTP and WebSocket.
//!
//! ```text
//! GET /ws            bidirectional note protocol
//! GET /health        liveness + engine counters
//! GET /api/v1/notes  note snapshot
//! GET /api/v1/tools  capability catalog
//! ```

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, build_router, start};
