//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, stop flag)
//!     → connection.rs (identity, live-connection tracking)
//!     → framing.rs (bytes → lines, partial outbound writes)
//!     → Hand off to proxy::session or admin
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Framing is transport-agnostic and unit tested without sockets

pub mod connection;
pub mod framing;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use framing::{FrameError, LineBuffer, OutboundBuffer};
pub use listener::{Listener, ListenerError};
