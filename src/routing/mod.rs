//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! USER <name> (client side)
//!     → registry.rs (lookup name)
//!     → hit: registered (host, port)
//!     → miss: default upstream
//!
//! SETSERVER <name> <host> <port> (admin side)
//!     → registry.rs (upsert)
//! ```
//!
//! # Design Decisions
//! - Lookups never block writers and vice versa
//! - Routing is decided once per session, at USER time

pub mod registry;

pub use registry::{ServerRegistry, Upstream};
