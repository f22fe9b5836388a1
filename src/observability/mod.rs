//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, pipeline and admin produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (Statistics counters, mirrored to the metrics facade)
//!
//! Consumers:
//!     → stdout
//!     → admin RETRSTATS snapshot
//!     → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Connection and session ids flow through every log event
//! - Counters are plain atomics, never locks

pub mod logging;
pub mod metrics;

pub use metrics::{Statistics, StatusCode};
