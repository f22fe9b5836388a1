//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Build ProxyContext → Bind listeners → Spawn reactors
//!
//! Shutdown (shutdown.rs):
//!     FINALIZE / signal → Stop flag set → Reactors leave their loops
//!     → Sessions finish current iteration → Join → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then shared state, then listeners
//! - A bind failure is the only fatal runtime error
//! - Session drain after the reactors stop is bounded

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{Proxy, RunningProxy, StartupError};
