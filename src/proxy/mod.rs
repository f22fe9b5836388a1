//! POP3 proxying engine.
//!
//! # Data Flow
//! ```text
//! Client bytes → session.rs (framing)
//!     → client.rs (validate, route USER, rewrite DELE)
//!     → upstream outbound buffer
//! Upstream bytes → session.rs (framing)
//!     → server.rs (interpret by last command)
//!     → client outbound buffer, or capture → pipeline → client
//! ```
//!
//! # Design Decisions
//! - The state machines are pure: lines in, effects out
//! - One task owns each session; nothing else touches its sockets
//! - Client lines wait while a forwarded command is unanswered

pub mod client;
pub mod command;
pub mod dialog;
pub mod server;
pub mod session;

pub use command::{Command, Request};
pub use dialog::{Dialog, Effect, SessionState};
pub use session::{serve, SessionError};
