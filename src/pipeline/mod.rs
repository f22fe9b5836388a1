//! Transformation pipeline.
//!
//! # Data Flow
//! ```text
//! Session captures a RETR reply line by line:
//!     → capture.rs (staging file mail<id>.txt)
//!     → pool.rs (bounded worker, blocking pool)
//!         → outline.rs (line offsets of body, HTML, images)
//!         → transform/ (leet, rotation; each gated by flags.rs)
//!     → Delivery chunks on the session's queue
//!     → Session writes them to the client
//! ```
//!
//! # Design Decisions
//! - Workers own a capture exclusively and never see a socket
//! - Transforms rewrite the staging file through an atomic rename
//! - Failures are logged and swallowed; completion is always reported

pub mod capture;
pub mod flags;
pub mod outline;
pub mod pool;
pub mod transform;

pub use capture::{Capture, CaptureSlots, ParsedCapture, SealedCapture};
pub use flags::{Feature, TransformFlags};
pub use outline::MailOutline;
pub use pool::{Delivery, TransformPool};
