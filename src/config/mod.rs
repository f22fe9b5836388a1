//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once at startup by lifecycle::startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ProxyContext::apply_reload swaps the live settings
//! ```
//!
//! # Design Decisions
//! - Only the default upstream and the admin password are live-reloadable;
//!   listener addresses, buffer capacity and pool size need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BufferConfig, CaptureConfig, ListenerConfig, ObservabilityConfig,
    PipelineConfig, ProxyConfig, UpstreamConfig, UserRoute,
};
