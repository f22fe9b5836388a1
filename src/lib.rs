//! Transparent POP3 proxy.
//!
//! Sits between mail clients and upstream POP3 servers, routes each user to
//! its server, intercepts retrieved messages for transformation and exposes
//! a separate admin channel for live control.

pub mod admin;
pub mod config;
pub mod context;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use context::ProxyContext;
pub use lifecycle::{Proxy, RunningProxy, Shutdown};
