//! Shared proxy state.
//!
//! One [`ProxyContext`] is built at startup and handed by `Arc` to both
//! reactors, every session and the admin channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::ConnectionTracker;
use crate::observability::Statistics;
use crate::pipeline::{CaptureSlots, TransformFlags, TransformPool};
use crate::routing::{ServerRegistry, Upstream};

#[derive(Debug)]
pub struct ProxyContext {
    pub registry: ServerRegistry,
    pub stats: Statistics,
    pub flags: Arc<TransformFlags>,
    pub pool: TransformPool,
    pub captures: CaptureSlots,
    pub shutdown: Shutdown,
    /// Live client sessions.
    pub sessions: ConnectionTracker,
    /// Live admin sessions.
    pub admins: ConnectionTracker,
    pub buffer_capacity: usize,
    pub connect_timeout: Duration,
    admin_password: ArcSwap<String>,
}

impl ProxyContext {
    pub fn new(config: &ProxyConfig, shutdown: Shutdown) -> Self {
        let flags = Arc::new(TransformFlags::new(
            config.pipeline.leet_enabled,
            config.pipeline.rotation_enabled,
        ));
        Self {
            registry: ServerRegistry::from_config(&config.upstream, &config.users),
            stats: Statistics::new(),
            pool: TransformPool::new(config.pipeline.workers, flags.clone()),
            flags,
            captures: CaptureSlots::new(PathBuf::from(&config.capture.directory), config.capture.max_slots),
            shutdown,
            sessions: ConnectionTracker::new(),
            admins: ConnectionTracker::new(),
            buffer_capacity: config.buffers.capacity,
            connect_timeout: Duration::from_secs(config.upstream.connect_timeout_secs),
            admin_password: ArcSwap::from_pointee(config.admin.password.clone()),
        }
    }

    pub fn admin_password(&self) -> Arc<String> {
        self.admin_password.load_full()
    }

    /// Apply the settings that can change without a restart.
    pub fn apply_reload(&self, config: &ProxyConfig) {
        let upstream = Upstream::from(&config.upstream);
        if *self.registry.default_upstream() != upstream {
            self.registry.set_default(upstream);
        }
        if *self.admin_password.load_full() != config.admin.password {
            tracing::info!("Admin password updated");
            self.admin_password.store(Arc::new(config.admin.password.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_swaps_default_and_password_only() {
        let mut config = ProxyConfig::default();
        let ctx = ProxyContext::new(&config, Shutdown::new());
        assert_eq!(ctx.admin_password().as_str(), "protos");

        config.upstream.host = "pop.example.org".to_string();
        config.admin.password = "hunter2".to_string();
        config.buffers.capacity = 4096;
        ctx.apply_reload(&config);

        assert_eq!(ctx.registry.resolve("anyone"), Upstream::new("pop.example.org", 110));
        assert_eq!(ctx.admin_password().as_str(), "hunter2");
        assert_eq!(ctx.buffer_capacity, 1024 * 1024);
    }
}
