//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared context from validated configuration
//! - Prepare the capture directory
//! - Bind the client and admin listeners
//! - Spawn both reactors and join them on shutdown
//!
//! # Design Decisions
//! - Fail fast: a bind or capture-directory failure is fatal
//! - Listeners are bound before any reactor runs, so callers learn the
//!   actual addresses (port 0 in tests) before traffic starts
//! - Session drain after the reactors stop is bounded

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin;
use crate::config::ProxyConfig;
use crate::context::ProxyContext;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::proxy;

/// How long sessions get to finish after the reactors stop.
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {listener} listener: {source}")]
    Bind {
        listener: &'static str,
        #[source]
        source: ListenerError,
    },
    #[error("failed to prepare capture directory {path}: {source}")]
    CaptureDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A proxy with its listeners bound, not yet serving.
pub struct Proxy {
    context: Arc<ProxyContext>,
    client: Listener,
    admin: Listener,
}

impl Proxy {
    pub async fn bind(config: &ProxyConfig) -> Result<Self, StartupError> {
        Self::bind_with(config, Shutdown::new()).await
    }

    /// Bind using an existing stop flag.
    pub async fn bind_with(config: &ProxyConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        tokio::fs::create_dir_all(&config.capture.directory)
            .await
            .map_err(|source| StartupError::CaptureDirectory {
                path: config.capture.directory.clone(),
                source,
            })?;

        let max_connections = config.listener.max_connections;
        let client = Listener::bind("client", &config.listener.client_address, max_connections)
            .await
            .map_err(|source| StartupError::Bind { listener: "client", source })?;
        let admin = Listener::bind("admin", &config.listener.admin_address, max_connections)
            .await
            .map_err(|source| StartupError::Bind { listener: "admin", source })?;

        Ok(Self {
            context: Arc::new(ProxyContext::new(config, shutdown)),
            client,
            admin,
        })
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    /// Spawn both reactors.
    pub fn run(self) -> Result<RunningProxy, StartupError> {
        let client_addr = local_addr(&self.client, "client")?;
        let admin_addr = local_addr(&self.admin, "admin")?;

        let shutdown = &self.context.shutdown;
        let ctx = self.context.clone();
        let client = tokio::spawn(self.client.serve(shutdown.subscribe(), move |stream, peer| {
            proxy::serve(stream, peer, ctx.clone())
        }));
        let ctx = self.context.clone();
        let admin = tokio::spawn(self.admin.serve(shutdown.subscribe(), move |stream, peer| {
            admin::serve(stream, peer, ctx.clone())
        }));

        tracing::info!(client = %client_addr, admin = %admin_addr, "Proxy running");
        Ok(RunningProxy {
            client_addr,
            admin_addr,
            context: self.context,
            reactors: vec![client, admin],
        })
    }
}

fn local_addr(listener: &Listener, name: &'static str) -> Result<SocketAddr, StartupError> {
    listener.local_addr().map_err(|e| StartupError::Bind {
        listener: name,
        source: ListenerError::Bind(e),
    })
}

/// Handle to a serving proxy.
pub struct RunningProxy {
    pub client_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    context: Arc<ProxyContext>,
    reactors: Vec<JoinHandle<()>>,
}

impl RunningProxy {
    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    /// Set the stop flag.
    pub fn shutdown(&self) {
        self.context.shutdown.trigger();
    }

    /// Wait for the stop flag, join the reactors, then give sessions a bounded
    /// window to finish.
    pub async fn wait(self) {
        for reactor in self.reactors {
            if let Err(e) = reactor.await {
                tracing::error!(error = %e, "Reactor task failed");
            }
        }

        let open = self.context.sessions.active_count() + self.context.admins.active_count();
        if open > 0 {
            tracing::info!(open, "Waiting for sessions to drain");
        }
        let drained = self.context.sessions.wait_for_drain(DRAIN_LIMIT).await
            && self.context.admins.wait_for_drain(DRAIN_LIMIT).await;
        if !drained {
            tracing::warn!("Sessions still open after drain limit");
        }
        tracing::info!("Proxy stopped");
    }
}
