//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the POP3 proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (client and admin addresses).
    pub listener: ListenerConfig,

    /// Default upstream mail server.
    pub upstream: UpstreamConfig,

    /// Per-connection buffer settings.
    pub buffers: BufferConfig,

    /// Admin channel settings.
    pub admin: AdminConfig,

    /// On-disk staging of retrieved messages.
    pub capture: CaptureConfig,

    /// Transformation worker pool.
    pub pipeline: PipelineConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Users routed to a specific upstream at startup.
    pub users: Vec<UserRoute>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for POP3 clients (e.g., "0.0.0.0:4040").
    pub client_address: String,

    /// Bind address for the admin protocol.
    pub admin_address: String,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            client_address: "0.0.0.0:4040".to_string(),
            admin_address: "127.0.0.1:4042".to_string(),
            max_connections: 10_000,
        }
    }
}

/// The upstream used when a user has no registry entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,

    /// Upstream connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 110,
            connect_timeout_secs: 5,
        }
    }
}

/// Buffer sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Inbound backlog ceiling and outbound high-water mark, in bytes.
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024,
        }
    }
}

/// Admin channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret expected by `AUTH`.
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            password: "protos".to_string(),
        }
    }
}

/// Capture staging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory holding `mail<id>.txt` staging files.
    pub directory: String,

    /// Capture ids are recycled modulo this value.
    pub max_slots: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            directory: "mails".to_string(),
            max_slots: 100,
        }
    }
}

/// Transformation pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed number of concurrent transformation jobs.
    pub workers: usize,

    /// Initial state of the text transformation flag.
    pub leet_enabled: bool,

    /// Initial state of the image rotation flag.
    pub rotation_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            leet_enabled: false,
            rotation_enabled: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A user preloaded into the server registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserRoute {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.client_address, "0.0.0.0:4040");
        assert_eq!(config.upstream.port, 110);
        assert_eq!(config.buffers.capacity, 1024 * 1024);
        assert_eq!(config.capture.max_slots, 100);
        assert_eq!(config.pipeline.workers, 10);
        assert!(config.users.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            host = "pop.example.org"

            [[users]]
            name = "alice"
            host = "mail.alice.net"
            port = 995
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream.host, "pop.example.org");
        assert_eq!(config.upstream.port, 110);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].port, 995);
    }
}
