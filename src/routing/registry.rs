//! Username → upstream server registry.
//!
//! # Responsibilities
//! - Resolve the upstream for a POP3 user (default server on miss)
//! - Accept live updates from the admin channel
//! - List registered users
//!
//! # Design Decisions
//! - `DashMap` for concurrent lookup/insert without a registry-wide lock
//! - The default upstream sits behind `ArcSwap` so config reloads can swap it

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::{UpstreamConfig, UserRoute};

/// An upstream POP3 server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<&UpstreamConfig> for Upstream {
    fn from(config: &UpstreamConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Shared mapping from usernames to the upstream holding their mailbox.
#[derive(Debug)]
pub struct ServerRegistry {
    entries: DashMap<String, Upstream>,
    default: ArcSwap<Upstream>,
}

impl ServerRegistry {
    pub fn new(default: Upstream) -> Self {
        Self {
            entries: DashMap::new(),
            default: ArcSwap::from_pointee(default),
        }
    }

    /// Build a registry preloaded with the configured users.
    pub fn from_config(default: &UpstreamConfig, users: &[UserRoute]) -> Self {
        let registry = Self::new(Upstream::from(default));
        for user in users {
            registry.set_server(user.name.clone(), Upstream::new(user.host.clone(), user.port));
        }
        registry
    }

    /// The upstream for `user`, falling back to the default server.
    pub fn resolve(&self, user: &str) -> Upstream {
        match self.entries.get(user) {
            Some(entry) => entry.value().clone(),
            None => self.default.load().as_ref().clone(),
        }
    }

    /// The registered upstream for `user`, if any.
    pub fn lookup(&self, user: &str) -> Option<Upstream> {
        self.entries.get(user).map(|entry| entry.value().clone())
    }

    /// Insert or replace the upstream for `user`. Returns the previous entry.
    pub fn set_server(&self, user: impl Into<String>, upstream: Upstream) -> Option<Upstream> {
        let user = user.into();
        tracing::info!(user = %user, upstream = %upstream, "Registry entry set");
        self.entries.insert(user, upstream)
    }

    /// Registered usernames, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_upstream(&self) -> Arc<Upstream> {
        self.default.load_full()
    }

    pub fn set_default(&self, upstream: Upstream) {
        tracing::info!(upstream = %upstream, "Default upstream replaced");
        self.default.store(Arc::new(upstream));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ServerRegistry {
        ServerRegistry::new(Upstream::new("pop.default.net", 110))
    }

    #[test]
    fn unregistered_user_routes_to_default() {
        let registry = registry();
        assert_eq!(registry.resolve("alice"), Upstream::new("pop.default.net", 110));
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn registered_user_routes_to_its_server() {
        let registry = registry();
        assert!(registry.set_server("bob", Upstream::new("mail.bob.com", 995)).is_none());
        assert_eq!(registry.resolve("bob"), Upstream::new("mail.bob.com", 995));

        let previous = registry.set_server("bob", Upstream::new("mail2.bob.com", 110));
        assert_eq!(previous, Some(Upstream::new("mail.bob.com", 995)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn users_are_sorted() {
        let registry = registry();
        registry.set_server("carol", Upstream::new("c", 1));
        registry.set_server("alice", Upstream::new("a", 1));
        assert_eq!(registry.users(), vec!["alice".to_string(), "carol".to_string()]);
    }

    #[test]
    fn default_can_be_swapped() {
        let registry = registry();
        registry.set_default(Upstream::new("pop.new.net", 1110));
        assert_eq!(registry.resolve("nobody").to_string(), "pop.new.net:1110");
    }

    #[test]
    fn preloads_configured_users() {
        let users = vec![UserRoute {
            name: "dave".into(),
            host: "mail.dave.org".into(),
            port: 110,
        }];
        let registry = ServerRegistry::from_config(&UpstreamConfig::default(), &users);
        assert_eq!(registry.lookup("dave"), Some(Upstream::new("mail.dave.org", 110)));
        assert_eq!(registry.resolve("eve"), Upstream::new("localhost", 110));
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        registry.set_server(format!("user{}-{}", i, j), Upstream::new("h", 1));
                        let _ = registry.resolve("missing");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}
