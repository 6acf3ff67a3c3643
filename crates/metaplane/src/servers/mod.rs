//! Server registry
//!
//! Known cluster servers and their tags. The config generator resolves
//! replica tags to server ids through this registry.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use meta_core::ServerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Tag every server carries unless told otherwise
pub const DEFAULT_SERVER_TAG: &str = "default";

/// Server status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    /// Connected, eligible for placement
    #[default]
    Online,
    /// Disconnected
    Offline,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Online => write!(f, "online"),
            ServerStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Server information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: ServerId,
    pub name: String,
    pub tags: BTreeSet<String>,
    pub status: ServerStatus,
    pub registered_at: DateTime<Utc>,
}

impl ServerInfo {
    /// New server with a fresh id and the default tag
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tags: BTreeSet::from([DEFAULT_SERVER_TAG.to_string()]),
            status: ServerStatus::Online,
            registered_at: Utc::now(),
        }
    }

    /// Add tags on top of the default one
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Registration result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterResult {
    /// New server
    NewServer,
    /// Known server came back
    Reconnected,
}

/// Registry of known servers
#[derive(Default)]
pub struct ServerDirectory {
    servers: RwLock<BTreeMap<ServerId, ServerInfo>>,
}

impl ServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register server, replacing any previous entry with the same id
    pub fn register(&self, mut server: ServerInfo) -> RegisterResult {
        server.status = ServerStatus::Online;
        let id = server.id;
        let name = server.name.clone();
        let previous = self.servers.write().insert(id, server);

        if previous.is_none() {
            info!("New server registered: {} ({})", name, id);
            RegisterResult::NewServer
        } else {
            info!("Server re-registered: {} ({})", name, id);
            RegisterResult::Reconnected
        }
    }

    pub fn remove(&self, id: &ServerId) -> Option<ServerInfo> {
        let server = self.servers.write().remove(id);
        if let Some(server) = &server {
            info!("Server {} removed from cluster", server.name);
        }
        server
    }

    pub fn set_status(&self, id: &ServerId, status: ServerStatus) -> bool {
        match self.servers.write().get_mut(id) {
            Some(server) => {
                if server.status != status {
                    info!("Server {} is now {}", server.name, status);
                }
                server.status = status;
                true
            }
            None => {
                warn!("Status change for unknown server: {}", id);
                false
            }
        }
    }

    pub fn get(&self, id: &ServerId) -> Option<ServerInfo> {
        self.servers.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<ServerInfo> {
        self.servers.read().values().cloned().collect()
    }

    pub fn server_name(&self, id: &ServerId) -> Option<String> {
        self.servers.read().get(id).map(|s| s.name.clone())
    }

    pub fn lookup_name(&self, name: &str) -> Option<ServerId> {
        self.servers
            .read()
            .values()
            .find(|s| s.name == name)
            .map(|s| s.id)
    }

    /// Online servers carrying `tag`
    pub fn servers_with_tag(&self, tag: &str) -> BTreeSet<ServerId> {
        self.servers
            .read()
            .values()
            .filter(|s| s.status == ServerStatus::Online && s.has_tag(tag))
            .map(|s| s.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_reconnect() {
        let directory = ServerDirectory::new();
        let server = ServerInfo::new("alpha");
        let id = server.id;

        assert_eq!(directory.register(server.clone()), RegisterResult::NewServer);
        assert!(directory.set_status(&id, ServerStatus::Offline));
        assert_eq!(directory.register(server), RegisterResult::Reconnected);
        assert_eq!(directory.get(&id).map(|s| s.status), Some(ServerStatus::Online));
        assert_eq!(directory.lookup_name("alpha"), Some(id));
    }

    #[test]
    fn test_servers_with_tag_skips_offline() {
        let directory = ServerDirectory::new();
        let a = ServerInfo::new("a").with_tags(["ssd"]);
        let b = ServerInfo::new("b").with_tags(["ssd"]);
        let c = ServerInfo::new("c");
        let (a_id, b_id) = (a.id, b.id);
        directory.register(a);
        directory.register(b);
        directory.register(c);

        assert_eq!(directory.servers_with_tag("ssd").len(), 2);
        assert_eq!(directory.servers_with_tag(DEFAULT_SERVER_TAG).len(), 3);

        directory.set_status(&b_id, ServerStatus::Offline);
        assert_eq!(
            directory.servers_with_tag("ssd"),
            BTreeSet::from([a_id])
        );
        assert!(directory.servers_with_tag("hdd").is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let directory = ServerDirectory::new();
        assert!(directory.remove(&Uuid::new_v4()).is_none());
        assert!(!directory.set_status(&Uuid::new_v4(), ServerStatus::Offline));
    }
}
