//! Config store interface: persistence of saved connections and groups.
//!
//! The host application owns the actual persistence (disk, settings
//! database); the core consumes this trait and never depends on the
//! ordering of returned lists.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{ConnectionConfig, ConnectionGroup};
use crate::error::{MammothError, Result};

/// Persistence operations for [`ConnectionConfig`] and [`ConnectionGroup`].
pub trait ConfigStore: Send + Sync {
    fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionConfig>>;
    fn get_all_connections(&self) -> Result<Vec<ConnectionConfig>>;
    /// Insert or replace a saved connection.
    fn save_connection(&self, config: &ConnectionConfig) -> Result<()>;
    fn delete_connection(&self, id: Uuid) -> Result<()>;
    /// Stamp `last_connected_at` with the current time.
    fn update_connection_last_used(&self, id: Uuid) -> Result<()>;

    fn get_group(&self, id: Uuid) -> Result<Option<ConnectionGroup>>;
    fn get_all_groups(&self) -> Result<Vec<ConnectionGroup>>;
    fn save_group(&self, group: &ConnectionGroup) -> Result<()>;
    fn delete_group(&self, id: Uuid) -> Result<()>;
}

/// In-memory config store used by tests and the CLI driver.
#[derive(Default)]
pub struct MemoryConfigStore {
    connections: RwLock<HashMap<Uuid, ConnectionConfig>>,
    groups: RwLock<HashMap<Uuid, ConnectionGroup>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionConfig>> {
        Ok(self.connections.read().unwrap().get(&id).cloned())
    }

    fn get_all_connections(&self) -> Result<Vec<ConnectionConfig>> {
        Ok(self.connections.read().unwrap().values().cloned().collect())
    }

    fn save_connection(&self, config: &ConnectionConfig) -> Result<()> {
        self.connections
            .write()
            .unwrap()
            .insert(config.id, config.clone());
        Ok(())
    }

    fn delete_connection(&self, id: Uuid) -> Result<()> {
        self.connections.write().unwrap().remove(&id);
        Ok(())
    }

    fn update_connection_last_used(&self, id: Uuid) -> Result<()> {
        let mut connections = self.connections.write().unwrap();
        let config = connections.get_mut(&id).ok_or(MammothError::NotFound {
            entity: "Connection",
            id,
        })?;
        config.last_connected_at = Some(Utc::now());
        Ok(())
    }

    fn get_group(&self, id: Uuid) -> Result<Option<ConnectionGroup>> {
        Ok(self.groups.read().unwrap().get(&id).cloned())
    }

    fn get_all_groups(&self) -> Result<Vec<ConnectionGroup>> {
        Ok(self.groups.read().unwrap().values().cloned().collect())
    }

    fn save_group(&self, group: &ConnectionGroup) -> Result<()> {
        self.groups.write().unwrap().insert(group.id, group.clone());
        Ok(())
    }

    fn delete_group(&self, id: Uuid) -> Result<()> {
        self.groups.write().unwrap().remove(&id);
        Ok(())
    }
}
