//! Process-wide registry of active connection pools.
//!
//! One [`ConnectionService`] owns every live [`ConnectionPool`], the saved
//! config/group CRUD, and an aggregated broadcast of status changes across
//! all connections. Construct it once at startup with the credential and
//! config stores; dropping it disconnects every pool.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConnectionConfig, ConnectionGroup};
use crate::error::{MammothError, Result};
use crate::pool::{ConnectionInfo, ConnectionPool, ConnectionStatus};
use crate::secrets::CredentialStore;
use crate::storage::ConfigStore;

/// One status transition for one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionChange {
    pub id: Uuid,
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

/// Aggregated event published on the service's broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub change: ConnectionChange,
    pub active_connections: usize,
}

/// Result of testing a connection without saving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub server_version: String,
    /// `pg_postmaster_start_time()` of the tested server.
    pub started_at: DateTime<Utc>,
    /// End-to-end wall time of the test, connect included.
    pub latency_ms: u64,
}

struct ServiceState {
    pools: RwLock<HashMap<Uuid, Arc<ConnectionPool>>>,
    events_tx: tokio::sync::broadcast::Sender<ServiceEvent>,
}

impl ServiceState {
    fn emit(&self, id: Uuid, status: ConnectionStatus, error: Option<String>) {
        let active_connections = self.pools.read().unwrap().len();
        let _ = self.events_tx.send(ServiceEvent {
            change: ConnectionChange { id, status, error },
            active_connections,
        });
    }
}

/// Registry of active pools plus CRUD over saved configs and groups.
pub struct ConnectionService {
    state: Arc<ServiceState>,
    credentials: Arc<dyn CredentialStore>,
    configs: Arc<dyn ConfigStore>,
}

impl ConnectionService {
    pub fn new(configs: Arc<dyn ConfigStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        let (events_tx, _) = tokio::sync::broadcast::channel(64);
        Self {
            state: Arc::new(ServiceState {
                pools: RwLock::new(HashMap::new()),
                events_tx,
            }),
            credentials,
            configs,
        }
    }

    /// Subscribe to the aggregated status stream. Per-connection transitions
    /// arrive in order; no ordering is guaranteed across connections.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ServiceEvent> {
        self.state.events_tx.subscribe()
    }

    /// Resolve the database password for a config. Only consults the
    /// credential store when the config says a password is stored there.
    fn resolve_password(&self, config: &ConnectionConfig) -> Result<String> {
        if config.password_in_keyring {
            self.credentials
                .get_password(config.id)?
                .ok_or(MammothError::CredentialNotFound { id: config.id })
        } else {
            Ok(String::new())
        }
    }

    /// Open a pool for this config and register it.
    ///
    /// Also stamps the saved config's `last_connected_at` when the config
    /// exists in the store.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<ConnectionInfo> {
        config.validate()?;
        if let Some(existing) = self.get_pool(config.id) {
            log::debug!("Connection already open; connection={}", config.id);
            return Ok(existing.info());
        }

        let password = self.resolve_password(config)?;
        self.state
            .emit(config.id, ConnectionStatus::Connecting, None);

        let pool = match ConnectionPool::new(config.clone(), &password).await {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                self.state
                    .emit(config.id, ConnectionStatus::Error, Some(e.to_string()));
                return Err(e);
            }
        };
        let info = pool.info();

        self.state
            .pools
            .write()
            .unwrap()
            .insert(config.id, Arc::clone(&pool));

        // Unsaved configs (ad-hoc connects) have no store row to stamp
        match self.configs.update_connection_last_used(config.id) {
            Ok(()) | Err(MammothError::NotFound { .. }) => {}
            Err(e) => log::warn!(
                "Failed to record last-connected time; connection={}, error={}",
                config.id,
                e
            ),
        }

        self.state.emit(config.id, ConnectionStatus::Connected, None);
        spawn_status_forwarder(Arc::downgrade(&self.state), config.id, pool.subscribe());

        Ok(info)
    }

    /// Close and unregister a pool.
    pub fn disconnect(&self, id: Uuid) -> Result<()> {
        let pool = self
            .state
            .pools
            .write()
            .unwrap()
            .remove(&id)
            .ok_or(MammothError::NotFound {
                entity: "Connection",
                id,
            })?;
        pool.close();
        Ok(())
    }

    /// Verify a config can reach its server without touching the registry or
    /// the config store.
    ///
    /// An explicit password (for configs not yet saved) is parked in the
    /// credential store for the duration of the test and deleted afterwards,
    /// success or failure.
    pub async fn test_connection(
        &self,
        config: &ConnectionConfig,
        password: Option<&str>,
    ) -> Result<ConnectionTestResult> {
        config.validate()?;
        let started = Instant::now();

        let temporary_credential = match password {
            Some(secret) => {
                self.credentials.store_password(config.id, secret)?;
                true
            }
            None => false,
        };

        let mut test_config = config.clone();
        if temporary_credential {
            test_config.password_in_keyring = true;
        }

        let result = self.run_test(&test_config).await;

        if temporary_credential {
            if let Err(e) = self.credentials.delete_password(config.id) {
                log::warn!(
                    "Failed to clean up test credential; connection={}, error={}",
                    config.id,
                    e
                );
            }
        }

        let (server_version, started_at) = result?;
        Ok(ConnectionTestResult {
            server_version,
            started_at,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn run_test(&self, config: &ConnectionConfig) -> Result<(String, DateTime<Utc>)> {
        let password = self.resolve_password(config)?;
        let pool = ConnectionPool::new(config.clone(), &password).await?;
        let outcome = async {
            let client = pool.get().await?;
            let row = client
                .query_one("SELECT version(), pg_postmaster_start_time()", &[])
                .await?;
            Ok::<_, MammothError>((row.get::<_, String>(0), row.get::<_, DateTime<Utc>>(1)))
        }
        .await;
        pool.close();
        outcome
    }

    /// The pool for a connected id, if any.
    pub fn get_pool(&self, id: Uuid) -> Option<Arc<ConnectionPool>> {
        self.state.pools.read().unwrap().get(&id).cloned()
    }

    /// Ids of currently connected pools.
    pub fn active_connections(&self) -> Vec<Uuid> {
        self.state.pools.read().unwrap().keys().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.state.pools.read().unwrap().len()
    }

    // ── saved configs ──

    pub fn get_connection(&self, id: Uuid) -> Result<ConnectionConfig> {
        self.configs
            .get_connection(id)?
            .ok_or(MammothError::NotFound {
                entity: "Connection",
                id,
            })
    }

    pub fn list_connections(&self) -> Result<Vec<ConnectionConfig>> {
        self.configs.get_all_connections()
    }

    /// Validate and persist a config.
    pub fn save_connection(&self, config: &mut ConnectionConfig) -> Result<()> {
        config.validate()?;
        config.touch();
        self.configs.save_connection(config)
    }

    /// Remove a saved connection: close its pool when open, purge every
    /// credential stored under its id, then delete the config.
    pub fn delete_connection(&self, id: Uuid) -> Result<()> {
        if self.get_pool(id).is_some() {
            self.disconnect(id)?;
        }
        self.credentials.delete_all_for_connection(id)?;
        self.configs.delete_connection(id)?;
        log::info!("Connection deleted; connection={}", id);
        Ok(())
    }

    /// Clone a saved connection under a fresh identity. The stored password,
    /// when present, is copied to the new id.
    pub fn duplicate_connection(&self, id: Uuid, new_name: &str) -> Result<ConnectionConfig> {
        let source = self.get_connection(id)?;
        let copy = source.duplicate(new_name);
        if source.password_in_keyring {
            if let Some(secret) = self.credentials.get_password(id)? {
                self.credentials.store_password(copy.id, &secret)?;
            }
        }
        self.configs.save_connection(&copy)?;
        Ok(copy)
    }

    // ── groups ──

    pub fn list_groups(&self) -> Result<Vec<ConnectionGroup>> {
        self.configs.get_all_groups()
    }

    pub fn save_group(&self, group: &ConnectionGroup) -> Result<()> {
        if group.name.trim().is_empty() {
            return Err(MammothError::invalid_input(
                "name",
                "Group name is required",
            ));
        }
        self.configs.save_group(group)
    }

    /// Delete a group. Member configs are swept to ungrouped first so no
    /// config is left pointing at a missing group.
    pub fn delete_group(&self, id: Uuid) -> Result<()> {
        if self.configs.get_group(id)?.is_none() {
            return Err(MammothError::NotFound {
                entity: "Group",
                id,
            });
        }
        for mut config in self.configs.get_all_connections()? {
            if config.group_id == Some(id) {
                config.group_id = None;
                config.touch();
                self.configs.save_connection(&config)?;
            }
        }
        self.configs.delete_group(id)
    }

    /// Close every pool and empty the registry.
    pub fn shutdown(&self) {
        let pools: Vec<Arc<ConnectionPool>> =
            self.state.pools.write().unwrap().drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close();
        }
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Re-publish one pool's status transitions onto the aggregated stream.
/// Ends at the terminal `Disconnected` or when the service is gone.
fn spawn_status_forwarder(
    state: Weak<ServiceState>,
    id: Uuid,
    mut events: tokio::sync::broadcast::Receiver<crate::pool::StatusEvent>,
) {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            let Some(state) = state.upgrade() else {
                break;
            };
            state.emit(id, event.status, event.error.clone());
            if event.status == ConnectionStatus::Disconnected {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemoryCredentialStore;
    use crate::storage::MemoryConfigStore;

    fn service() -> ConnectionService {
        ConnectionService::new(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    fn sample_config(name: &str) -> ConnectionConfig {
        ConnectionConfig {
            name: name.to_string(),
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let svc = service();
        let mut config = sample_config("local");
        svc.save_connection(&mut config).unwrap();
        let loaded = svc.get_connection(config.id).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_rejects_invalid() {
        let svc = service();
        let mut config = sample_config("local");
        config.port = 0;
        assert!(svc.save_connection(&mut config).is_err());
    }

    #[test]
    fn test_duplicate_copies_credential() {
        let svc = service();
        let mut config = sample_config("prod");
        config.password_in_keyring = true;
        svc.credentials.store_password(config.id, "s3cret").unwrap();
        svc.save_connection(&mut config).unwrap();

        let copy = svc.duplicate_connection(config.id, "prod (copy)").unwrap();
        assert_ne!(copy.id, config.id);
        assert!(copy.last_connected_at.is_none());
        assert_eq!(
            svc.credentials.get_password(copy.id).unwrap().as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn test_delete_connection_purges_credentials() {
        let svc = service();
        let mut config = sample_config("gone");
        svc.save_connection(&mut config).unwrap();
        svc.credentials.store_password(config.id, "x").unwrap();
        svc.credentials.store_ssh_password(config.id, "y").unwrap();

        svc.delete_connection(config.id).unwrap();
        assert!(svc.get_connection(config.id).is_err());
        assert_eq!(svc.credentials.get_password(config.id).unwrap(), None);
        assert_eq!(svc.credentials.get_ssh_password(config.id).unwrap(), None);
    }

    #[test]
    fn test_delete_group_sweeps_members() {
        let svc = service();
        let group = ConnectionGroup::new("staging");
        svc.save_group(&group).unwrap();

        let mut member = sample_config("db1");
        member.group_id = Some(group.id);
        svc.save_connection(&mut member).unwrap();
        let mut other = sample_config("db2");
        svc.save_connection(&mut other).unwrap();

        svc.delete_group(group.id).unwrap();
        assert!(svc.get_connection(member.id).unwrap().group_id.is_none());
        assert!(svc.list_groups().unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_group_not_found() {
        let svc = service();
        let err = svc.delete_group(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, MammothError::NotFound { entity: "Group", .. }));
    }

    #[test]
    fn test_disconnect_unknown_connection() {
        let svc = service();
        let err = svc.disconnect(Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            err,
            MammothError::NotFound { entity: "Connection", .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_requires_stored_credential() {
        let svc = service();
        let mut config = sample_config("locked");
        config.password_in_keyring = true;
        let err = svc.connect(&config).await.unwrap_err();
        assert!(matches!(err, MammothError::CredentialNotFound { .. }));
    }
}
