//! Credential store interface.
//!
//! The OS keystore lives outside this crate; the core only sees this narrow
//! trait. All secrets are keyed by connection id, with separate namespaces
//! for the database password, the SSH password, and the SSH key passphrase.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::Result;

/// Narrow secrets API the core consumes. Implementations are opaque; no
/// plaintext persistence is required of the core.
pub trait CredentialStore: Send + Sync {
    fn get_password(&self, id: Uuid) -> Result<Option<String>>;
    fn store_password(&self, id: Uuid, secret: &str) -> Result<()>;
    fn delete_password(&self, id: Uuid) -> Result<()>;

    fn get_ssh_password(&self, id: Uuid) -> Result<Option<String>>;
    fn store_ssh_password(&self, id: Uuid, secret: &str) -> Result<()>;
    fn delete_ssh_password(&self, id: Uuid) -> Result<()>;

    fn get_ssh_passphrase(&self, id: Uuid) -> Result<Option<String>>;
    fn store_ssh_passphrase(&self, id: Uuid, secret: &str) -> Result<()>;
    fn delete_ssh_passphrase(&self, id: Uuid) -> Result<()>;

    /// Remove every credential keyed by this connection id.
    fn delete_all_for_connection(&self, id: Uuid) -> Result<()> {
        self.delete_password(id)?;
        self.delete_ssh_password(id)?;
        self.delete_ssh_passphrase(id)?;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
    Password,
    SshPassword,
    SshPassphrase,
}

/// In-memory credential store used by tests and the CLI driver.
#[derive(Default)]
pub struct MemoryCredentialStore {
    secrets: RwLock<HashMap<(Uuid, Namespace), String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: Uuid, ns: Namespace) -> Result<Option<String>> {
        Ok(self.secrets.read().unwrap().get(&(id, ns)).cloned())
    }

    fn put(&self, id: Uuid, ns: Namespace, secret: &str) -> Result<()> {
        self.secrets
            .write()
            .unwrap()
            .insert((id, ns), secret.to_string());
        Ok(())
    }

    fn remove(&self, id: Uuid, ns: Namespace) -> Result<()> {
        self.secrets.write().unwrap().remove(&(id, ns));
        Ok(())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_password(&self, id: Uuid) -> Result<Option<String>> {
        self.get(id, Namespace::Password)
    }

    fn store_password(&self, id: Uuid, secret: &str) -> Result<()> {
        self.put(id, Namespace::Password, secret)
    }

    fn delete_password(&self, id: Uuid) -> Result<()> {
        self.remove(id, Namespace::Password)
    }

    fn get_ssh_password(&self, id: Uuid) -> Result<Option<String>> {
        self.get(id, Namespace::SshPassword)
    }

    fn store_ssh_password(&self, id: Uuid, secret: &str) -> Result<()> {
        self.put(id, Namespace::SshPassword, secret)
    }

    fn delete_ssh_password(&self, id: Uuid) -> Result<()> {
        self.remove(id, Namespace::SshPassword)
    }

    fn get_ssh_passphrase(&self, id: Uuid) -> Result<Option<String>> {
        self.get(id, Namespace::SshPassphrase)
    }

    fn store_ssh_passphrase(&self, id: Uuid, secret: &str) -> Result<()> {
        self.put(id, Namespace::SshPassphrase, secret)
    }

    fn delete_ssh_passphrase(&self, id: Uuid) -> Result<()> {
        self.remove(id, Namespace::SshPassphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let store = MemoryCredentialStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get_password(id).unwrap(), None);

        store.store_password(id, "hunter2").unwrap();
        assert_eq!(store.get_password(id).unwrap().as_deref(), Some("hunter2"));

        store.delete_password(id).unwrap();
        assert_eq!(store.get_password(id).unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let store = MemoryCredentialStore::new();
        let id = Uuid::new_v4();
        store.store_password(id, "db").unwrap();
        store.store_ssh_password(id, "ssh").unwrap();
        store.store_ssh_passphrase(id, "phrase").unwrap();

        assert_eq!(store.get_password(id).unwrap().as_deref(), Some("db"));
        assert_eq!(store.get_ssh_password(id).unwrap().as_deref(), Some("ssh"));
        assert_eq!(
            store.get_ssh_passphrase(id).unwrap().as_deref(),
            Some("phrase")
        );
    }

    #[test]
    fn test_delete_all_for_connection() {
        let store = MemoryCredentialStore::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.store_password(id, "a").unwrap();
        store.store_ssh_password(id, "b").unwrap();
        store.store_password(other, "keep").unwrap();

        store.delete_all_for_connection(id).unwrap();
        assert_eq!(store.get_password(id).unwrap(), None);
        assert_eq!(store.get_ssh_password(id).unwrap(), None);
        assert_eq!(store.get_password(other).unwrap().as_deref(), Some("keep"));
    }
}
