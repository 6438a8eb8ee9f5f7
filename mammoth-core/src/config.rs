//! Saved connection configuration: identity, network, security, and
//! behavior settings for one PostgreSQL server.
//!
//! Secrets never live in these records. A config only carries the
//! `password_in_keyring` flag; the secret itself stays behind the
//! [`CredentialStore`](crate::secrets::CredentialStore).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MammothError, Result};

/// SSL/TLS mode for PostgreSQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Never use TLS.
    Disable,
    /// Try TLS first, fall back to plaintext.
    #[default]
    Prefer,
    /// Require TLS; fail if the handshake fails.
    Require,
    /// Require TLS and verify the server certificate against the configured CA.
    #[serde(rename = "verify-ca")]
    VerifyCa,
    /// Require TLS, verify the CA, and verify the server hostname.
    #[serde(rename = "verify-full")]
    VerifyFull,
}

impl SslMode {
    /// Spelling used in PostgreSQL connection strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = MammothError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "disabled" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "required" => Ok(SslMode::Require),
            "verify-ca" | "verifyca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verifyfull" => Ok(SslMode::VerifyFull),
            _ => Err(MammothError::invalid_input(
                "ssl_mode",
                format!(
                    "Invalid SSL mode '{}'. Use 'disable', 'prefer', 'require', 'verify-ca', or 'verify-full'.",
                    s
                ),
            )),
        }
    }
}

/// SSH authentication method for tunnelled connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshAuthMethod {
    /// Password authentication (secret kept in the credential store).
    Password,
    /// Private key file authentication.
    Key,
    /// SSH agent.
    #[default]
    Agent,
}

/// SSH tunnel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshTunnel {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: SshAuthMethod,
    /// Private key path; required when `auth_method` is [`SshAuthMethod::Key`].
    pub key_path: Option<PathBuf>,
    /// Local forward port; auto-assigned when absent.
    pub local_port: Option<u16>,
}

impl Default for SshTunnel {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            username: String::new(),
            auth_method: SshAuthMethod::Agent,
            key_path: None,
            local_port: None,
        }
    }
}

/// Per-connection behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Connection timeout in seconds. Also bounds pool acquisition.
    pub connect_timeout_secs: u32,
    /// Server-side statement timeout, if any.
    pub statement_timeout_ms: Option<u64>,
    /// Enforce `default_transaction_read_only` on every session.
    pub readonly: bool,
    /// `application_name` reported to the server.
    pub application_name: String,
    /// Keepalive probe interval in seconds.
    pub keepalive_interval_secs: u32,
    /// Upper bound on pooled clients.
    pub max_pool_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            statement_timeout_ms: None,
            readonly: false,
            application_name: "mammoth".to_string(),
            keepalive_interval_secs: 60,
            max_pool_size: 10,
        }
    }
}

/// Saved database connection configuration.
///
/// Passwords are NOT stored here; they live in the credential store keyed
/// by this config's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Stable unique identifier.
    pub id: Uuid,
    /// User-facing display name.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// True when a password is stored in the credential store under `id`.
    pub password_in_keyring: bool,
    /// Optional display color (hex string chosen by the UI).
    pub color: Option<String>,
    /// Optional membership in a [`ConnectionGroup`].
    pub group_id: Option<Uuid>,
    pub ssl_mode: SslMode,
    /// CA certificate for `verify-ca` / `verify-full`.
    pub ssl_ca_cert: Option<PathBuf>,
    pub ssl_client_cert: Option<PathBuf>,
    pub ssl_client_key: Option<PathBuf>,
    pub ssh_tunnel: Option<SshTunnel>,
    pub options: ConnectionOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password_in_keyring: false,
            color: None,
            group_id: None,
            ssl_mode: SslMode::Prefer,
            ssl_ca_cert: None,
            ssl_client_cert: None,
            ssl_client_key: None,
            ssh_tunnel: None,
            options: ConnectionOptions::default(),
            created_at: now,
            updated_at: now,
            last_connected_at: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a new configuration with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Validate all invariants. Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MammothError::invalid_input(
                "name",
                "Connection name is required",
            ));
        }
        if self.host.trim().is_empty() {
            return Err(MammothError::invalid_input(
                "host",
                "Server hostname is required",
            ));
        }
        if self.port == 0 {
            return Err(MammothError::invalid_input(
                "port",
                "Port must be between 1 and 65535",
            ));
        }
        if self.database.trim().is_empty() {
            return Err(MammothError::invalid_input(
                "database",
                "Database name is required",
            ));
        }
        if self.username.trim().is_empty() {
            return Err(MammothError::invalid_input(
                "username",
                "Username is required",
            ));
        }
        if matches!(self.ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull)
            && self.ssl_ca_cert.is_none()
        {
            return Err(MammothError::invalid_input(
                "ssl_ca_cert",
                format!(
                    "SSL mode '{}' requires a CA certificate",
                    self.ssl_mode.as_str()
                ),
            ));
        }
        if let Some(ref ssh) = self.ssh_tunnel {
            if ssh.enabled {
                if ssh.host.trim().is_empty() {
                    return Err(MammothError::invalid_input(
                        "ssh_host",
                        "SSH host is required when the tunnel is enabled",
                    ));
                }
                if ssh.username.trim().is_empty() {
                    return Err(MammothError::invalid_input(
                        "ssh_username",
                        "SSH username is required when the tunnel is enabled",
                    ));
                }
                if ssh.auth_method == SshAuthMethod::Key && ssh.key_path.is_none() {
                    return Err(MammothError::invalid_input(
                        "ssh_key_path",
                        "SSH key authentication requires a key file path",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Bump `updated_at` after an edit.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Clone into a fresh config: new id and `created_at`, no connection
    /// history. Used by connection duplication.
    pub fn duplicate(&self, new_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new_name.into(),
            created_at: now,
            updated_at: now,
            last_connected_at: None,
            ..self.clone()
        }
    }
}

/// Named group of saved connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGroup {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: None,
            created_at: Utc::now(),
        }
    }
}
