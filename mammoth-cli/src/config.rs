//! CLI configuration loading and resolution.
//!
//! Connection parameters come from a TOML file, environment variables, and
//! CLI flags with a defined priority order (CLI > env > TOML > defaults).
//! The TOML file can hold several named connections; `--connection` picks
//! one, and a file with a single entry needs no name at all.

use serde::Deserialize;

use mammoth_core::config::{ConnectionConfig, SslMode};
use mammoth_core::error::{MammothError, Result};

/// One `[[connections]]` entry in `mammoth.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConnection {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    /// Discouraged; prefer MAMMOTH_PASSWORD or the prompt.
    pub password: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_ca_cert: Option<String>,
    pub connect_timeout: Option<u32>,
    pub statement_timeout_ms: Option<u64>,
    pub readonly: Option<bool>,
    pub keepalive: Option<u32>,
    pub pool_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlFile {
    connections: Option<Vec<TomlConnection>>,
}

/// CLI flags that override everything else.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: Option<String>,
    pub connect_timeout: Option<u32>,
    pub statement_timeout_ms: Option<u64>,
    pub readonly: bool,
}

/// The fully resolved connection plus the secret that goes with it.
#[derive(Debug)]
pub struct ResolvedConnection {
    pub config: ConnectionConfig,
    pub password: Option<String>,
}

/// Read the TOML file when present. An explicitly requested file that does
/// not exist is an error; the default path is allowed to be absent.
fn load_file(path: Option<&str>) -> Result<Vec<TomlConnection>> {
    let toml_path = path.unwrap_or("mammoth.toml");
    match std::fs::read_to_string(toml_path) {
        Ok(contents) => {
            let file: TomlFile = toml::from_str(&contents).map_err(|e| {
                MammothError::invalid_input(
                    "config",
                    format!("Failed to parse '{}': {}", toml_path, e),
                )
            })?;
            Ok(file.connections.unwrap_or_default())
        }
        Err(_) if path.is_none() => Ok(Vec::new()),
        Err(e) => Err(MammothError::invalid_input(
            "config",
            format!("Config file '{}' not found: {}", toml_path, e),
        )),
    }
}

fn pick_entry(
    entries: Vec<TomlConnection>,
    name: Option<&str>,
) -> Result<TomlConnection> {
    match name {
        Some(wanted) => entries
            .into_iter()
            .find(|c| c.name.as_deref() == Some(wanted))
            .ok_or_else(|| {
                MammothError::invalid_input(
                    "connection",
                    format!("No connection named '{}' in the config file", wanted),
                )
            }),
        None => {
            if entries.len() > 1 {
                return Err(MammothError::invalid_input(
                    "connection",
                    "Several connections are configured; pick one with --connection",
                ));
            }
            Ok(entries.into_iter().next().unwrap_or_default())
        }
    }
}

fn apply_env(entry: &mut TomlConnection) {
    if let Ok(v) = std::env::var("MAMMOTH_HOST") {
        entry.host = Some(v);
    }
    if let Ok(v) = std::env::var("MAMMOTH_PORT") {
        if let Ok(port) = v.parse() {
            entry.port = Some(port);
        }
    }
    if let Ok(v) = std::env::var("MAMMOTH_DATABASE") {
        entry.database = Some(v);
    }
    if let Ok(v) = std::env::var("MAMMOTH_USER") {
        entry.username = Some(v);
    }
    if let Ok(v) = std::env::var("MAMMOTH_PASSWORD") {
        entry.password = Some(v);
    }
    if let Ok(v) = std::env::var("MAMMOTH_SSL_MODE") {
        entry.ssl_mode = Some(v);
    }
}

/// Resolve a connection from file, environment, and flags.
pub fn resolve(
    config_path: Option<&str>,
    connection_name: Option<&str>,
    overrides: &CliOverrides,
) -> Result<ResolvedConnection> {
    let entries = load_file(config_path)?;
    let mut entry = pick_entry(entries, connection_name)?;

    apply_env(&mut entry);

    if let Some(ref v) = overrides.host {
        entry.host = Some(v.clone());
    }
    if let Some(v) = overrides.port {
        entry.port = Some(v);
    }
    if let Some(ref v) = overrides.database {
        entry.database = Some(v.clone());
    }
    if let Some(ref v) = overrides.username {
        entry.username = Some(v.clone());
    }
    if let Some(ref v) = overrides.password {
        entry.password = Some(v.clone());
    }
    if let Some(ref v) = overrides.ssl_mode {
        entry.ssl_mode = Some(v.clone());
    }
    if let Some(v) = overrides.connect_timeout {
        entry.connect_timeout = Some(v);
    }
    if let Some(v) = overrides.statement_timeout_ms {
        entry.statement_timeout_ms = Some(v);
    }
    if overrides.readonly {
        entry.readonly = Some(true);
    }

    let mut config = ConnectionConfig::new(
        entry.name.clone().unwrap_or_else(|| "cli".to_string()),
    );
    if let Some(host) = entry.host {
        config.host = host;
    }
    if let Some(port) = entry.port {
        config.port = port;
    }
    config.database = entry.database.unwrap_or_default();
    config.username = entry.username.unwrap_or_default();
    if let Some(ref mode) = entry.ssl_mode {
        config.ssl_mode = mode.parse::<SslMode>()?;
    }
    config.ssl_ca_cert = entry.ssl_ca_cert.map(Into::into);
    if let Some(v) = entry.connect_timeout {
        config.options.connect_timeout_secs = v;
    }
    config.options.statement_timeout_ms = entry.statement_timeout_ms;
    config.options.readonly = entry.readonly.unwrap_or(false);
    if let Some(v) = entry.keepalive {
        config.options.keepalive_interval_secs = v;
    }
    if let Some(v) = entry.pool_size {
        config.options.max_pool_size = v;
    }
    config.options.application_name = "mammoth-cli".to_string();

    config.validate()?;
    Ok(ResolvedConnection {
        config,
        password: entry.password,
    })
}

/// List all configured connections (for `mammoth connections`).
pub fn list(config_path: Option<&str>) -> Result<Vec<TomlConnection>> {
    load_file(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mammoth.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path.to_str().unwrap().to_string())
    }

    #[test]
    fn test_resolve_from_file() {
        let (_dir, path) = write_config(
            r#"
[[connections]]
name = "local"
host = "db.internal"
port = 5433
database = "app"
username = "svc"
ssl_mode = "require"
"#,
        );
        let resolved = resolve(Some(&path), None, &CliOverrides::default()).unwrap();
        assert_eq!(resolved.config.host, "db.internal");
        assert_eq!(resolved.config.port, 5433);
        assert_eq!(resolved.config.ssl_mode, SslMode::Require);
        assert!(resolved.password.is_none());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let (_dir, path) = write_config(
            r#"
[[connections]]
name = "local"
host = "db.internal"
database = "app"
username = "svc"
"#,
        );
        let overrides = CliOverrides {
            host: Some("other".to_string()),
            readonly: true,
            ..Default::default()
        };
        let resolved = resolve(Some(&path), None, &overrides).unwrap();
        assert_eq!(resolved.config.host, "other");
        assert!(resolved.config.options.readonly);
    }

    #[test]
    fn test_named_lookup_and_ambiguity() {
        let (_dir, path) = write_config(
            r#"
[[connections]]
name = "a"
host = "a.db"
database = "app"
username = "svc"

[[connections]]
name = "b"
host = "b.db"
database = "app"
username = "svc"
"#,
        );
        let resolved = resolve(Some(&path), Some("b"), &CliOverrides::default()).unwrap();
        assert_eq!(resolved.config.host, "b.db");

        let err = resolve(Some(&path), None, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, MammothError::InvalidInput { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(resolve(Some("/nonexistent/mammoth.toml"), None, &CliOverrides::default()).is_err());
    }

    #[test]
    fn test_validation_applies() {
        // No database/username anywhere: invalid
        let err = resolve(None, None, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, MammothError::InvalidInput { .. }));
    }
}
