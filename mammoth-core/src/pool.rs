//! Pooled, auto-recovering access to one configured PostgreSQL server.
//!
//! A [`ConnectionPool`] owns a bounded deadpool of multiplexed clients, a
//! cached [`ConnectionInfo`], a keepalive supervisor task, and a broadcast
//! channel of [`ConnectionStatus`] transitions. Pools are shared behind
//! `Arc`; closing is idempotent and safe under concurrent readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;

use crate::config::{ConnectionConfig, SslMode};
use crate::error::{MammothError, Result};

/// How long an idle client may sit in the pool before its health is
/// re-checked on acquisition.
const RECYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry backoff bounds for [`ConnectionPool::execute_with_retry`].
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// One status transition published on the pool's broadcast channel.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

/// Server facts cached at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub server_version: String,
    pub database: String,
    pub username: String,
    pub backend_pid: i32,
    pub connected_at: DateTime<Utc>,
}

/// Point-in-time pool occupancy snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// A client checked out of the pool; returns on drop.
pub type PooledClient = deadpool_postgres::Client;

#[derive(Debug)]
struct PoolInner {
    pool: Pool,
    status: RwLock<ConnectionStatus>,
    info: RwLock<ConnectionInfo>,
    status_tx: tokio::sync::broadcast::Sender<StatusEvent>,
    closed: AtomicBool,
}

impl PoolInner {
    fn set_status(&self, status: ConnectionStatus, error: Option<String>) {
        *self.status.write().unwrap() = status;
        // Send only fails when there are no subscribers, which is fine
        let _ = self.status_tx.send(StatusEvent { status, error });
    }
}

/// A managed pool of database clients for a single [`ConnectionConfig`].
#[derive(Debug)]
pub struct ConnectionPool {
    id: uuid::Uuid,
    config: ConnectionConfig,
    inner: Arc<PoolInner>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Build a pool, validate connectivity with one eager acquisition, and
    /// cache the server's identity. The password comes pre-resolved from the
    /// credential store (empty when the config carries none).
    pub async fn new(config: ConnectionConfig, password: &str) -> Result<Self> {
        config.validate()?;

        let (status_tx, _) = tokio::sync::broadcast::channel(16);

        let pool = match config.ssl_mode {
            SslMode::Disable => build_pool(&config, password, NoTls)?,
            SslMode::Prefer => {
                // Try TLS first; rebuild in plaintext if the handshake fails.
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_rustls_config(
                    &config,
                )?);
                let tls_pool = build_pool(&config, password, tls)?;
                match tls_pool.get().await {
                    Ok(_) => tls_pool,
                    Err(_) => {
                        log::debug!(
                            "TLS connection failed, falling back to plaintext; connection={}",
                            config.id
                        );
                        tls_pool.close();
                        build_pool(&config, password, NoTls)?
                    }
                }
            }
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_rustls_config(
                    &config,
                )?);
                build_pool(&config, password, tls)?
            }
        };

        let _ = status_tx.send(StatusEvent {
            status: ConnectionStatus::Connecting,
            error: None,
        });

        // Eager acquisition validates connectivity before the pool is handed out
        let client = pool.get().await.map_err(connect_error)?;

        let row = client
            .query_one(
                "SELECT version(), current_database(), current_user, pg_backend_pid()",
                &[],
            )
            .await?;
        let info = ConnectionInfo {
            server_version: row.get(0),
            database: row.get(1),
            username: row.get(2),
            backend_pid: row.get(3),
            connected_at: Utc::now(),
        };

        if config.options.readonly {
            client
                .batch_execute("SET default_transaction_read_only = ON")
                .await?;
        }
        drop(client);

        log::info!(
            "Connection pool created; connection={}, host={}, database={}, server={}",
            config.id,
            config.host,
            config.database,
            info.server_version
        );

        let inner = Arc::new(PoolInner {
            pool,
            status: RwLock::new(ConnectionStatus::Connected),
            info: RwLock::new(info),
            status_tx,
            closed: AtomicBool::new(false),
        });
        let _ = inner.status_tx.send(StatusEvent {
            status: ConnectionStatus::Connected,
            error: None,
        });

        let supervisor = spawn_keepalive(
            Arc::downgrade(&inner),
            config.id,
            config.options.keepalive_interval_secs,
        );

        Ok(Self {
            id: config.id,
            config,
            inner,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// The id of the config this pool serves.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Acquire a client, waiting up to the configured timeout when the pool
    /// is exhausted.
    pub async fn get(&self) -> Result<PooledClient> {
        if self.is_closed() {
            return Err(MammothError::ConnectionFailed {
                message: "Pool is closed".to_string(),
                source: None,
            });
        }
        self.inner.pool.get().await.map_err(connect_error)
    }

    /// Cached server identity from construction time.
    pub fn info(&self) -> ConnectionInfo {
        self.inner.info.read().unwrap().clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.read().unwrap()
    }

    /// Occupancy snapshot of the underlying pool.
    pub fn pool_status(&self) -> PoolStatus {
        let status = self.inner.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Subscribe to status transitions. A receiver that falls behind sees a
    /// coalesced latest value; the terminal `Disconnected` is always sent.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StatusEvent> {
        self.inner.status_tx.subscribe()
    }

    /// Run `op` with up to `max_retries` retries on transient connection
    /// failures. The delay starts at 100 ms and doubles per attempt, capped
    /// at 10 s. Statement failures are never retried.
    pub async fn execute_with_retry<T, F, Fut>(&self, max_retries: u32, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = RETRY_INITIAL_DELAY;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    if attempt == 0 {
                        self.inner
                            .set_status(ConnectionStatus::Reconnecting, Some(e.to_string()));
                    }
                    log::warn!(
                        "Retrying after transient failure; connection={}, attempt={}, max_attempts={}, delay_ms={}, error={}",
                        self.id,
                        attempt + 1,
                        max_retries + 1,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Close the pool: publish the terminal `Disconnected`, release all
    /// clients, and stop the keepalive supervisor. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.set_status(ConnectionStatus::Disconnected, None);
        self.inner.pool.close();
        if let Some(handle) = self.supervisor.lock().unwrap().take() {
            handle.abort();
        }
        log::info!("Connection pool closed; connection={}", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a deadpool acquisition error into the connection taxonomy.
fn connect_error(e: deadpool_postgres::PoolError) -> MammothError {
    match e {
        deadpool_postgres::PoolError::Timeout(_) => MammothError::ConnectionTimeout,
        deadpool_postgres::PoolError::Backend(pg) => MammothError::ConnectionFailed {
            message: crate::error::format_db_error(&pg),
            source: Some(pg),
        },
        other => MammothError::ConnectionFailed {
            message: other.to_string(),
            source: None,
        },
    }
}

/// Build the deadpool for one config with the given TLS connector.
fn build_pool<T>(config: &ConnectionConfig, password: &str, tls: T) -> Result<Pool>
where
    T: tokio_postgres::tls::MakeTlsConnect<tokio_postgres::Socket> + Clone + Send + Sync + 'static,
    T::Stream: Send + Sync,
    T::TlsConnect: Send + Sync,
    <T::TlsConnect as tokio_postgres::tls::TlsConnect<tokio_postgres::Socket>>::Future: Send,
{
    let connect_timeout = Duration::from_secs(config.options.connect_timeout_secs as u64);

    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.username);
    pg_config.password(password);
    pg_config.application_name(&config.options.application_name);
    pg_config.connect_timeout(connect_timeout);
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(60));

    let mut session_options = Vec::new();
    if let Some(ms) = config.options.statement_timeout_ms {
        session_options.push(format!("-c statement_timeout={}ms", ms));
    }
    if config.options.readonly {
        // Applies to every pooled session, not just the eagerly validated one
        session_options.push("-c default_transaction_read_only=on".to_string());
    }
    if !session_options.is_empty() {
        pg_config.options(&session_options.join(" "));
    }

    let manager = Manager::from_config(
        pg_config,
        tls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(config.options.max_pool_size)
        .wait_timeout(Some(connect_timeout))
        .create_timeout(Some(connect_timeout))
        .recycle_timeout(Some(RECYCLE_TIMEOUT))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| MammothError::ConnectionFailed {
            message: format!("Failed to create pool: {}", e),
            source: None,
        })
}

/// Build a rustls ClientConfig from the Mozilla CA bundle plus any
/// configured CA and client certificates.
fn make_rustls_config(config: &ConnectionConfig) -> Result<rustls::ClientConfig> {
    let mut root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(ref ca_path) = config.ssl_ca_cert {
        let certs = CertificateDer::pem_file_iter(ca_path).map_err(|e| {
            MammothError::invalid_input(
                "ssl_ca_cert",
                format!("Failed to read CA certificate {}: {}", ca_path.display(), e),
            )
        })?;
        for cert in certs {
            let cert = cert.map_err(|e| {
                MammothError::invalid_input("ssl_ca_cert", format!("Invalid CA certificate: {}", e))
            })?;
            root_store.add(cert).map_err(|e| {
                MammothError::invalid_input("ssl_ca_cert", format!("Rejected CA certificate: {}", e))
            })?;
        }
    }

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("ring provider supports the default protocol versions")
    .with_root_certificates(root_store);

    match (&config.ssl_client_cert, &config.ssl_client_key) {
        (Some(cert_path), Some(key_path)) => {
            let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(cert_path)
                .map_err(|e| {
                    MammothError::invalid_input(
                        "ssl_client_cert",
                        format!("Failed to read client certificate: {}", e),
                    )
                })?
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    MammothError::invalid_input(
                        "ssl_client_cert",
                        format!("Invalid client certificate: {}", e),
                    )
                })?;
            let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| {
                MammothError::invalid_input(
                    "ssl_client_key",
                    format!("Failed to read client key: {}", e),
                )
            })?;
            builder.with_client_auth_cert(certs, key).map_err(|e| {
                MammothError::invalid_input(
                    "ssl_client_cert",
                    format!("Client certificate rejected: {}", e),
                )
            })
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Keepalive supervisor: probe the server every interval, flipping the
/// status between `Reconnecting` and `Connected` as probes fail and recover.
/// Holds only a weak reference so a dropped pool ends the task.
fn spawn_keepalive(
    inner: Weak<PoolInner>,
    id: uuid::Uuid,
    interval_secs: u32,
) -> tokio::task::JoinHandle<()> {
    let interval_secs = if interval_secs == 0 { 60 } else { interval_secs };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs as u64));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so probing starts one
        // interval after construction.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if inner.closed.load(Ordering::SeqCst) {
                break;
            }
            let probe = async {
                let client = inner.pool.get().await?;
                client.execute("SELECT 1", &[]).await?;
                Ok::<_, MammothError>(())
            };
            match probe.await {
                Ok(()) => {
                    let was_reconnecting =
                        *inner.status.read().unwrap() == ConnectionStatus::Reconnecting;
                    if was_reconnecting {
                        log::info!("Keepalive probe recovered; connection={}", id);
                        inner.set_status(ConnectionStatus::Connected, None);
                    }
                }
                Err(e) => {
                    // A probe racing close() must not mask the terminal Disconnected
                    if inner.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!("Keepalive probe failed; connection={}, error={}", id, e);
                    inner.set_status(ConnectionStatus::Reconnecting, Some(e.to_string()));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_schedule() {
        // 100ms, 200ms, 400ms, ..., capped at 10s
        let mut delay = RETRY_INITIAL_DELAY;
        let mut schedule = Vec::new();
        for _ in 0..9 {
            schedule.push(delay.as_millis() as u64);
            delay = (delay * 2).min(RETRY_MAX_DELAY);
        }
        assert_eq!(
            schedule,
            vec![100, 200, 400, 800, 1600, 3200, 6400, 10_000, 10_000]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_io() {
        let config = ConnectionConfig::default(); // empty name/database/username
        let err = ConnectionPool::new(config, "").await.unwrap_err();
        assert!(matches!(err, MammothError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_verify_ca_without_cert_rejected() {
        let mut config = ConnectionConfig::new("x");
        config.database = "db".to_string();
        config.username = "u".to_string();
        config.ssl_mode = SslMode::VerifyCa;
        let err = ConnectionPool::new(config, "").await.unwrap_err();
        assert!(matches!(
            err,
            MammothError::InvalidInput { ref field, .. } if field == "ssl_ca_cert"
        ));
    }
}
