//! PostgreSQL client core: pooled connections, bulk import, and export.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mammoth_core::config::ConnectionConfig;
//! use mammoth_core::secrets::MemoryCredentialStore;
//! use mammoth_core::storage::MemoryConfigStore;
//! use mammoth_core::ConnectionService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ConnectionService::new(
//!     Arc::new(MemoryConfigStore::new()),
//!     Arc::new(MemoryCredentialStore::new()),
//! );
//! let mut config = ConnectionConfig::new("local");
//! config.database = "postgres".to_string();
//! config.username = "postgres".to_string();
//! let info = service.connect(&config).await?;
//! println!("Connected to {}", info.server_version);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`value`] — the tagged value sum every pipeline shares
//! - [`config`] — connection configuration and validation
//! - [`secrets`] / [`storage`] — credential and config store interfaces
//! - [`pool`] — bounded auto-recovering connection pools
//! - [`service`] — the process-wide connection registry
//! - [`import`] — analyzer, wizard, and COPY/INSERT executors
//! - [`export`] — the eight-format export engine
//! - [`sql`] — identifier quoting helpers
//! - [`error`] — error types

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod pool;
pub mod secrets;
pub mod service;
pub mod sql;
pub mod storage;
pub mod value;

pub use config::{ConnectionConfig, ConnectionGroup, ConnectionOptions, SslMode};
pub use error::{ImportFailure, MammothError, Result};
pub use export::{ExportFormat, ExportOptions, ExportResult, QueryResultData};
pub use import::{ImportJob, ImportOptions, ImportResult, ImportStatus, JobRegistry};
pub use pool::{ConnectionInfo, ConnectionPool, ConnectionStatus, PoolStatus};
pub use service::{ConnectionService, ConnectionTestResult, ServiceEvent};
pub use value::Value;
