//! CLI entry point for the mammoth PostgreSQL client core.
//! Provides clap-based command routing for connection testing, file
//! analysis, bulk import, export, and exit code mapping by error type.

mod config;
mod output;

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use mammoth_core::export::stream::StreamingExporter;
use mammoth_core::export::{
    clipboard, export_to_file, export_to_string, CsvOptions, ExportFormat, ExportOptions,
    JsonOptions, QueryResultData, SqlOptions,
};
use mammoth_core::import::wizard::ImportWizard;
use mammoth_core::import::{execute as import_execute, ConflictHandling, ImportOptions};
use mammoth_core::secrets::{CredentialStore, MemoryCredentialStore};
use mammoth_core::storage::MemoryConfigStore;
use mammoth_core::{ConnectionService, JobRegistry, MammothError};

use crate::config::CliOverrides;

/// Print a report as JSON (when `--json` is active) or via a formatter.
macro_rules! print_report {
    ($report:expr, $json:expr, $printer:expr) => {
        if $json {
            println!(
                "{}",
                serde_json::to_string_pretty(&$report).expect("JSON serialization failed")
            );
        } else {
            $printer(&$report);
        }
    };
}

/// Top-level CLI definition with global flags and subcommand dispatch.
#[derive(Parser)]
#[command(
    name = "mammoth",
    about = "PostgreSQL import/export and connection tooling",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file path (default: mammoth.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Named connection from the config file
    #[arg(long, value_name = "NAME", global = true)]
    connection: Option<String>,

    /// Server hostname (overrides config)
    #[arg(long, value_name = "HOST", global = true)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, value_name = "PORT", global = true)]
    port: Option<u16>,

    /// Database name (overrides config)
    #[arg(long, value_name = "DB", global = true)]
    dbname: Option<String>,

    /// Username (overrides config)
    #[arg(long, value_name = "USER", global = true)]
    user: Option<String>,

    /// Password (prefer MAMMOTH_PASSWORD)
    #[arg(long, value_name = "SECRET", global = true)]
    password: Option<String>,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full
    #[arg(long, value_name = "MODE", global = true)]
    ssl_mode: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    connect_timeout: Option<u32>,

    /// Statement timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    statement_timeout: Option<u64>,

    /// Open the session read-only
    #[arg(long, global = true)]
    readonly: bool,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// All available mammoth subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Test connectivity and report server version and latency
    Test,

    /// Analyze an import source file: format, columns, type hints, preview
    Analyze {
        /// CSV, TSV, JSON, or JSON Lines file
        file: String,
    },

    /// Import a file into a table
    Import {
        /// CSV, TSV, JSON, or JSON Lines file
        file: String,

        /// Existing target table
        #[arg(long, value_name = "TABLE", conflicts_with = "create_table")]
        table: Option<String>,

        /// Create this table from the analyzed column types
        #[arg(long, value_name = "TABLE")]
        create_table: Option<String>,

        /// Target schema
        #[arg(long, value_name = "SCHEMA", default_value = "public")]
        schema: String,

        /// Use row-by-row INSERT instead of COPY
        #[arg(long)]
        no_copy: bool,

        /// Conflict handling: error, skip, update
        #[arg(long, value_name = "MODE", default_value = "error")]
        conflict: String,

        /// Conflict target columns (comma-separated)
        #[arg(long, value_name = "COLS", value_delimiter = ',')]
        conflict_columns: Vec<String>,

        /// Columns to update on conflict (comma-separated)
        #[arg(long, value_name = "COLS", value_delimiter = ',')]
        update_columns: Vec<String>,

        /// Rows per INSERT batch
        #[arg(long, value_name = "N", default_value_t = 1000)]
        batch_size: usize,

        /// Wrap the import in a single transaction
        #[arg(long)]
        transaction: bool,

        /// TRUNCATE the target table first
        #[arg(long)]
        truncate: bool,
    },

    /// Run a query and export the result
    Export {
        /// SQL query to run
        #[arg(long, value_name = "SQL")]
        query: String,

        /// Output format: csv, tsv, json, jsonl, sql, sql-copy, markdown, xlsx
        #[arg(long, value_name = "FORMAT", default_value = "csv")]
        format: String,

        /// Write to this file (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<String>,

        /// Copy to the clipboard instead of writing a file
        #[arg(long, conflicts_with = "output")]
        to_clipboard: bool,

        /// Omit the header row (CSV/TSV)
        #[arg(long)]
        no_headers: bool,

        /// Rendering of NULL cells (CSV/TSV)
        #[arg(long, value_name = "TEXT", default_value = "")]
        null_string: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Table name used in generated SQL
        #[arg(long, value_name = "TABLE", default_value = "export")]
        table_name: String,

        /// Schema used in generated SQL
        #[arg(long, value_name = "SCHEMA")]
        schema_name: Option<String>,
    },

    /// List configured connections
    Connections,
}

fn parse_format(s: &str) -> Result<ExportFormat, MammothError> {
    match s.to_lowercase().as_str() {
        "csv" => Ok(ExportFormat::Csv),
        "tsv" => Ok(ExportFormat::Tsv),
        "json" => Ok(ExportFormat::Json),
        "jsonl" | "ndjson" => Ok(ExportFormat::JsonLines),
        "sql" | "insert" => Ok(ExportFormat::Sql),
        "sql-copy" | "copy" => Ok(ExportFormat::SqlCopy),
        "markdown" | "md" => Ok(ExportFormat::Markdown),
        "xlsx" | "excel" => Ok(ExportFormat::Excel),
        other => Err(MammothError::invalid_input(
            "format",
            format!("Unknown export format '{}'", other),
        )),
    }
}

fn parse_conflict(s: &str) -> Result<ConflictHandling, MammothError> {
    match s.to_lowercase().as_str() {
        "error" => Ok(ConflictHandling::Error),
        "skip" => Ok(ConflictHandling::Skip),
        "update" => Ok(ConflictHandling::Update),
        other => Err(MammothError::invalid_input(
            "conflict",
            format!("Unknown conflict mode '{}'", other),
        )),
    }
}

/// Exit code by error type, for scripting.
fn exit_code(e: &MammothError) -> i32 {
    match e {
        MammothError::InvalidInput { .. } => 2,
        MammothError::ConnectionFailed { .. }
        | MammothError::ConnectionTimeout
        | MammothError::CredentialNotFound { .. } => 3,
        MammothError::QueryFailed { .. } => 4,
        MammothError::Cancelled => 130,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

fn overrides(cli: &Cli) -> CliOverrides {
    CliOverrides {
        host: cli.host.clone(),
        port: cli.port,
        database: cli.dbname.clone(),
        username: cli.user.clone(),
        password: cli.password.clone(),
        ssl_mode: cli.ssl_mode.clone(),
        connect_timeout: cli.connect_timeout,
        statement_timeout_ms: cli.statement_timeout,
        readonly: cli.readonly,
    }
}

/// Build the service and open the configured connection.
async fn connect(cli: &Cli) -> Result<(ConnectionService, uuid::Uuid), MammothError> {
    let resolved = config::resolve(
        cli.config.as_deref(),
        cli.connection.as_deref(),
        &overrides(cli),
    )?;
    let credentials = Arc::new(MemoryCredentialStore::new());
    let mut connection = resolved.config;
    if let Some(ref password) = resolved.password {
        credentials.store_password(connection.id, password)?;
        connection.password_in_keyring = true;
    }
    let service = ConnectionService::new(Arc::new(MemoryConfigStore::new()), credentials);
    service.connect(&connection).await?;
    Ok((service, connection.id))
}

async fn run(cli: &Cli) -> Result<(), MammothError> {
    match &cli.command {
        Commands::Test => {
            let resolved = config::resolve(
                cli.config.as_deref(),
                cli.connection.as_deref(),
                &overrides(cli),
            )?;
            let service = ConnectionService::new(
                Arc::new(MemoryConfigStore::new()),
                Arc::new(MemoryCredentialStore::new()),
            );
            let result = service
                .test_connection(&resolved.config, resolved.password.as_deref())
                .await?;
            print_report!(result, cli.json, output::print_test_result);
            Ok(())
        }

        Commands::Analyze { file } => {
            let source = mammoth_core::import::analyze::analyze(file.as_str()).await?;
            print_report!(source, cli.json, output::print_analysis);
            Ok(())
        }

        Commands::Connections => {
            let entries = config::list(cli.config.as_deref())?;
            output::print_connections(&entries);
            Ok(())
        }

        Commands::Import {
            file,
            table,
            create_table,
            schema,
            no_copy,
            conflict,
            conflict_columns,
            update_columns,
            batch_size,
            transaction,
            truncate,
        } => {
            let source = mammoth_core::import::analyze::analyze(file.as_str()).await?;
            let (service, connection_id) = connect(cli).await?;
            let pool = service
                .get_pool(connection_id)
                .expect("connection was just opened");

            let mut wizard = ImportWizard::new();
            wizard.set_source(source);
            wizard.advance()?; // -> Target

            {
                let client = pool.get().await?;
                wizard.load_tables(&**client, schema).await?;
            }
            match (table, create_table) {
                (Some(name), _) => wizard.select_table(name)?,
                (None, Some(name)) => wizard.set_new_table(name)?,
                (None, None) => {
                    return Err(MammothError::invalid_input(
                        "target",
                        "Pass --table or --create-table",
                    ))
                }
            }

            wizard.advance()?; // -> Mapping (auto-map)
            wizard.advance()?; // -> Options
            wizard.set_options(ImportOptions {
                use_copy: !no_copy,
                conflict_handling: parse_conflict(conflict)?,
                conflict_columns: conflict_columns.clone(),
                update_columns: update_columns.clone(),
                batch_size: *batch_size,
                use_transaction: *transaction,
                truncate_first: *truncate,
            });
            wizard.advance()?; // -> Execute

            let registry = JobRegistry::new();
            let handle = registry.insert(wizard.begin_execution()?);

            // Ctrl-C requests cooperative cancellation
            let cancel_handle = Arc::clone(&handle);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Cancelling import...".yellow());
                    cancel_handle.cancel();
                }
            });

            // The run is fire-and-observe: watch progress from the side
            let progress_task = (!cli.json).then(|| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move {
                    let mut ticker =
                        tokio::time::interval(std::time::Duration::from_millis(500));
                    let mut last_read = 0u64;
                    loop {
                        ticker.tick().await;
                        let Some(progress) = handle.snapshot().progress else {
                            continue;
                        };
                        if progress.rows_read != last_read {
                            last_read = progress.rows_read;
                            eprintln!(
                                "  {} read, {} inserted, {} skipped, {} failed",
                                progress.rows_read,
                                progress.rows_inserted,
                                progress.rows_skipped,
                                progress.rows_failed
                            );
                        }
                    }
                })
            });

            let result = import_execute::execute(&pool, &handle).await;
            if let Some(task) = progress_task {
                task.abort();
            }
            let result = result?;
            print_report!(result, cli.json, output::print_import_result);
            if !result.success {
                process::exit(1);
            }
            Ok(())
        }

        Commands::Export {
            query,
            format,
            output: output_path,
            to_clipboard,
            no_headers,
            null_string,
            pretty,
            table_name,
            schema_name,
        } => {
            let (service, connection_id) = connect(cli).await?;
            let pool = service
                .get_pool(connection_id)
                .expect("connection was just opened");

            let options = ExportOptions {
                format: parse_format(format)?,
                csv: CsvOptions {
                    include_headers: !no_headers,
                    null_string: null_string.clone(),
                    ..Default::default()
                },
                json: JsonOptions {
                    pretty_print: *pretty,
                    ..Default::default()
                },
                sql: SqlOptions {
                    table_name: table_name.clone(),
                    schema_name: schema_name.clone(),
                    ..Default::default()
                },
                ..Default::default()
            };

            // Streamable formats write files incrementally; everything else
            // buffers the full result set first
            if let (Some(path), true) = (output_path, options.format.is_streamable()) {
                let client = pool.get().await?;
                let exporter = StreamingExporter::new(options, None)?;
                let result = exporter.export_query(&client, query, path).await?;
                print_report!(result, cli.json, |r| output::print_export_result(r, path));
                return Ok(());
            }

            let client = pool.get().await?;
            let rows = client.query(query.as_str(), &[]).await?;
            let data = QueryResultData::from_rows(&rows);
            drop(client);

            if *to_clipboard {
                let result = clipboard::copy_to_clipboard(&data, &options)?;
                print_report!(result, cli.json, |r| output::print_export_result(
                    r,
                    "clipboard"
                ));
            } else if let Some(path) = output_path {
                let result = export_to_file(data, options, path).await?;
                print_report!(result, cli.json, |r| output::print_export_result(r, path));
            } else {
                print!("{}", export_to_string(&data, &options)?);
            }
            Ok(())
        }
    }
}
