//! gleaner-acq - image dataset acquisition
//!
//! Walks a set of locations on an automation surface, collects items with
//! enough usable images, labels them and records them in the local sink.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gleaner_common::config::{
    config_file_path, load_toml_config, LoggingConfig, RootFolderInitializer, RootFolderResolver,
};
use gleaner_common::db::init_database;
use gleaner_common::events::EventBus;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gleaner_acq::config::{resolve_credentials, resolve_parameters, store_credentials};
use gleaner_acq::models::AcquisitionState;
use gleaner_acq::services::{AcquisitionService, ControllerDeps, LabelSchema};
use gleaner_acq::sink::{recent_events, Sink, SinkTable, SqliteSink};
use gleaner_acq::surface::{Credentials, FolderSurfaceFactory};

/// Command-line arguments for gleaner-acq
#[derive(Parser, Debug)]
#[command(name = "gleaner-acq")]
#[command(about = "Image dataset acquisition with location rotation")]
#[command(version)]
struct Cli {
    /// Root folder holding the database and image store
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, global = true, env = "GLEANER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one acquisition session
    Run {
        /// Number of accepted items to collect
        #[arg(short, long)]
        target: usize,

        /// Location to visit (repeat for several, in rotation order)
        #[arg(short, long = "location", required = true)]
        locations: Vec<String>,

        /// Source folder served by the automation surface
        #[arg(short, long, env = "GLEANER_SOURCE")]
        source: PathBuf,
    },

    /// Print sink and image store statistics
    Stats,

    /// Print the most recent rows
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(short, long, value_enum, default_value = "records")]
        table: TableArg,
    },

    /// Remove rows from sink tables
    Clear {
        #[arg(short, long, value_enum)]
        table: TableArg,

        /// Remove the header row too
        #[arg(long)]
        drop_header: bool,
    },

    /// Store surface credentials in the database
    SetCredentials {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TableArg {
    Records,
    Events,
    Errors,
    All,
}

impl TableArg {
    fn tables(self) -> Vec<SinkTable> {
        match self {
            TableArg::Records => vec![SinkTable::ExtractedRecords],
            TableArg::Events => vec![SinkTable::ExtractionEvents],
            TableArg::Errors => vec![SinkTable::ErrorEvents],
            TableArg::All => SinkTable::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = cli
        .config
        .clone()
        .or_else(config_file_path)
        .map(|path| load_toml_config(&path))
        .unwrap_or_default();

    init_tracing(&toml_config.logging)?;
    info!("Starting gleaner-acq {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(cli.root_folder.clone(), toml_config.clone()).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let sink: Arc<dyn Sink> = Arc::new(SqliteSink::new(db.clone()).await?);

    let source = match &cli.command {
        Command::Run { source, .. } => source.clone(),
        _ => initializer.root_folder().join("source"),
    };
    let params = resolve_parameters(&toml_config)?;
    let credentials = match resolve_credentials(&db, &toml_config).await? {
        Some(credentials) => credentials,
        None => {
            warn!("No surface credentials configured, using empty credentials");
            Credentials::new("", "")
        }
    };

    let service = AcquisitionService::new(
        params,
        ControllerDeps {
            factory: Arc::new(FolderSurfaceFactory::new(source, None)),
            sink: sink.clone(),
            event_bus: EventBus::new(100),
            credentials,
            image_dir: initializer.image_dir(),
            label_schema: LabelSchema::standard(),
        },
    );

    match cli.command {
        Command::Run {
            target, locations, ..
        } => {
            let session_id = service.start(target, locations).await?;
            info!(session_id = %session_id, "Acquisition running (Ctrl+C to cancel)");

            let canceller = service.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling acquisition");
                    canceller.cancel().await;
                }
            });

            let snapshot = service
                .wait()
                .await
                .context("Acquisition session vanished")?;
            print_json(&snapshot)?;
            if snapshot.state == AcquisitionState::Aborted {
                anyhow::bail!("Acquisition session aborted");
            }
        }
        Command::Stats => print_json(&service.stats().await?)?,
        Command::Recent { limit, table } => {
            if table == TableArg::Records {
                print_json(&service.recent_items(limit).await?)?;
            } else {
                for table in table.tables() {
                    let rows = recent_events(sink.as_ref(), table, limit).await?;
                    println!("# {}", table.name());
                    print_json(&rows)?;
                }
            }
        }
        Command::Clear { table, drop_header } => {
            for table in table.tables() {
                sink.clear(table, !drop_header).await?;
                info!(table = table.name(), drop_header, "Sink table cleared");
            }
        }
        Command::SetCredentials { username, password } => {
            store_credentials(&db, &Credentials::new(username, password)).await?;
        }
    }

    Ok(())
}

/// stderr logging plus an optional log file; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
