//! # Living Policy Simulator CLI (`lps`)
//!
//! ## Usage
//!
//! ```bash
//! lps --config ./config/lps.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lps init` | Create the local SQLite database |
//! | `lps uploads list\|add <path>\|delete <id>` | Manage uploaded documents |
//! | `lps analyze <path>\|--upload <name>` | Extract a document's policy structure with the LLM |
//! | `lps analyses list\|get <file>` | Remote analysis history / cached analysis |
//! | `lps simulate <file> [--lever k=v]...` | Forecast outcomes for an analyzed document |
//! | `lps simulations list\|delete <id>\|status <id> <status>` | Manage simulations |
//! | `lps presign <key>` | Presigned S3 upload URL |
//! | `lps serve` | Start the JSON HTTP API |
//!
//! Without a config file, `lps` runs local-only against `./data/lps.sqlite`.
//! Store calls that fall back to local storage print a `warning:` line to
//! stderr but still succeed.

use anyhow::Result;
use clap::{Parser, Subcommand};
use policy_sim::config::{self, Config};
use policy_sim::context::AppContext;
use policy_sim::{logging, migrate, prompts, server};
use policy_sim_core::hybrid::SyncStatus;
use policy_sim_core::models::SimulationStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Living Policy Simulator: analyze policy documents, simulate outcomes,
/// and keep results in sync between this device and your account.
#[derive(Parser)]
#[command(name = "lps", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lps.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local database. Idempotent.
    Init,

    /// Manage uploaded documents (local to this device).
    Uploads {
        #[command(subcommand)]
        action: UploadAction,
    },

    /// Extract the policy structure of a document and cache it.
    Analyze {
        /// Document to analyze (.pdf, .docx, .pptx, .txt, .md).
        #[arg(required_unless_present = "upload", conflicts_with = "upload")]
        path: Option<PathBuf>,

        /// Analyze a registered upload by name instead, fetching its bytes
        /// from object storage when it was stored there.
        #[arg(long, value_name = "NAME")]
        upload: Option<String>,
    },

    /// Read analyses.
    Analyses {
        #[command(subcommand)]
        action: AnalysisAction,
    },

    /// Run a simulation against a previously analyzed document.
    Simulate {
        /// File name the analysis was saved under.
        file: String,

        /// Scenario name (defaults to "<policy title> baseline").
        #[arg(long)]
        scenario: Option<String>,

        /// Override a lever, e.g. `--lever carbon_tax=80`. Repeatable.
        #[arg(long = "lever", value_name = "NAME=VALUE")]
        levers: Vec<String>,
    },

    /// Manage simulation results.
    Simulations {
        #[command(subcommand)]
        action: SimulationAction,
    },

    /// Print a presigned PUT URL for object storage.
    Presign {
        /// Object key, e.g. `uploads/Act.pdf`.
        key: String,

        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum UploadAction {
    /// List uploads, newest first.
    List,
    /// Register a document (and push it to object storage when configured).
    Add { path: PathBuf },
    /// Delete an upload record by id.
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum AnalysisAction {
    /// List analyses stored in your account (empty when signed out).
    List,
    /// Print the cached analysis for a file.
    Get { file: String },
}

#[derive(Subcommand)]
enum SimulationAction {
    /// List simulations, newest first.
    List,
    /// Delete a simulation by id.
    Delete { id: String },
    /// Change a simulation's status (draft, completed, deployed).
    Status { id: String, status: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        debug!(path = %cli.config.display(), "config file not found; running local-only");
        Config::minimal()
    };

    let ctx = Arc::new(AppContext::from_config(cfg).await?);
    let store = ctx.store.clone();
    let workflow = ctx.workflow.clone();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&ctx.config).await?;
            println!("Database initialized at {}", ctx.config.local.path.display());
        }
        Commands::Uploads { action } => match action {
            UploadAction::List => {
                let outcome = store.list_uploads().await;
                warn_if_degraded(&outcome.sync);
                if outcome.value.is_empty() {
                    println!("No uploads.");
                }
                for file in outcome.value {
                    println!(
                        "{}\t{}\t{}\t{:?}\t{}",
                        file.id, file.name, file.size, file.status, file.source
                    );
                }
            }
            UploadAction::Add { path } => {
                let outcome = workflow.upload_document(&path).await?;
                warn_if_degraded(&outcome.sync);
                let uploaded = outcome.value;
                if uploaded.created {
                    println!(
                        "Registered {} ({}) as upload {}",
                        uploaded.file.name, uploaded.file.size, uploaded.file.id
                    );
                } else {
                    println!("{} is already registered.", uploaded.file.name);
                }
            }
            UploadAction::Delete { id } => {
                let outcome = store.delete_upload(id).await;
                warn_if_degraded(&outcome.sync);
                println!("Deleted upload {}.", id);
            }
        },
        Commands::Analyze { path, upload } => {
            let outcome = match (path, upload) {
                (_, Some(name)) => workflow.analyze_upload(&name).await?,
                (Some(path), None) => workflow.analyze_document(&path).await?,
                (None, None) => anyhow::bail!("Pass a document path or --upload <name>"),
            };
            warn_if_degraded(&outcome.sync);
            println!("{}", serde_json::to_string_pretty(&outcome.value)?);
        }
        Commands::Analyses { action } => match action {
            AnalysisAction::List => {
                let outcome = store.list_analyses().await;
                warn_if_degraded(&outcome.sync);
                if outcome.value.is_empty() {
                    println!("No analyses.");
                }
                for analysis in outcome.value {
                    println!("{}\t{}", analysis.timestamp, analysis.file_name);
                }
            }
            AnalysisAction::Get { file } => {
                let outcome = store.get_analysis(&file).await;
                warn_if_degraded(&outcome.sync);
                let analysis = outcome
                    .value
                    .ok_or_else(|| anyhow::anyhow!("No analysis found for {}", file))?;
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            }
        },
        Commands::Simulate {
            file,
            scenario,
            levers,
        } => {
            let overrides = levers
                .iter()
                .map(|raw| prompts::parse_override(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let outcome = workflow
                .run_simulation(&file, &overrides, scenario.as_deref())
                .await?;
            warn_if_degraded(&outcome.sync);
            println!("{}", serde_json::to_string_pretty(&outcome.value)?);
        }
        Commands::Simulations { action } => match action {
            SimulationAction::List => {
                let outcome = store.list_simulations().await;
                warn_if_degraded(&outcome.sync);
                if outcome.value.is_empty() {
                    println!("No simulations.");
                }
                for sim in outcome.value {
                    println!(
                        "{}\t{}\t{}\t{}",
                        sim.id, sim.status, sim.created_at, sim.scenario_name
                    );
                }
            }
            SimulationAction::Delete { id } => {
                let outcome = store.delete_simulation(&id).await;
                warn_if_degraded(&outcome.sync);
                println!("Deleted simulation {}.", id);
            }
            SimulationAction::Status { id, status } => {
                let status: SimulationStatus = status.parse().map_err(anyhow::Error::msg)?;
                let outcome = workflow.set_simulation_status(&id, status).await?;
                warn_if_degraded(&outcome.sync);
                println!("Simulation {} is now {}.", id, outcome.value.status);
            }
        },
        Commands::Presign { key, content_type } => {
            let objects = ctx.objects.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Object storage unavailable. Configure [storage] and set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY."
                )
            })?;
            println!("{}", objects.presign_put(&key, &content_type));
        }
        Commands::Serve => {
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}

fn warn_if_degraded(sync: &SyncStatus) {
    if let Some(reason) = sync.reason() {
        eprintln!("warning: not synced to your account ({})", reason);
    }
}
