use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use weft_core::app_config::load_document_async;
use weft_core::{Context, Error, Result};

/// Weft: builds and runs reactive component graphs from configuration files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Log level or filter directive; RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch a configuration and keep it running
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Stop after this many milliseconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Build and tear down configurations without starting them
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List the available component implementations and object types
    List,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Configuration document (.json, .yaml, .yml or .toml)
    pub file: PathBuf,

    /// Configuration id; defaults to the first one (`run`) or all of them (`check`)
    #[arg(long)]
    pub config: Option<String>,

    /// Parameter for `%NAME%` placeholders, as NAME=VALUE
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

impl TargetArgs {
    fn parameters(&self) -> BTreeMap<String, String> {
        self.params.iter().cloned().collect()
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

pub async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run { target, duration_ms } => run(&target, duration_ms.map(Duration::from_millis)).await,
        Commands::Check { target } => check(&target).await,
        Commands::List => list().await,
    }
}

/// Context configured by the document, with the core components and every
/// template of the document registered.
async fn open(file: &Path) -> Result<(Arc<Context>, Vec<String>)> {
    let document = load_document_async(file).await?;
    let context = Context::with_config(document.context.clone())?;
    core_components::register_all(&context)?;
    let ids = context.register_document(&document)?;
    info!("Loaded {} configuration(s) from {}", ids.len(), file.display());
    Ok((context, ids))
}

async fn run(target: &TargetArgs, duration: Option<Duration>) -> Result<()> {
    let (context, ids) = open(&target.file).await?;
    let Some(id) = target.config.clone().or_else(|| ids.first().cloned()) else {
        context.shutdown().await?;
        return Err(Error::Other(format!("{} declares no configuration", target.file.display())));
    };

    let mut manager = context
        .app_config_manager(&id)
        .with_parameters(target.parameters());
    if let Err(e) = manager.launch().await {
        if let Err(cleanup) = manager.stop_and_destroy().await {
            warn!("Cleanup after failed launch of '{}' failed: {}", id, cleanup);
        }
        context.shutdown().await?;
        return Err(e);
    }
    println!("Running configuration '{}' ({} component(s))", id, manager.services().len());

    let waited = match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(()),
                interrupted = tokio::signal::ctrl_c() => interrupted,
            }
        }
        None => tokio::signal::ctrl_c().await,
    };
    if let Err(e) = waited {
        warn!("Failed to wait for Ctrl-C: {}", e);
    }

    manager.stop_and_destroy().await?;
    context.shutdown().await?;
    println!("Stopped configuration '{}'", id);
    Ok(())
}

async fn check(target: &TargetArgs) -> Result<()> {
    let (context, ids) = open(&target.file).await?;
    let selected = match &target.config {
        Some(id) => vec![id.clone()],
        None => ids,
    };
    let mut outcome = Ok(());
    for id in &selected {
        let mut manager = context
            .app_config_manager(id)
            .with_parameters(target.parameters());
        if let Err(e) = manager.create().await {
            outcome = Err(e);
            break;
        }
        println!(
            "Configuration '{}' is valid ({} object(s), {} component(s))",
            id,
            manager.objects().len(),
            manager.services().len()
        );
        manager.destroy().await?;
    }
    context.shutdown().await?;
    outcome
}

async fn list() -> Result<()> {
    let context = Context::new()?;
    core_components::register_all(&context)?;
    println!("Component implementations:");
    for implementation in context.implementations() {
        println!("  - {}", implementation);
    }
    println!("Object types:");
    for object_type in context.object_types() {
        println!("  - {}", object_type);
    }
    context.shutdown().await
}
