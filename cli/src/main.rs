//! PortPilot CLI - Manage Kubernetes port-forward tunnels
//!
//! A command-line tool for saving, resuming, and controlling
//! port-forward tunnels through the cluster proxy backend.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use portpilot_core::{HttpControlApi, JsonFileStorage, PortForwardStore};

use commands::{ProtocolArg, TargetArgs};

#[derive(Parser)]
#[command(name = "portpilot")]
#[command(author, version, about = "Manage Kubernetes port-forward tunnels")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the port-forward control backend
    #[arg(long, global = true, default_value = "http://127.0.0.1:9292")]
    api_url: String,

    /// Override the storage file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved port-forwards
    #[command(alias = "ls")]
    List,

    /// Resume saved port-forwards
    Resume,

    /// Add a port-forward
    Add {
        #[command(flatten)]
        target: TargetArgs,

        /// Local port (0 = any free port)
        #[arg(short, long, default_value = "0")]
        local_port: u16,

        /// Protocol served over the tunnel
        #[arg(long, value_enum, default_value = "http")]
        protocol: ProtocolArg,

        /// Register without starting
        #[arg(long)]
        disabled: bool,
    },

    /// Start a saved port-forward
    Start {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Stop a port-forward
    Stop {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Move a port-forward to a new local port
    Modify {
        #[command(flatten)]
        target: TargetArgs,

        /// New local port
        local_port: u16,

        /// New protocol
        #[arg(long, value_enum)]
        protocol: Option<ProtocolArg>,
    },

    /// Remove a port-forward
    #[command(alias = "rm")]
    Remove {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Query the live state of a port-forward
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();

    let storage = match &cli.config {
        Some(path) => JsonFileStorage::with_path(path.clone()),
        None => JsonFileStorage::new()?,
    };
    let control = HttpControlApi::new(&cli.api_url);
    let store = PortForwardStore::new(storage, control);

    match cli.command {
        Commands::List => commands::list::run(&store, cli.json).await?,
        Commands::Resume => commands::resume::run(&store, cli.json).await?,
        Commands::Add {
            target,
            local_port,
            protocol,
            disabled,
        } => commands::add::run(&store, target, local_port, protocol, disabled, cli.json).await?,
        Commands::Start { target } => commands::start::run(&store, target, cli.json).await?,
        Commands::Stop { target } => commands::stop::run(&store, target).await?,
        Commands::Modify {
            target,
            local_port,
            protocol,
        } => commands::modify::run(&store, target, local_port, protocol, cli.json).await?,
        Commands::Remove { target } => commands::remove::run(&store, target).await?,
        Commands::Status { target } => commands::status::run(&store, target, cli.json).await?,
    }

    Ok(())
}
