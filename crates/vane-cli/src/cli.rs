use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "vane")]
#[command(about = "Vane CLI — drive a Vane reconciliation controller")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Controller base URL
    #[arg(
        short,
        long,
        global = true,
        env = "VANE_SERVER",
        default_value = "http://127.0.0.1:8090"
    )]
    pub server: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered applications
    List,
    /// Show one application's full status and revision history
    Get(GetArgs),
    /// Register an application from a declaration file
    Register(RegisterArgs),
    /// Deregister an application
    Deregister(DeregisterArgs),
    /// Trigger a manual resync
    Sync(GetArgs),
    /// Roll back to a revision from history
    Rollback(RollbackArgs),
    /// Check controller health
    Status,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Application name
    pub name: String,
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// Path to a JSON declaration file
    #[arg(short, long)]
    pub file: String,
}

#[derive(clap::Args)]
pub struct DeregisterArgs {
    /// Application name
    pub name: String,
    /// Also delete every resource the application owns
    #[arg(long)]
    pub cascade: bool,
}

#[derive(clap::Args)]
pub struct RollbackArgs {
    /// Application name
    pub name: String,
    /// Revision index from the application's history
    pub index: usize,
}
