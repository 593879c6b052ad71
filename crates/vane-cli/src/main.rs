mod cli;
mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use client::ControllerClient;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let client = ControllerClient::new(&cli.server);

    match &cli.command {
        Commands::List => {
            commands::apps::list(&client, format).await?;
        }
        Commands::Get(args) => {
            commands::apps::get(&client, &args.name, format).await?;
        }
        Commands::Register(args) => {
            commands::apps::register(&client, &args.file).await?;
        }
        Commands::Deregister(args) => {
            commands::apps::deregister(&client, &args.name, args.cascade).await?;
        }
        Commands::Sync(args) => {
            commands::apps::sync(&client, &args.name).await?;
        }
        Commands::Rollback(args) => {
            commands::apps::rollback(&client, &args.name, args.index).await?;
        }
        Commands::Status => {
            commands::server::status(&client, &cli.server).await?;
        }
    }
    Ok(())
}
