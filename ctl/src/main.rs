use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{
    commands::{InspectParams, OrderChainParams, ProvisionParams},
    config::ProvisionConfig,
};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "certwrightctl")]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long,
        short,
        global = true,
        env = "CERTWRIGHT_CONFIG_PATH",
        default_value = "/etc/certwright/ssl.toml"
    )]
    config_path: PathBuf,
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Make the server and database certificates ready
    Provision(ProvisionParams),

    /// Order a certificate bundle into its chain and root CA
    #[command(name = "order-chain")]
    OrderChain(OrderChainParams),

    /// Report on the stored certificates
    Inspect(InspectParams),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or("certwright_ssl=info,certwright_store=info,certwrightctl=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Provision(params) => {
            commands::provision(ProvisionConfig::from_file(args.config_path)?, params)
        }
        Command::OrderChain(params) => commands::order_chain(params),
        Command::Inspect(params) => {
            commands::inspect(ProvisionConfig::from_file(args.config_path)?, params)
        }
    }
}
