use std::sync::Arc;

use anyhow::Context;
use certwright_ssl::{CaPassword, LocalCaGenerator, ProvisioningEngine, legacy_source};
use clap::Parser;
use tracing::info;

use crate::config::ProvisionConfig;

#[derive(Clone, Parser)]
pub struct ProvisionParams {
    /// Password of the deployment CA key, overrides the configuration file
    #[arg(long, env = "CERTWRIGHT_SSL_PASSWORD", hide_env_values = true)]
    pub ssl_password: Option<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn provision(config: ProvisionConfig, params: ProvisionParams) -> anyhow::Result<()> {
    let mut settings = config.ssl;
    if let Some(password) = params.ssl_password {
        settings.password = Some(CaPassword::new(password));
    }

    let engine = ProvisioningEngine::new(
        config.store.build(),
        Arc::new(LocalCaGenerator::new(&config.ca_dir)),
        &config.fqdn,
    )
    .with_legacy(legacy_source(config.generation, &config.legacy_root));

    let report = engine
        .provision(&settings)
        .context("Failed to provision the TLS material")?;
    info!(fqdn = %config.fqdn, "TLS material ready");

    if params.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            let [ca, cert, key] = result.secrets.all();
            println!("{}: {} ({ca}, {cert}, {key})", result.identity, result.source);
        }
    }

    Ok(())
}
