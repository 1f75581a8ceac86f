use std::path::PathBuf;

use anyhow::Context;
use certwright_ssl::support;
use chrono::Utc;
use clap::Parser;

use crate::config::ProvisionConfig;

#[derive(Clone, Parser)]
pub struct InspectParams {
    /// Write the report to this file instead of printing it
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn inspect(config: ProvisionConfig, params: InspectParams) -> anyhow::Result<()> {
    let store = config.store.build();
    let report = support::collect(store.as_ref(), &config.fqdn, Utc::now());

    let content = if params.json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.to_string()
    };

    match params.output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Certificate report written to {}", path.display());
        }
        None => print!("{content}"),
    }

    if report.has_issues() {
        anyhow::bail!("Certificate issues detected");
    }
    Ok(())
}
