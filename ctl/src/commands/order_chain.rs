use std::path::PathBuf;

use anyhow::Context;
use certwright_ssl::{CaChain, SslPair, order_cas};
use clap::Parser;

#[derive(Clone, Parser)]
pub struct OrderChainParams {
    /// Root CA certificate
    #[arg(long)]
    pub root: PathBuf,

    /// Intermediate CA certificates, in any order
    #[arg(long = "intermediate")]
    pub intermediates: Vec<PathBuf>,

    /// Leaf certificate, possibly followed by its chain
    #[arg(long)]
    pub cert: PathBuf,

    /// Private key of the leaf certificate
    #[arg(long)]
    pub key: PathBuf,

    /// Write the ordered chain here instead of printing it
    #[arg(long)]
    pub chain_out: Option<PathBuf>,

    /// Write the root CA here instead of printing it
    #[arg(long)]
    pub root_out: Option<PathBuf>,
}

pub fn order_chain(params: OrderChainParams) -> anyhow::Result<()> {
    let ca = CaChain {
        root: Some(params.root),
        intermediate: params.intermediates,
    };
    let pair = SslPair {
        cert: Some(params.cert),
        key: Some(params.key),
    };

    let resolved = order_cas(&ca, &pair).context("Failed to order the certificate chain")?;

    for (content, out) in [
        (&resolved.chain, params.chain_out),
        (&resolved.root, params.root_out),
    ] {
        match out {
            Some(path) => std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => print!("{content}"),
        }
    }

    Ok(())
}
