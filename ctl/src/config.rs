use std::{path::PathBuf, sync::Arc};

use certwright_ssl::{DeploymentGeneration, SslSettings};
use certwright_store::{CertificateStore, DirectoryStore, PodmanSecretStore};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// Fully qualified host name the server is reached under.
    pub fqdn: String,

    #[serde(default)]
    pub generation: DeploymentGeneration,

    /// Mount point of a legacy deployment's file system.
    #[serde(default = "default_legacy_root")]
    pub legacy_root: PathBuf,

    /// Where the deployment CA certificate and encrypted key live.
    #[serde(default = "default_ca_dir")]
    pub ca_dir: PathBuf,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ssl: SslSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Podman {
        #[serde(default = "default_podman")]
        podman: PathBuf,
    },
    Directory {
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Podman {
            podman: default_podman(),
        }
    }
}

impl StoreConfig {
    pub fn build(&self) -> Arc<dyn CertificateStore> {
        match self {
            StoreConfig::Podman { podman } => Arc::new(PodmanSecretStore::with_program(
                podman,
                Vec::<PathBuf>::new(),
            )),
            StoreConfig::Directory { path } => Arc::new(DirectoryStore::new(path)),
        }
    }
}

fn default_legacy_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_ca_dir() -> PathBuf {
    PathBuf::from("/var/lib/certwright/ca")
}

fn default_podman() -> PathBuf {
    PathBuf::from("podman")
}

impl ProvisionConfig {
    pub fn from_file(path: PathBuf) -> anyhow::Result<Self> {
        let config_str = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config = toml::from_str(&config_str).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e)
        })?;
        Ok(config)
    }
}
