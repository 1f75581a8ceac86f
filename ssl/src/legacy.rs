//! Material left behind by a legacy deployment at well known file locations.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, SslError},
    identity::Identity,
};

/// How the deployment being provisioned was originally installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentGeneration {
    #[default]
    Current,
    Legacy,
}

/// CA, certificate and key bytes of one identity.
#[derive(Clone, PartialEq, Eq)]
pub struct LegacyMaterial {
    pub ca: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl Debug for LegacyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyMaterial")
            .field("ca", &self.ca.len())
            .field("cert", &self.cert.len())
            .field("key", &"***")
            .finish()
    }
}

pub trait LegacySource: Debug + Send + Sync {
    /// The identity's material, or `None` unless all three pieces exist.
    fn read(&self, identity: Identity) -> Result<Option<LegacyMaterial>>;
}

/// Used by current deployments, never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacy;

impl LegacySource for NoLegacy {
    fn read(&self, _identity: Identity) -> Result<Option<LegacyMaterial>> {
        Ok(None)
    }
}

/// Reads the legacy file layout below a mount point.
#[derive(Debug, Clone)]
pub struct FileLegacySource {
    root: PathBuf,
}

struct LegacyPaths {
    ca: &'static str,
    cert: &'static str,
    key: &'static str,
}

fn legacy_paths(identity: Identity) -> LegacyPaths {
    match identity {
        Identity::Server => LegacyPaths {
            ca: "etc/pki/trust/anchors/LOCAL-RHN-ORG-TRUSTED-SSL-CERT",
            cert: "etc/pki/tls/certs/spacewalk.crt",
            key: "etc/pki/tls/private/spacewalk.key",
        },
        Identity::Database => LegacyPaths {
            ca: "etc/pki/trust/anchors/DB-RHN-ORG-TRUSTED-SSL-CERT",
            cert: "etc/pki/tls/certs/reportdb.crt",
            key: "etc/pki/tls/private/reportdb.key",
        },
    }
}

impl FileLegacySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LegacySource for FileLegacySource {
    fn read(&self, identity: Identity) -> Result<Option<LegacyMaterial>> {
        let paths = legacy_paths(identity);
        let ca = self.root.join(paths.ca);
        let cert = self.root.join(paths.cert);
        let key = self.root.join(paths.key);

        for path in [&ca, &cert, &key] {
            if !path.is_file() {
                debug!(%identity, path = %path.display(), "No legacy file");
                return Ok(None);
            }
        }

        let read = |path: &Path| std::fs::read(path).map_err(|e| SslError::io(path, e));
        Ok(Some(LegacyMaterial {
            ca: read(&ca)?,
            cert: read(&cert)?,
            key: read(&key)?,
        }))
    }
}

/// Pick the legacy source matching the deployment generation.
pub fn legacy_source(
    generation: DeploymentGeneration,
    root: impl Into<PathBuf>,
) -> Box<dyn LegacySource> {
    match generation {
        DeploymentGeneration::Current => Box::new(NoLegacy),
        DeploymentGeneration::Legacy => Box::new(FileLegacySource::new(root)),
    }
}

/// Lay out legacy files below `root`. Test helper.
#[cfg(test)]
pub(crate) fn write_legacy(root: &Path, identity: Identity, material: &LegacyMaterial) {
    let paths = legacy_paths(identity);
    for (path, data) in [
        (paths.ca, &material.ca),
        (paths.cert, &material.cert),
        (paths.key, &material.key),
    ] {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> LegacyMaterial {
        LegacyMaterial {
            ca: b"ca".to_vec(),
            cert: b"cert".to_vec(),
            key: b"key".to_vec(),
        }
    }

    #[test]
    fn test_reads_complete_material() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy(dir.path(), Identity::Database, &material());
        let source = FileLegacySource::new(dir.path());

        assert_eq!(source.read(Identity::Database).unwrap(), Some(material()));
        assert_eq!(source.read(Identity::Server).unwrap(), None);
    }

    #[test]
    fn test_partial_material_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy(dir.path(), Identity::Server, &material());
        std::fs::remove_file(dir.path().join("etc/pki/tls/private/spacewalk.key")).unwrap();

        let source = FileLegacySource::new(dir.path());
        assert_eq!(source.read(Identity::Server).unwrap(), None);
    }

    #[test]
    fn test_current_deployments_skip_legacy_files() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy(dir.path(), Identity::Server, &material());

        let current = legacy_source(DeploymentGeneration::Current, dir.path());
        let legacy = legacy_source(DeploymentGeneration::Legacy, dir.path());

        assert_eq!(current.read(Identity::Server).unwrap(), None);
        assert_eq!(legacy.read(Identity::Server).unwrap(), Some(material()));
    }

    #[test]
    fn test_key_is_not_logged() {
        let debug = format!("{:?}", material());
        assert!(debug.contains(r#"key: "***""#));
        assert!(debug.contains("cert: 4"));
    }
}
