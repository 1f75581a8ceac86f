//! Decides, per identity, where its TLS material comes from.
//!
//! Each identity goes through a fixed priority list: operator supplied
//! material, entries already in the store, files of a legacy deployment, and
//! finally generation. Identities that reach generation are generated
//! together so they share one CA and one expiration date.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use certwright_store::CertificateStore;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    certificate::decode_certificates,
    chain::{ResolvedChain, order_cas},
    error::{Result, SslError},
    generator::{CertificateGenerator, GenerateError, GenerationRequest},
    identity::{Identity, SecretNames},
    legacy::{LegacySource, NoLegacy},
    types::{CaChain, SslPair, SslSettings, ThirdPartyMaterial},
    validate::{check_key_not_encrypted, verify_hostnames},
};

pub const DEFAULT_VALIDITY_DAYS: i64 = 3650;

/// Where an identity's material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Provided,
    Stored,
    Legacy,
    Generated,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Provided => "provided",
            Source::Stored => "stored",
            Source::Legacy => "legacy",
            Source::Generated => "generated",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningResult {
    pub identity: Identity,
    pub ready: bool,
    pub source: Source,
    pub secrets: SecretNames,
}

/// Outcome of one provisioning run, one result per identity.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    pub results: Vec<ProvisioningResult>,
}

impl ProvisioningReport {
    pub fn get(&self, identity: Identity) -> Option<&ProvisioningResult> {
        self.results.iter().find(|r| r.identity == identity)
    }

    pub fn source(&self, identity: Identity) -> Option<Source> {
        self.get(identity).map(|r| r.source)
    }

    pub fn all_ready(&self) -> bool {
        self.results.iter().all(|r| r.ready)
    }
}

enum StoredState {
    Ready,
    Mismatch,
    Incomplete,
}

#[derive(Debug)]
pub struct ProvisioningEngine {
    store: Arc<dyn CertificateStore>,
    generator: Arc<dyn CertificateGenerator>,
    legacy: Box<dyn LegacySource>,
    fqdn: String,
    validity: Duration,
}

impl ProvisioningEngine {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        generator: Arc<dyn CertificateGenerator>,
        fqdn: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            legacy: Box::new(NoLegacy),
            fqdn: fqdn.into(),
            validity: Duration::days(DEFAULT_VALIDITY_DAYS),
        }
    }

    pub fn with_legacy(mut self, legacy: Box<dyn LegacySource>) -> Self {
        self.legacy = legacy;
        self
    }

    /// Lifetime of generated certificates.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Make the server and database material ready.
    #[instrument(skip_all, fields(fqdn = %self.fqdn))]
    pub fn provision(&self, settings: &SslSettings) -> Result<ProvisioningReport> {
        settings.check_parameters()?;

        let mut sources = BTreeMap::new();
        let mut pending = Vec::new();
        for identity in Identity::ALL {
            match self.prepare(identity, settings)? {
                Some(source) => {
                    sources.insert(identity, source);
                }
                None => pending.push(identity),
            }
        }

        if !pending.is_empty() {
            let reused: Vec<Identity> = sources
                .iter()
                .filter(|(_, source)| matches!(source, Source::Stored | Source::Legacy))
                .map(|(identity, _)| *identity)
                .collect();
            self.generate(&pending, &reused, settings)?;
            for identity in pending {
                sources.insert(identity, Source::Generated);
            }
        }

        let results = sources
            .into_iter()
            .map(|(identity, source)| ProvisioningResult {
                identity,
                ready: true,
                source,
                secrets: identity.secrets(),
            })
            .collect();

        Ok(ProvisioningReport { results })
    }

    fn prepare(&self, identity: Identity, settings: &SslSettings) -> Result<Option<Source>> {
        let material = settings.third_party(identity);
        if material.is_provided() {
            self.use_provided(identity, material)?;
            return Ok(Some(Source::Provided));
        }

        match self.stored_state(identity)? {
            StoredState::Ready => return Ok(Some(Source::Stored)),
            StoredState::Mismatch => return Ok(None),
            StoredState::Incomplete => {}
        }

        if self.reuse_legacy(identity)? {
            return Ok(Some(Source::Legacy));
        }

        Ok(None)
    }

    #[instrument(skip(self, material))]
    fn use_provided(&self, identity: Identity, material: &ThirdPartyMaterial) -> Result<()> {
        let resolved = self.validate(identity, &material.ca, &material.pair)?;

        let Some(key_path) = material.pair.key.as_deref() else {
            return Err(SslError::IncompleteThirdParty { identity });
        };
        let key = fs::read(key_path).map_err(|e| SslError::io(key_path, e))?;

        self.store_triplet(identity, &resolved, &key)?;
        info!("Using the provided certificate");
        Ok(())
    }

    fn validate(&self, identity: Identity, ca: &CaChain, pair: &SslPair) -> Result<ResolvedChain> {
        let resolved = order_cas(ca, pair)?;
        if let Some(key) = pair.key.as_deref() {
            check_key_not_encrypted(key)?;
        }
        verify_hostnames(
            resolved.root.as_bytes(),
            resolved.chain.as_bytes(),
            identity,
            &self.fqdn,
        )?;
        Ok(resolved)
    }

    fn stored_state(&self, identity: Identity) -> Result<StoredState> {
        let names = identity.secrets();
        for name in names.all() {
            if !self.store.exists(name)? {
                debug!(%identity, secret = name, "Stored material incomplete");
                return Ok(StoredState::Incomplete);
            }
        }

        let ca = self.store.read(names.ca)?;
        let cert = self.store.read(names.cert)?;
        match verify_hostnames(&ca, &cert, identity, &self.fqdn) {
            Ok(()) => {
                info!(%identity, "Reusing the stored certificate");
                Ok(StoredState::Ready)
            }
            Err(e) => {
                warn!(%identity, error = %e, "Stored certificate cannot be reused, generating a new one");
                Ok(StoredState::Mismatch)
            }
        }
    }

    #[instrument(skip(self))]
    fn reuse_legacy(&self, identity: Identity) -> Result<bool> {
        let Some(material) = self.legacy.read(identity)? else {
            return Ok(false);
        };

        let staging = scratch_dir()?;
        let ca = CaChain {
            root: Some(stage(staging.path(), "ca.crt", &material.ca)?),
            intermediate: Vec::new(),
        };
        let pair = SslPair {
            cert: Some(stage(staging.path(), "cert.crt", &material.cert)?),
            key: Some(stage(staging.path(), "cert.key", &material.key)?),
        };

        match self.validate(identity, &ca, &pair) {
            Ok(resolved) => {
                self.store_triplet(identity, &resolved, &material.key)?;
                info!("Migrated the legacy certificate");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Legacy certificate cannot be reused, generating a new one");
                Ok(false)
            }
        }
    }

    /// Generate `pending` identities. Identities in `reused` keep their
    /// material and must already trace to the generator's CA.
    #[instrument(skip(self, settings))]
    fn generate(
        &self,
        pending: &[Identity],
        reused: &[Identity],
        settings: &SslSettings,
    ) -> Result<()> {
        let Some(&first) = pending.first() else {
            return Ok(());
        };
        let password = settings
            .ca_password()
            .ok_or(SslError::MissingCaPassword)?;

        if self.generator.has_ca_key() {
            self.generator
                .validate_ca(password)
                .map_err(|e| generation_error(first, e))?;
        } else if pending.len() < Identity::ALL.len() {
            return Err(SslError::CaUnavailable { identity: first });
        }

        for &identity in reused {
            if !self.shares_generator_ca(identity)? {
                warn!(%identity, "Reused certificate is not signed by the deployment CA");
                return Err(SslError::CaUnavailable { identity: first });
            }
        }

        let not_after = Utc::now()
            .checked_add_signed(self.validity)
            .ok_or_else(|| SslError::Generation {
                identity: first,
                reason: format!("validity of {} days is out of range", self.validity.num_days()),
            })?;
        let staging = scratch_dir()?;

        let mut generated = Vec::with_capacity(pending.len());
        for &identity in pending {
            let mut alt_names = identity.hostnames(&self.fqdn);
            if identity == Identity::Server {
                alt_names.extend(settings.cnames.iter().cloned());
            }

            let request = GenerationRequest {
                subject: &settings.subject,
                password,
                common_name: identity.common_name(&self.fqdn),
                alt_names,
                not_after,
                file_stem: identity.file_stem(),
            };
            let files = self
                .generator
                .generate(&request, staging.path())
                .map_err(|e| generation_error(identity, e))?;

            let ca = read_generated(identity, &files.ca)?;
            let cert = read_generated(identity, &files.cert)?;
            let key = read_generated(identity, &files.key)?;
            verify_hostnames(&ca, &cert, identity, &self.fqdn)?;

            generated.push((identity, ca, cert, key));
        }

        for (identity, ca, cert, key) in generated {
            let names = identity.secrets();
            self.store.put(names.ca, &ca)?;
            self.store.put(names.cert, &cert)?;
            self.store.put(names.key, &key)?;
            info!(%identity, not_after = %not_after, "Generated a new certificate");
        }

        Ok(())
    }

    fn shares_generator_ca(&self, identity: Identity) -> Result<bool> {
        let Some(generator_ca) = self
            .generator
            .ca_certificate()
            .map_err(|e| generation_error(identity, e))?
        else {
            return Ok(false);
        };
        let generator_ca = decode_certificates(&generator_ca, Path::new("ca.crt"))?;

        let name = identity.secrets().ca;
        let stored = decode_certificates(&self.store.read(name)?, Path::new(name))?;
        Ok(stored
            .iter()
            .any(|ca| generator_ca.iter().any(|own| own.der == ca.der)))
    }

    fn store_triplet(&self, identity: Identity, resolved: &ResolvedChain, key: &[u8]) -> Result<()> {
        let names = identity.secrets();
        self.store.put(names.ca, resolved.root.as_bytes())?;
        self.store.put(names.cert, resolved.chain.as_bytes())?;
        self.store.put(names.key, key)?;
        Ok(())
    }
}

fn generation_error(identity: Identity, err: GenerateError) -> SslError {
    match err {
        GenerateError::CaUnavailable { .. } => SslError::CaUnavailable { identity },
        GenerateError::PasswordInvalid => SslError::CaPasswordInvalid,
        other => SslError::Generation {
            identity,
            reason: other.to_string(),
        },
    }
}

fn scratch_dir() -> Result<tempfile::TempDir> {
    tempfile::tempdir().map_err(|e| SslError::io(std::env::temp_dir(), e))
}

fn stage(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, data).map_err(|e| SslError::io(&path, e))?;
    Ok(path)
}

fn read_generated(identity: Identity, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| SslError::Generation {
        identity,
        reason: format!("missing output {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use certwright_store::MemoryStore;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        generator::{LocalCaGenerator, encrypt_private_key},
        legacy::{FileLegacySource, LegacyMaterial, write_legacy},
        testing::{self, TestCa},
        types::CaPassword,
        validate::verify_hostname,
    };

    const FQDN: &str = "server.example.com";
    const DB_HOSTS: [&str; 3] = [FQDN, "db", "reportdb"];

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryStore>,
        generator: Arc<LocalCaGenerator>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let generator =
                Arc::new(LocalCaGenerator::new(dir.path().join("ca")).with_kdf_iterations(1_000));
            Self {
                dir,
                store: Arc::new(MemoryStore::new()),
                generator,
            }
        }

        fn engine(&self, fqdn: &str) -> ProvisioningEngine {
            ProvisioningEngine::new(self.store.clone(), self.generator.clone(), fqdn)
        }

        fn entry(&self, name: &str) -> Vec<u8> {
            self.store.read(name).unwrap()
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }
    }

    fn with_password(password: &str) -> SslSettings {
        SslSettings {
            password: Some(CaPassword::new(password)),
            ..Default::default()
        }
    }

    /// Third-party material for `identity`, signed through RootCA and TeamCA.
    fn provided(dir: &Path, identity: Identity, hosts: &[&str]) -> (ThirdPartyMaterial, TestCa) {
        let root = TestCa::root("RootCA");
        let team = root.intermediate("TeamCA");
        let (cert, key) = team.leaf(hosts);
        let stem = identity.file_stem();

        let material = ThirdPartyMaterial {
            ca: CaChain {
                root: Some(testing::write(dir, &format!("{stem}-root.pem"), root.pem())),
                intermediate: vec![testing::write(dir, &format!("{stem}-team.pem"), team.pem())],
            },
            pair: SslPair {
                cert: Some(testing::write(dir, &format!("{stem}.crt"), cert)),
                key: Some(testing::write(dir, &format!("{stem}.key"), key.serialize_pem())),
            },
        };
        (material, root)
    }

    fn first_cert(data: &[u8]) -> crate::certificate::Certificate {
        decode_certificates(data, Path::new("entry")).unwrap().remove(0)
    }

    #[test]
    fn test_fresh_install_generates_both_with_one_ca() {
        let fx = Fixture::new();

        let report = fx.engine(FQDN).provision(&with_password("secret")).unwrap();

        assert!(report.all_ready());
        assert_eq!(report.source(Identity::Server), Some(Source::Generated));
        assert_eq!(report.source(Identity::Database), Some(Source::Generated));
        assert_eq!(fx.store.names().len(), 6);

        assert_eq!(fx.entry("ssl-ca"), fx.entry("db-ssl-ca"));
        let server = first_cert(&fx.entry("ssl-cert"));
        let database = first_cert(&fx.entry("db-ssl-cert"));
        assert_eq!(server.not_after, database.not_after);
        assert_eq!(server.issuer_hash, database.issuer_hash);

        for host in DB_HOSTS {
            assert!(verify_hostname(&fx.entry("db-ssl-ca"), &fx.entry("db-ssl-cert"), host));
        }
    }

    #[test]
    fn test_second_run_reuses_stored_material() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();
        let before: Vec<_> = fx.store.names().iter().map(|n| fx.entry(n)).collect();

        let report = engine.provision(&with_password("secret")).unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Stored));
        assert_eq!(report.source(Identity::Database), Some(Source::Stored));
        let after: Vec<_> = fx.store.names().iter().map(|n| fx.entry(n)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reuse_does_not_need_password() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();

        let report = engine.provision(&SslSettings::default()).unwrap();
        assert!(report.all_ready());
    }

    #[test]
    fn test_missing_password() {
        let fx = Fixture::new();

        assert!(matches!(
            fx.engine(FQDN).provision(&SslSettings::default()),
            Err(SslError::MissingCaPassword)
        ));
        assert!(fx.store.names().is_empty());
    }

    #[test]
    fn test_stored_server_reused_database_generated() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();
        let server_cert = fx.entry("ssl-cert");
        fx.store.remove("db-ssl-cert");
        fx.store.remove("db-ssl-key");

        let report = engine.provision(&with_password("secret")).unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Stored));
        assert_eq!(report.source(Identity::Database), Some(Source::Generated));
        assert_eq!(fx.entry("ssl-cert"), server_cert);
        assert_eq!(fx.entry("db-ssl-ca"), fx.entry("ssl-ca"));
        assert!(verify_hostname(&fx.entry("ssl-ca"), &fx.entry("db-ssl-cert"), "reportdb"));
    }

    #[test]
    fn test_single_identity_needs_existing_ca() {
        let fx = Fixture::new();
        let root = TestCa::root("RootCA");
        let (cert, key) = root.leaf(&[FQDN]);
        fx.store.put("ssl-ca", root.pem().as_bytes()).unwrap();
        fx.store.put("ssl-cert", cert.as_bytes()).unwrap();
        fx.store.put("ssl-key", key.serialize_pem().as_bytes()).unwrap();

        assert!(matches!(
            fx.engine(FQDN).provision(&with_password("secret")),
            Err(SslError::CaUnavailable {
                identity: Identity::Database
            })
        ));
        assert!(!fx.store.exists("db-ssl-cert").unwrap());
    }

    #[test]
    fn test_reused_identity_from_another_ca_blocks_generation() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();

        let other = TestCa::root("Other");
        let (cert, key) = other.leaf(&[FQDN]);
        fx.store.put("ssl-ca", other.pem().as_bytes()).unwrap();
        fx.store.put("ssl-cert", cert.as_bytes()).unwrap();
        fx.store.put("ssl-key", key.serialize_pem().as_bytes()).unwrap();
        fx.store.remove("db-ssl-cert");

        assert!(matches!(
            engine.provision(&with_password("secret")),
            Err(SslError::CaUnavailable {
                identity: Identity::Database
            })
        ));
        assert!(!fx.store.exists("db-ssl-cert").unwrap());
        assert_eq!(fx.entry("ssl-cert"), cert.into_bytes());
    }

    #[test]
    fn test_out_of_range_validity() {
        let fx = Fixture::new();

        assert!(matches!(
            fx.engine(FQDN)
                .with_validity(Duration::MAX)
                .provision(&with_password("secret")),
            Err(SslError::Generation { .. })
        ));
        assert!(fx.store.names().is_empty());
    }

    #[test]
    fn test_wrong_ca_password() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();
        fx.store.remove("db-ssl-cert");

        assert!(matches!(
            engine.provision(&with_password("wrong")),
            Err(SslError::CaPasswordInvalid)
        ));
        assert!(!fx.store.exists("db-ssl-cert").unwrap());
    }

    #[test]
    fn test_stored_mismatch_is_regenerated() {
        let fx = Fixture::new();
        fx.engine(FQDN).provision(&with_password("secret")).unwrap();
        let old_ca = fx.entry("ssl-ca");

        let report = fx
            .engine("renamed.example.com")
            .provision(&with_password("secret"))
            .unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Generated));
        assert_eq!(report.source(Identity::Database), Some(Source::Generated));
        assert_eq!(fx.entry("ssl-ca"), old_ca);
        assert!(verify_hostname(&old_ca, &fx.entry("ssl-cert"), "renamed.example.com"));
    }

    #[test]
    fn test_provided_material_is_stored_ordered() {
        let fx = Fixture::new();
        let (server, server_root) = provided(fx.path(), Identity::Server, &[FQDN]);
        let (database, _) = provided(fx.path(), Identity::Database, &DB_HOSTS);
        let settings = SslSettings {
            server: server.clone(),
            database,
            ..Default::default()
        };

        let report = fx.engine(FQDN).provision(&settings).unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Provided));
        assert_eq!(report.source(Identity::Database), Some(Source::Provided));
        assert!(!fx.generator.has_ca_key());

        assert_eq!(first_cert(&fx.entry("ssl-ca")).der, server_root.der());
        let chain = decode_certificates(&fx.entry("ssl-cert"), Path::new("ssl-cert")).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(!chain[0].is_ca);
        assert!(chain[1].subject.contains("TeamCA"));
        assert_eq!(
            fx.entry("ssl-key"),
            fs::read(server.pair.key.unwrap()).unwrap()
        );
    }

    #[test]
    fn test_provided_server_wrong_host_is_fatal() {
        let fx = Fixture::new();
        let (server, _) = provided(fx.path(), Identity::Server, &["other.example.com"]);
        let settings = SslSettings {
            server,
            password: Some(CaPassword::new("secret")),
            ..Default::default()
        };

        assert!(matches!(
            fx.engine(FQDN).provision(&settings),
            Err(SslError::HostnameMismatch {
                identity: Identity::Server,
                ..
            })
        ));
        assert!(fx.store.names().is_empty());
        assert!(!fx.generator.has_ca_key());
    }

    #[test]
    fn test_provided_database_without_aliases_is_fatal() {
        let fx = Fixture::new();
        let (database, _) = provided(fx.path(), Identity::Database, &[FQDN]);
        let settings = SslSettings {
            database,
            password: Some(CaPassword::new("secret")),
            ..Default::default()
        };

        assert!(matches!(
            fx.engine(FQDN).provision(&settings),
            Err(SslError::HostnameMismatch {
                identity: Identity::Database,
                ..
            })
        ));
    }

    #[test]
    fn test_provided_encrypted_key_is_fatal() {
        let fx = Fixture::new();
        let root = TestCa::root("RootCA");
        let (cert, key) = root.leaf(&[FQDN]);
        let encrypted = encrypt_private_key(&key.serialize_der(), "pass", 1_000).unwrap();
        let settings = SslSettings {
            server: ThirdPartyMaterial {
                ca: CaChain {
                    root: Some(testing::write(fx.path(), "root.pem", root.pem())),
                    intermediate: vec![],
                },
                pair: SslPair {
                    cert: Some(testing::write(fx.path(), "server.crt", cert)),
                    key: Some(testing::write(fx.path(), "server.key", encrypted)),
                },
            },
            ..Default::default()
        };

        assert!(matches!(
            fx.engine(FQDN).provision(&settings),
            Err(SslError::KeyEncrypted { .. })
        ));
        assert!(fx.store.names().is_empty());
    }

    #[test]
    fn test_provided_chain_through_end_entity_is_fatal() {
        let fx = Fixture::new();
        let root = TestCa::root("RootCA");
        let issuer = root.end_entity("issuer.example.com");
        let (cert, key) = issuer.leaf(&[FQDN]);
        let settings = SslSettings {
            server: ThirdPartyMaterial {
                ca: CaChain {
                    root: Some(testing::write(fx.path(), "root.pem", root.pem())),
                    intermediate: vec![],
                },
                pair: SslPair {
                    cert: Some(testing::write(
                        fx.path(),
                        "server.crt",
                        format!("{}{}", cert, issuer.pem()),
                    )),
                    key: Some(testing::write(fx.path(), "server.key", key.serialize_pem())),
                },
            },
            password: Some(CaPassword::new("secret")),
            ..Default::default()
        };

        assert!(matches!(
            fx.engine(FQDN).provision(&settings),
            Err(SslError::HostnameMismatch {
                identity: Identity::Server,
                ..
            })
        ));
        assert!(fx.store.names().is_empty());
    }

    #[test]
    fn test_partial_third_party_is_fatal() {
        let fx = Fixture::new();
        let settings = SslSettings {
            server: ThirdPartyMaterial {
                ca: CaChain::default(),
                pair: SslPair {
                    cert: Some(fx.path().join("server.crt")),
                    key: None,
                },
            },
            password: Some(CaPassword::new("secret")),
            ..Default::default()
        };

        assert!(matches!(
            fx.engine(FQDN).provision(&settings),
            Err(SslError::IncompleteThirdParty {
                identity: Identity::Server
            })
        ));
    }

    fn legacy_material(root: &TestCa, hosts: &[&str]) -> LegacyMaterial {
        let (cert, key) = root.leaf(hosts);
        LegacyMaterial {
            ca: root.pem().into_bytes(),
            cert: cert.into_bytes(),
            key: key.serialize_pem().into_bytes(),
        }
    }

    #[test]
    fn test_legacy_material_is_migrated() {
        let fx = Fixture::new();
        let mount = fx.path().join("legacy");
        let root = TestCa::root("Legacy CA");
        let server = legacy_material(&root, &[FQDN]);
        let database = legacy_material(&root, &DB_HOSTS);
        write_legacy(&mount, Identity::Server, &server);
        write_legacy(&mount, Identity::Database, &database);

        let report = fx
            .engine(FQDN)
            .with_legacy(Box::new(FileLegacySource::new(&mount)))
            .provision(&SslSettings::default())
            .unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Legacy));
        assert_eq!(report.source(Identity::Database), Some(Source::Legacy));
        assert_eq!(
            first_cert(&fx.entry("ssl-cert")).der,
            first_cert(&server.cert).der
        );
        assert_eq!(fx.entry("db-ssl-key"), database.key);
    }

    #[test]
    fn test_invalid_legacy_material_falls_back_to_generation() {
        let fx = Fixture::new();
        let mount = fx.path().join("legacy");
        let root = TestCa::root("Legacy CA");
        write_legacy(
            &mount,
            Identity::Server,
            &legacy_material(&root, &["old.example.com"]),
        );

        let report = fx
            .engine(FQDN)
            .with_legacy(Box::new(FileLegacySource::new(&mount)))
            .provision(&with_password("secret"))
            .unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Generated));
        assert_eq!(report.source(Identity::Database), Some(Source::Generated));
        assert_ne!(first_cert(&fx.entry("ssl-ca")).der, root.der());
    }

    #[test]
    fn test_stored_material_wins_over_legacy() {
        let fx = Fixture::new();
        let engine = fx.engine(FQDN);
        engine.provision(&with_password("secret")).unwrap();
        let stored = fx.entry("ssl-cert");

        let mount = fx.path().join("legacy");
        let root = TestCa::root("Legacy CA");
        write_legacy(&mount, Identity::Server, &legacy_material(&root, &[FQDN]));

        let report = fx
            .engine(FQDN)
            .with_legacy(Box::new(FileLegacySource::new(&mount)))
            .provision(&SslSettings::default())
            .unwrap();

        assert_eq!(report.source(Identity::Server), Some(Source::Stored));
        assert_eq!(fx.entry("ssl-cert"), stored);
    }

    #[test]
    fn test_generated_validity() {
        let fx = Fixture::new();

        fx.engine(FQDN)
            .with_validity(Duration::days(10))
            .provision(&with_password("secret"))
            .unwrap();

        let cert = first_cert(&fx.entry("ssl-cert"));
        let remaining = cert.not_after - Utc::now();
        assert!(remaining <= Duration::days(10));
        assert!(remaining > Duration::days(9));
    }

    #[test]
    fn test_cnames_on_server_certificate() {
        let fx = Fixture::new();
        let settings = SslSettings {
            cnames: vec!["alias.example.com".to_string()],
            ..with_password("secret")
        };

        fx.engine(FQDN).provision(&settings).unwrap();

        assert!(verify_hostname(
            &fx.entry("ssl-ca"),
            &fx.entry("ssl-cert"),
            "alias.example.com"
        ));
    }
}
