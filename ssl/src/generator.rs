//! Certificate generation from a password protected deployment CA.

use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use pem_rfc7468::LineEnding;
use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo, pkcs5::pbes2};
use rand::Rng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::types::{CaPassword, CaSubject};

const CA_CERT_FILE: &str = "ca.crt";
const CA_KEY_FILE: &str = "ca.key";
const DEFAULT_KDF_ITERATIONS: u32 = 600_000;
// PKCS#9 emailAddress
const EMAIL_ADDRESS_OID: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("CA signing key unavailable in {}", dir.display())]
    CaUnavailable { dir: PathBuf },

    #[error("Wrong CA key password")]
    PasswordInvalid,

    #[error("{0}")]
    Failed(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// What to issue for one identity.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub subject: &'a CaSubject,
    pub password: &'a CaPassword,
    /// Host name the certificate is issued to.
    pub common_name: String,
    pub alt_names: Vec<String>,
    /// Shared by every certificate generated in one run.
    pub not_after: DateTime<Utc>,
    /// Base name of the certificate and key files.
    pub file_stem: &'a str,
}

/// Files written by a generator into the caller's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

pub trait CertificateGenerator: Debug + Send + Sync {
    /// Whether the deployment CA signing key exists.
    fn has_ca_key(&self) -> bool;

    /// PEM of the deployment CA certificate, if there is one.
    fn ca_certificate(&self) -> Result<Option<Vec<u8>>, GenerateError>;

    /// Unlock the existing CA key with `password`.
    fn validate_ca(&self, password: &CaPassword) -> Result<(), GenerateError>;

    /// Issue a certificate and key, creating the CA if there is none yet.
    fn generate(
        &self,
        request: &GenerationRequest<'_>,
        out_dir: &Path,
    ) -> Result<GeneratedFiles, GenerateError>;
}

/// Generator keeping its CA as `ca.crt` and an encrypted `ca.key` in a
/// directory.
#[derive(Debug, Clone)]
pub struct LocalCaGenerator {
    ca_dir: PathBuf,
    kdf_iterations: u32,
}

impl LocalCaGenerator {
    pub fn new(ca_dir: impl Into<PathBuf>) -> Self {
        Self {
            ca_dir: ca_dir.into(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }

    /// PBKDF2 rounds used when encrypting a new CA key.
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_dir.join(CA_CERT_FILE)
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.ca_dir.join(CA_KEY_FILE)
    }

    fn load_ca(&self, password: &CaPassword) -> Result<(String, KeyPair), GenerateError> {
        if !self.has_ca_key() {
            return Err(GenerateError::CaUnavailable {
                dir: self.ca_dir.clone(),
            });
        }

        let cert_path = self.ca_cert_path();
        let key_path = self.ca_key_path();
        let cert_pem =
            fs::read_to_string(&cert_path).map_err(|e| GenerateError::io(&cert_path, e))?;
        let key_pem = fs::read_to_string(&key_path).map_err(|e| GenerateError::io(&key_path, e))?;

        let key = decrypt_private_key(&key_pem, password.expose())?;
        Ok((cert_pem, key))
    }

    #[instrument(skip_all, fields(ca_dir = %self.ca_dir.display()))]
    fn create_ca(
        &self,
        subject: &CaSubject,
        password: &CaPassword,
        not_after: DateTime<Utc>,
    ) -> Result<(String, KeyPair), GenerateError> {
        if self.ca_cert_path().exists() {
            // A certificate without its key cannot sign anything
            return Err(GenerateError::CaUnavailable {
                dir: self.ca_dir.clone(),
            });
        }

        let key = KeyPair::generate()
            .map_err(|e| GenerateError::Failed(format!("Failed to generate CA keypair: {e}")))?;

        let mut params = CertificateParams::default();
        params.distinguished_name =
            distinguished_name(subject, &format!("{} Certificate Authority", subject.org));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        set_validity(&mut params, not_after)?;

        let cert = params
            .self_signed(&key)
            .map_err(|e| GenerateError::Failed(format!("Failed to self-sign CA: {e}")))?;
        let cert_pem = cert.pem();
        let key_pem = encrypt_private_key(&key.serialize_der(), password.expose(), self.kdf_iterations)?;

        fs::create_dir_all(&self.ca_dir).map_err(|e| GenerateError::io(&self.ca_dir, e))?;
        write_private(&self.ca_key_path(), key_pem.as_bytes())?;
        fs::write(self.ca_cert_path(), &cert_pem)
            .map_err(|e| GenerateError::io(self.ca_cert_path(), e))?;

        info!("Created deployment CA");
        Ok((cert_pem, key))
    }
}

impl CertificateGenerator for LocalCaGenerator {
    fn has_ca_key(&self) -> bool {
        self.ca_cert_path().is_file() && self.ca_key_path().is_file()
    }

    fn ca_certificate(&self) -> Result<Option<Vec<u8>>, GenerateError> {
        let path = self.ca_cert_path();
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(|e| GenerateError::io(&path, e))
    }

    fn validate_ca(&self, password: &CaPassword) -> Result<(), GenerateError> {
        self.load_ca(password).map(|_| ())
    }

    #[instrument(skip_all, fields(cn = %request.common_name))]
    fn generate(
        &self,
        request: &GenerationRequest<'_>,
        out_dir: &Path,
    ) -> Result<GeneratedFiles, GenerateError> {
        let (ca_pem, ca_key) = if self.has_ca_key() {
            self.load_ca(request.password)?
        } else {
            self.create_ca(request.subject, request.password, request.not_after)?
        };

        let ca_cert = CertificateParams::from_ca_cert_pem(&ca_pem)
            .map_err(|e| GenerateError::Failed(format!("Failed to parse CA cert: {e}")))?
            .self_signed(&ca_key)
            .map_err(|e| GenerateError::Failed(format!("Failed to reconstruct CA cert: {e}")))?;

        let mut alt_names = vec![request.common_name.clone()];
        for name in &request.alt_names {
            if !alt_names.contains(name) {
                alt_names.push(name.clone());
            }
        }

        let mut params = CertificateParams::new(alt_names)
            .map_err(|e| GenerateError::Failed(format!("Invalid host name: {e}")))?;
        params.distinguished_name = distinguished_name(request.subject, &request.common_name);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        set_validity(&mut params, request.not_after)?;

        let key = KeyPair::generate()
            .map_err(|e| GenerateError::Failed(format!("Failed to generate keypair: {e}")))?;
        let cert = params
            .signed_by(&key, &ca_cert, &ca_key)
            .map_err(|e| GenerateError::Failed(format!("Failed to sign certificate: {e}")))?;

        let files = GeneratedFiles {
            ca: out_dir.join(CA_CERT_FILE),
            cert: out_dir.join(format!("{}.crt", request.file_stem)),
            key: out_dir.join(format!("{}.key", request.file_stem)),
        };
        fs::write(&files.ca, &ca_pem).map_err(|e| GenerateError::io(&files.ca, e))?;
        fs::write(&files.cert, cert.pem()).map_err(|e| GenerateError::io(&files.cert, e))?;
        write_private(&files.key, key.serialize_pem().as_bytes())?;

        debug!(cert = %files.cert.display(), "Generated certificate");
        Ok(files)
    }
}

fn distinguished_name(subject: &CaSubject, common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    for (kind, value) in [
        (DnType::CountryName, &subject.country),
        (DnType::StateOrProvinceName, &subject.state),
        (DnType::LocalityName, &subject.city),
        (DnType::OrganizationName, &subject.org),
        (DnType::OrganizationalUnitName, &subject.ou),
    ] {
        if !value.is_empty() {
            dn.push(kind, value.as_str());
        }
    }
    dn.push(DnType::CommonName, common_name);
    if !subject.email.is_empty() {
        dn.push(
            DnType::CustomDnType(EMAIL_ADDRESS_OID.to_vec()),
            subject.email.as_str(),
        );
    }
    dn
}

fn set_validity(
    params: &mut CertificateParams,
    not_after: DateTime<Utc>,
) -> Result<(), GenerateError> {
    params.not_before = ::time::OffsetDateTime::from_unix_timestamp(Utc::now().timestamp())
        .map_err(|e| GenerateError::Failed(format!("Invalid timestamp: {e}")))?;
    params.not_after = ::time::OffsetDateTime::from_unix_timestamp(not_after.timestamp())
        .map_err(|e| GenerateError::Failed(format!("Invalid timestamp: {e}")))?;
    Ok(())
}

fn write_private(path: &Path, content: &[u8]) -> Result<(), GenerateError> {
    fs::write(path, content).map_err(|e| GenerateError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| GenerateError::io(path, e))?;
    }

    Ok(())
}

/// Encrypt a PKCS#8 DER key as an `ENCRYPTED PRIVATE KEY` PEM block
/// (PBES2, PBKDF2-SHA256 and AES-256-CBC).
pub(crate) fn encrypt_private_key(
    der: &[u8],
    password: &str,
    iterations: u32,
) -> Result<String, GenerateError> {
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    rand::rng().fill(&mut salt);
    rand::rng().fill(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
        .map_err(|e| GenerateError::Failed(format!("Invalid encryption parameters: {e}")))?;
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| GenerateError::Failed(format!("Invalid private key: {e}")))?;
    let encrypted = info
        .encrypt_with_params(params, password)
        .map_err(|e| GenerateError::Failed(format!("Failed to encrypt private key: {e}")))?;

    pem_rfc7468::encode_string("ENCRYPTED PRIVATE KEY", LineEnding::LF, encrypted.as_bytes())
        .map_err(|e| GenerateError::Failed(format!("Failed to encode private key: {e}")))
}

pub(crate) fn decrypt_private_key(pem: &str, password: &str) -> Result<KeyPair, GenerateError> {
    let (label, der) = pem_rfc7468::decode_vec(pem.as_bytes())
        .map_err(|e| GenerateError::Failed(format!("Invalid CA key PEM: {e}")))?;
    if label != "ENCRYPTED PRIVATE KEY" {
        return Err(GenerateError::Failed(format!(
            "CA key must be an ENCRYPTED PRIVATE KEY, found {label}"
        )));
    }

    let info = EncryptedPrivateKeyInfo::try_from(der.as_slice())
        .map_err(|e| GenerateError::Failed(format!("Invalid encrypted CA key: {e}")))?;
    let document = info
        .decrypt(password)
        .map_err(|_| GenerateError::PasswordInvalid)?;

    // Garbage that happens to decrypt with valid padding is still a wrong password
    let plain = pem_rfc7468::encode_string("PRIVATE KEY", LineEnding::LF, document.as_bytes())
        .map_err(|_| GenerateError::PasswordInvalid)?;
    KeyPair::from_pem(&plain).map_err(|_| GenerateError::PasswordInvalid)
}
