//! Stateless checks on certificate and key material.

use std::{path::Path, sync::Arc};

use rustls::{
    RootCertStore,
    client::{WebPkiServerVerifier, danger::ServerCertVerifier},
    crypto::ring,
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use rustls_pemfile::Item;
use tracing::debug;

use crate::{
    error::{Result, SslError},
    identity::Identity,
    types::{CaChain, SslPair},
};

/// Ensure the files of a third-party chain and pair are present.
pub fn check_paths(ca: &CaChain, pair: &SslPair) -> Result<()> {
    check_file(ca.root.as_deref(), "Root CA")?;
    for intermediate in &ca.intermediate {
        check_file(Some(intermediate), "Intermediate CA")?;
    }
    check_file(pair.cert.as_deref(), "Certificate")?;
    check_file(pair.key.as_deref(), "Certificate key")?;
    Ok(())
}

fn check_file(path: Option<&Path>, what: &str) -> Result<()> {
    let path = path.ok_or_else(|| SslError::MissingFile(format!("{what} is required")))?;
    if !path.is_file() {
        return Err(SslError::NotAccessible {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Fail when the key cannot be loaded without a passphrase.
pub fn check_key_not_encrypted(path: &Path) -> Result<()> {
    let data = std::fs::read(path).map_err(|e| SslError::io(path, e))?;
    if key_is_plain(&data) {
        Ok(())
    } else {
        Err(SslError::KeyEncrypted {
            path: path.to_path_buf(),
        })
    }
}

fn key_is_plain(data: &[u8]) -> bool {
    matches!(
        rustls_pemfile::private_key(&mut &data[..]),
        Ok(Some(_))
    )
}

/// Whether `cert` chains to one of the anchors in `ca` and is valid for
/// `hostname`.
///
/// `cert` may carry intermediates after the leaf. Only SAN DNS entries name a
/// host, issuers must be CA certificates.
pub fn verify_hostname(ca: &[u8], cert: &[u8], hostname: &str) -> bool {
    match check_hostname(ca, cert, hostname) {
        Ok(()) => true,
        Err(reason) => {
            debug!(%hostname, %reason, "Certificate verification failed");
            false
        }
    }
}

/// Check every host name of `identity`, failing on the first mismatch.
pub fn verify_hostnames(ca: &[u8], cert: &[u8], identity: Identity, fqdn: &str) -> Result<()> {
    for hostname in identity.hostnames(fqdn) {
        if !verify_hostname(ca, cert, &hostname) {
            return Err(SslError::HostnameMismatch { identity, hostname });
        }
    }
    Ok(())
}

fn pem_certificates(data: &[u8]) -> std::result::Result<Vec<CertificateDer<'static>>, String> {
    let mut reader = data;
    let mut ders = Vec::new();
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(der))) => ders.push(der),
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return Err(format!("invalid PEM: {e}")),
        }
    }
    Ok(ders)
}

fn check_hostname(ca: &[u8], cert: &[u8], hostname: &str) -> std::result::Result<(), String> {
    let mut roots = RootCertStore::empty();
    for anchor in pem_certificates(ca)? {
        roots
            .add(anchor)
            .map_err(|e| format!("invalid trust anchor: {e}"))?;
    }
    if roots.is_empty() {
        return Err("no trust anchor".to_string());
    }

    let mut presented = pem_certificates(cert)?.into_iter();
    let leaf = presented.next().ok_or("no certificate to verify")?;
    let intermediates: Vec<_> = presented.collect();

    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    let server_name = ServerName::try_from(hostname.as_str())
        .map_err(|e| format!("invalid host name {hostname}: {e}"))?;

    let verifier = WebPkiServerVerifier::builder_with_provider(
        Arc::new(roots),
        Arc::new(ring::default_provider()),
    )
    .build()
    .map_err(|e| e.to_string())?;

    verifier
        .verify_server_cert(&leaf, &intermediates, &server_name, &[], UnixTime::now())
        .map(|_| ())
        .map_err(|e| e.to_string())
}
