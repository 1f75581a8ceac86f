//! PEM certificate decoding and the metadata the chain resolver works on.

use std::path::Path;

use chrono::{DateTime, Utc};
use pem_rfc7468::LineEnding;
use rustls_pemfile::Item;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::{Result, SslError};

/// A decoded X.509 certificate.
///
/// Only lives for the duration of one resolution or report.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Canonical PEM block, LF line endings.
    pub pem: String,
    pub der: Vec<u8>,
    pub subject: String,
    pub subject_hash: String,
    pub issuer: String,
    pub issuer_hash: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject_key_id: Option<String>,
    pub authority_key_id: Option<String>,
    pub is_ca: bool,
    pub is_self_signed: bool,
}

impl Certificate {
    /// Parse a DER certificate. `origin` only names the source in errors.
    pub fn from_der(der: &[u8], origin: &Path) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| SslError::parse(origin, e))?;

        let pem = pem_rfc7468::encode_string("CERTIFICATE", LineEnding::LF, der)
            .map_err(|e| SslError::parse(origin, e))?;

        let not_before =
            DateTime::from_timestamp(cert.validity().not_before.to_datetime().unix_timestamp(), 0)
                .ok_or_else(|| SslError::parse(origin, "invalid notBefore date"))?;
        let not_after =
            DateTime::from_timestamp(cert.validity().not_after.to_datetime().unix_timestamp(), 0)
                .ok_or_else(|| SslError::parse(origin, "invalid notAfter date"))?;

        let mut subject_key_id = None;
        let mut authority_key_id = None;
        for extension in cert.extensions() {
            match extension.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    subject_key_id = Some(format_key_id(id.0));
                }
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    authority_key_id = aki.key_identifier.as_ref().map(|id| format_key_id(id.0));
                }
                _ => {}
            }
        }

        let subject_hash = name_hash(cert.subject());
        let issuer_hash = name_hash(cert.issuer());
        let is_self_signed = subject_hash == issuer_hash;

        if is_self_signed && authority_key_id.is_none() {
            authority_key_id = subject_key_id.clone();
        }

        Ok(Self {
            pem,
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            subject_hash,
            issuer: cert.issuer().to_string(),
            issuer_hash,
            not_before,
            not_after,
            subject_key_id,
            authority_key_id,
            is_ca: cert.is_ca(),
            is_self_signed,
        })
    }

    /// SHA-256 over the DER encoding, lowercase hex.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }
}

/// Read every certificate of a PEM file.
pub fn read_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let data = std::fs::read(path).map_err(|source| SslError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_certificates(&data, path)
}

/// Decode consecutive PEM certificate blocks.
///
/// Decoding stops at the first PEM section that is not a certificate. Text
/// around the blocks is ignored.
pub fn decode_certificates(data: &[u8], origin: &Path) -> Result<Vec<Certificate>> {
    let mut reader = data;
    let mut certificates = Vec::new();

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(der))) => {
                certificates.push(Certificate::from_der(der.as_ref(), origin)?);
            }
            Ok(_) => break,
            Err(e) => return Err(SslError::parse(origin, e)),
        }
    }

    Ok(certificates)
}

/// Short hash identifying a distinguished name.
///
/// Attribute values are compared trimmed, whitespace-collapsed and lowercase
/// so the hash does not depend on the string type the issuer chose.
pub fn name_hash(name: &X509Name<'_>) -> String {
    let canonical = name
        .iter()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let value = match attr.as_str() {
                        Ok(value) => value
                            .split_whitespace()
                            .collect::<Vec<_>>()
                            .join(" ")
                            .to_lowercase(),
                        Err(_) => hex::encode(attr.attr_value().data),
                    };
                    format!("{}={}", attr.attr_type().to_id_string(), value)
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",");

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..8])
}

fn format_key_id(id: &[u8]) -> String {
    id.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
