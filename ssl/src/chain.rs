//! Reconstructs the leaf to root chain from an unordered certificate pool.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::{
    certificate::{Certificate, read_certificates},
    error::{Result, SslError},
    types::{CaChain, SslPair},
    validate::check_paths,
};

/// Leaf and intermediates as concatenated PEM, and the root on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    pub chain: String,
    pub root: String,
}

/// Walk issuer links from the certificate with subject hash `leaf_hash` up to
/// the self-signed root.
///
/// When two certificates share a subject hash the one found later in the pool
/// is used.
pub fn resolve(pool: &[Certificate], leaf_hash: &str) -> Result<ResolvedChain> {
    let mut by_subject: HashMap<&str, &Certificate> = HashMap::new();
    for cert in pool {
        if let Some(previous) = by_subject.insert(cert.subject_hash.as_str(), cert) {
            if previous.der != cert.der {
                warn!(
                    subject = %cert.subject,
                    hash = %cert.subject_hash,
                    "Different certificates share a subject hash, using the last one"
                );
            }
        }
    }

    let leaf = by_subject
        .get(leaf_hash)
        .copied()
        .ok_or(SslError::NoLeafCertificate)?;

    let mut chain = leaf.pem.clone();
    let mut visited = HashSet::from([leaf.subject_hash.as_str()]);
    let mut current = leaf;

    loop {
        let issuer = by_subject
            .get(current.issuer_hash.as_str())
            .copied()
            .ok_or_else(|| SslError::ChainIncomplete {
                subject: current.subject.clone(),
                issuer: current.issuer.clone(),
            })?;

        if issuer.issuer_hash == current.issuer_hash {
            debug!(root = %issuer.subject, "Found root CA");
            return Ok(ResolvedChain {
                chain,
                root: issuer.pem.clone(),
            });
        }

        if !visited.insert(issuer.subject_hash.as_str()) {
            return Err(SslError::ChainLoop {
                subject: issuer.subject.clone(),
            });
        }

        debug!(intermediate = %issuer.subject, "Adding intermediate CA");
        chain.push_str(&issuer.pem);
        current = issuer;
    }
}

/// First certificate of the pool that is not a CA.
pub fn find_leaf(pool: &[Certificate]) -> Result<&Certificate> {
    pool.iter()
        .find(|cert| !cert.is_ca)
        .ok_or(SslError::NoLeafCertificate)
}

/// Order operator supplied CA and leaf files into a chain and a root.
pub fn order_cas(ca: &CaChain, pair: &SslPair) -> Result<ResolvedChain> {
    check_paths(ca, pair)?;

    let mut pool = Vec::new();
    for path in ca.root.iter().chain(&ca.intermediate).chain(&pair.cert) {
        pool.extend(read_certificates(path)?);
    }

    let leaf = find_leaf(&pool)?;
    resolve(&pool, &leaf.subject_hash)
}
