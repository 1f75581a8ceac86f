use std::path::PathBuf;

use certwright_store::StoreError;
use thiserror::Error;

use crate::identity::Identity;

pub type Result<T, E = SslError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SslError {
    #[error("{0}")]
    MissingFile(String),

    #[error("{} file is not accessible", path.display())]
    NotAccessible { path: PathBuf },

    #[error("Failed to read certificate file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse certificate from {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to find a non-CA certificate")]
    NoLeafCertificate,

    #[error("No CA found for certificate {subject} (issuer {issuer})")]
    ChainIncomplete { subject: String, issuer: String },

    #[error("Certificate chain loops back to {subject}")]
    ChainLoop { subject: String },

    #[error("Invalid SSL key {}, it is probably encrypted", path.display())]
    KeyEncrypted { path: PathBuf },

    #[error("The {identity} certificate is not valid for {hostname}")]
    HostnameMismatch { identity: Identity, hostname: String },

    #[error("The {identity} certificate, key and root CA need to be all provided")]
    IncompleteThirdParty { identity: Identity },

    #[error("A CA password is required to generate certificates")]
    MissingCaPassword,

    #[error("Cannot generate the {identity} certificate: CA signing key unavailable")]
    CaUnavailable { identity: Identity },

    #[error("Wrong CA key password")]
    CaPasswordInvalid,

    #[error("Failed to generate the {identity} certificate: {reason}")]
    Generation { identity: Identity, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SslError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
