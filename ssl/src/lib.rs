//! TLS material for a self-hosted server and its database.
//!
//! Operator bundles are decoded and ordered into a leaf to root chain, checked
//! against the host names they will be served for, and stored under fixed
//! entry names. When nothing usable is supplied or stored, both identities
//! are generated together from one deployment CA.

pub mod certificate;
pub mod chain;
pub mod engine;
pub mod error;
pub mod generator;
pub mod identity;
pub mod legacy;
pub mod support;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use certificate::{Certificate, decode_certificates, read_certificates};
pub use chain::{ResolvedChain, order_cas, resolve};
pub use engine::{ProvisioningEngine, ProvisioningReport, ProvisioningResult, Source};
pub use error::{Result, SslError};
pub use generator::{CertificateGenerator, GenerateError, LocalCaGenerator};
pub use identity::Identity;
pub use legacy::{DeploymentGeneration, FileLegacySource, LegacySource, NoLegacy, legacy_source};
pub use types::{CaChain, CaPassword, CaSubject, SslPair, SslSettings, ThirdPartyMaterial};
