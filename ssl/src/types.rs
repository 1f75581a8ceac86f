use std::{fmt, path::PathBuf};

use serde::Deserialize;

use crate::{
    error::{Result, SslError},
    identity::Identity,
};

/// Root CA and optional intermediates supplied by the operator.
///
/// Intermediates may be given in any order, the chain is re-derived from the
/// certificates themselves.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaChain {
    #[serde(default, rename = "ca_root")]
    pub root: Option<PathBuf>,

    #[serde(default, rename = "ca_intermediate")]
    pub intermediate: Vec<PathBuf>,
}

/// Certificate and private key of one leaf identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslPair {
    #[serde(default)]
    pub cert: Option<PathBuf>,

    #[serde(default)]
    pub key: Option<PathBuf>,
}

/// Operator supplied material for one identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThirdPartyMaterial {
    #[serde(flatten)]
    pub ca: CaChain,

    #[serde(flatten)]
    pub pair: SslPair,
}

impl ThirdPartyMaterial {
    /// Certificate, key and root CA are all given.
    pub fn is_provided(&self) -> bool {
        self.pair.cert.is_some() && self.pair.key.is_some() && self.ca.root.is_some()
    }

    /// Reject material that is only partly given.
    pub fn check_parameters(&self, identity: Identity) -> Result<()> {
        let any = self.pair.cert.is_some() || self.pair.key.is_some() || self.ca.root.is_some();
        if any && !self.is_provided() {
            return Err(SslError::IncompleteThirdParty { identity });
        }
        Ok(())
    }
}

/// Subject fields of generated certificates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaSubject {
    pub country: String,
    pub state: String,
    pub city: String,
    pub org: String,
    pub ou: String,
    pub email: String,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            country: "DE".into(),
            state: "Bayern".into(),
            city: "Nuernberg".into(),
            org: "Example".into(),
            ou: "Example".into(),
            email: "ca-admin@example.com".into(),
        }
    }
}

/// Passphrase protecting the CA private key.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct CaPassword(String);

impl CaPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CaPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaPassword(***)")
    }
}

/// Everything the operator can tell the provisioning engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslSettings {
    /// Extra names added to generated certificates.
    pub cnames: Vec<String>,

    #[serde(flatten)]
    pub subject: CaSubject,

    pub password: Option<CaPassword>,

    pub server: ThirdPartyMaterial,

    pub database: ThirdPartyMaterial,
}

impl SslSettings {
    pub fn third_party(&self, identity: Identity) -> &ThirdPartyMaterial {
        match identity {
            Identity::Server => &self.server,
            Identity::Database => &self.database,
        }
    }

    pub fn check_parameters(&self) -> Result<()> {
        for identity in Identity::ALL {
            self.third_party(identity).check_parameters(identity)?;
        }
        Ok(())
    }

    /// The CA password, if a usable one was given.
    pub fn ca_password(&self) -> Option<&CaPassword> {
        self.password.as_ref().filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_third_party_is_rejected() {
        let material = ThirdPartyMaterial {
            ca: CaChain::default(),
            pair: SslPair {
                cert: Some("server.crt".into()),
                key: Some("server.key".into()),
            },
        };

        assert!(!material.is_provided());
        assert!(matches!(
            material.check_parameters(Identity::Server),
            Err(SslError::IncompleteThirdParty {
                identity: Identity::Server
            })
        ));
    }

    #[test]
    fn test_empty_third_party_is_accepted() {
        assert!(ThirdPartyMaterial::default()
            .check_parameters(Identity::Database)
            .is_ok());
    }

    #[test]
    fn test_password_is_redacted() {
        let password = CaPassword::new("hunter2");
        assert_eq!(format!("{password:?}"), "CaPassword(***)");
    }

    #[test]
    fn test_empty_password_is_not_usable() {
        let settings = SslSettings {
            password: Some(CaPassword::new("")),
            ..Default::default()
        };
        assert!(settings.ca_password().is_none());
    }
}
