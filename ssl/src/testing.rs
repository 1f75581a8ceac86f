//! Certificate fixtures generated at test time.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};

pub(crate) struct TestCa {
    pub cert: rcgen::Certificate,
    pub key: KeyPair,
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationName, "Certwright Tests");
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params
}

fn leaf_params(hosts: &[&str]) -> CertificateParams {
    let mut params =
        CertificateParams::new(hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, hosts.first().copied().unwrap_or("leaf"));
    params.distinguished_name = dn;
    params.is_ca = IsCa::ExplicitNoCa;
    params
}

impl TestCa {
    pub fn root(cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = ca_params(cn).self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn intermediate(&self, cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = ca_params(cn)
            .signed_by(&key, &self.cert, &self.key)
            .unwrap();
        Self { cert, key }
    }

    /// End-entity certificate that is then misused to sign others.
    pub fn end_entity(&self, cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(&[cn])
            .signed_by(&key, &self.cert, &self.key)
            .unwrap();
        Self { cert, key }
    }

    /// Leaf certificate PEM and its key, valid for `hosts`.
    pub fn leaf(&self, hosts: &[&str]) -> (String, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(hosts)
            .signed_by(&key, &self.cert, &self.key)
            .unwrap();
        (cert.pem(), key)
    }

    pub fn expired_leaf(&self, hosts: &[&str]) -> (String, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = leaf_params(hosts);
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key)
    }

    /// Leaf certificate carrying only a common name.
    pub fn cn_only_leaf(&self, cn: &str) -> (String, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = leaf_params(&[]);
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, cn);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key)
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn der(&self) -> &[u8] {
        self.cert.der().as_ref()
    }
}

pub(crate) fn write(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
