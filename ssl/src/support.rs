//! Human readable report on the stored certificates, for support requests.

use std::{fmt, path::Path};

use certwright_store::{CertificateStore, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::{certificate::decode_certificates, identity::Identity, validate::verify_hostname};

const WARNING_DAYS: i64 = 30;
const NOTICE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "days", rename_all = "snake_case")]
pub enum ExpiryStatus {
    /// Days since the certificate expired.
    Expired(i64),
    Warning(i64),
    Notice(i64),
    Valid(i64),
}

impl ExpiryStatus {
    pub fn at(not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now > not_after {
            return Self::Expired((now - not_after).num_days());
        }
        let days = (not_after - now).num_days();
        if days < WARNING_DAYS {
            Self::Warning(days)
        } else if days < NOTICE_DAYS {
            Self::Notice(days)
        } else {
            Self::Valid(days)
        }
    }

    pub fn is_issue(self) -> bool {
        matches!(self, Self::Expired(_) | Self::Warning(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateDetails {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub fingerprint: String,
    pub expiry: ExpiryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateInfo {
    pub name: &'static str,
    pub entry: &'static str,
    #[serde(flatten)]
    pub details: Option<CertificateDetails>,
    pub error: Option<String>,
}

impl CertificateInfo {
    fn failed(name: &'static str, entry: &'static str, error: impl ToString) -> Self {
        Self {
            name,
            entry,
            details: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_issue(&self) -> bool {
        self.details.as_ref().is_none_or(|d| d.expiry.is_issue())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainCheck {
    pub identity: Identity,
    pub hostname: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportReport {
    pub generated: DateTime<Utc>,
    pub certificates: Vec<CertificateInfo>,
    pub chains: Vec<ChainCheck>,
}

impl SupportReport {
    pub fn has_issues(&self) -> bool {
        self.certificates.iter().any(CertificateInfo::is_issue)
            || self.chains.iter().any(|c| !c.valid)
    }
}

const REPORTED: [(&str, Identity, bool); 4] = [
    ("Root CA", Identity::Server, true),
    ("DB Root CA", Identity::Database, true),
    ("Server Certificate", Identity::Server, false),
    ("Database Certificate", Identity::Database, false),
];

/// Describe the first certificate of `data`.
pub fn describe(
    name: &'static str,
    entry: &'static str,
    data: &[u8],
    now: DateTime<Utc>,
) -> CertificateInfo {
    let cert = match decode_certificates(data, Path::new(entry)) {
        Ok(mut certs) if !certs.is_empty() => certs.remove(0),
        Ok(_) => return CertificateInfo::failed(name, entry, "No certificate found"),
        Err(e) => return CertificateInfo::failed(name, entry, e),
    };

    CertificateInfo {
        name,
        entry,
        details: Some(CertificateDetails {
            fingerprint: cert.fingerprint(),
            expiry: ExpiryStatus::at(cert.not_after, now),
            subject: cert.subject,
            issuer: cert.issuer,
            not_before: cert.not_before,
            not_after: cert.not_after,
            is_ca: cert.is_ca,
        }),
        error: None,
    }
}

/// Inspect the CA and leaf certificates of both identities in `store`.
pub fn collect(store: &dyn CertificateStore, fqdn: &str, now: DateTime<Utc>) -> SupportReport {
    let read = |entry: &str| -> Result<Vec<u8>, StoreError> { store.read(entry) };

    let certificates = REPORTED
        .iter()
        .map(|&(name, identity, is_ca)| {
            let secrets = identity.secrets();
            let entry = if is_ca { secrets.ca } else { secrets.cert };
            match read(entry) {
                Ok(data) => describe(name, entry, &data, now),
                Err(StoreError::NotFound(_)) => {
                    CertificateInfo::failed(name, entry, "Certificate not found")
                }
                Err(e) => CertificateInfo::failed(name, entry, e),
            }
        })
        .collect();

    let chains = Identity::ALL
        .iter()
        .flat_map(|&identity| {
            let secrets = identity.secrets();
            let material = read(secrets.ca).and_then(|ca| Ok((ca, read(secrets.cert)?)));
            identity
                .hostnames(fqdn)
                .into_iter()
                .map(move |hostname| ChainCheck {
                    identity,
                    valid: material
                        .as_ref()
                        .is_ok_and(|(ca, cert)| verify_hostname(ca, cert, &hostname)),
                    hostname,
                })
                .collect::<Vec<_>>()
        })
        .collect();

    SupportReport {
        generated: now,
        certificates,
        chains,
    }
}

fn rfc3339(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl fmt::Display for CertificateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ({}) ---", self.name, self.entry)?;
        let Some(details) = &self.details else {
            return writeln!(f, "ERROR: {}", self.error.as_deref().unwrap_or("unknown"));
        };

        writeln!(f, "Subject: {}", details.subject)?;
        writeln!(f, "Issuer: {}", details.issuer)?;
        writeln!(f, "Valid From: {}", rfc3339(&details.not_before))?;
        writeln!(f, "Valid Until: {}", rfc3339(&details.not_after))?;
        writeln!(f, "Is CA: {}", details.is_ca)?;
        writeln!(f, "Fingerprint: sha256:{}", details.fingerprint)?;
        match details.expiry {
            ExpiryStatus::Expired(_) => writeln!(f, "*** WARNING: CERTIFICATE IS EXPIRED ***"),
            ExpiryStatus::Warning(days) => {
                writeln!(f, "*** WARNING: Certificate expires in {days} days ***")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SupportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SSL Certificate Information ===")?;
        writeln!(f, "Generated: {}", rfc3339(&self.generated))?;
        writeln!(f)?;

        for info in &self.certificates {
            writeln!(f, "{info}")?;
        }

        writeln!(f, "--- Certificate Chain Validation ---")?;
        for check in &self.chains {
            let status = if check.valid { "OK" } else { "FAILED" };
            writeln!(f, "{} certificate for {}: {status}", check.identity, check.hostname)?;
        }
        writeln!(f)?;

        writeln!(f, "--- Expiry Summary ---")?;
        for info in &self.certificates {
            match (&info.details, &info.error) {
                (Some(details), _) => match details.expiry {
                    ExpiryStatus::Expired(days) => writeln!(
                        f,
                        "- {}: *** EXPIRED *** (expired {days} days ago)",
                        info.name
                    )?,
                    ExpiryStatus::Warning(days) => writeln!(
                        f,
                        "- {}: *** WARNING *** expires in {days} days",
                        info.name
                    )?,
                    ExpiryStatus::Notice(days) => {
                        writeln!(f, "- {}: expires in {days} days", info.name)?
                    }
                    ExpiryStatus::Valid(days) => {
                        writeln!(f, "- {}: OK (expires in {days} days)", info.name)?
                    }
                },
                (None, error) => writeln!(
                    f,
                    "- {}: ERROR - {}",
                    info.name,
                    error.as_deref().unwrap_or("unknown")
                )?,
            }
        }
        writeln!(f)?;

        if self.has_issues() {
            writeln!(
                f,
                "*** ATTENTION: Certificate issues detected. Please review above. ***"
            )
        } else {
            writeln!(f, "All certificates are valid and not expiring soon.")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use certwright_store::MemoryStore;
    use chrono::Duration;

    use super::*;
    use crate::{
        engine::ProvisioningEngine,
        generator::LocalCaGenerator,
        testing::TestCa,
        types::{CaPassword, SslSettings},
    };

    #[test]
    fn test_expiry_thresholds() {
        let now = Utc::now();

        assert_eq!(
            ExpiryStatus::at(now - Duration::days(3), now),
            ExpiryStatus::Expired(3)
        );
        assert_eq!(
            ExpiryStatus::at(now + Duration::days(10), now),
            ExpiryStatus::Warning(10)
        );
        assert_eq!(
            ExpiryStatus::at(now + Duration::days(60), now),
            ExpiryStatus::Notice(60)
        );
        assert_eq!(
            ExpiryStatus::at(now + Duration::days(400), now),
            ExpiryStatus::Valid(400)
        );
        assert!(!ExpiryStatus::Notice(60).is_issue());
    }

    #[test]
    fn test_report_on_empty_store() {
        let store = MemoryStore::new();

        let report = collect(&store, "server.example.com", Utc::now());

        assert_eq!(report.certificates.len(), 4);
        assert!(report.certificates.iter().all(|c| c.details.is_none()));
        assert!(report.has_issues());
        let text = report.to_string();
        assert!(text.contains("- Root CA: ERROR - Certificate not found"));
        assert!(text.contains("*** ATTENTION"));
    }

    #[test]
    fn test_report_on_provisioned_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(LocalCaGenerator::new(dir.path()).with_kdf_iterations(1_000));
        ProvisioningEngine::new(store.clone(), generator, "server.example.com")
            .provision(&SslSettings {
                password: Some(CaPassword::new("secret")),
                ..Default::default()
            })
            .unwrap();

        let report = collect(store.as_ref(), "server.example.com", Utc::now());

        assert!(!report.has_issues(), "{report}");
        assert_eq!(report.chains.len(), 4);
        let root = report.certificates[0].details.as_ref().unwrap();
        assert!(root.is_ca);
        assert_eq!(root.fingerprint.len(), 64);
        assert!(report.to_string().contains("All certificates are valid"));
    }

    #[test]
    fn test_expiring_certificate_is_flagged() {
        let root = TestCa::root("RootCA");
        let (cert, _) = root.leaf(&["server.example.com"]);
        // rcgen issues certificates valid until 4096
        let far_future = Utc::now() + Duration::days(365 * 3000);

        let info = describe("Server Certificate", "ssl-cert", cert.as_bytes(), far_future);

        assert!(info.is_issue());
        assert!(info.to_string().contains("CERTIFICATE IS EXPIRED"));
    }

    #[test]
    fn test_garbage_entry() {
        let info = describe("Root CA", "ssl-ca", b"garbage", Utc::now());

        assert!(info.details.is_none());
        assert_eq!(info.error.as_deref(), Some("No certificate found"));
    }
}
