use std::fmt;

use serde::Serialize;

/// Host aliases the database is reached under from inside the deployment.
pub const DATABASE_ALIASES: [&str; 2] = ["db", "reportdb"];

/// The two TLS identities of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    Server,
    Database,
}

impl Identity {
    pub const ALL: [Identity; 2] = [Identity::Server, Identity::Database];

    /// Store entry names holding this identity's material.
    pub fn secrets(self) -> SecretNames {
        match self {
            Identity::Server => SecretNames {
                ca: "ssl-ca",
                cert: "ssl-cert",
                key: "ssl-key",
            },
            Identity::Database => SecretNames {
                ca: "db-ssl-ca",
                cert: "db-ssl-cert",
                key: "db-ssl-key",
            },
        }
    }

    /// Every host name the certificate must be valid for.
    pub fn hostnames(self, fqdn: &str) -> Vec<String> {
        let mut names = vec![fqdn.to_string()];
        if self == Identity::Database {
            names.extend(DATABASE_ALIASES.iter().map(|alias| alias.to_string()));
        }
        names
    }

    /// Host name the generated certificate is issued to.
    pub fn common_name(self, fqdn: &str) -> String {
        match self {
            Identity::Server => fqdn.to_string(),
            Identity::Database => "reportdb".to_string(),
        }
    }

    /// Short name used for file names.
    pub fn file_stem(self) -> &'static str {
        match self {
            Identity::Server => "server",
            Identity::Database => "reportdb",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Server => f.write_str("server"),
            Identity::Database => f.write_str("database"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecretNames {
    pub ca: &'static str,
    pub cert: &'static str,
    pub key: &'static str,
}

impl SecretNames {
    pub fn all(&self) -> [&'static str; 3] {
        [self.ca, self.cert, self.key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_only_checks_fqdn() {
        assert_eq!(
            Identity::Server.hostnames("server.example.com"),
            vec!["server.example.com"]
        );
    }

    #[test]
    fn test_database_checks_aliases() {
        assert_eq!(
            Identity::Database.hostnames("server.example.com"),
            vec!["server.example.com", "db", "reportdb"]
        );
    }

    #[test]
    fn test_secret_names_are_distinct() {
        let server = Identity::Server.secrets().all();
        let database = Identity::Database.secrets().all();
        for name in server {
            assert!(!database.contains(&name));
        }
    }
}
