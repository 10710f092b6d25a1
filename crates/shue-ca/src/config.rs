//! Configuration for the certificate authority and its front end.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::CaError;

/// Root certificate file name under `data_dir`.
pub const ROOT_CERT_FILE: &str = "ca-crt.pem";
/// Root private key file name under `data_dir`.
pub const ROOT_KEY_FILE: &str = "ca-key.pem";
/// Service (front-end) certificate file name under `data_dir`.
pub const SERVICE_CERT_FILE: &str = "ca-web-crt.pem";
/// Service private key file name under `data_dir`.
pub const SERVICE_KEY_FILE: &str = "ca-web-key.pem";

/// Configuration for a shue-ca deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    /// Listen address for the front end (default: 0.0.0.0:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Subject alternative names for the service credential issued to the
    /// front end at bootstrap.
    #[serde(default = "default_service_hostnames")]
    pub service_hostnames: Vec<String>,

    /// Challenge DNS lookup endpoints.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Durable storage locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Endpoints for challenge TXT lookups.
///
/// Queries go to a fixed internal resolver from a fixed source address.
/// This is not general-purpose resolver discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Local source address for challenge queries (default: 10.64.10.3:50000).
    #[serde(default = "default_dns_local")]
    pub local_addr: SocketAddr,

    /// Resolver the queries are sent to (default: 10.64.10.2:53).
    #[serde(default = "default_dns_server")]
    pub server_addr: SocketAddr,

    /// Receive deadline for a single query, in seconds (default: 5).
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
}

/// Where PEM material lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the root and service PEM files (default: `.`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory the `/cert` endpoint serves stored PEM files from
    /// (default: `mtls/tls/certs`).
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            service_hostnames: default_service_hostnames(),
            dns: DnsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            local_addr: default_dns_local(),
            server_addr: default_dns_server(),
            timeout_secs: default_dns_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cert_dir: default_cert_dir(),
        }
    }
}

impl CaConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| CaError::Config(format!("{}: {e}", path.display())))
        } else {
            Ok(Self::default())
        }
    }
}

impl StorageConfig {
    /// Path of the root certificate PEM.
    pub fn root_cert_path(&self) -> PathBuf {
        self.data_dir.join(ROOT_CERT_FILE)
    }

    /// Path of the root private key PEM.
    pub fn root_key_path(&self) -> PathBuf {
        self.data_dir.join(ROOT_KEY_FILE)
    }

    /// Path of the service certificate PEM.
    pub fn service_cert_path(&self) -> PathBuf {
        self.data_dir.join(SERVICE_CERT_FILE)
    }

    /// Path of the service private key PEM.
    pub fn service_key_path(&self) -> PathBuf {
        self.data_dir.join(SERVICE_KEY_FILE)
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default addr")
}

fn default_service_hostnames() -> Vec<String> {
    vec![
        String::from("ca.internal"),
        String::from("keyserver.internal"),
    ]
}

fn default_dns_local() -> SocketAddr {
    "10.64.10.3:50000".parse().expect("valid default addr")
}

fn default_dns_server() -> SocketAddr {
    "10.64.10.2:53".parse().expect("valid default addr")
}

const fn default_dns_timeout() -> u64 {
    5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("mtls/tls/certs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaConfig::default();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.dns.server_addr.port(), 53);
        assert_eq!(config.dns.timeout_secs, 5);
        assert_eq!(
            config.service_hostnames,
            vec!["ca.internal", "keyserver.internal"]
        );
        assert_eq!(config.storage.root_cert_path(), PathBuf::from("./ca-crt.pem"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CaConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:9090"

            [dns]
            server_addr = "127.0.0.1:5353"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.dns.server_addr.port(), 5353);
        // Unspecified fields keep their defaults.
        assert_eq!(config.dns.local_addr.port(), 50000);
        assert_eq!(config.storage.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = CaConfig::load(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(config.listen.port(), 8080);
    }
}
