//! shue-ca: domain-validated certificate authority core.
//!
//! Proves that a requester controls a DNS zone through a DNS-01 style
//! challenge, then issues an X.509 leaf certificate signed by a locally
//! managed root.
//!
//! # Architecture
//!
//! ```text
//! front end (shue-srv)
//!        │
//!        └── CertificateAuthority ── owns root key material, signs leaves
//!               ├── ChallengeRegistry ── domain -> outstanding token
//!               └── ChallengeResolver ── one TXT query per validation
//! ```
//!
//! The issuance flow: a caller requests a challenge for a domain, publishes
//! the returned token as a TXT record at `_acme-challenge.<domain>.`, then
//! asks for validation. The authority fetches the live TXT value, compares
//! it to the stored token, and on a match hands back a freshly signed
//! certificate and private key. Tokens are single-use: a successful
//! validation consumes the registry entry.

pub mod authority;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod error;

// Re-exports for convenience.
pub use authority::CertificateAuthority;
pub use challenge::ChallengeRegistry;
pub use config::{CaConfig, DnsConfig, StorageConfig};
pub use dns::ChallengeResolver;
pub use error::{CaError, DnsError};

/// Result type for CA operations.
pub type Result<T> = std::result::Result<T, CaError>;
