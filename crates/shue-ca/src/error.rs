//! Error types for the certificate authority core.

use std::time::Duration;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use thiserror::Error;

/// Errors from a single challenge TXT lookup.
///
/// These are never retried internally; the authority surfaces them to the
/// caller as a verification failure.
#[derive(Error, Debug)]
pub enum DnsError {
    /// The resolver answered with a non-success response code.
    #[error("dns query failed: {0}")]
    QueryFailed(ResponseCode),

    /// The response carried an empty answer section.
    #[error("no answer")]
    NoAnswer,

    /// The first answer record was not a TXT record.
    #[error("unexpected answer type: {0}")]
    UnexpectedRecordType(RecordType),

    /// No response arrived before the receive deadline.
    #[error("dns query timed out after {0:?}")]
    Timeout(Duration),

    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS message encoding or decoding failed.
    #[error("dns protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

/// Errors from certificate authority operations.
#[derive(Error, Debug)]
pub enum CaError {
    /// The caller supplied a missing or empty domain.
    #[error("domain is required")]
    InvalidDomain,

    /// The challenge TXT record could not be fetched.
    #[error("challenge verification failed: {0}")]
    ChallengeVerification(#[from] DnsError),

    /// The published TXT value did not match the outstanding token. The
    /// token stays outstanding, so the caller may fix DNS and retry.
    #[error("challenge mismatch")]
    ChallengeMismatch,

    /// Certificate construction or signing failed.
    #[error("signing error: {0}")]
    Signing(#[from] openssl::error::ErrorStack),

    /// Root key material could not be generated, persisted, or loaded.
    /// Fatal: without a root trust anchor the process must not serve.
    #[error("ca bootstrap failed: {0}")]
    Bootstrap(String),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
