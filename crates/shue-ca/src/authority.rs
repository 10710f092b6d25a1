//! Root CA key material and leaf certificate signing.

use std::fs;
use std::path::Path;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder, X509Ref};
use tracing::info;

use crate::challenge::ChallengeRegistry;
use crate::config::CaConfig;
use crate::dns::ChallengeResolver;
use crate::error::CaError;
use crate::Result;

/// RSA modulus size for the root and every issued leaf.
const RSA_BITS: u32 = 4096;

/// Bit length of leaf serial numbers, sampled uniformly.
const SERIAL_BITS: i32 = 65;

/// Certificate lifetime, root and leaf alike.
const VALIDITY_DAYS: u32 = 3650;

/// Issuer organization name.
const ORG_NAME: &str = "DigiShue CA";

/// Fixed serial for the self-signed root. Exactly one root exists per
/// deployment, so the constant never collides with anything.
const ROOT_SERIAL: u32 = 2019;

/// The certificate authority: owns the root credential for the process
/// lifetime and runs the challenge/issuance flow.
///
/// Construct one per process with [`CertificateAuthority::open`] and share
/// it behind an `Arc`. Tests can build independent instances against
/// isolated storage directories.
pub struct CertificateAuthority {
    root_cert: X509,
    root_key: PKey<Private>,
    registry: ChallengeRegistry,
    resolver: ChallengeResolver,
}

impl CertificateAuthority {
    /// Load the root credential from durable storage, generating and
    /// persisting a fresh one (plus the front-end service credential) when
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::Bootstrap`] if key generation, signing, or
    /// storage I/O fails. This is fatal: without a root trust anchor the
    /// caller must not start serving.
    pub fn open(config: &CaConfig) -> Result<Self> {
        let cert_path = config.storage.root_cert_path();
        let key_path = config.storage.root_key_path();

        if !cert_path.exists() || !key_path.exists() {
            info!("no root credential found, generating a new CA");
            generate_root(config)?;
        }

        info!("importing root credential");
        let cert_pem = fs::read(&cert_path)
            .map_err(|e| CaError::Bootstrap(format!("read {}: {e}", cert_path.display())))?;
        let root_cert = X509::from_pem(&cert_pem)
            .map_err(|e| CaError::Bootstrap(format!("parse {}: {e}", cert_path.display())))?;

        let key_pem = fs::read(&key_path)
            .map_err(|e| CaError::Bootstrap(format!("read {}: {e}", key_path.display())))?;
        let rsa = Rsa::private_key_from_pem(&key_pem)
            .map_err(|e| CaError::Bootstrap(format!("parse {}: {e}", key_path.display())))?;
        let root_key = PKey::from_rsa(rsa)
            .map_err(|e| CaError::Bootstrap(format!("load root key: {e}")))?;

        Ok(Self {
            root_cert,
            root_key,
            registry: ChallengeRegistry::new(),
            resolver: ChallengeResolver::new(&config.dns),
        })
    }

    /// Create an outstanding challenge for `domain` and return its token.
    ///
    /// A repeated request replaces the earlier token.
    pub fn request_challenge(&self, domain: &str) -> Result<String> {
        if domain.is_empty() {
            return Err(CaError::InvalidDomain);
        }
        let token = self.registry.issue(domain);
        info!(domain, "challenge issued");
        Ok(token)
    }

    /// Look up the challenge value currently published in DNS for `domain`.
    ///
    /// Purely informational: the registry is not consulted or modified.
    pub async fn published_challenge(&self, domain: &str) -> Result<String> {
        if domain.is_empty() {
            return Err(CaError::InvalidDomain);
        }
        Ok(self.resolver.resolve(domain).await?)
    }

    /// Validate the outstanding challenge for `domain` against DNS and, on
    /// success, sign and return a leaf certificate for it.
    ///
    /// The stored token is consumed by a successful validation. On a
    /// mismatch it stays outstanding, so the caller can fix DNS and retry
    /// without requesting a new challenge.
    pub async fn issue(&self, domain: &str) -> Result<(String, String)> {
        if domain.is_empty() {
            return Err(CaError::InvalidDomain);
        }

        let published = self.resolver.resolve(domain).await?;
        if !self.registry.consume(domain, &published) {
            return Err(CaError::ChallengeMismatch);
        }

        info!(domain, "challenge validated, issuing certificate");
        self.issue_leaf(&[domain])
    }

    /// Sign a fresh leaf certificate bound to `domains`.
    ///
    /// Generates a new RSA-4096 key pair per call. Returns the PEM-encoded
    /// certificate and its PKCS#1 private key. Runs without touching the
    /// challenge registry or its lock.
    pub fn issue_leaf(&self, domains: &[&str]) -> Result<(String, String)> {
        Ok(sign_leaf(&self.root_cert, &self.root_key, domains)?)
    }
}

/// Generate the root credential and the front-end service credential,
/// persisting all four PEM files under the data dir.
fn generate_root(config: &CaConfig) -> Result<()> {
    let storage = &config.storage;
    fs::create_dir_all(&storage.data_dir)
        .map_err(|e| CaError::Bootstrap(format!("create {}: {e}", storage.data_dir.display())))?;

    let (root_cert, root_key_pem, root_key) =
        build_root().map_err(|e| CaError::Bootstrap(format!("root generation: {e}")))?;

    let cert_pem = root_cert
        .to_pem()
        .map_err(|e| CaError::Bootstrap(format!("encode root certificate: {e}")))?;
    write_pem(&storage.root_cert_path(), &cert_pem)?;
    write_pem(&storage.root_key_path(), &root_key_pem)?;

    // Service credential for the CA's own front end, signed by the new root.
    let hostnames: Vec<&str> = config.service_hostnames.iter().map(String::as_str).collect();
    let (web_cert, web_key) = sign_leaf(&root_cert, &root_key, &hostnames)
        .map_err(|e| CaError::Bootstrap(format!("service credential: {e}")))?;
    write_pem(&storage.service_cert_path(), web_cert.as_bytes())?;
    write_pem(&storage.service_key_path(), web_key.as_bytes())?;

    info!(dir = %storage.data_dir.display(), "root and service credentials written");
    Ok(())
}

fn write_pem(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .map_err(|e| CaError::Bootstrap(format!("write {}: {e}", path.display())))
}

/// Build the self-signed root: CA basic constraints, digital-signature +
/// cert-sign key usage, client/server EKU, ten year validity.
fn build_root() -> std::result::Result<(X509, Vec<u8>, PKey<Private>), ErrorStack> {
    let rsa = Rsa::generate(RSA_BITS)?;
    let key_pem = rsa.private_key_to_pem()?;
    let key = PKey::from_rsa(rsa)?;

    let name = org_name()?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = BigNum::from_u32(ROOT_SERIAL)?.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_after(&not_after)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .build()?,
    )?;
    builder.append_extension(ExtendedKeyUsage::new().client_auth().server_auth().build()?)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok((builder.build(), key_pem, key))
}

/// Sign a fresh leaf bound to `domains` with `ca_key`.
fn sign_leaf(
    ca_cert: &X509Ref,
    ca_key: &PKeyRef<Private>,
    domains: &[&str],
) -> std::result::Result<(String, String), ErrorStack> {
    // Fresh key pair per leaf; never reused across issuances.
    let rsa = Rsa::generate(RSA_BITS)?;
    let key_pem = rsa.private_key_to_pem()?;
    let key = PKey::from_rsa(rsa)?;

    // Uniform serial below 2^65. Collisions against earlier serials are
    // not checked.
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    let subject = org_name()?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(ca_cert.subject_name())?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_after(&not_after)?;

    let san = {
        let mut san = SubjectAlternativeName::new();
        for domain in domains {
            san.dns(domain);
        }
        san.build(&builder.x509v3_context(Some(ca_cert), None))?
    };
    builder.append_extension(san)?;
    // The root's cert-sign bit is not delegated to leaves.
    builder.append_extension(KeyUsage::new().digital_signature().build()?)?;
    builder.append_extension(ExtendedKeyUsage::new().client_auth().server_auth().build()?)?;
    builder.sign(ca_key, MessageDigest::sha256())?;
    let cert = builder.build();

    let cert_pem = String::from_utf8_lossy(&cert.to_pem()?).into_owned();
    let key_pem = String::from_utf8_lossy(&key_pem).into_owned();
    Ok((cert_pem, key_pem))
}

fn org_name() -> std::result::Result<X509Name, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("O", ORG_NAME)?;
    Ok(name.build())
}
