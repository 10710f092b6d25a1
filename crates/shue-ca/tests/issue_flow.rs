//! End-to-end issuance flow against a loopback DNS responder.

use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::rdata::TXT;
use hickory_proto::rr::{RData, Record};
use openssl::x509::X509;
use parking_lot::Mutex;
use tokio::net::UdpSocket;

use shue_ca::{CaConfig, CaError, CertificateAuthority};

/// The TXT value the loopback resolver currently publishes. `None` means
/// stay silent and let the query time out.
type Published = Arc<Mutex<Option<String>>>;

/// Run a loopback resolver answering every TXT query with the currently
/// published value.
async fn spawn_responder() -> (SocketAddr, Published) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let published: Published = Arc::new(Mutex::new(None));
    let state = Arc::clone(&published);

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Some(value) = state.lock().clone() else {
                continue;
            };

            let query = Message::from_vec(&buf[..len]).unwrap();
            let qname = query.queries()[0].name().clone();

            let mut response = Message::new();
            response
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .add_queries(query.queries().to_vec());
            response.add_answer(Record::from_rdata(
                qname,
                60,
                RData::TXT(TXT::new(vec![value])),
            ));

            let bytes = response.to_vec().unwrap();
            socket.send_to(&bytes, peer).await.unwrap();
        }
    });

    (addr, published)
}

fn test_config(data_dir: &std::path::Path, dns_server: SocketAddr) -> CaConfig {
    let mut config = CaConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.dns.local_addr = "127.0.0.1:0".parse().unwrap();
    config.dns.server_addr = dns_server;
    config.dns.timeout_secs = 1;
    config
}

#[tokio::test]
async fn validated_challenge_yields_certificate_once() {
    let dir = tempfile::tempdir().unwrap();
    let (dns, published) = spawn_responder().await;
    let config = test_config(dir.path(), dns);
    let ca = CertificateAuthority::open(&config).unwrap();

    let token = ca.request_challenge("example.test").unwrap();
    assert_eq!(token.len(), 32);

    // A wrong published value fails distinctly from a resolver failure
    // and leaves the token outstanding.
    *published.lock() = Some(String::from("00000000000000000000000000000000"));
    let err = ca.issue("example.test").await.unwrap_err();
    assert!(matches!(err, CaError::ChallengeMismatch));

    // Publish the real token: issuance succeeds.
    *published.lock() = Some(token);
    let (cert_pem, key_pem) = ca.issue("example.test").await.unwrap();
    assert!(key_pem.contains("BEGIN RSA PRIVATE KEY"));

    let cert = X509::from_pem(cert_pem.as_bytes()).unwrap();
    let sans: Vec<String> = cert
        .subject_alt_names()
        .unwrap()
        .iter()
        .filter_map(|name| name.dnsname().map(ToOwned::to_owned))
        .collect();
    assert_eq!(sans, vec!["example.test"]);

    // Signed by the persisted root.
    let root_pem = std::fs::read(config.storage.root_cert_path()).unwrap();
    let root = X509::from_pem(&root_pem).unwrap();
    assert!(cert.verify(&root.public_key().unwrap()).unwrap());

    // The token was consumed: the same DNS state no longer validates.
    let err = ca.issue("example.test").await.unwrap_err();
    assert!(matches!(err, CaError::ChallengeMismatch));
}

#[tokio::test]
async fn resolver_failure_leaves_challenge_outstanding() {
    let dir = tempfile::tempdir().unwrap();
    let (dns, published) = spawn_responder().await;
    let ca = CertificateAuthority::open(&test_config(dir.path(), dns)).unwrap();

    let token = ca.request_challenge("example.test").unwrap();

    // The responder stays silent: verification fails without consuming
    // the token.
    let err = ca.issue("example.test").await.unwrap_err();
    assert!(matches!(err, CaError::ChallengeVerification(_)));

    // Once DNS answers, the original token still validates; no new
    // challenge request was needed.
    *published.lock() = Some(token);
    let (cert_pem, _) = ca.issue("example.test").await.unwrap();
    assert!(cert_pem.contains("BEGIN CERTIFICATE"));
}

#[tokio::test]
async fn lookup_reflects_published_value() {
    let dir = tempfile::tempdir().unwrap();
    let (dns, published) = spawn_responder().await;
    let ca = CertificateAuthority::open(&test_config(dir.path(), dns)).unwrap();

    *published.lock() = Some(String::from("deadbeef"));
    assert_eq!(ca.published_challenge("example.test").await.unwrap(), "deadbeef");

    // Informational only: no registry entry was created or consumed, so
    // validation still reports a mismatch.
    let err = ca.issue("example.test").await.unwrap_err();
    assert!(matches!(err, CaError::ChallengeMismatch));
}
