//! Challenge TXT lookups.
//!
//! One UDP datagram per lookup against a fixed internal resolver, mirroring
//! the controlled deployment this CA runs in. No retries, no pooling; the
//! socket lives for exactly one query/response exchange.

use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use rand::Rng as _;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::DnsConfig;
use crate::error::DnsError;

/// Label prefix challenge records are published under.
const CHALLENGE_LABEL: &str = "_acme-challenge";

/// Largest UDP response we accept.
const MAX_RESPONSE_SIZE: usize = 4096;

/// Fetches the published challenge value for a domain.
#[derive(Debug, Clone)]
pub struct ChallengeResolver {
    local_addr: SocketAddr,
    server_addr: SocketAddr,
    timeout: Duration,
}

impl ChallengeResolver {
    /// Create a resolver using the configured endpoints.
    #[must_use]
    pub fn new(config: &DnsConfig) -> Self {
        Self {
            local_addr: config.local_addr,
            server_addr: config.server_addr,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Look up the TXT record at `_acme-challenge.<domain>.` and return the
    /// first string segment of the first answer record.
    ///
    /// Additional segments and additional answer records are ignored. This
    /// single-answer, first-segment policy is deliberate; callers must not
    /// expect full RFC TXT handling.
    pub async fn resolve(&self, domain: &str) -> Result<String, DnsError> {
        let name = Name::from_ascii(format!("{CHALLENGE_LABEL}.{domain}."))?;
        debug!(domain, name = %name, "querying challenge record");

        let mut query = Query::query(name, RecordType::TXT);
        query.set_query_class(DNSClass::IN);

        let mut message = Message::new();
        message
            .set_id(rand::rng().random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(query);
        let request = message.to_vec()?;

        // One socket per lookup, closed on drop.
        let socket = UdpSocket::bind(self.local_addr).await?;
        socket.connect(self.server_addr).await?;
        socket.send(&request).await?;

        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| DnsError::Timeout(self.timeout))??;

        let response = Message::from_vec(&buf[..len])?;
        first_txt_segment(&response)
    }
}

/// Apply the response policy: success rcode, non-empty answer section, first
/// record must be TXT, first segment wins.
fn first_txt_segment(response: &Message) -> Result<String, DnsError> {
    if response.response_code() != ResponseCode::NoError {
        return Err(DnsError::QueryFailed(response.response_code()));
    }

    let Some(answer) = response.answers().first() else {
        return Err(DnsError::NoAnswer);
    };

    match answer.data() {
        RData::TXT(txt) => {
            let Some(segment) = txt.txt_data().first() else {
                return Err(DnsError::NoAnswer);
            };
            Ok(String::from_utf8_lossy(segment).into_owned())
        }
        _ => Err(DnsError::UnexpectedRecordType(answer.record_type())),
    }
}
