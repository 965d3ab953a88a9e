use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::dns_error::{DnsError, Result};
use crate::dns_msg::{DnsMessage, Question, RRType};

/// Type sent for labels the client does not know, so the server's
/// invalid-type handling can be exercised.
pub const TYPE_INVALID: u16 = 0;

pub fn parse_qtype(label: &str) -> u16 {
    label
        .parse::<RRType>()
        .map(|t| t as u16)
        .unwrap_or(TYPE_INVALID)
}

/// Sends one query from an ephemeral port and waits up to `timeout` for the
/// matching reply. Replies carrying another ID are ignored.
pub async fn query(server: SocketAddr, question: Question, timeout: Duration) -> Result<DnsMessage> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;

    let qid: u16 = rand::random();
    let request = DnsMessage::query(qid, question);
    socket.send_to(&request.to_bytes()?, server).await?;
    debug!(qid, %server, question = %request.questions[0], "sent query");

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 4096];
    loop {
        let (size, from) = timeout_at(deadline, socket.recv_from(&mut buf))
            .await
            .map_err(|_| DnsError::Timeout)??;

        match DnsMessage::from_bytes(&buf[..size]) {
            Ok(reply) if reply.header.id == qid && reply.header.is_response() => return Ok(reply),
            Ok(reply) => {
                debug!(qid, got = reply.header.id, %from, "ignoring unrelated reply");
            }
            Err(e) => {
                warn!(%from, error = %e, "ignoring malformed reply");
            }
        }
    }
}

/// dig-style rendering of a reply.
pub fn format_response(msg: &DnsMessage) -> String {
    msg.to_string()
}
