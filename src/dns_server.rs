use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::dns_error::DnsError;
use crate::dns_msg::{DnsMessage, Question};
use crate::dns_resolver::Resolver;

const RECV_BUF_SIZE: usize = 4096;

pub const DEFAULT_PORT: u16 = 2053;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub zone_file: PathBuf,
    /// Upper bound on queries being handled at once; datagrams arriving
    /// while the bound is reached are dropped.
    pub max_in_flight: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            zone_file: PathBuf::from("sample_master.txt"),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// State owned by the task handling a single question.
#[derive(Debug)]
struct QueryContext {
    id: u16,
    question: Question,
    client: SocketAddr,
    received_at: Instant,
}

pub struct DnsServer {
    socket: Arc<UdpSocket>,
    resolver: Resolver,
    permits: Arc<Semaphore>,
}

impl DnsServer {
    pub async fn bind(config: &ServerConfig, resolver: Resolver) -> Result<Self> {
        let addr = config.addr();
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to address {addr}"))?;

        Ok(Self {
            socket: Arc::new(socket),
            resolver,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read local address")
    }

    /// Receive loop. This is the only reader of the socket; each datagram is
    /// handed to its own task and the loop goes straight back to receiving.
    /// Returns only on a transport error.
    pub async fn start(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "serving DNS queries");

        let mut buf = [0u8; RECV_BUF_SIZE];
        loop {
            let (size, source) = self
                .socket
                .recv_from(&mut buf)
                .await
                .context("Error receiving data")?;
            let received_at = Instant::now();
            debug!(size, client = %source, "received datagram");

            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                warn!(client = %source, "too many queries in flight, dropping datagram");
                continue;
            };

            let datagram = Bytes::copy_from_slice(&buf[..size]);
            let socket = self.socket.clone();
            let resolver = self.resolver.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) =
                    handle_datagram(&socket, &resolver, &datagram, source, received_at).await
                {
                    if e.is_format() {
                        warn!(client = %source, error = %e, "dropping malformed query");
                    } else {
                        error!(client = %source, error = %e, "failed to answer query");
                    }
                }
            });
        }
    }
}

async fn handle_datagram(
    socket: &UdpSocket,
    resolver: &Resolver,
    datagram: &[u8],
    client: SocketAddr,
    received_at: Instant,
) -> Result<(), DnsError> {
    let request = DnsMessage::from_bytes(datagram)?;
    if request.header.is_response() {
        debug!(client = %client, qid = request.header.id, "ignoring response datagram");
        return Ok(());
    }

    for question in request.questions {
        let ctx = QueryContext {
            id: request.header.id,
            question,
            client,
            received_at,
        };
        answer_query(socket, resolver, ctx).await;
    }

    Ok(())
}

// Failures are logged here so one bad question does not stop the others
// carried by the same datagram.
async fn answer_query(socket: &UdpSocket, resolver: &Resolver, ctx: QueryContext) {
    debug!(qid = ctx.id, client = %ctx.client, question = %ctx.question, "resolving");

    let response = resolver.answer(ctx.id, &ctx.question);
    let sent = match response.to_bytes() {
        Ok(bytes) => socket.send_to(&bytes, ctx.client).await.map_err(DnsError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        error!(qid = ctx.id, client = %ctx.client, question = %ctx.question, error = %e, "failed to answer question");
        return;
    }

    info!(
        qid = ctx.id,
        client = %ctx.client,
        qname = %ctx.question.name,
        qtype = ctx.question.qtype,
        answers = response.answers.len(),
        authority = response.authority.len(),
        additional = response.additional.len(),
        elapsed_us = ctx.received_at.elapsed().as_micros() as u64,
        "answered"
    );
}
