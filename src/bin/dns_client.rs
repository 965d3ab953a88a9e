use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dns_zone_server::dns_client::{format_response, parse_qtype, query};
use dns_zone_server::dns_msg::validate_name;
use dns_zone_server::{logging, DnsError, Question};

#[derive(Parser, Debug)]
#[command(name = "dns-client")]
#[command(about = "Send one query to a dns-zone-server and print the reply", long_about = None)]
struct Args {
    /// Server UDP port
    server_port: u16,

    /// Name to look up, e.g. `example.com.`
    qname: String,

    /// Record type: A, NS or CNAME
    qtype: String,

    /// Seconds to wait for a reply
    timeout: u64,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1")]
    server: IpAddr,

    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    validate_name(&args.qname).with_context(|| format!("Invalid name {}", args.qname))?;

    let server = SocketAddr::new(args.server, args.server_port);
    let question = Question::new(args.qname.as_str(), parse_qtype(&args.qtype));

    match query(server, question, Duration::from_secs(args.timeout)).await {
        Ok(reply) => print!("{}", format_response(&reply)),
        Err(DnsError::Timeout) => println!("Request timed out"),
        Err(e) => return Err(e).context("Query failed"),
    }

    Ok(())
}
