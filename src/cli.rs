use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use dns_zone_server::dns_server::{ServerConfig, DEFAULT_MAX_IN_FLIGHT};

#[derive(Parser, Debug)]
#[command(name = "dns-zone-server")]
#[command(about = "Authoritative DNS server answering A/NS/CNAME queries from a zone file", long_about = None)]
pub struct Args {
    /// UDP port to listen on
    pub port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Zone file with one `name type value` record per line
    #[arg(short, long, default_value = "sample_master.txt")]
    pub zone_file: PathBuf,

    /// Queries handled concurrently before new datagrams are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            zone_file: self.zone_file.clone(),
            max_in_flight: self.max_in_flight,
        }
    }
}
