pub mod dns_client;
pub mod dns_error;
pub mod dns_msg;
pub mod dns_resolver;
pub mod dns_server;
pub mod dns_zone;
pub mod logging;

pub use dns_error::{DnsError, Result};
pub use dns_msg::{DnsMessage, Header, Question, RRType, Record};
pub use dns_resolver::{Resolution, Resolver};
pub use dns_server::{DnsServer, ServerConfig};
pub use dns_zone::{ZoneEntry, ZoneStore};
