use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::{debug, info};

use crate::dns_error::{DnsError, Result};
use crate::dns_msg::{normalize_name, validate_name, RRType};

/// One line of a zone file: `name type value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEntry {
    pub name: String,
    pub rtype: RRType,
    pub value: String,
}

impl ZoneEntry {
    pub fn new(name: impl Into<String>, rtype: RRType, value: impl Into<String>) -> Self {
        ZoneEntry {
            name: name.into(),
            rtype,
            value: value.into(),
        }
    }
}

/// Records keyed by normalised owner name, then type. Built once and never
/// mutated afterwards, so it can be shared between query tasks behind an `Arc`.
#[derive(Debug, Default)]
pub struct ZoneStore {
    records: HashMap<String, HashMap<RRType, Vec<String>>>,
    len: usize,
}

impl ZoneStore {
    pub fn load<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ZoneEntry>,
    {
        let mut store = ZoneStore::default();
        for entry in entries {
            store
                .records
                .entry(normalize_name(&entry.name))
                .or_default()
                .entry(entry.rtype)
                .or_default()
                .push(entry.value);
            store.len += 1;
        }
        store
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let store = ZoneStore::load(parse_zone(&text)?);
        info!(
            records = store.len(),
            names = store.records.len(),
            "loaded zone from {}",
            path.display()
        );
        Ok(store)
    }

    /// Values for `(name, rtype)` in insertion order; empty when absent.
    pub fn lookup(&self, name: &str, rtype: RRType) -> &[String] {
        self.records
            .get(normalize_name(name).as_str())
            .and_then(|types| types.get(&rtype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn zone_error(line: usize, message: impl Into<String>) -> DnsError {
    DnsError::ZoneFile {
        line,
        message: message.into(),
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<ZoneEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [name, rtype, value] = fields[..] else {
        return Err(zone_error(
            line_no,
            format!("expected `name type value`, found {} fields", fields.len()),
        ));
    };

    validate_name(name).map_err(|e| zone_error(line_no, e.to_string()))?;
    let rtype: RRType = rtype
        .parse()
        .map_err(|e: DnsError| zone_error(line_no, e.to_string()))?;

    // values are checked but stored as written; only the owner is normalised
    match rtype {
        RRType::A => {
            value
                .parse::<Ipv4Addr>()
                .map_err(|e| zone_error(line_no, format!("{value}: {e}")))?;
        }
        RRType::NS | RRType::CNAME => {
            validate_name(value).map_err(|e| zone_error(line_no, e.to_string()))?;
        }
    }

    Ok(ZoneEntry::new(normalize_name(name), rtype, value))
}

/// Parses zone file text. Blank lines and `#`/`;` comments are skipped; any
/// other malformed line rejects the whole file.
pub fn parse_zone(text: &str) -> Result<Vec<ZoneEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let entry = parse_line(idx + 1, line)?;
        debug!(name = %entry.name, rtype = %entry.rtype, value = %entry.value, "zone record");
        entries.push(entry);
    }
    Ok(entries)
}
