use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::dns_error::{DnsError, Result};
use crate::dns_msg::{normalize_name, DnsMessage, Question, RRType, Record, ROOT_NAME};
use crate::dns_zone::ZoneStore;

/// Longest CNAME chain followed before giving up on a query.
pub const MAX_CNAME_CHAIN: usize = 16;

/// Record sets produced for one question.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

/// Answers questions from a read-only [`ZoneStore`].
///
/// Resolution tries, in order: a direct match for the requested type, a
/// CNAME chain ending in such a match, and finally a referral to the
/// nameservers of the closest enclosing zone with their A records as glue.
#[derive(Debug, Clone)]
pub struct Resolver {
    zone: Arc<ZoneStore>,
    max_chain: usize,
}

impl Resolver {
    pub fn new(zone: Arc<ZoneStore>) -> Self {
        Resolver {
            zone,
            max_chain: MAX_CNAME_CHAIN,
        }
    }

    pub fn with_max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = max_chain;
        self
    }

    pub fn resolve(&self, question: &Question) -> Result<Resolution> {
        let rtype = question
            .rr_type()
            .ok_or(DnsError::InvalidType(question.qtype))?;

        let (answers, last_name, found) = self.follow_chain(&question.name, rtype);
        if found {
            return Ok(Resolution {
                answers,
                ..Default::default()
            });
        }

        let (authority, additional) = self.referral(&last_name);
        Ok(Resolution {
            answers,
            authority,
            additional,
        })
    }

    /// Builds the response message for `question`. Questions that cannot be
    /// resolved at all get a response with empty sections.
    pub fn answer(&self, qid: u16, question: &Question) -> DnsMessage {
        match self.resolve(question) {
            Ok(res) => DnsMessage::response(
                qid,
                question.clone(),
                res.answers,
                res.authority,
                res.additional,
            ),
            Err(e) => {
                warn!(qid, question = %question, error = %e, "query failed, sending empty response");
                DnsMessage::response(qid, question.clone(), vec![], vec![], vec![])
            }
        }
    }

    pub fn respond(&self, qid: u16, question: &Question) -> Result<Bytes> {
        self.answer(qid, question).to_bytes()
    }

    // Returns the accumulated answers, the name the chain stopped at, and
    // whether a record of the requested type was reached.
    fn follow_chain(&self, qname: &str, rtype: RRType) -> (Vec<Record>, String, bool) {
        let mut answers = Vec::new();
        let mut visited = HashSet::from([normalize_name(qname)]);
        let mut current = qname.to_string();

        loop {
            let direct = self.zone.lookup(&current, rtype);
            if !direct.is_empty() {
                answers.extend(
                    direct
                        .iter()
                        .map(|value| Record::new(current.as_str(), rtype, value.as_str())),
                );
                return (answers, current, true);
            }

            if rtype == RRType::CNAME {
                return (answers, current, false);
            }

            let aliases = self.zone.lookup(&current, RRType::CNAME);
            let Some(target) = aliases.first() else {
                return (answers, current, false);
            };
            if aliases.len() > 1 {
                debug!(name = %current, count = aliases.len(), "multiple CNAMEs, following the first");
            }

            if answers.len() >= self.max_chain || !visited.insert(normalize_name(target)) {
                warn!(
                    qname,
                    name = %current,
                    target = %target,
                    depth = answers.len(),
                    "CNAME chain loops or is too long, stopping"
                );
                return (answers, current, false);
            }

            answers.push(Record::new(current.as_str(), RRType::CNAME, target.as_str()));
            current = target.clone();
        }
    }

    // NS records of the closest enclosing zone plus one level of A glue.
    fn referral(&self, name: &str) -> (Vec<Record>, Vec<Record>) {
        let Some((zone, servers)) = zone_cuts(name)
            .into_iter()
            .map(|cut| {
                let servers = self.zone.lookup(&cut, RRType::NS);
                (cut, servers)
            })
            .find(|(_, servers)| !servers.is_empty())
        else {
            return (vec![], vec![]);
        };

        let authority = servers
            .iter()
            .map(|ns| Record::new(zone.as_str(), RRType::NS, ns.as_str()))
            .collect::<Vec<_>>();

        let additional = servers
            .iter()
            .flat_map(|ns| {
                self.zone
                    .lookup(ns, RRType::A)
                    .iter()
                    .map(move |addr| Record::new(ns.as_str(), RRType::A, addr.as_str()))
            })
            .collect::<Vec<_>>();

        (authority, additional)
    }
}

/// `name` followed by each shorter suffix, ending with the root:
/// `a.b.` yields `a.b.`, `b.`, `.`.
pub fn zone_cuts(name: &str) -> Vec<String> {
    let name = normalize_name(name);
    let mut cuts = Vec::new();
    let mut rest = name.as_str();

    while rest != ROOT_NAME {
        cuts.push(rest.to_string());
        rest = match rest.split_once('.') {
            Some((_, tail)) if !tail.is_empty() => tail,
            _ => ROOT_NAME,
        };
    }
    cuts.push(ROOT_NAME.to_string());

    cuts
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::dns_zone::parse_zone;

    const ZONE: &str = "\
.                    NS     a.root-servers.net.
a.root-servers.net.  A      198.41.0.4
foo.example.com.     CNAME  bar.example.com.
bar.example.com.     A      93.184.215.14
example.org.         NS     ns1.example.org.
example.org.         NS     ns2.example.org.
ns1.example.org.     A      192.168.2.1
ns2.example.org.     A      192.168.2.2
test.example.com.    A      192.168.4.1
test.example.com.    A      192.168.4.2
www.example.com.     CNAME  example.com.
example.com.         A      192.168.6.1
loop-a.example.      CNAME  loop-b.example.
loop-b.example.      CNAME  loop-a.example.
dangling.example.org. CNAME nowhere.example.org.
";

    fn resolver() -> Result<Resolver> {
        Ok(Resolver::new(Arc::new(ZoneStore::load(parse_zone(ZONE)?))))
    }

    fn question(name: &str, rtype: RRType) -> Question {
        Question::new(name, rtype as u16)
    }

    #[test]
    fn test_direct_match() -> Result<()> {
        let res = resolver()?.resolve(&question("test.example.com.", RRType::A))?;

        assert_eq!(
            res.answers,
            vec![
                Record::new("test.example.com.", RRType::A, "192.168.4.1"),
                Record::new("test.example.com.", RRType::A, "192.168.4.2"),
            ]
        );
        assert!(res.authority.is_empty());
        assert!(res.additional.is_empty());

        Ok(())
    }

    #[test]
    fn test_cname_chain() -> Result<()> {
        let res = resolver()?.resolve(&question("foo.example.com.", RRType::A))?;

        assert_eq!(
            res.answers,
            vec![
                Record::new("foo.example.com.", RRType::CNAME, "bar.example.com."),
                Record::new("bar.example.com.", RRType::A, "93.184.215.14"),
            ]
        );
        assert!(res.authority.is_empty());

        let res = resolver()?.resolve(&question("www.example.com.", RRType::A))?;
        assert_eq!(res.answers.len(), 2);
        assert_eq!(res.answers[1].data, "192.168.6.1");

        Ok(())
    }

    #[test]
    fn test_cname_target_as_written() -> Result<()> {
        let resolver = Resolver::new(Arc::new(ZoneStore::load(parse_zone(
            "alias.example. CNAME Target.Example.COM\ntarget.example.com. A 10.0.0.7",
        )?)));
        let res = resolver.resolve(&question("alias.example.", RRType::A))?;

        assert_eq!(
            res.answers,
            vec![
                Record::new("alias.example.", RRType::CNAME, "Target.Example.COM"),
                Record::new("Target.Example.COM", RRType::A, "10.0.0.7"),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_cname_query_not_followed() -> Result<()> {
        let res = resolver()?.resolve(&question("foo.example.com.", RRType::CNAME))?;
        assert_eq!(
            res.answers,
            vec![Record::new("foo.example.com.", RRType::CNAME, "bar.example.com.")]
        );
        Ok(())
    }

    #[test]
    fn test_root_referral() -> Result<()> {
        let res = resolver()?.resolve(&question("example.net.", RRType::A))?;

        assert!(res.answers.is_empty());
        assert_eq!(
            res.authority,
            vec![Record::new(".", RRType::NS, "a.root-servers.net.")]
        );
        assert_eq!(
            res.additional,
            vec![Record::new("a.root-servers.net.", RRType::A, "198.41.0.4")]
        );

        Ok(())
    }

    #[test]
    fn test_closest_zone_referral() -> Result<()> {
        let res = resolver()?.resolve(&question("www.example.org.", RRType::A))?;

        assert!(res.answers.is_empty());
        assert_eq!(res.authority.len(), 2);
        assert!(res.authority.iter().all(|r| r.name == "example.org."));
        assert_eq!(
            res.additional
                .iter()
                .map(|r| r.data.as_str())
                .collect::<Vec<_>>(),
            ["192.168.2.1", "192.168.2.2"]
        );

        Ok(())
    }

    #[test]
    fn test_dangling_cname_refers() -> Result<()> {
        let res = resolver()?.resolve(&question("dangling.example.org.", RRType::A))?;

        assert_eq!(
            res.answers,
            vec![Record::new(
                "dangling.example.org.",
                RRType::CNAME,
                "nowhere.example.org."
            )]
        );
        assert_eq!(res.authority[0].name, "example.org.");

        Ok(())
    }

    #[test]
    fn test_no_ns_anywhere() -> Result<()> {
        let resolver = Resolver::new(Arc::new(ZoneStore::load(parse_zone(
            "only.example. A 10.0.0.1",
        )?)));
        let res = resolver.resolve(&question("other.example.", RRType::A))?;
        assert_eq!(res, Resolution::default());
        Ok(())
    }

    #[test]
    fn test_cname_loop_terminates() -> Result<()> {
        let res = resolver()?.resolve(&question("loop-a.example.", RRType::A))?;

        assert_eq!(
            res.answers,
            vec![Record::new("loop-a.example.", RRType::CNAME, "loop-b.example.")]
        );
        // falls back to the root referral
        assert_eq!(res.authority.len(), 1);

        Ok(())
    }

    #[test]
    fn test_chain_depth_bound() -> Result<()> {
        let zone = (0..5)
            .map(|i| format!("c{i}.example. CNAME c{}.example.", i + 1))
            .chain(Some("c5.example. A 10.0.0.5".to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        let resolver = Resolver::new(Arc::new(ZoneStore::load(parse_zone(&zone)?)));

        let full = resolver.resolve(&question("c0.example.", RRType::A))?;
        assert_eq!(full.answers.len(), 6);

        let bounded = resolver
            .with_max_chain(3)
            .resolve(&question("c0.example.", RRType::A))?;
        assert_eq!(bounded.answers.len(), 3);
        assert!(bounded
            .answers
            .iter()
            .all(|r| r.rtype == RRType::CNAME as u16));

        Ok(())
    }

    #[test]
    fn test_invalid_type() -> Result<()> {
        let resolver = resolver()?;
        let q = Question::new("example.com.", 0);

        assert!(matches!(
            resolver.resolve(&q),
            Err(DnsError::InvalidType(0))
        ));

        let msg = DnsMessage::from_bytes(&resolver.respond(99, &q)?)?;
        assert_eq!(msg.header.id, 99);
        assert!(msg.header.is_response());
        assert_eq!(msg.questions, vec![q]);
        assert!(msg.answers.is_empty() && msg.authority.is_empty() && msg.additional.is_empty());

        Ok(())
    }

    #[test]
    fn test_respond_header() -> Result<()> {
        let bytes = resolver()?.respond(0x1234, &question("example.org.", RRType::A))?;
        let msg = DnsMessage::from_bytes(&bytes)?;

        assert_eq!(msg.header.id, 0x1234);
        assert!(msg.header.is_response());
        assert_eq!(msg.header.qdcount, 1);
        assert_eq!(msg.header.ancount, 0);
        assert_eq!(msg.header.nscount, 2);
        assert_eq!(msg.header.arcount, 2);

        Ok(())
    }

    #[test]
    fn test_zone_cuts() {
        assert_eq!(
            zone_cuts("www.Example.org"),
            ["www.example.org.", "example.org.", "org.", "."]
        );
        assert_eq!(zone_cuts("."), ["."]);
    }
}
