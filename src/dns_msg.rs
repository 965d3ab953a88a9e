use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use nom::{
    bytes::complete::take,
    combinator::map,
    multi::{length_data, many_m_n},
    number::complete::{be_u16, be_u8},
    sequence::tuple,
    IResult,
};

use crate::dns_error::{DnsError, Result, WireError};

/*
                                1  1  1  1  1  1
  0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      ID                       |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     FLAGS                  |QR|
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    QDCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ANCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    NSCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ARCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
 */

pub const DNS_HDR_SIZE: usize = 12;

pub const FLAG_QUERY: u16 = 0;
pub const FLAG_RESPONSE: u16 = 1;

pub const ROOT_NAME: &str = ".";

const MAX_LABEL_LEN: usize = 63;
const POINTER_MASK: u8 = 0b1100_0000;

type ParseResult<'a, T> = IResult<&'a [u8], T, WireError>;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RRType {
    A = 1,     // Host Address
    NS = 2,    // an authoritative name server
    CNAME = 5, // the canonical name for an alias
}

impl RRType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RRType::A),
            2 => Some(RRType::NS),
            5 => Some(RRType::CNAME),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RRType::A => "A",
            RRType::NS => "NS",
            RRType::CNAME => "CNAME",
        }
    }
}

impl fmt::Display for RRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RRType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RRType::A),
            "NS" => Ok(RRType::NS),
            "CNAME" => Ok(RRType::CNAME),
            other => Err(DnsError::Format(format!("unknown record type {other}"))),
        }
    }
}

/// Label for a numeric type as it appears in zone files and client output.
pub fn type_label(rtype: u16) -> String {
    RRType::from_u16(rtype)
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| format!("TYPE{rtype}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn new(id: u16, flags: u16) -> Self {
        Header {
            id,
            flags,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.qdcount);
        buf.put_u16(self.ancount);
        buf.put_u16(self.nscount);
        buf.put_u16(self.arcount);
    }

    fn parse(input: &[u8]) -> ParseResult<'_, Header> {
        map(
            tuple((be_u16, be_u16, be_u16, be_u16, be_u16, be_u16)),
            |(id, flags, qdcount, ancount, nscount, arcount)| Header {
                id,
                flags,
                qdcount,
                ancount,
                nscount,
                arcount,
            },
        )(input)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < DNS_HDR_SIZE {
            return Err(DnsError::TooShort(buf.len()));
        }
        let (_, header) = Header::parse(buf)?;
        Ok(header)
    }
}

/// Checks that `name` can be spelled out on the wire: ASCII labels of
/// 1..=63 bytes, optionally ending with the root dot.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == ROOT_NAME {
        return Ok(());
    }
    if !name.is_ascii() {
        return Err(DnsError::Format(format!("non-ASCII name {name}")));
    }
    for label in name.strip_suffix('.').unwrap_or(name).split('.') {
        if label.is_empty() {
            return Err(DnsError::Format(format!("empty label in {name}")));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsError::LabelTooLong(label.len()));
        }
    }
    Ok(())
}

/// Lower-cased, fully qualified form used as the lookup key.
pub fn normalize_name(name: &str) -> String {
    let name = name.to_ascii_lowercase();
    if name.is_empty() || name == ROOT_NAME {
        ROOT_NAME.to_string()
    } else if name.ends_with('.') {
        name
    } else {
        name + "."
    }
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<()> {
    validate_name(name)?;
    if !name.is_empty() && name != ROOT_NAME {
        for label in name.strip_suffix('.').unwrap_or(name).split('.') {
            buf.put_u8(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.put_u8(0);
    Ok(())
}

fn octet(input: &[u8]) -> ParseResult<'_, u8> {
    be_u8(input)
}

fn failure(err: DnsError) -> nom::Err<WireError> {
    nom::Err::Failure(WireError(err))
}

fn ascii_text(label: &[u8]) -> std::result::Result<String, nom::Err<WireError>> {
    if !label.is_ascii() {
        return Err(failure(DnsError::Format("non-ASCII label".into())));
    }
    Ok(String::from_utf8_lossy(label).into_owned())
}

// Reads labels starting at `input` (a suffix of `msg`) until the zero byte
// or a pointer. Each pointer must target an offset before both its own
// position and the previous pointer's target, so decoding always terminates.
fn read_labels<'a>(
    msg: &'a [u8],
    mut input: &'a [u8],
    limit: Option<usize>,
    labels: &mut Vec<String>,
) -> std::result::Result<&'a [u8], nom::Err<WireError>> {
    loop {
        let at = msg.len() - input.len();
        let (rest, len) = octet(input)?;
        match len {
            0 => return Ok(rest),
            l if l & POINTER_MASK == POINTER_MASK => {
                let (rest, low) = octet(rest)?;
                let offset = (((l & !POINTER_MASK) as usize) << 8) | low as usize;
                let bound = limit.map_or(at, |limit| limit.min(at));
                if offset >= bound {
                    return Err(failure(DnsError::BadPointer { offset, at }));
                }
                read_labels(msg, &msg[offset..], Some(offset), labels)?;
                return Ok(rest);
            }
            l if l & POINTER_MASK != 0 => {
                return Err(failure(DnsError::Format(format!(
                    "reserved label type {l:#04x} at offset {at}"
                ))));
            }
            l => {
                let (rest, label) = take::<usize, &[u8], WireError>(l as usize)(rest)?;
                if label.contains(&b'.') {
                    return Err(failure(DnsError::Format(format!(
                        "label at offset {at} contains a dot"
                    ))));
                }
                labels.push(ascii_text(label)?);
                input = rest;
            }
        }
    }
}

fn join_labels(labels: &[String]) -> String {
    if labels.is_empty() {
        ROOT_NAME.to_string()
    } else {
        let mut name = labels.join(".");
        name.push('.');
        name
    }
}

/// Name parser over the complete message `msg`, so compression pointers can
/// be followed back into earlier parts of it.
fn parse_name<'a>(msg: &'a [u8]) -> impl Fn(&'a [u8]) -> ParseResult<'a, String> {
    move |input: &'a [u8]| -> ParseResult<'a, String> {
        let mut labels = Vec::new();
        let rest = read_labels(msg, input, None, &mut labels)?;
        Ok((rest, join_labels(&labels)))
    }
}

/*
1  1  1  1  1  1
0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                                               |
/                     QNAME                     /
/                                               /
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     QTYPE                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: u16) -> Self {
        Question {
            name: name.into(),
            qtype,
        }
    }

    pub fn rr_type(&self) -> Option<RRType> {
        RRType::from_u16(self.qtype)
    }

    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<()> {
        put_name(buf, &self.name)?;
        buf.put_u16(self.qtype);
        Ok(())
    }

    fn parse<'a>(msg: &'a [u8]) -> impl Fn(&'a [u8]) -> ParseResult<'a, Question> {
        move |input: &'a [u8]| {
            map(tuple((parse_name(msg), be_u16)), |(name, qtype)| Question {
                name,
                qtype,
            })(input)
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, type_label(self.qtype))
    }
}

/*
0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                                               |
/                                               /
/                      NAME                     /
|                                               |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      TYPE                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                   RDLENGTH                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
/                     RDATA                     /
/                                               /
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
RDATA is carried as ASCII text: a dotted IPv4 literal for A, a domain name
for NS and CNAME.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub data: String,
}

impl Record {
    pub fn new(name: impl Into<String>, rtype: RRType, data: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            rtype: rtype as u16,
            data: data.into(),
        }
    }

    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<()> {
        let rdlength = u16::try_from(self.data.len()).map_err(|_| {
            DnsError::Format(format!("RDATA of {} bytes exceeds 65535", self.data.len()))
        })?;
        put_name(buf, &self.name)?;
        buf.put_u16(self.rtype);
        buf.put_u16(rdlength);
        buf.extend_from_slice(self.data.as_bytes());
        Ok(())
    }

    fn parse<'a>(msg: &'a [u8]) -> impl Fn(&'a [u8]) -> ParseResult<'a, Record> {
        move |input: &'a [u8]| -> ParseResult<'a, Record> {
            let (rest, (name, rtype, rdata)) =
                tuple((parse_name(msg), be_u16, length_data(be_u16)))(input)?;
            let data = ascii_text(rdata)?;
            Ok((rest, Record { name, rtype, data }))
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, type_label(self.rtype), self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl DnsMessage {
    pub fn new(header: Header) -> Self {
        DnsMessage {
            header,
            questions: vec![],
            answers: vec![],
            authority: vec![],
            additional: vec![],
        }
    }

    pub fn query(id: u16, question: Question) -> Self {
        DnsMessage {
            questions: vec![question],
            ..DnsMessage::new(Header::new(id, FLAG_QUERY))
        }
    }

    pub fn response(
        id: u16,
        question: Question,
        answers: Vec<Record>,
        authority: Vec<Record>,
        additional: Vec<Record>,
    ) -> Self {
        DnsMessage {
            header: Header::new(id, FLAG_RESPONSE),
            questions: vec![question],
            answers,
            authority,
            additional,
        }
    }

    /// Section counts are always taken from the section lengths, never from
    /// the stored header.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(512);

        Header {
            qdcount: section_count(self.questions.len())?,
            ancount: section_count(self.answers.len())?,
            nscount: section_count(self.authority.len())?,
            arcount: section_count(self.additional.len())?,
            ..self.header
        }
        .to_bytes(&mut buf);

        for q in self.questions.iter() {
            q.to_bytes(&mut buf)?;
        }

        for r in self
            .answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
        {
            r.to_bytes(&mut buf)?;
        }

        Ok(buf.freeze())
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < DNS_HDR_SIZE {
            return Err(DnsError::TooShort(buf.len()));
        }

        let (rest, header) = Header::parse(buf)?;

        let qd = header.qdcount as usize;
        let (rest, questions) = many_m_n(qd, qd, Question::parse(buf))(rest)?;

        let an = header.ancount as usize;
        let (rest, answers) = many_m_n(an, an, Record::parse(buf))(rest)?;

        let ns = header.nscount as usize;
        let (rest, authority) = many_m_n(ns, ns, Record::parse(buf))(rest)?;

        let ar = header.arcount as usize;
        let (_, additional) = many_m_n(ar, ar, Record::parse(buf))(rest)?;

        Ok(DnsMessage {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

fn section_count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| DnsError::Format(format!("{len} entries in one section")))
}

impl fmt::Display for DnsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID: {}", self.header.id)?;
        writeln!(f, "\nQUESTION SECTION:")?;
        for question in self.questions.iter() {
            writeln!(f, "{question}")?;
        }

        for (title, records) in [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authority),
            ("ADDITIONAL", &self.additional),
        ] {
            if records.is_empty() {
                continue;
            }
            writeln!(f, "\n{title} SECTION:")?;
            for record in records.iter() {
                writeln!(f, "{record}")?;
            }
        }

        Ok(())
    }
}
