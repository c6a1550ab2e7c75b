//! Minimal DNS codec for TXT lookups.
//!
//! Region discovery needs exactly one query type: the TXT record listing all
//! deployed regions. This module encodes that question and decodes the
//! answer section; it is not a general resolver. Answers follow RFC 1035:
//! names may use compression pointers, and a TXT RDATA is a sequence of
//! length-prefixed character strings which are concatenated per record.

/// DNS packet constants
pub const DNS_HEADER_SIZE: usize = 12;
pub const DNS_MAX_UDP_PACKET: usize = 512;

/// DNS record types / classes
pub const TYPE_TXT: u16 = 16;
const CLASS_IN: u16 = 1;

/// DNS flags
const FLAG_QR: u16 = 0x8000; // Query/Response
const FLAG_AA: u16 = 0x0400; // Authoritative Answer
const FLAG_TC: u16 = 0x0200; // Truncated
const FLAG_RD: u16 = 0x0100; // Recursion Desired
const RCODE_MASK: u16 = 0x000f;
const RCODE_NXDOMAIN: u8 = 3;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
/// Guards against pointer loops in malformed packets.
const MAX_POINTER_HOPS: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("invalid query name {0:?}")]
    InvalidName(String),
    #[error("packet truncated")]
    Truncated,
    #[error("invalid label in packet")]
    BadLabel,
    #[error("response id {got:#06x} does not match query id {want:#06x}")]
    IdMismatch { want: u16, got: u16 },
    #[error("packet is not a response")]
    NotAResponse,
    #[error("response truncated by server (TC bit set)")]
    ResponseTruncated,
    #[error("server returned rcode {0}")]
    Rcode(u8),
}

/// Encode a recursive TXT question for `name`.
pub fn encode_txt_query(id: u16, name: &str) -> Result<Vec<u8>, DnsError> {
    let mut packet = Vec::with_capacity(DNS_HEADER_SIZE + name.len() + 6);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&FLAG_RD.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    packet.extend_from_slice(&0u16.to_be_bytes()); // ancount
    packet.extend_from_slice(&0u16.to_be_bytes()); // nscount
    packet.extend_from_slice(&0u16.to_be_bytes()); // arcount
    encode_name(&mut packet, name)?;
    packet.extend_from_slice(&TYPE_TXT.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(packet)
}

/// Encode an authoritative TXT answer. Each record is a list of character
/// strings; strings longer than 255 bytes are split.
pub fn encode_txt_response(
    id: u16,
    name: &str,
    records: &[Vec<String>],
    ttl: u32,
) -> Result<Vec<u8>, DnsError> {
    let mut packet = Vec::with_capacity(DNS_MAX_UDP_PACKET);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&(FLAG_QR | FLAG_AA | FLAG_RD).to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&(records.len() as u16).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());

    let qname_offset = packet.len();
    encode_name(&mut packet, name)?;
    packet.extend_from_slice(&TYPE_TXT.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());

    let name_ptr = 0xC000 | (qname_offset as u16); // Compression pointer
    for strings in records {
        let mut rdata = Vec::new();
        for s in strings {
            let bytes = s.as_bytes();
            if bytes.is_empty() {
                rdata.push(0);
            }
            for piece in bytes.chunks(255) {
                rdata.push(piece.len() as u8);
                rdata.extend_from_slice(piece);
            }
        }
        packet.extend_from_slice(&name_ptr.to_be_bytes());
        packet.extend_from_slice(&TYPE_TXT.to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());
        packet.extend_from_slice(&ttl.to_be_bytes());
        packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        packet.extend_from_slice(&rdata);
    }
    Ok(packet)
}

/// Decode the TXT answers of a response to query `id`.
///
/// Returns one string per TXT record, in answer order, with the record's
/// character strings concatenated. NXDOMAIN decodes to no records.
pub fn decode_txt_response(id: u16, packet: &[u8]) -> Result<Vec<String>, DnsError> {
    if packet.len() < DNS_HEADER_SIZE {
        return Err(DnsError::Truncated);
    }

    let got = read_u16(packet, 0)?;
    if got != id {
        return Err(DnsError::IdMismatch { want: id, got });
    }
    let flags = read_u16(packet, 2)?;
    if flags & FLAG_QR == 0 {
        return Err(DnsError::NotAResponse);
    }
    if flags & FLAG_TC != 0 {
        return Err(DnsError::ResponseTruncated);
    }
    match (flags & RCODE_MASK) as u8 {
        0 => {}
        RCODE_NXDOMAIN => return Ok(Vec::new()),
        rcode => return Err(DnsError::Rcode(rcode)),
    }

    let qdcount = read_u16(packet, 4)?;
    let ancount = read_u16(packet, 6)?;

    let mut offset = DNS_HEADER_SIZE;
    for _ in 0..qdcount {
        offset = skip_name(packet, offset)?;
        offset += 4; // qtype + qclass
    }

    let mut records = Vec::new();
    for _ in 0..ancount {
        offset = skip_name(packet, offset)?;
        let rtype = read_u16(packet, offset)?;
        let rclass = read_u16(packet, offset + 2)?;
        let rdlength = read_u16(packet, offset + 8)? as usize;
        offset += 10;

        let rdata = packet
            .get(offset..offset + rdlength)
            .ok_or(DnsError::Truncated)?;
        offset += rdlength;

        if rtype == TYPE_TXT && rclass == CLASS_IN {
            records.push(decode_character_strings(rdata)?);
        }
    }
    Ok(records)
}

fn encode_name(packet: &mut Vec<u8>, name: &str) -> Result<(), DnsError> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DnsError::InvalidName(name.to_string()));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(DnsError::InvalidName(name.to_string()));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0); // End of name
    Ok(())
}

/// Offset just past the (possibly compressed) name starting at `offset`.
fn skip_name(packet: &[u8], mut offset: usize) -> Result<usize, DnsError> {
    for _ in 0..MAX_NAME_LEN {
        let len = *packet.get(offset).ok_or(DnsError::Truncated)? as usize;
        if len == 0 {
            return Ok(offset + 1);
        }
        if len & 0xC0 == 0xC0 {
            // A pointer ends the name in place; the target is irrelevant here.
            packet.get(offset + 1).ok_or(DnsError::Truncated)?;
            let target = ((len & 0x3F) << 8) | packet[offset + 1] as usize;
            check_pointer(packet, target)?;
            return Ok(offset + 2);
        }
        if len > MAX_LABEL_LEN {
            return Err(DnsError::BadLabel);
        }
        offset += 1 + len;
    }
    Err(DnsError::BadLabel)
}

/// Follow a compression pointer chain far enough to reject loops and
/// out-of-bounds targets.
fn check_pointer(packet: &[u8], mut target: usize) -> Result<(), DnsError> {
    for _ in 0..MAX_POINTER_HOPS {
        let mut offset = target;
        loop {
            let len = *packet.get(offset).ok_or(DnsError::Truncated)? as usize;
            if len == 0 {
                return Ok(());
            }
            if len & 0xC0 == 0xC0 {
                let low = *packet.get(offset + 1).ok_or(DnsError::Truncated)? as usize;
                target = ((len & 0x3F) << 8) | low;
                break;
            }
            if len > MAX_LABEL_LEN {
                return Err(DnsError::BadLabel);
            }
            offset += 1 + len;
        }
    }
    Err(DnsError::BadLabel)
}

fn decode_character_strings(rdata: &[u8]) -> Result<String, DnsError> {
    let mut out = Vec::with_capacity(rdata.len());
    let mut offset = 0;
    while offset < rdata.len() {
        let len = rdata[offset] as usize;
        let piece = rdata
            .get(offset + 1..offset + 1 + len)
            .ok_or(DnsError::Truncated)?;
        out.extend_from_slice(piece);
        offset += 1 + len;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn read_u16(packet: &[u8], offset: usize) -> Result<u16, DnsError> {
    packet
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DnsError::Truncated)
}
