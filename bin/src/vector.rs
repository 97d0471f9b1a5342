//! Copyright (c) 2025-2026 Magsel, Inc.
//!
//! This file is part of Magsel
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU Affero General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU Affero General Public License for more details.
//!
//! You should have received a copy of the GNU Affero General Public License
//! along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

/// one expected flow to bucket mapping
#[derive(Debug)]
pub struct FlowEntry {
    /// source address in wire byte order
    pub sip: u32,
    /// source port in wire byte order
    pub sport: u16,
    /// destination address in wire byte order
    pub dip: u32,
    /// destination port in wire byte order
    pub dport: u16,
    pub protocol: u8,
    /// expected flow key hash, if recorded
    pub hash: Option<u32>,
    /// expected bucket id, if recorded
    pub bucket: Option<u32>,
}

/// a parsed test vector file
#[derive(Debug, Default)]
pub struct TestVector {
    pub table_index: u32,
    pub group: u32,
    pub buckets: u32,
    pub bucket_weight: u32,
    pub flows: Vec<FlowEntry>,
}

fn invalid(line: &str, what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{what} in vector line: {line}"),
    )
}

/// dotted quad to its wire byte order value
fn parse_ip(line: &str, field: &str) -> io::Result<u32> {
    let mut quad = [0u8; 4];
    let mut octets = field.split('.');
    for byte in quad.iter_mut() {
        *byte = octets
            .next()
            .and_then(|octet| octet.parse().ok())
            .ok_or_else(|| invalid(line, "bad address"))?;
    }
    if octets.next().is_some() {
        return Err(invalid(line, "bad address"));
    }
    Ok(u32::from_le_bytes(quad))
}

fn parse_hex(line: &str, field: &str) -> io::Result<u32> {
    let digits = field.strip_prefix("0x").unwrap_or(field);
    u32::from_str_radix(digits, 16).map_err(|_| invalid(line, "bad hash"))
}

/// parse one flow line
/// sip sport dip dport [protocol [hash [bucket]]]
fn parse_flow(line: &str, fields: &[&str]) -> io::Result<FlowEntry> {
    if fields.len() < 4 {
        return Err(invalid(line, "too few fields"));
    }
    let port = |field: &str| -> io::Result<u16> {
        field
            .parse::<u16>()
            .map(u16::swap_bytes)
            .map_err(|_| invalid(line, "bad port"))
    };
    Ok(FlowEntry {
        sip: parse_ip(line, fields[0])?,
        sport: port(fields[1])?,
        dip: parse_ip(line, fields[2])?,
        dport: port(fields[3])?,
        protocol: match fields.get(4) {
            Some(field) => field.parse().map_err(|_| invalid(line, "bad protocol"))?,
            // tcp unless the vector says otherwise
            None => 6,
        },
        hash: match fields.get(5) {
            Some(field) => Some(parse_hex(line, field)?),
            None => None,
        },
        bucket: match fields.get(6) {
            Some(field) => Some(field.parse().map_err(|_| invalid(line, "bad bucket"))?),
            None => None,
        },
    })
}

/// load a test vector file
///
/// header lines are `key value` pairs, `#` starts a comment, every
/// line starting with a digit is a flow entry
pub fn load(path: &Path) -> io::Result<TestVector> {
    info!("load hash entries from {}", path.display());
    let text = fs::read_to_string(path)?;
    let mut vector = TestVector::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ' ' || c == ':' || c == '\t')
            .filter(|field| !field.is_empty())
            .collect();
        let value = fields.get(1).copied().unwrap_or("");
        match fields[0] {
            "maglev_hash_table_size_index" => {
                vector.table_index =
                    value.parse().map_err(|_| invalid(line, "bad index"))?;
            }
            "maglev_id" => {
                vector.group = value.parse().map_err(|_| invalid(line, "bad id"))?;
            }
            "num_buckets" => {
                vector.buckets = value.parse().map_err(|_| invalid(line, "bad count"))?;
            }
            "bucket_weight" => {
                vector.bucket_weight =
                    value.parse().map_err(|_| invalid(line, "bad weight"))?;
            }
            // informational only
            "maglev_hash2" => {}
            first if first.starts_with(|c: char| c.is_ascii_digit()) => {
                vector.flows.push(parse_flow(line, &fields)?);
            }
            _ => {
                warn!("unknown data: {line}");
            }
        }
    }
    info!("hash entries to be verified: {}", vector.flows.len());
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_byte_order() {
        assert_eq!(parse_ip("", "172.20.88.194").unwrap(), 0xc258_14ac);
        assert_eq!(parse_ip("", "172.20.234.26").unwrap(), 0x1aea_14ac);
        assert!(parse_ip("", "172.20.88").is_err());
        assert!(parse_ip("", "172.20.88.194.1").is_err());
    }

    #[test]
    fn flow_line_with_expectations() {
        let line = "172.20.88.194 52794 172.20.234.26 80 6 0x5271e49c 5";
        let fields: Vec<&str> = line.split(' ').collect();
        let entry = parse_flow(line, &fields).unwrap();
        assert_eq!(entry.sport, 0x3ace);
        assert_eq!(entry.dport, 0x5000);
        assert_eq!(entry.protocol, 6);
        assert_eq!(entry.hash, Some(0x5271_e49c));
        assert_eq!(entry.bucket, Some(5));
    }
}
