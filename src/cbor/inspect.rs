//
// Copyright 2022 The Notation COSE Plugin Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Streaming CBOR pretty-printer.
//!
//! Each item is printed as an indented line carrying the raw head bytes in
//! hex followed by a description. Tag 1 content is rendered as an RFC 3339
//! datetime and tag 18 as a labeled COSE_Sign1 structure.

use std::io::{Read, Write};

use chrono::{DateTime, SecondsFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid count: {0}")]
    InvalidCount(u8),

    #[error("major type {0} is not supported")]
    UnsupportedMajorType(u8),

    #[error("invalid COSE_Sign1 object")]
    InvalidCoseSign1,

    #[error("invalid protected header")]
    InvalidProtectedHeader,

    #[error("datetime type {0} not supported")]
    UnsupportedDatetime(u8),

    #[error("datetime value {0} out of range")]
    DatetimeOutOfRange(u64),
}

/// Pretty-print one CBOR item read from `input` onto `output`.
pub fn dump<R: Read, W: Write>(input: &mut R, output: &mut W) -> Result<(), InspectError> {
    print_item(input, output, 0, 0, "")
}

fn print_item<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    indent: usize,
    width: usize,
    prefix: &str,
) -> Result<(), InspectError> {
    let (major, count, head) = read_head(input)?;
    match major {
        0 | 1 => {
            let n = if major == 1 {
                -1 - count as i64
            } else {
                count as i64
            };
            write_line(output, indent, &head, width, &format!("{prefix}Integer: {n}"))?;
        }
        2 => {
            let desc = format!("{prefix}Binary string: {count} bytes");
            write_line(output, indent, &head, width, &desc)?;
            print_string_body(input, output, indent + 1, count)?;
        }
        3 => {
            let desc = format!("{prefix}UTF-8 text: {count} bytes");
            write_line(output, indent, &head, width, &desc)?;
            print_string_body(input, output, indent + 1, count)?;
        }
        4 => {
            let desc = format!("{prefix}Array of length {count}");
            write_line(output, indent, &head, width, &desc)?;
            for _ in 0..count {
                print_item(input, output, indent + 1, 0, "")?;
            }
        }
        5 => {
            let desc = format!("{prefix}Map of size {count}");
            write_line(output, indent, &head, 0, &desc)?;
            for _ in 0..count {
                print_item(input, output, indent + 1, 3, "Key:   ")?;
                print_item(input, output, indent + 1, 3, "Value: ")?;
            }
        }
        6 => print_tag(input, output, indent, &head, count, prefix)?,
        other => return Err(InspectError::UnsupportedMajorType(other)),
    }
    Ok(())
}

fn print_tag<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    indent: usize,
    head: &[u8],
    tag: u64,
    prefix: &str,
) -> Result<(), InspectError> {
    let desc = format!("{prefix}Tag {tag}");
    match tag {
        1 => {
            write_line(output, indent, head, 0, &format!("{desc}: datetime"))?;
            print_datetime(input, output, indent)
        }
        18 => {
            write_line(output, indent, head, 0, &format!("{desc}: cose-sign1"))?;
            print_cose_sign1(input, output, indent)
        }
        _ => {
            write_line(output, indent, head, 0, &desc)?;
            print_item(input, output, indent, 0, "")
        }
    }
}

fn print_cose_sign1<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    indent: usize,
) -> Result<(), InspectError> {
    let (_, _, head) = read_head(input)?;
    if head != [0x84] {
        return Err(InspectError::InvalidCoseSign1);
    }
    write_line(output, indent, &head, 0, "COSE_Sign1 object: Array of length 4")?;
    let indent = indent + 1;

    // The protected header is a byte string whose content is itself CBOR;
    // descend into it instead of hex-dumping.
    let (major, count, head) = read_head(input)?;
    if major != 2 {
        return Err(InspectError::InvalidProtectedHeader);
    }
    let desc = format!("protected: Binary string: {count} bytes");
    write_line(output, indent, &head, 0, &desc)?;
    print_item(input, output, indent + 1, 0, "")?;

    print_item(input, output, indent, 0, "unprotected: ")?;
    print_item(input, output, indent, 0, "payload: ")?;
    print_item(input, output, indent, 0, "signature: ")?;
    Ok(())
}

fn print_datetime<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    indent: usize,
) -> Result<(), InspectError> {
    let (major, count, head) = read_head(input)?;
    if major != 0 {
        return Err(InspectError::UnsupportedDatetime(major));
    }
    let t = DateTime::from_timestamp(count as i64, 0)
        .ok_or(InspectError::DatetimeOutOfRange(count))?;
    let desc = format!(
        "UNIX epoch: {count} -> {}",
        t.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    write_line(output, indent, &head, 0, &desc)?;
    Ok(())
}

/// Hex dump, 16 bytes per line, with a printable-ASCII gutter.
fn print_string_body<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    indent: usize,
    mut count: u64,
) -> Result<(), InspectError> {
    let mut buf = [0u8; 16];
    while count > 0 {
        let n = count.min(16) as usize;
        let line = &mut buf[..n];
        input.read_exact(line)?;
        let gutter: String = line
            .iter()
            .map(|&c| if (0x20..0x7f).contains(&c) { c as char } else { '.' })
            .collect();
        write_line(output, indent, line, 16, &gutter)?;
        count -= n as u64;
    }
    Ok(())
}

fn read_head<R: Read>(input: &mut R) -> Result<(u8, u64, Vec<u8>), InspectError> {
    let mut head = Vec::with_capacity(9);
    let mut initial = [0u8; 1];
    input.read_exact(&mut initial)?;
    head.extend_from_slice(&initial);

    let major = initial[0] >> 5;
    let info = initial[0] & 0x1f;
    if info > 27 {
        return Err(InspectError::InvalidCount(info));
    }
    let count = match info {
        24 => {
            let mut raw = [0u8; 1];
            input.read_exact(&mut raw)?;
            head.extend_from_slice(&raw);
            raw[0] as u64
        }
        25 => {
            let mut raw = [0u8; 2];
            input.read_exact(&mut raw)?;
            head.extend_from_slice(&raw);
            u16::from_be_bytes(raw) as u64
        }
        26 => {
            let mut raw = [0u8; 4];
            input.read_exact(&mut raw)?;
            head.extend_from_slice(&raw);
            u32::from_be_bytes(raw) as u64
        }
        27 => {
            let mut raw = [0u8; 8];
            input.read_exact(&mut raw)?;
            head.extend_from_slice(&raw);
            u64::from_be_bytes(raw)
        }
        n => n as u64,
    };
    Ok((major, count, head))
}

fn write_line<W: Write>(
    output: &mut W,
    indent: usize,
    content: &[u8],
    width: usize,
    description: &str,
) -> Result<(), InspectError> {
    for _ in 0..indent {
        write!(output, "   ")?;
    }
    for byte in content {
        write!(output, "{byte:02x} ")?;
    }
    for _ in content.len()..width {
        write!(output, "   ")?;
    }
    writeln!(output, "-- {description}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump_to_string(input: &[u8]) -> String {
        let mut out = Vec::new();
        dump(&mut &input[..], &mut out).expect("dump failed");
        String::from_utf8(out).expect("non UTF-8 output")
    }

    #[test]
    fn integers_and_arrays() {
        // [1, -7]
        let out = dump_to_string(&[0x82, 0x01, 0x26]);
        assert_eq!(
            out,
            "82 -- Array of length 2\n   01 -- Integer: 1\n   26 -- Integer: -7\n"
        );
    }

    #[test]
    fn text_with_gutter() {
        // "iat" followed by a non-printable byte would show as a dot; plain
        // text shows verbatim.
        let out = dump_to_string(&[0x63, b'i', b'a', b't']);
        assert!(out.starts_with("63 -- UTF-8 text: 3 bytes\n"));
        assert!(out.contains("69 61 74"));
        assert!(out.trim_end().ends_with("-- iat"));
    }

    #[test]
    fn tag_1_renders_rfc3339() {
        // Tag 1 over 1577880000 (2020-01-01T12:00:00Z)
        let out = dump_to_string(&[0xc1, 0x1a, 0x5e, 0x0c, 0x4d, 0xc0]);
        assert!(out.contains("Tag 1: datetime"));
        assert!(out.contains("UNIX epoch: 1577880000 -> 2020-01-01T12:00:00Z"));
    }

    #[test]
    fn map_key_value_prefixes() {
        // {1: -7}
        let out = dump_to_string(&[0xa1, 0x01, 0x26]);
        assert!(out.contains("a1 -- Map of size 1"));
        assert!(out.contains("Key:   Integer: 1"));
        assert!(out.contains("Value: Integer: -7"));
    }

    #[test]
    fn unsupported_major_type() {
        assert!(matches!(
            dump(&mut &[0xf6][..], &mut Vec::new()),
            Err(InspectError::UnsupportedMajorType(7))
        ));
    }
}
