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

//! The streaming CBOR decoder.

use std::collections::BTreeSet;

use super::{
    encode, CborError, Value, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_SIMPLE,
    MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE,
};

/// Nesting bound; a valid envelope is a handful of levels deep.
const MAX_DEPTH: usize = 128;

/// Decode a single item and require the whole input to be consumed.
pub fn from_slice(buf: &[u8]) -> Result<Value, CborError> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.decode_value()?;
    if !decoder.is_empty() {
        return Err(CborError::Malformed("trailing bytes after item".into()));
    }
    Ok(value)
}

/// A cursor over a CBOR byte stream.
///
/// Item heads are surfaced as `(major type, argument, raw head bytes)` so
/// callers that need byte-exact slices (the protected header, the signature
/// input) can recover them without re-encoding.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read the head of the next item: major type, argument, and the raw
    /// head bytes as they appear on the wire.
    pub fn read_head(&mut self) -> Result<(u8, u64, &'a [u8]), CborError> {
        let start = self.pos;
        let initial = self.read_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;
        let arg = match info {
            0..=23 => info as u64,
            24 => self.read_byte()? as u64,
            25 => u16::from_be_bytes(self.read_array::<2>()?) as u64,
            26 => u32::from_be_bytes(self.read_array::<4>()?) as u64,
            27 => u64::from_be_bytes(self.read_array::<8>()?),
            31 => {
                return Err(CborError::Malformed(
                    "indefinite-length items are not permitted".into(),
                ))
            }
            _ => {
                return Err(CborError::Malformed(format!(
                    "invalid count encoding: {info}"
                )))
            }
        };
        Ok((major, arg, &self.buf[start..self.pos]))
    }

    /// Decode the next complete item.
    pub fn decode_value(&mut self) -> Result<Value, CborError> {
        self.decode_at_depth(0)
    }

    fn decode_at_depth(&mut self, depth: usize) -> Result<Value, CborError> {
        if depth > MAX_DEPTH {
            return Err(CborError::Malformed("nesting too deep".into()));
        }
        let (major, arg, _) = self.read_head()?;
        match major {
            MAJOR_UNSIGNED => Ok(Value::Int(arg)),
            MAJOR_NEGATIVE => Ok(Value::Neg(arg)),
            MAJOR_BYTES => Ok(Value::Bytes(self.read_slice(arg)?.to_vec())),
            MAJOR_TEXT => {
                let raw = self.read_slice(arg)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|e| CborError::Malformed(format!("invalid UTF-8 text: {e}")))?;
                Ok(Value::Text(text.to_string()))
            }
            MAJOR_ARRAY => {
                let mut items = Vec::with_capacity(usize::try_from(arg).unwrap_or(0).min(1024));
                for _ in 0..arg {
                    items.push(self.decode_at_depth(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            MAJOR_MAP => {
                let mut entries = Vec::with_capacity(usize::try_from(arg).unwrap_or(0).min(1024));
                let mut seen = BTreeSet::new();
                for _ in 0..arg {
                    let key = self.decode_at_depth(depth + 1)?;
                    if !seen.insert(encode::to_vec(&key)?) {
                        return Err(CborError::DuplicateKey);
                    }
                    let value = self.decode_at_depth(depth + 1)?;
                    entries.push((key, value));
                }
                Ok(Value::Map(entries))
            }
            MAJOR_TAG => {
                let content = self.decode_at_depth(depth + 1)?;
                Ok(Value::Tag(arg, Box::new(content)))
            }
            MAJOR_SIMPLE => match arg {
                SIMPLE_FALSE => Ok(Value::Bool(false)),
                SIMPLE_TRUE => Ok(Value::Bool(true)),
                SIMPLE_NULL => Ok(Value::Null),
                other => Err(CborError::Unsupported(format!("simple value {other}"))),
            },
            other => Err(CborError::Unsupported(format!("major type {other}"))),
        }
    }

    fn read_byte(&mut self) -> Result<u8, CborError> {
        let byte = *self.buf.get(self.pos).ok_or(CborError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CborError> {
        let raw = self.read_slice(N as u64)?;
        Ok(raw.try_into().expect("slice length checked"))
    }

    fn read_slice(&mut self, len: u64) -> Result<&'a [u8], CborError> {
        let len = usize::try_from(len).map_err(|_| CborError::Truncated)?;
        let end = self.pos.checked_add(len).ok_or(CborError::Truncated)?;
        if end > self.buf.len() {
            return Err(CborError::Truncated);
        }
        let raw = &self.buf[self.pos..end];
        self.pos = end;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_input() {
        assert_eq!(from_slice(&[0x18]), Err(CborError::Truncated));
        assert_eq!(from_slice(&[0x44, 0x01]), Err(CborError::Truncated));
        assert_eq!(from_slice(&[0x82, 0x01]), Err(CborError::Truncated));
    }

    #[test]
    fn indefinite_length_is_malformed() {
        assert!(matches!(
            from_slice(&[0x5f, 0x41, 0x01, 0xff]),
            Err(CborError::Malformed(_))
        ));
        assert!(matches!(
            from_slice(&[0x9f, 0xff]),
            Err(CborError::Malformed(_))
        ));
    }

    #[test]
    fn reserved_count_encoding_is_malformed() {
        // Additional information 28 is reserved.
        assert!(matches!(
            from_slice(&[0x1c]),
            Err(CborError::Malformed(_))
        ));
    }

    #[test]
    fn floats_are_unsupported() {
        assert!(matches!(
            from_slice(&[0xfb, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(CborError::Unsupported(_))
        ));
    }

    #[test]
    fn duplicate_map_keys_are_rejected() {
        // {1: 2, 1: 3}
        assert_eq!(
            from_slice(&[0xa2, 0x01, 0x02, 0x01, 0x03]),
            Err(CborError::DuplicateKey)
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            from_slice(&[0x01, 0x02]),
            Err(CborError::Malformed(_))
        ));
    }

    #[test]
    fn simple_values_inside_headers() {
        assert_eq!(from_slice(&[0xf4]).unwrap(), Value::Bool(false));
        assert_eq!(from_slice(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(from_slice(&[0xf6]).unwrap(), Value::Null);
    }

    #[test]
    fn raw_head_bytes_are_preserved() {
        let mut decoder = Decoder::new(&[0x58, 0x02, 0xab, 0xcd]);
        let (major, arg, raw) = decoder.read_head().unwrap();
        assert_eq!(major, MAJOR_BYTES);
        assert_eq!(arg, 2);
        assert_eq!(raw, &[0x58, 0x02]);
    }
}
