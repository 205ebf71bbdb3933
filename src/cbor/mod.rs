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

//! Canonical CBOR encoding and decoding.
//!
//! The COSE protected header is serialized into the envelope and reused
//! verbatim to reconstruct the `Sig_structure` during verification, so the
//! encoder follows the deterministic rules of RFC 7049 §3.9: shortest-form
//! arguments, map keys sorted by the bytewise order of their encoded form,
//! and definite lengths only. The decoder is streaming and keeps the raw
//! header bytes of every item available for byte-exact recovery.

use thiserror::Error;

pub mod decode;
pub mod encode;
pub mod inspect;

pub use decode::{from_slice, Decoder};
pub use encode::to_vec;

/// CBOR major types.
pub(crate) const MAJOR_UNSIGNED: u8 = 0;
pub(crate) const MAJOR_NEGATIVE: u8 = 1;
pub(crate) const MAJOR_BYTES: u8 = 2;
pub(crate) const MAJOR_TEXT: u8 = 3;
pub(crate) const MAJOR_ARRAY: u8 = 4;
pub(crate) const MAJOR_MAP: u8 = 5;
pub(crate) const MAJOR_TAG: u8 = 6;
pub(crate) const MAJOR_SIMPLE: u8 = 7;

/// Additional-information values for the simple types this profile accepts.
pub(crate) const SIMPLE_FALSE: u64 = 20;
pub(crate) const SIMPLE_TRUE: u64 = 21;
pub(crate) const SIMPLE_NULL: u64 = 22;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CborError {
    #[error("unexpected end of CBOR input")]
    Truncated,

    #[error("malformed CBOR item: {0}")]
    Malformed(String),

    #[error("duplicate map key")]
    DuplicateKey,

    #[error("unsupported CBOR item: {0}")]
    Unsupported(String),
}

/// A CBOR data item.
///
/// Map entries keep their order of insertion; the encoder sorts them into
/// canonical order on output. Negative integers are stored as the `n` of
/// `-1 - n` exactly as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Neg(u64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tag(u64, Box<Value>),
    Bool(bool),
    Null,
}

impl Value {
    /// Build an integer value from a signed integer.
    pub fn int(v: i64) -> Value {
        if v < 0 {
            Value::Neg(!(v as u64))
        } else {
            Value::Int(v as u64)
        }
    }

    pub fn text(v: impl Into<String>) -> Value {
        Value::Text(v.into())
    }

    pub fn bytes(v: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(v.into())
    }

    /// The signed integer this value represents, if it is an integer that
    /// fits an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) if *n <= i64::MAX as u64 => Some(*n as i64),
            Value::Neg(n) if *n <= i64::MAX as u64 => Some(!(*n as i64)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::int(v)
    }
}
