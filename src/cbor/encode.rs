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

//! The canonical CBOR encoder.

use super::{
    CborError, Value, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_SIMPLE,
    MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE,
};

/// Deterministically encode a value.
///
/// Two invocations on the same value produce byte-identical output, and map
/// entries may be supplied in any order. Duplicate map keys are a fatal
/// encode error.
pub fn to_vec(value: &Value) -> Result<Vec<u8>, CborError> {
    let mut out = Vec::new();
    encode_value(value, &mut out)?;
    Ok(out)
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CborError> {
    match value {
        Value::Int(n) => write_head(MAJOR_UNSIGNED, *n, out),
        Value::Neg(n) => write_head(MAJOR_NEGATIVE, *n, out),
        Value::Bytes(b) => {
            write_head(MAJOR_BYTES, b.len() as u64, out);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_head(MAJOR_TEXT, s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_head(MAJOR_ARRAY, items.len() as u64, out);
            for item in items {
                encode_value(item, out)?;
            }
        }
        Value::Map(entries) => encode_map(entries, out)?,
        Value::Tag(tag, content) => {
            write_head(MAJOR_TAG, *tag, out);
            encode_value(content, out)?;
        }
        Value::Bool(false) => write_head(MAJOR_SIMPLE, SIMPLE_FALSE, out),
        Value::Bool(true) => write_head(MAJOR_SIMPLE, SIMPLE_TRUE, out),
        Value::Null => write_head(MAJOR_SIMPLE, SIMPLE_NULL, out),
    }
    Ok(())
}

fn encode_map(entries: &[(Value, Value)], out: &mut Vec<u8>) -> Result<(), CborError> {
    // Keys are compared by the bytewise lexicographic order of their
    // encoded form, so each key is encoded before sorting.
    let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        encoded.push((to_vec(key)?, to_vec(value)?));
    }
    encoded.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in encoded.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(CborError::DuplicateKey);
        }
    }

    write_head(MAJOR_MAP, entries.len() as u64, out);
    for (key, value) in encoded {
        out.extend_from_slice(&key);
        out.extend_from_slice(&value);
    }
    Ok(())
}

/// Write an item head with the shortest argument encoding.
fn write_head(major: u8, arg: u64, out: &mut Vec<u8>) {
    let major = major << 5;
    if arg < 24 {
        out.push(major | arg as u8);
    } else if arg <= u8::MAX as u64 {
        out.push(major | 24);
        out.push(arg as u8);
    } else if arg <= u16::MAX as u64 {
        out.push(major | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u32::MAX as u64 {
        out.push(major | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}
