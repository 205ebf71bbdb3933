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

//! COSE_Sign1 envelopes for artifact signatures.

use crate::cbor::{self, Value};
use crate::errors::{CoseError, Result};

pub mod algorithm;
pub mod sign;
pub mod verify;

pub use algorithm::{recommended_algorithm, Algorithm, AlgorithmResolver};
pub use sign::{SignOptions, Signer};
pub use verify::{Verifier, VerifierBuilder};

/// CBOR tag of a COSE_Sign1 message (RFC 8152 §4.2).
pub const TAG_COSE_SIGN1: u64 = 18;

/// Protected header labels.
pub(crate) const LABEL_ALG: i64 = 1;
pub(crate) const LABEL_CRIT: i64 = 2;
pub(crate) const LABEL_CONTENT_TYPE: i64 = 3;
pub(crate) const LABEL_IAT: &str = "iat";
pub(crate) const LABEL_EXP: &str = "exp";
pub(crate) const LABEL_SIGNING_TIME: &str = "signingtime";

/// Unprotected header labels.
pub(crate) const LABEL_X5CHAIN: i64 = 33;
pub(crate) const LABEL_TIMESTAMP: &str = "timestamp";

const SIG_STRUCTURE_CONTEXT: &str = "Signature1";

/// The signature-covered header map.
///
/// The encoded bytes are kept verbatim next to the decoded entries: the
/// envelope carries the protected header as a byte string, and the same
/// bytes must flow into the `Sig_structure` on both sides. The verifier
/// never re-serializes the parsed map.
#[derive(Debug, Clone)]
pub struct ProtectedHeader {
    raw: Vec<u8>,
    entries: Vec<(Value, Value)>,
}

impl ProtectedHeader {
    /// Build a header from map entries, fixing its canonical encoding.
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Result<Self> {
        let raw = cbor::to_vec(&Value::Map(entries.clone()))?;
        Ok(ProtectedHeader { raw, entries })
    }

    /// Parse a header from its encoded form, retaining the original bytes.
    pub fn from_raw(raw: Vec<u8>) -> Result<Self> {
        let value = cbor::from_slice(&raw)?;
        let Value::Map(entries) = value else {
            return Err(CoseError::MalformedEnvelope(
                "protected header is not a map".into(),
            ));
        };
        Ok(ProtectedHeader { raw, entries })
    }

    /// The exact bytes carried in the envelope.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn get(&self, label: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == label)
            .map(|(_, value)| value)
    }

    /// The `alg` header as its raw integer identifier.
    pub fn algorithm_value(&self) -> Result<i64> {
        let value = self
            .get(&Value::int(LABEL_ALG))
            .ok_or(CoseError::MissingHeader("alg header"))?;
        value.as_i64().ok_or(CoseError::InvalidHeader("alg header"))
    }

    /// The `crit` header labels.
    pub fn critical_labels(&self) -> Result<&[Value]> {
        let value = self
            .get(&Value::int(LABEL_CRIT))
            .ok_or(CoseError::MissingHeader("crit header"))?;
        value
            .as_array()
            .ok_or(CoseError::InvalidHeader("crit header"))
    }

    /// The payload content type.
    pub fn content_type(&self) -> Result<&str> {
        let value = self
            .get(&Value::int(LABEL_CONTENT_TYPE))
            .ok_or(CoseError::MissingHeader("content type header"))?;
        value
            .as_text()
            .ok_or(CoseError::InvalidHeader("content type header"))
    }

    /// Signing time in seconds since the Unix epoch. Emitted as `iat`;
    /// `signingtime` is accepted as an alias from older signers.
    pub fn signing_time(&self) -> Result<i64> {
        let value = self
            .get(&Value::text(LABEL_IAT))
            .or_else(|| self.get(&Value::text(LABEL_SIGNING_TIME)))
            .ok_or(CoseError::MissingHeader("iat header"))?;
        epoch_seconds(value).ok_or(CoseError::InvalidHeader("iat header"))
    }

    /// Expiry in seconds since the Unix epoch, if set.
    pub fn expiry(&self) -> Result<Option<i64>> {
        match self.get(&Value::text(LABEL_EXP)) {
            None => Ok(None),
            Some(value) => epoch_seconds(value)
                .map(Some)
                .ok_or(CoseError::InvalidHeader("exp header")),
        }
    }
}

/// Epoch seconds from either a bare integer or a tag-1 datetime.
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Tag(1, content) => content.as_i64(),
        other => other.as_i64(),
    }
}

/// The header map carried alongside the signature but not covered by it.
#[derive(Debug, Clone, Default)]
pub struct UnprotectedHeader {
    entries: Vec<(Value, Value)>,
}

impl UnprotectedHeader {
    fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(CoseError::MalformedEnvelope(
                "unprotected header is not a map".into(),
            ));
        };
        Ok(UnprotectedHeader { entries })
    }

    fn get(&self, label: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == label)
            .map(|(_, value)| value)
    }

    /// The DER-encoded certificate chain from `x5chain`, leaf first. A
    /// single certificate is carried as one byte string, a longer chain as
    /// an array of byte strings.
    pub fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let value = self
            .get(&Value::int(LABEL_X5CHAIN))
            .ok_or(CoseError::MissingCertChain)?;
        match value {
            Value::Bytes(der) => Ok(vec![der.clone()]),
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(CoseError::MissingCertChain);
                }
                items
                    .iter()
                    .map(|item| {
                        item.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
                            CoseError::MalformedEnvelope(
                                "certificate chain entry is not a byte string".into(),
                            )
                        })
                    })
                    .collect()
            }
            _ => Err(CoseError::MalformedEnvelope(
                "invalid certificate chain header".into(),
            )),
        }
    }

    pub fn set_certificate_chain(&mut self, chain: &[Vec<u8>]) {
        let value = if chain.len() == 1 {
            Value::bytes(chain[0].clone())
        } else {
            Value::Array(chain.iter().map(|der| Value::bytes(der.clone())).collect())
        };
        self.entries.push((Value::int(LABEL_X5CHAIN), value));
    }

    /// The RFC 3161 timestamp token, if one was attached.
    pub fn timestamp_token(&self) -> Option<&[u8]> {
        self.get(&Value::text(LABEL_TIMESTAMP))
            .and_then(Value::as_bytes)
    }

    pub fn set_timestamp_token(&mut self, token: Vec<u8>) {
        self.entries
            .push((Value::text(LABEL_TIMESTAMP), Value::Bytes(token)));
    }
}

/// A parsed COSE_Sign1 message.
#[derive(Debug, Clone)]
pub struct Sign1Message {
    pub protected: ProtectedHeader,
    pub unprotected: UnprotectedHeader,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Sign1Message {
    /// Serialize as a tagged four-element array.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let envelope = Value::Tag(
            TAG_COSE_SIGN1,
            Box::new(Value::Array(vec![
                Value::bytes(self.protected.raw.clone()),
                Value::Map(self.unprotected.entries.clone()),
                Value::bytes(self.payload.clone()),
                Value::bytes(self.signature.clone()),
            ])),
        );
        Ok(cbor::to_vec(&envelope)?)
    }

    /// Parse a tagged four-element array.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let value = cbor::from_slice(data)?;
        let content = match value {
            Value::Tag(TAG_COSE_SIGN1, content) => *content,
            _ => {
                return Err(CoseError::MalformedEnvelope(
                    "not a tagged COSE_Sign1 message".into(),
                ))
            }
        };
        let Value::Array(mut items) = content else {
            return Err(CoseError::MalformedEnvelope(
                "COSE_Sign1 content is not an array".into(),
            ));
        };
        if items.len() != 4 {
            return Err(CoseError::MalformedEnvelope(format!(
                "COSE_Sign1 array has {} elements, want 4",
                items.len()
            )));
        }
        let signature = items.pop().expect("length checked");
        let payload = items.pop().expect("length checked");
        let unprotected = items.pop().expect("length checked");
        let protected = items.pop().expect("length checked");

        let Value::Bytes(protected_raw) = protected else {
            return Err(CoseError::MalformedEnvelope(
                "protected header is not a byte string".into(),
            ));
        };
        let Value::Bytes(payload) = payload else {
            return Err(CoseError::MalformedEnvelope(
                "payload is not a byte string".into(),
            ));
        };
        let Value::Bytes(signature) = signature else {
            return Err(CoseError::MalformedEnvelope(
                "signature is not a byte string".into(),
            ));
        };

        Ok(Sign1Message {
            protected: ProtectedHeader::from_raw(protected_raw)?,
            unprotected: UnprotectedHeader::from_value(unprotected)?,
            payload,
            signature,
        })
    }

    /// The canonical `Sig_structure` covered by the signature:
    /// `["Signature1", protected, external_aad, payload]` with an empty
    /// `external_aad` for this profile.
    pub fn signature_input(protected_raw: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let structure = Value::Array(vec![
            Value::text(SIG_STRUCTURE_CONTEXT),
            Value::bytes(protected_raw.to_vec()),
            Value::bytes(Vec::new()),
            Value::bytes(payload.to_vec()),
        ]);
        Ok(cbor::to_vec(&structure)?)
    }
}
