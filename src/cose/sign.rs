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

//! Signing descriptors into COSE_Sign1 envelopes.

use chrono::{DateTime, Utc};
use x509_cert::der::Encode;
use x509_cert::Certificate;

use crate::cbor::Value;
use crate::cose::{
    recommended_algorithm, Algorithm, ProtectedHeader, Sign1Message, UnprotectedHeader, LABEL_ALG,
    LABEL_CONTENT_TYPE, LABEL_CRIT, LABEL_EXP, LABEL_IAT,
};
use crate::crypto::timestamp::{timestamp_signature, Timestamper, TimestampError};
use crate::crypto::{CertificatePool, PublicKey, SigningKey};
use crate::descriptor::{Descriptor, MEDIA_TYPE_NOTATION_PAYLOAD};
use crate::errors::{CoseError, Result};

/// Per-call signing options.
#[derive(Default)]
pub struct SignOptions<'a> {
    /// Expiry of the produced signature; must lie after the signing time.
    pub expiry: Option<DateTime<Utc>>,

    /// Time-Stamping Authority to cover the signature. A TSA failure aborts
    /// the sign call.
    pub tsa: Option<&'a dyn Timestamper>,

    /// Roots to validate the TSA signer chain against.
    pub tsa_roots: Option<&'a CertificatePool>,

    /// Deadline for the TSA exchange; on expiry the call fails with a
    /// canceled timestamp error.
    pub tsa_deadline: Option<std::time::Duration>,
}

/// Signs artifact descriptors and produces COSE signature envelopes.
pub struct Signer {
    key: SigningKey,
    algorithm: Algorithm,
    cert_chain: Vec<Vec<u8>>,
}

impl Signer {
    /// Create a signer with the recommended algorithm for the key, bundled
    /// with its certificate chain (leaf first).
    pub fn new(key: SigningKey, cert_chain: &[Certificate]) -> Result<Self> {
        let algorithm = recommended_algorithm(&key.public_key())?;
        Self::with_algorithm(algorithm, key, cert_chain)
    }

    /// Create a signer with an explicit algorithm.
    pub fn with_algorithm(
        algorithm: Algorithm,
        key: SigningKey,
        cert_chain: &[Certificate],
    ) -> Result<Self> {
        if cert_chain.is_empty() {
            return Err(CoseError::MissingCertChain);
        }
        let leaf_key = PublicKey::from_certificate(&cert_chain[0])?;
        if leaf_key != key.public_key() {
            return Err(CoseError::CertChainInvalid(
                "leaf certificate does not match the signing key".into(),
            ));
        }
        let cert_chain = cert_chain
            .iter()
            .map(|cert| Ok(cert.to_der()?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Signer {
            key,
            algorithm,
            cert_chain,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign the artifact described by `descriptor` and return the envelope.
    ///
    /// The payload is the canonical JSON serialization of the descriptor.
    /// When a TSA is configured, the acquired token covers the exact
    /// signature bytes emitted in the envelope.
    pub async fn sign(&self, descriptor: &Descriptor, options: SignOptions<'_>) -> Result<Vec<u8>> {
        let payload =
            serde_json::to_vec(descriptor).map_err(|e| CoseError::Encoding(e.to_string()))?;

        let iat = Utc::now().timestamp();
        if let Some(expiry) = options.expiry {
            if expiry.timestamp() <= iat {
                return Err(CoseError::InvalidOptions(
                    "expiry is not after the signing time".into(),
                ));
            }
        }

        let mut entries = vec![
            (Value::int(LABEL_ALG), Value::int(self.algorithm.value())),
            (
                Value::int(LABEL_CRIT),
                Value::Array(vec![Value::int(LABEL_CONTENT_TYPE)]),
            ),
            (
                Value::int(LABEL_CONTENT_TYPE),
                Value::text(MEDIA_TYPE_NOTATION_PAYLOAD),
            ),
            (Value::text(LABEL_IAT), Value::int(iat)),
        ];
        if let Some(expiry) = options.expiry {
            entries.push((Value::text(LABEL_EXP), Value::int(expiry.timestamp())));
        }
        let protected = ProtectedHeader::from_entries(entries)?;

        let signature_input = Sign1Message::signature_input(protected.raw_bytes(), &payload)?;
        let signature = self.key.sign(self.algorithm, &signature_input)?;

        let mut unprotected = UnprotectedHeader::default();
        unprotected.set_certificate_chain(&self.cert_chain);

        if let Some(tsa) = options.tsa {
            tracing::debug!("timestamping signature");
            let exchange = timestamp_signature(&signature, tsa, options.tsa_roots);
            let token = match options.tsa_deadline {
                Some(deadline) => tokio::time::timeout(deadline, exchange)
                    .await
                    .map_err(|_| TimestampError::Canceled)??,
                None => exchange.await?,
            };
            unprotected.set_timestamp_token(token);
        }

        Sign1Message {
            protected,
            unprotected,
            payload,
            signature,
        }
        .to_vec()
    }
}
