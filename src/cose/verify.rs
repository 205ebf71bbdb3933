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

//! Verifying COSE signature envelopes.

use chrono::{DateTime, Utc};
use pki_types::CertificateDer;
use x509_cert::der::Decode;
use x509_cert::Certificate;

use crate::cbor::Value;
use crate::cose::{
    recommended_algorithm, Algorithm, AlgorithmResolver, ProtectedHeader, Sign1Message,
    LABEL_CONTENT_TYPE, LABEL_EXP, LABEL_IAT, LABEL_SIGNING_TIME,
};
use crate::crypto::certificate_pool::CertChainError;
use crate::crypto::timestamp::{verify_timestamp_token, TimestampError};
use crate::crypto::{CertificatePool, ExtKeyUsage, PublicKey};
use crate::descriptor::{Descriptor, MEDIA_TYPE_NOTATION_PAYLOAD};
use crate::errors::{CoseError, Result};

/// Verifies artifact signatures against a set of trusted roots.
///
/// A `Verifier` is an immutable configuration; `verify` holds no state
/// between calls and may run concurrently on independent envelopes.
pub struct Verifier {
    roots: CertificatePool,
    tsa_roots: CertificatePool,
    key_usages: Vec<ExtKeyUsage>,
    enforce_expiry_validation: bool,
    algorithm_resolver: AlgorithmResolver,
}

/// Builder for [`Verifier`].
#[derive(Default)]
pub struct VerifierBuilder {
    roots: Option<CertificatePool>,
    tsa_roots: Option<CertificatePool>,
    key_usages: Vec<ExtKeyUsage>,
    enforce_expiry_validation: bool,
    algorithm_resolver: Option<AlgorithmResolver>,
}

impl VerifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusted roots for the signing certificate chain.
    pub fn roots(mut self, roots: CertificatePool) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Trusted roots for timestamp token signer chains.
    pub fn tsa_roots(mut self, roots: CertificatePool) -> Self {
        self.tsa_roots = Some(roots);
        self
    }

    /// Extended key usages the signing certificate must satisfy; an empty
    /// list means any usage is acceptable.
    pub fn key_usages(mut self, usages: Vec<ExtKeyUsage>) -> Self {
        self.key_usages = usages;
        self
    }

    /// Verify the timestamp token even when the certificate chain is
    /// currently valid.
    pub fn enforce_expiry_validation(mut self, enforce: bool) -> Self {
        self.enforce_expiry_validation = enforce;
        self
    }

    /// Override how the verification algorithm is resolved from the leaf
    /// public key.
    pub fn algorithm_resolver(mut self, resolver: AlgorithmResolver) -> Self {
        self.algorithm_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Verifier {
        Verifier {
            roots: self.roots.unwrap_or_default(),
            tsa_roots: self.tsa_roots.unwrap_or_default(),
            key_usages: self.key_usages,
            enforce_expiry_validation: self.enforce_expiry_validation,
            algorithm_resolver: self.algorithm_resolver.unwrap_or(recommended_algorithm),
        }
    }
}

impl Verifier {
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::new()
    }

    /// Verify an envelope and return the descriptor of the signed artifact.
    pub fn verify(&self, envelope: &[u8]) -> Result<Descriptor> {
        let message = Sign1Message::from_slice(envelope)?;

        let chain = message.unprotected.certificate_chain()?;
        let leaf_cert = Certificate::from_der(&chain[0])
            .map_err(|e| CoseError::CertChainInvalid(format!("invalid signer certificate: {e}")))?;
        let leaf_der = CertificateDer::from(chain[0].clone());
        let intermediates: Vec<CertificateDer<'_>> = chain[1..]
            .iter()
            .cloned()
            .map(CertificateDer::from)
            .collect();

        // Validate the signer chain at the wall clock, falling back to the
        // stamped time when the chain is expired (or when expiry validation
        // is enforced).
        let now = Utc::now();
        let expired = match self
            .roots
            .verify_chain_at(&leaf_der, &intermediates, now, &self.key_usages)
        {
            Ok(()) => false,
            Err(CertChainError::Expired) => true,
            Err(CertChainError::Invalid(cause)) => return Err(CoseError::CertChainInvalid(cause)),
        };

        let mut stamped_time = None;
        if expired || self.enforce_expiry_validation {
            let Some(token) = message.unprotected.timestamp_token() else {
                return Err(if expired {
                    CoseError::CertExpired
                } else {
                    TimestampError::MissingToken.into()
                });
            };
            let time = verify_timestamp_token(token, &message.signature, &self.tsa_roots)?;
            tracing::debug!("re-validating signer chain at stamped time {time}");
            self.roots
                .verify_chain_at(&leaf_der, &intermediates, time, &self.key_usages)
                .map_err(|e| match e {
                    CertChainError::Expired => CoseError::CertExpired,
                    CertChainError::Invalid(cause) => CoseError::CertChainInvalid(cause),
                })?;
            stamped_time = Some(time);
        }

        // The algorithm resolved from the leaf key must be the one the
        // protected header declares; no negotiation.
        let leaf_key = PublicKey::from_certificate(&leaf_cert)?;
        let key_algorithm = (self.algorithm_resolver)(&leaf_key)?;
        let header_value = message.protected.algorithm_value()?;
        let header_algorithm = Algorithm::from_value(header_value)
            .ok_or(CoseError::UnsupportedAlgorithm(header_value))?;
        if header_algorithm != key_algorithm {
            return Err(CoseError::AlgorithmMismatch {
                header: header_algorithm,
                key: key_algorithm,
            });
        }

        let signature_input =
            Sign1Message::signature_input(message.protected.raw_bytes(), &message.payload)?;
        leaf_key.verify(key_algorithm, &signature_input, &message.signature)?;

        // Header invariants run only after the signature is known good, so
        // a forged envelope never surfaces header-specific errors.
        self.validate_headers(&message.protected, now, stamped_time)?;

        serde_json::from_slice(&message.payload).map_err(CoseError::MalformedPayload)
    }

    fn validate_headers(
        &self,
        protected: &ProtectedHeader,
        now: DateTime<Utc>,
        stamped_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let crit = protected.critical_labels()?;
        if crit.is_empty() || !crit.contains(&Value::int(LABEL_CONTENT_TYPE)) {
            return Err(CoseError::InvalidHeader("crit header"));
        }
        for label in crit {
            if !is_understood(label) {
                return Err(CoseError::UnknownCritical(format_label(label)));
            }
        }

        if protected.content_type()? != MEDIA_TYPE_NOTATION_PAYLOAD {
            return Err(CoseError::InvalidHeader("content type header"));
        }

        // Zero clock-skew tolerance for this profile.
        let iat = protected.signing_time()?;
        if iat > now.timestamp() {
            return Err(CoseError::SignatureFromFuture);
        }

        if let Some(exp) = protected.expiry()? {
            let reference = stamped_time.unwrap_or(now).timestamp();
            if reference >= exp {
                return Err(CoseError::SignatureExpired(reference - exp));
            }
        }
        Ok(())
    }
}

/// Whether a critical header label is one this implementation processes.
fn is_understood(label: &Value) -> bool {
    match label {
        Value::Int(n) => (1..=3).contains(n),
        Value::Text(s) => {
            matches!(s.as_str(), LABEL_IAT | LABEL_EXP | LABEL_SIGNING_TIME)
        }
        _ => false,
    }
}

fn format_label(label: &Value) -> String {
    match label {
        Value::Text(s) => s.clone(),
        other => match other.as_i64() {
            Some(n) => n.to_string(),
            None => format!("{other:?}"),
        },
    }
}
