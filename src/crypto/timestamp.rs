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

//! RFC 3161 timestamping: request construction, TSA transport, and token
//! verification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cmpv2::status::PkiStatus;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use pki_types::CertificateDer;
use rand::Rng;
use sha2::{Digest, Sha256};
use x509_cert::der::asn1::{Int, OctetString, OctetStringRef};
use x509_cert::der::{Decode, Encode};
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;
use x509_tsp::{MessageImprint, TimeStampReq, TimeStampResp, TspVersion, TstInfo};

use crate::crypto::certificate_pool::{CertificatePool, ExtKeyUsage};
use crate::crypto::{DigestKind, PublicKey};

/// Max acceptable accuracy for a timestamp token.
pub const MAX_TIMESTAMP_ACCURACY: std::time::Duration = std::time::Duration::from_secs(60);

const ID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
const ID_CT_TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
const ID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
const ID_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";

#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    #[error("tsa rejected the request: {status}: {detail}")]
    Rejected { status: i32, detail: String },

    #[error("timestamp response carries no token")]
    MissingToken,

    #[error("failed to parse timestamp token: {0}")]
    Parse(String),

    #[error("timestamp does not cover the signature: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("timestamp nonce does not match the request")]
    NonceMismatch,

    #[error("max timestamp accuracy exceeded: {seconds}s")]
    AccuracyExceeded { seconds: u64 },

    #[error("timestamp token signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("TSA certificate validation failed: {0}")]
    CertificateValidation(String),

    #[error("timestamp request aborted by deadline")]
    Canceled,

    #[error("TSA transport error: {0}")]
    Transport(String),
}

/// A Time-Stamping Authority abstracted down to its wire exchange: DER
/// request bytes in, DER response bytes out.
#[async_trait]
pub trait Timestamper: Send + Sync {
    async fn send_request(&self, request: &[u8]) -> Result<Vec<u8>, TimestampError>;
}

/// RFC 3161 TSA client over HTTP.
pub struct HttpTimestamper {
    url: String,
    client: reqwest::Client,
}

impl HttpTimestamper {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        HttpTimestamper {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Timestamper for HttpTimestamper {
    async fn send_request(&self, request: &[u8]) -> Result<Vec<u8>, TimestampError> {
        tracing::debug!("sending timestamp request to TSA: {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/timestamp-query")
            .header("Accept", "application/timestamp-reply")
            .body(request.to_vec())
            .send()
            .await
            .map_err(|e| TimestampError::Transport(format!("TSA request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(TimestampError::Transport(format!(
                "TSA returned error status: {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| TimestampError::Transport(format!("failed to read TSA response: {e}")))?;
        Ok(body.to_vec())
    }
}

/// A TimeStampReq over a signature byte string, retaining the nonce so the
/// response can be matched to it.
pub struct TimestampRequest {
    der: Vec<u8>,
    nonce: Vec<u8>,
}

impl TimestampRequest {
    /// Build a request carrying a SHA-256 imprint of the signature, a fresh
    /// 64-bit nonce, and `certReq` set.
    pub fn from_signature(signature: &[u8]) -> Result<Self, TimestampError> {
        let hash = Sha256::digest(signature);
        let message_imprint = MessageImprint {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ID_SHA_256,
                parameters: None,
            },
            hashed_message: OctetString::new(&hash[..])
                .map_err(|e| TimestampError::Parse(format!("failed to build imprint: {e}")))?,
        };

        let nonce_bytes = positive_nonce_bytes();
        let nonce = Int::new(&nonce_bytes)
            .map_err(|e| TimestampError::Parse(format!("failed to build nonce: {e}")))?;

        let request = TimeStampReq {
            version: TspVersion::V1,
            message_imprint,
            req_policy: None,
            nonce: Some(nonce),
            cert_req: true,
            extensions: None,
        };
        let der = request
            .to_der()
            .map_err(|e| TimestampError::Parse(format!("failed to encode request: {e}")))?;
        Ok(TimestampRequest {
            der,
            nonce: nonce_bytes,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

/// The nonce is an 8-byte random value encoded as a positive DER INTEGER:
/// a leading zero is prepended when the high bit is set.
fn positive_nonce_bytes() -> Vec<u8> {
    let raw: [u8; 8] = rand::thread_rng().gen();
    if raw[0] & 0x80 != 0 {
        let mut padded = vec![0x00];
        padded.extend_from_slice(&raw);
        padded
    } else {
        raw.to_vec()
    }
}

/// Request a timestamp over `signature` and verify the returned token
/// before handing it back: status, CMS signature, signer chain, message
/// imprint, nonce, and accuracy are all checked.
pub async fn timestamp_signature(
    signature: &[u8],
    tsa: &dyn Timestamper,
    tsa_roots: Option<&CertificatePool>,
) -> Result<Vec<u8>, TimestampError> {
    let request = TimestampRequest::from_signature(signature)?;
    let response = tsa.send_request(request.as_der()).await?;

    let resp = TimeStampResp::from_der(&response)
        .map_err(|e| TimestampError::Parse(format!("invalid TimeStampResp: {e}")))?;
    match resp.status.status {
        PkiStatus::Accepted | PkiStatus::GrantedWithMods => {}
        status => {
            let detail = resp
                .status
                .status_string
                .as_ref()
                .map(|s| format!("{s:?}"))
                .unwrap_or_default();
            return Err(TimestampError::Rejected {
                status: status as i32,
                detail,
            });
        }
    }

    let token = resp
        .time_stamp_token
        .as_ref()
        .ok_or(TimestampError::MissingToken)?;
    let token_der = token
        .to_der()
        .map_err(|e| TimestampError::Parse(format!("invalid TimeStampToken: {e}")))?;

    verify_token(&token_der, signature, tsa_roots, Some(&request.nonce))?;
    tracing::debug!("timestamp token acquired and verified");
    Ok(token_der)
}

/// Verify a detached timestamp token against the signature bytes it is
/// expected to cover, and return the stamped time.
pub fn verify_timestamp_token(
    token: &[u8],
    signature: &[u8],
    tsa_roots: &CertificatePool,
) -> Result<DateTime<Utc>, TimestampError> {
    verify_token(token, signature, Some(tsa_roots), None)
}

fn verify_token(
    token: &[u8],
    signature: &[u8],
    tsa_roots: Option<&CertificatePool>,
    expected_nonce: Option<&[u8]>,
) -> Result<DateTime<Utc>, TimestampError> {
    let content_info = ContentInfo::from_der(token)
        .map_err(|e| TimestampError::Parse(format!("invalid ContentInfo: {e}")))?;
    if content_info.content_type.to_string() != ID_SIGNED_DATA {
        return Err(TimestampError::Parse(
            "timestamp token is not CMS SignedData".into(),
        ));
    }
    let signed_data_der = content_info
        .content
        .to_der()
        .map_err(|e| TimestampError::Parse(format!("failed to encode SignedData: {e}")))?;
    let signed_data = SignedData::from_der(&signed_data_der)
        .map_err(|e| TimestampError::Parse(format!("failed to decode SignedData: {e}")))?;

    if signed_data.encap_content_info.econtent_type.to_string() != ID_CT_TST_INFO {
        return Err(TimestampError::Parse("content type is not TSTInfo".into()));
    }
    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| TimestampError::Parse("no TSTInfo content".into()))?;
    let tst_info_der = econtent.value();
    let tst_info = TstInfo::from_der(tst_info_der)
        .map_err(|e| TimestampError::Parse(format!("failed to decode TSTInfo: {e}")))?;

    verify_message_imprint(&tst_info, signature)?;

    if let Some(expected) = expected_nonce {
        let nonce = tst_info
            .nonce
            .as_ref()
            .ok_or(TimestampError::NonceMismatch)?;
        if strip_leading_zeros(nonce.as_bytes()) != strip_leading_zeros(expected) {
            return Err(TimestampError::NonceMismatch);
        }
    }

    let unix = tst_info.gen_time.to_unix_duration();
    let stamped_time = DateTime::from_timestamp(unix.as_secs() as i64, unix.subsec_nanos())
        .ok_or_else(|| TimestampError::Parse("invalid genTime in TSTInfo".into()))?;

    if let Some(accuracy) = &tst_info.accuracy {
        let total = std::time::Duration::from_secs(accuracy.seconds.unwrap_or(0))
            + std::time::Duration::from_millis(accuracy.millis.unwrap_or(0) as u64)
            + std::time::Duration::from_micros(accuracy.micros.unwrap_or(0) as u64);
        if total > MAX_TIMESTAMP_ACCURACY {
            return Err(TimestampError::AccuracyExceeded {
                seconds: total.as_secs(),
            });
        }
    }

    let certificates = extract_certificates(&signed_data);
    if signed_data.signer_infos.0.is_empty() {
        return Err(TimestampError::SignatureVerification(
            "no SignerInfo in SignedData".into(),
        ));
    }
    let signer_info = signed_data.signer_infos.0.get(0).ok_or_else(|| {
        TimestampError::SignatureVerification("failed to read first SignerInfo".into())
    })?;
    let signer_cert = find_signer_certificate(&signer_info.sid, &certificates)?;

    // RFC 3161 tokens sign their attributes, never the bare content.
    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| TimestampError::SignatureVerification("missing signed attributes".into()))?;

    let digest_kind = DigestKind::from_oid_str(&signer_info.digest_alg.oid.to_string())
        .ok_or_else(|| {
            TimestampError::SignatureVerification(format!(
                "unsupported digest algorithm: {}",
                signer_info.digest_alg.oid
            ))
        })?;

    verify_message_digest_attribute(signed_attrs, tst_info_der, digest_kind)?;

    // Signed attributes are a DER SET OF; re-encoding the parsed set yields
    // the signed bytes for any DER-compliant token.
    let signed_attrs_der = signed_attrs
        .to_der()
        .map_err(|e| TimestampError::Parse(format!("failed to encode signed attributes: {e}")))?;
    let prehash = digest_kind.digest(&signed_attrs_der);

    let public_key = PublicKey::from_certificate(signer_cert)
        .map_err(|e| TimestampError::SignatureVerification(e.to_string()))?;
    public_key
        .verify_der_prehash(digest_kind, &prehash, signer_info.signature.as_bytes())
        .map_err(|_| {
            TimestampError::SignatureVerification("CMS signature does not verify".into())
        })?;
    tracing::debug!("timestamp CMS signature verified");

    match tsa_roots {
        Some(roots) if !roots.is_empty() => {
            let leaf_der = CertificateDer::from(signer_cert.to_der().map_err(|e| {
                TimestampError::CertificateValidation(format!(
                    "failed to encode signer certificate: {e}"
                ))
            })?);
            let mut intermediates = Vec::new();
            for cert in &certificates {
                if cert == signer_cert {
                    continue;
                }
                intermediates.push(CertificateDer::from(cert.to_der().map_err(|e| {
                    TimestampError::CertificateValidation(format!(
                        "failed to encode embedded certificate: {e}"
                    ))
                })?));
            }
            // A token must stay verifiable after the TSA certificate
            // expires, so the chain is checked at the stamped time.
            roots
                .verify_chain_at(
                    &leaf_der,
                    &intermediates,
                    stamped_time,
                    &[ExtKeyUsage::TimeStamping],
                )
                .map_err(|e| TimestampError::CertificateValidation(e.to_string()))?;
            tracing::debug!("TSA certificate chain validated at {stamped_time}");
        }
        _ => {
            tracing::debug!("no TSA roots provided, skipping certificate chain validation");
        }
    }

    Ok(stamped_time)
}

fn verify_message_imprint(tst_info: &TstInfo, signature: &[u8]) -> Result<(), TimestampError> {
    let digest_kind =
        DigestKind::from_oid_str(&tst_info.message_imprint.hash_algorithm.oid.to_string())
            .ok_or_else(|| {
                TimestampError::Parse(format!(
                    "unsupported imprint hash algorithm: {}",
                    tst_info.message_imprint.hash_algorithm.oid
                ))
            })?;
    let actual = digest_kind.digest(signature);
    let expected = tst_info.message_imprint.hashed_message.as_bytes();
    if actual != expected {
        return Err(TimestampError::HashMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(&actual),
        });
    }
    Ok(())
}

/// The message-digest signed attribute must cover the TSTInfo content.
fn verify_message_digest_attribute(
    signed_attrs: &x509_cert::attr::Attributes,
    tst_info_der: &[u8],
    digest_kind: DigestKind,
) -> Result<(), TimestampError> {
    let attr = signed_attrs
        .iter()
        .find(|attr| attr.oid.to_string() == ID_MESSAGE_DIGEST)
        .ok_or_else(|| {
            TimestampError::SignatureVerification("message-digest attribute not found".into())
        })?;
    if attr.values.len() != 1 {
        return Err(TimestampError::SignatureVerification(
            "message-digest attribute must have exactly one value".into(),
        ));
    }
    let value = attr.values.get(0).ok_or_else(|| {
        TimestampError::SignatureVerification("failed to read message-digest value".into())
    })?;
    let value_der = value.to_der().map_err(|e| {
        TimestampError::SignatureVerification(format!("failed to encode message-digest: {e}"))
    })?;
    let octets = OctetStringRef::from_der(&value_der).map_err(|e| {
        TimestampError::SignatureVerification(format!(
            "message-digest is not an OCTET STRING: {e}"
        ))
    })?;

    let content_hash = digest_kind.digest(tst_info_der);
    if octets.as_bytes() != content_hash {
        return Err(TimestampError::HashMismatch {
            expected: hex::encode(octets.as_bytes()),
            actual: hex::encode(&content_hash),
        });
    }
    Ok(())
}

fn extract_certificates(signed_data: &SignedData) -> Vec<Certificate> {
    let mut certificates = Vec::new();
    if let Some(cert_set) = &signed_data.certificates {
        for choice in cert_set.0.iter() {
            match choice {
                CertificateChoices::Certificate(cert) => certificates.push(cert.clone()),
                CertificateChoices::Other(_) => {
                    tracing::debug!("skipping non-standard certificate format");
                }
            }
        }
    }
    certificates
}

fn find_signer_certificate<'a>(
    signer_id: &SignerIdentifier,
    certificates: &'a [Certificate],
) -> Result<&'a Certificate, TimestampError> {
    match signer_id {
        SignerIdentifier::IssuerAndSerialNumber(issuer_serial) => certificates
            .iter()
            .find(|cert| {
                cert.tbs_certificate.issuer == issuer_serial.issuer
                    && cert.tbs_certificate.serial_number == issuer_serial.serial_number
            })
            .ok_or_else(|| {
                TimestampError::SignatureVerification(
                    "no certificate matches issuer and serial number".into(),
                )
            }),
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            for cert in certificates {
                let Some(extensions) = &cert.tbs_certificate.extensions else {
                    continue;
                };
                for ext in extensions.iter() {
                    if ext.extn_id.to_string() != ID_SUBJECT_KEY_IDENTIFIER {
                        continue;
                    }
                    if let Ok(cert_ski) = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(
                        ext.extn_value.as_bytes(),
                    ) {
                        if &cert_ski == ski {
                            return Ok(cert);
                        }
                    }
                }
            }
            Err(TimestampError::SignatureVerification(
                "no certificate matches subject key identifier".into(),
            ))
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
