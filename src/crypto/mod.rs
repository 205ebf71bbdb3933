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

//! Key material and the cryptographic primitives behind the envelope.
//!
//! Keys are modeled as closed enums over the supported kinds: RSA (2048-bit
//! and larger) and ECDSA on the NIST P-256/P-384/P-521 curves. There is no
//! escape hatch to unknown algorithms.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use signature::{Signer as _, Verifier as _};
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::referenced::OwnedToRef;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

use crate::cose::Algorithm;
use crate::errors::{CoseError, Result};

pub mod certificate_pool;
pub mod timestamp;

pub use certificate_pool::{CertificatePool, ExtKeyUsage};

// RFC 5912 algorithm identifiers, matched textually as the certificate
// parser hands them out.
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";
const OID_SECP521R1: &str = "1.3.132.0.35";

/// Digest algorithms used by the envelope and the timestamp token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DigestKind {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestKind {
    pub(crate) fn from_oid_str(oid: &str) -> Option<Self> {
        match oid {
            "2.16.840.1.101.3.4.2.1" => Some(DigestKind::Sha256),
            "2.16.840.1.101.3.4.2.2" => Some(DigestKind::Sha384),
            "2.16.840.1.101.3.4.2.3" => Some(DigestKind::Sha512),
            _ => None,
        }
    }

    pub(crate) fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestKind::Sha256 => Sha256::digest(data).to_vec(),
            DigestKind::Sha384 => Sha384::digest(data).to_vec(),
            DigestKind::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// A private key accepted for envelope signing.
#[derive(Debug, Clone)]
pub enum SigningKey {
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
    EcdsaP521(p521::ecdsa::SigningKey),
    Rsa(rsa::RsaPrivateKey),
}

impl SigningKey {
    /// Parse a private key from PEM, trying PKCS#8 for every supported key
    /// kind and falling back to PKCS#1 and SEC1 encodings.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| CoseError::UnsupportedKey("private key is not PEM".into()))?;
        use pkcs8::DecodePrivateKey;
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(text) {
            return Ok(SigningKey::EcdsaP256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_pem(text) {
            return Ok(SigningKey::EcdsaP384(key));
        }
        if let Ok(key) = p521::ecdsa::SigningKey::from_pkcs8_pem(text) {
            return Ok(SigningKey::EcdsaP521(key));
        }
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_pem(text) {
            return Ok(SigningKey::Rsa(key));
        }
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs1_pem(text) {
            return Ok(SigningKey::Rsa(key));
        }
        if let Ok(key) = p256::SecretKey::from_sec1_pem(text) {
            return Ok(SigningKey::EcdsaP256(key.into()));
        }
        if let Ok(key) = p384::SecretKey::from_sec1_pem(text) {
            return Ok(SigningKey::EcdsaP384(key.into()));
        }
        Err(CoseError::UnsupportedKey(
            "unrecognized private key encoding".into(),
        ))
    }

    /// The public half of this key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::EcdsaP256(key) => PublicKey::EcdsaP256(*key.verifying_key()),
            SigningKey::EcdsaP384(key) => PublicKey::EcdsaP384(*key.verifying_key()),
            SigningKey::EcdsaP521(key) => PublicKey::EcdsaP521(*key.verifying_key()),
            SigningKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
        }
    }

    /// Sign `message` with the scheme the algorithm identifier mandates:
    /// RSASSA-PSS with MGF1 and a hash-length salt, or deterministic ECDSA
    /// with the signature emitted as fixed-width `r || s`.
    pub fn sign(&self, algorithm: Algorithm, message: &[u8]) -> Result<Vec<u8>> {
        match (self, algorithm) {
            (SigningKey::EcdsaP256(key), Algorithm::ES256) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            (SigningKey::EcdsaP384(key), Algorithm::ES384) => {
                let sig: p384::ecdsa::Signature = key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            (SigningKey::EcdsaP521(key), Algorithm::ES512) => {
                let sig: p521::ecdsa::Signature = key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            (SigningKey::Rsa(key), Algorithm::PS256) => {
                let signer = rsa::pss::BlindedSigningKey::<Sha256>::new(key.clone());
                Ok(signer.sign_with_rng(&mut rand::thread_rng(), message).to_vec())
            }
            (SigningKey::Rsa(key), Algorithm::PS384) => {
                let signer = rsa::pss::BlindedSigningKey::<Sha384>::new(key.clone());
                Ok(signer.sign_with_rng(&mut rand::thread_rng(), message).to_vec())
            }
            (SigningKey::Rsa(key), Algorithm::PS512) => {
                let signer = rsa::pss::BlindedSigningKey::<Sha512>::new(key.clone());
                Ok(signer.sign_with_rng(&mut rand::thread_rng(), message).to_vec())
            }
            _ => Err(CoseError::Crypto(format!(
                "algorithm {algorithm} does not match the signing key"
            ))),
        }
    }
}

/// A public key accepted for envelope verification.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
    EcdsaP521(p521::ecdsa::VerifyingKey),
    Rsa(rsa::RsaPublicKey),
}

impl PublicKey {
    /// Extract the subject public key of a certificate.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        Self::from_spki(&cert.tbs_certificate.subject_public_key_info)
    }

    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        match spki.algorithm.oid.to_string().as_str() {
            OID_EC_PUBLIC_KEY => {
                let params = spki.algorithm.parameters.as_ref().ok_or_else(|| {
                    CoseError::UnsupportedKey("EC public key without curve parameters".into())
                })?;
                let curve = params
                    .decode_as::<ObjectIdentifier>()
                    .map_err(|e| CoseError::UnsupportedKey(format!("invalid curve OID: {e}")))?;
                let point = spki.subject_public_key.as_bytes().ok_or_else(|| {
                    CoseError::UnsupportedKey("invalid EC public key encoding".into())
                })?;
                match curve.to_string().as_str() {
                    OID_SECP256R1 => Ok(PublicKey::EcdsaP256(
                        p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                            .map_err(|e| CoseError::UnsupportedKey(format!("P-256: {e}")))?,
                    )),
                    OID_SECP384R1 => Ok(PublicKey::EcdsaP384(
                        p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
                            .map_err(|e| CoseError::UnsupportedKey(format!("P-384: {e}")))?,
                    )),
                    OID_SECP521R1 => Ok(PublicKey::EcdsaP521(
                        p521::ecdsa::VerifyingKey::from_sec1_bytes(point)
                            .map_err(|e| CoseError::UnsupportedKey(format!("P-521: {e}")))?,
                    )),
                    other => Err(CoseError::UnsupportedKey(format!(
                        "unsupported elliptic curve {other}"
                    ))),
                }
            }
            OID_RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                rsa::RsaPublicKey::try_from(spki.owned_to_ref())
                    .map_err(|e| CoseError::UnsupportedKey(format!("RSA: {e}")))?,
            )),
            other => Err(CoseError::UnsupportedKey(format!(
                "key algorithm {other} is not supported"
            ))),
        }
    }

    /// RSA modulus size in bytes, if this is an RSA key.
    pub(crate) fn rsa_size(&self) -> Option<usize> {
        match self {
            PublicKey::Rsa(key) => Some(rsa::traits::PublicKeyParts::size(key)),
            _ => None,
        }
    }

    /// Verify a COSE signature: fixed-width `r || s` for ECDSA, PSS for RSA.
    /// The primitive must match the algorithm identifier exactly.
    pub fn verify(&self, algorithm: Algorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        match (self, algorithm) {
            (PublicKey::EcdsaP256(key), Algorithm::ES256) => {
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            (PublicKey::EcdsaP384(key), Algorithm::ES384) => {
                let sig = p384::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            (PublicKey::EcdsaP521(key), Algorithm::ES512) => {
                let sig = p521::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            (PublicKey::Rsa(key), Algorithm::PS256) => {
                let verifier = rsa::pss::VerifyingKey::<Sha256>::new(key.clone());
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                verifier
                    .verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            (PublicKey::Rsa(key), Algorithm::PS384) => {
                let verifier = rsa::pss::VerifyingKey::<Sha384>::new(key.clone());
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                verifier
                    .verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            (PublicKey::Rsa(key), Algorithm::PS512) => {
                let verifier = rsa::pss::VerifyingKey::<Sha512>::new(key.clone());
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                verifier
                    .verify(message, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            _ => Err(CoseError::Crypto(format!(
                "algorithm {algorithm} does not match the verification key"
            ))),
        }
    }

    /// Verify a CMS-style signature over a prehashed message: DER-encoded
    /// ECDSA (with a raw fallback) or RSASSA-PKCS1-v1_5.
    pub(crate) fn verify_der_prehash(
        &self,
        digest: DigestKind,
        prehash: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match self {
            PublicKey::EcdsaP256(key) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_slice(signature))
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify_prehash(prehash, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            PublicKey::EcdsaP384(key) => {
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p384::ecdsa::Signature::from_slice(signature))
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify_prehash(prehash, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            PublicKey::EcdsaP521(key) => {
                let sig = p521::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p521::ecdsa::Signature::from_slice(signature))
                    .map_err(|_| CoseError::SignatureInvalid)?;
                key.verify_prehash(prehash, &sig)
                    .map_err(|_| CoseError::SignatureInvalid)
            }
            PublicKey::Rsa(key) => {
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| CoseError::SignatureInvalid)?;
                let result = match digest {
                    DigestKind::Sha256 => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
                        .verify_prehash(prehash, &sig),
                    DigestKind::Sha384 => rsa::pkcs1v15::VerifyingKey::<Sha384>::new(key.clone())
                        .verify_prehash(prehash, &sig),
                    DigestKind::Sha512 => rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key.clone())
                        .verify_prehash(prehash, &sig),
                };
                result.map_err(|_| CoseError::SignatureInvalid)
            }
        }
    }
}

/// Parse every certificate in a PEM bundle.
pub fn certificates_from_pem(data: &[u8]) -> Result<Vec<Certificate>> {
    let certs = Certificate::load_pem_chain(data)?;
    Ok(certs)
}
