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

//! Shared fixtures: programmatically issued certificates and an in-process
//! Time-Stamping Authority producing real CMS-signed tokens.

#![allow(dead_code)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cmpv2::status::{PkiStatus, PkiStatusInfo};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use pkcs8::EncodePublicKey;
use sha2::{Digest, Sha256};
use signature::hazmat::PrehashSigner;
use x509_cert::attr::Attribute;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::{GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec};
use x509_cert::der::{Any, Decode, Encode};
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;
use x509_tsp::{Accuracy, TimeStampReq, TimeStampResp, TspVersion, TstInfo};

use notation_cose::crypto::timestamp::{Timestamper, TimestampError};
use notation_cose::crypto::{CertificatePool, SigningKey};

/// A key pair with its certificate.
pub struct CertData {
    pub key: SigningKey,
    pub cert: Certificate,
}

fn validity(not_before: i64, not_after: i64) -> Validity {
    Validity {
        not_before: utc_time(not_before),
        not_after: utc_time(not_after),
    }
}

fn utc_time(epoch: i64) -> Time {
    Time::UtcTime(
        x509_cert::der::asn1::UtcTime::from_unix_duration(Duration::from_secs(epoch as u64))
            .expect("validity time out of UTCTime range"),
    )
}

fn spki_of(key: &impl EncodePublicKey) -> SubjectPublicKeyInfoOwned {
    let der = key.to_public_key_der().expect("encode public key");
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).expect("re-parse public key")
}

/// Issue a self-signed P-256 certificate valid over the given window.
pub fn self_signed_p256(common_name: &str, not_before: i64, not_after: i64) -> CertData {
    let key = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
    let subject = Name::from_str(&format!("CN={common_name},O=tests")).expect("subject name");
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(1u32),
        validity(not_before, not_after),
        subject,
        spki_of(key.verifying_key()),
        &key,
    )
    .expect("certificate builder");
    let cert = builder
        .build::<p256::ecdsa::DerSignature>()
        .expect("build certificate");
    CertData {
        key: SigningKey::EcdsaP256(key),
        cert,
    }
}

/// A fixed RSA-3072 key: generating one at runtime is too slow for tests.
const RSA_3072_KEY_PEM: &[u8] = include_bytes!("../data/rsa3072_key.pem");

/// Issue a self-signed RSA-3072 certificate valid over the given window.
pub fn self_signed_rsa(common_name: &str, not_before: i64, not_after: i64) -> CertData {
    let SigningKey::Rsa(key) = SigningKey::from_pem(RSA_3072_KEY_PEM).expect("parse RSA key")
    else {
        unreachable!("fixture is an RSA key")
    };
    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
    let subject = Name::from_str(&format!("CN={common_name},O=tests")).expect("subject name");
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(2u32),
        validity(not_before, not_after),
        subject,
        spki_of(&key.to_public_key()),
        &signer,
    )
    .expect("certificate builder");
    let cert = builder
        .build::<rsa::pkcs1v15::Signature>()
        .expect("build certificate");
    CertData {
        key: SigningKey::Rsa(key),
        cert,
    }
}

/// Issue a P-256 root plus a leaf signed by it. Returns (leaf, root).
pub fn p256_chain(common_name: &str, not_before: i64, not_after: i64) -> (CertData, CertData) {
    let root = self_signed_p256(&format!("{common_name} Root CA"), not_before, not_after);
    let SigningKey::EcdsaP256(root_key) = &root.key else {
        unreachable!("root key is P-256")
    };

    let leaf_key = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
    let issuer = root.cert.tbs_certificate.subject.clone();
    let subject = Name::from_str(&format!("CN={common_name},O=tests")).expect("subject name");
    let builder = CertificateBuilder::new(
        Profile::Leaf {
            issuer,
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        SerialNumber::from(3u32),
        validity(not_before, not_after),
        subject,
        spki_of(leaf_key.verifying_key()),
        root_key,
    )
    .expect("certificate builder");
    let cert = builder
        .build::<p256::ecdsa::DerSignature>()
        .expect("build certificate");

    (
        CertData {
            key: SigningKey::EcdsaP256(leaf_key),
            cert,
        },
        root,
    )
}

const ID_CT_TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
const ID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
const ID_CONTENT_TYPE_ATTR: &str = "1.2.840.113549.1.9.3";
const ID_MESSAGE_DIGEST_ATTR: &str = "1.2.840.113549.1.9.4";
const TEST_TSA_POLICY: &str = "1.3.6.1.4.1.4146.2.3";

/// An in-process RFC 3161 authority. It honors the request's imprint and
/// nonce and signs a genuine TSTInfo with a P-256 timestamping certificate,
/// so tokens verify end to end without any network.
pub struct TestTsa {
    signing_key: p256::ecdsa::SigningKey,
    cert: Certificate,
    root: Certificate,
    pub gen_time: DateTime<Utc>,
    pub accuracy_seconds: Option<u64>,
    pub reject: bool,
    pub wrong_nonce: bool,
}

impl TestTsa {
    /// A TSA whose certificates are valid 2019-2035, stamping at `gen_time`.
    pub fn new(gen_time: DateTime<Utc>) -> Self {
        let not_before = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap().timestamp();
        let not_after = Utc.with_ymd_and_hms(2035, 1, 1, 0, 0, 0).unwrap().timestamp();
        let root = self_signed_p256("Test TSA Root CA", not_before, not_after);
        let SigningKey::EcdsaP256(root_key) = &root.key else {
            unreachable!("root key is P-256")
        };

        let signing_key = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let issuer = root.cert.tbs_certificate.subject.clone();
        let subject = Name::from_str("CN=Test TSA,O=tests").expect("subject name");
        let mut builder = CertificateBuilder::new(
            Profile::Leaf {
                issuer,
                enable_key_agreement: false,
                enable_key_encipherment: false,
            },
            SerialNumber::from(4u32),
            validity(not_before, not_after),
            subject,
            spki_of(signing_key.verifying_key()),
            root_key,
        )
        .expect("certificate builder");
        let timestamping = ExtendedKeyUsage(vec![const_oid::db::rfc5280::ID_KP_TIME_STAMPING]);
        builder
            .add_extension(&timestamping)
            .expect("add timestamping EKU");
        let cert = builder
            .build::<p256::ecdsa::DerSignature>()
            .expect("build certificate");

        TestTsa {
            signing_key,
            cert,
            root: root.cert,
            gen_time,
            accuracy_seconds: Some(1),
            reject: false,
            wrong_nonce: false,
        }
    }

    /// A pool trusting this TSA's root.
    pub fn roots(&self) -> CertificatePool {
        CertificatePool::from_certificates([&self.root]).expect("TSA root pool")
    }

    fn respond(&self, request: &[u8]) -> Result<Vec<u8>, TimestampError> {
        let request = TimeStampReq::from_der(request)
            .map_err(|e| TimestampError::Parse(format!("bad request: {e}")))?;

        if self.reject {
            let response = TimeStampResp {
                status: PkiStatusInfo {
                    status: PkiStatus::Rejection,
                    status_string: None,
                    fail_info: None,
                },
                time_stamp_token: None,
            };
            return response
                .to_der()
                .map_err(|e| TimestampError::Parse(format!("encode response: {e}")));
        }

        let nonce = if self.wrong_nonce {
            Some(
                x509_cert::der::asn1::Int::new(&[0x01])
                    .map_err(|e| TimestampError::Parse(e.to_string()))?,
            )
        } else {
            request.nonce.clone()
        };

        let tst_info = TstInfo {
            version: TspVersion::V1,
            policy: ObjectIdentifier::new_unwrap(TEST_TSA_POLICY),
            message_imprint: request.message_imprint.clone(),
            serial_number: SerialNumber::from(99u32),
            gen_time: GeneralizedTime::from_unix_duration(Duration::from_secs(
                self.gen_time.timestamp() as u64,
            ))
            .map_err(|e| TimestampError::Parse(e.to_string()))?,
            accuracy: self.accuracy_seconds.map(|seconds| Accuracy {
                seconds: Some(seconds),
                millis: None,
                micros: None,
            }),
            ordering: false,
            nonce,
            tsa: None,
            extensions: None,
        };
        let tst_info_der = tst_info
            .to_der()
            .map_err(|e| TimestampError::Parse(e.to_string()))?;

        let signed_data = self.signed_data_over(&tst_info_der)?;
        let token = ContentInfo {
            content_type: ObjectIdentifier::new_unwrap(ID_SIGNED_DATA),
            content: Any::encode_from(&signed_data)
                .map_err(|e| TimestampError::Parse(e.to_string()))?,
        };

        let response = TimeStampResp {
            status: PkiStatusInfo {
                status: PkiStatus::Accepted,
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: Some(token),
        };
        response
            .to_der()
            .map_err(|e| TimestampError::Parse(format!("encode response: {e}")))
    }

    /// CMS SignedData over the TSTInfo with content-type and message-digest
    /// signed attributes, ECDSA-P256/SHA-256.
    fn signed_data_over(&self, tst_info_der: &[u8]) -> Result<SignedData, TimestampError> {
        let parse = |e: x509_cert::der::Error| TimestampError::Parse(e.to_string());

        let mut attrs = SetOfVec::new();
        attrs
            .insert(Attribute {
                oid: ObjectIdentifier::new_unwrap(ID_CONTENT_TYPE_ATTR),
                values: {
                    let mut values = SetOfVec::new();
                    values
                        .insert(
                            Any::encode_from(&ObjectIdentifier::new_unwrap(ID_CT_TST_INFO))
                                .map_err(parse)?,
                        )
                        .map_err(parse)?;
                    values
                },
            })
            .map_err(parse)?;
        attrs
            .insert(Attribute {
                oid: ObjectIdentifier::new_unwrap(ID_MESSAGE_DIGEST_ATTR),
                values: {
                    let digest = Sha256::digest(tst_info_der);
                    let mut values = SetOfVec::new();
                    values
                        .insert(
                            Any::encode_from(&OctetString::new(&digest[..]).map_err(parse)?)
                                .map_err(parse)?,
                        )
                        .map_err(parse)?;
                    values
                },
            })
            .map_err(parse)?;

        let attrs_der = attrs.to_der().map_err(parse)?;
        let attrs_digest = Sha256::digest(&attrs_der);
        let signature: p256::ecdsa::Signature = self
            .signing_key
            .sign_prehash(&attrs_digest)
            .map_err(|e| TimestampError::SignatureVerification(e.to_string()))?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: self.cert.tbs_certificate.issuer.clone(),
                serial_number: self.cert.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ID_SHA_256,
                parameters: None,
            },
            signed_attrs: Some(attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            signature: OctetString::new(signature.to_der().as_bytes().to_vec()).map_err(parse)?,
            unsigned_attrs: None,
        };

        let mut certificates = SetOfVec::new();
        certificates
            .insert(CertificateChoices::Certificate(self.cert.clone()))
            .map_err(parse)?;
        certificates
            .insert(CertificateChoices::Certificate(self.root.clone()))
            .map_err(parse)?;

        let mut digest_algorithms = SetOfVec::new();
        digest_algorithms
            .insert(AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ID_SHA_256,
                parameters: None,
            })
            .map_err(parse)?;

        let mut signer_infos = SetOfVec::new();
        signer_infos.insert(signer_info).map_err(parse)?;

        Ok(SignedData {
            version: CmsVersion::V3,
            digest_algorithms,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ObjectIdentifier::new_unwrap(ID_CT_TST_INFO),
                econtent: Some(
                    Any::new(
                        x509_cert::der::Tag::OctetString,
                        tst_info_der.to_vec(),
                    )
                    .map_err(parse)?,
                ),
            },
            certificates: Some(CertificateSet(certificates)),
            crls: None,
            signer_infos: SignerInfos(signer_infos),
        })
    }
}

#[async_trait]
impl Timestamper for TestTsa {
    async fn send_request(&self, request: &[u8]) -> Result<Vec<u8>, TimestampError> {
        self.respond(request)
    }
}
