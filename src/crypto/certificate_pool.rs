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

//! Trusted root pools and certificate chain validation.

use chrono::{DateTime, Utc};
use pki_types::{CertificateDer, TrustAnchor, UnixTime};
use thiserror::Error;
use webpki::{EndEntityCert, KeyUsage};
use x509_cert::der::Encode;
use x509_cert::Certificate;

use crate::errors::{CoseError, Result};

// anyExtendedKeyUsage (2.5.29.37.0)
const ANY_EXTENDED_KEY_USAGE: &[u8] = &[0x55, 0x1d, 0x25, 0x00];
// id-kp-timeStamping (1.3.6.1.5.5.7.3.8)
const ID_KP_TIME_STAMPING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x08];
// id-kp-codeSigning (1.3.6.1.5.5.7.3.3)
const ID_KP_CODE_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03];

/// Extended key usages a verifier may demand of the signing certificate.
///
/// A chain is accepted when it validates for at least one of the requested
/// usages. An empty usage list means [`ExtKeyUsage::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtKeyUsage {
    Any,
    TimeStamping,
    CodeSigning,
    ClientAuth,
    ServerAuth,
}

impl ExtKeyUsage {
    fn to_webpki(self) -> KeyUsage {
        match self {
            ExtKeyUsage::Any => KeyUsage::required(ANY_EXTENDED_KEY_USAGE),
            ExtKeyUsage::TimeStamping => KeyUsage::required(ID_KP_TIME_STAMPING),
            ExtKeyUsage::CodeSigning => KeyUsage::required(ID_KP_CODE_SIGNING),
            ExtKeyUsage::ClientAuth => KeyUsage::client_auth(),
            ExtKeyUsage::ServerAuth => KeyUsage::server_auth(),
        }
    }
}

/// Why a chain failed to validate. Expiry-class failures are separated so
/// the verifier can retry at the stamped time.
#[derive(Error, Debug)]
pub enum CertChainError {
    #[error("certificate is expired or not yet valid")]
    Expired,

    #[error("{0}")]
    Invalid(String),
}

/// A collection of trusted root certificates.
#[derive(Default)]
pub struct CertificatePool {
    anchors: Vec<TrustAnchor<'static>>,
}

impl CertificatePool {
    /// Build a pool from DER-encoded certificates.
    pub fn from_der_certificates(certs: &[CertificateDer<'_>]) -> Result<Self> {
        let anchors = certs
            .iter()
            .map(|cert| {
                webpki::anchor_from_trusted_cert(cert)
                    .map(|anchor| anchor.to_owned())
                    .map_err(|e| {
                        CoseError::CertChainInvalid(format!("cannot use certificate as root: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CertificatePool { anchors })
    }

    /// Build a pool from parsed certificates.
    pub fn from_certificates<'a>(certs: impl IntoIterator<Item = &'a Certificate>) -> Result<Self> {
        let ders = certs
            .into_iter()
            .map(|cert| Ok(CertificateDer::from(cert.to_der()?)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_der_certificates(&ders)
    }

    /// Build a pool from a PEM bundle of root certificates.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let ders = pem::parse_many(data)?
            .into_iter()
            .map(|block| CertificateDer::from(block.into_contents()))
            .collect::<Vec<_>>();
        Self::from_der_certificates(&ders)
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Validate `leaf` against this pool at the given time, chain-building
    /// through `intermediates`. The chain must satisfy at least one of the
    /// requested extended key usages.
    pub fn verify_chain_at(
        &self,
        leaf: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        at: DateTime<Utc>,
        usages: &[ExtKeyUsage],
    ) -> std::result::Result<(), CertChainError> {
        let end_entity = EndEntityCert::try_from(leaf)
            .map_err(|e| CertChainError::Invalid(format!("invalid signing certificate: {e}")))?;
        let time = UnixTime::since_unix_epoch(std::time::Duration::from_secs(
            u64::try_from(at.timestamp())
                .map_err(|_| CertChainError::Invalid("verification time before epoch".into()))?,
        ));

        let usages = if usages.is_empty() {
            &[ExtKeyUsage::Any]
        } else {
            usages
        };

        let mut last_error = None;
        for usage in usages {
            match end_entity.verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                &self.anchors,
                intermediates,
                time,
                usage.to_webpki(),
                None,
                None,
            ) {
                Ok(_) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }

        let error = last_error.expect("at least one usage is always checked");
        if matches!(
            error,
            webpki::Error::CertExpired { .. } | webpki::Error::CertNotValidYet { .. }
        ) {
            Err(CertChainError::Expired)
        } else {
            Err(CertChainError::Invalid(error.to_string()))
        }
    }
}
