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

//! The errors that can be raised by notation-cose.

use thiserror::Error;

use crate::cbor::CborError;
use crate::cose::Algorithm;
use crate::crypto::timestamp::TimestampError;

pub type Result<T> = std::result::Result<T, CoseError>;

#[derive(Error, Debug)]
pub enum CoseError {
    #[error("malformed signature envelope: {0}")]
    MalformedEnvelope(String),

    #[error(transparent)]
    Cbor(#[from] CborError),

    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("invalid sign options: {0}")]
    InvalidOptions(String),

    #[error("signer certificate chain not found")]
    MissingCertChain,

    #[error("certificate chain verification failed: {0}")]
    CertChainInvalid(String),

    #[error("signing certificate is expired")]
    CertExpired,

    #[error("signing algorithm {header} does not match the certificate key algorithm {key}")]
    AlgorithmMismatch { header: Algorithm, key: Algorithm },

    #[error("unsupported critical header: {0}")]
    UnknownCritical(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("missing {0}")]
    MissingHeader(&'static str),

    #[error("invalid {0}")]
    InvalidHeader(&'static str),

    #[error("signature is expired by {0}s")]
    SignatureExpired(i64),

    #[error("signature used before generated")]
    SignatureFromFuture,

    #[error("timestamp failed: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    X509(#[from] x509_cert::der::Error),

    #[error(transparent)]
    Pem(#[from] pem::PemError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}
