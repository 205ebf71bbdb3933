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

//! COSE signature algorithms and the key-to-algorithm resolver.

use std::fmt;

use crate::crypto::PublicKey;
use crate::errors::{CoseError, Result};

/// COSE signature algorithm identifiers (RFC 8152 §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    ES256,
    ES384,
    ES512,
    PS256,
    PS384,
    PS512,
}

impl Algorithm {
    /// The integer identifier carried in the `alg` header.
    pub fn value(self) -> i64 {
        match self {
            Algorithm::ES256 => -7,
            Algorithm::ES384 => -35,
            Algorithm::ES512 => -36,
            Algorithm::PS256 => -37,
            Algorithm::PS384 => -38,
            Algorithm::PS512 => -39,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            -7 => Some(Algorithm::ES256),
            -35 => Some(Algorithm::ES384),
            -36 => Some(Algorithm::ES512),
            -37 => Some(Algorithm::PS256),
            -38 => Some(Algorithm::PS384),
            -39 => Some(Algorithm::PS512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES512 => "ES512",
            Algorithm::PS256 => "PS256",
            Algorithm::PS384 => "PS384",
            Algorithm::PS512 => "PS512",
        };
        write!(f, "{name}")
    }
}

/// Resolves the verification algorithm from a public key. Injected into the
/// verifier, with [`recommended_algorithm`] as the default.
pub type AlgorithmResolver = fn(&PublicKey) -> Result<Algorithm>;

/// Pick the recommended algorithm for a key (RFC 8152 §8): ES256/384/512
/// for the NIST curves, PS256/384/512 for RSA sized by the modulus.
pub fn recommended_algorithm(key: &PublicKey) -> Result<Algorithm> {
    match key {
        PublicKey::EcdsaP256(_) => Ok(Algorithm::ES256),
        PublicKey::EcdsaP384(_) => Ok(Algorithm::ES384),
        PublicKey::EcdsaP521(_) => Ok(Algorithm::ES512),
        PublicKey::Rsa(_) => {
            let size = key.rsa_size().expect("RSA key has a modulus size");
            match size {
                256 => Ok(Algorithm::PS256),
                384 => Ok(Algorithm::PS384),
                512 => Ok(Algorithm::PS512),
                other => Err(CoseError::UnsupportedKey(format!(
                    "RSA key of {} bits is not supported",
                    other * 8
                ))),
            }
        }
    }
}
