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

//! COSE signature envelopes for Notation-style artifact signing.
//!
//! The crate wraps an OCI artifact descriptor in a COSE_Sign1 envelope
//! (RFC 8152), carrying the signer's X.509 certificate chain in the
//! unprotected header and, optionally, an RFC 3161 timestamp token over the
//! signature bytes. Verification walks the same path in reverse: parse the
//! envelope, validate the chain (falling back to the stamped time when the
//! signing certificate is expired), resolve the algorithm from the leaf key,
//! and verify the signature over the reconstructed `Sig_structure`.
//!
//! # Signing and verifying
//!
//! ```no_run
//! use notation_cose::cose::{SignOptions, Signer, Verifier};
//! use notation_cose::crypto::{certificates_from_pem, CertificatePool, SigningKey};
//! use notation_cose::Descriptor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let key = SigningKey::from_pem(&std::fs::read("key.pem")?)?;
//! let chain = certificates_from_pem(&std::fs::read("certs.pem")?)?;
//! let signer = Signer::new(key, &chain)?;
//!
//! let descriptor = Descriptor::new(
//!     "application/vnd.oci.image.manifest.v1+json",
//!     "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
//!     528,
//! );
//! let envelope = signer.sign(&descriptor, SignOptions::default()).await?;
//!
//! let verifier = Verifier::builder()
//!     .roots(CertificatePool::from_pem(&std::fs::read("roots.pem")?)?)
//!     .build();
//! let verified = verifier.verify(&envelope)?;
//! assert_eq!(verified, descriptor);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod cbor;
pub mod cose;
pub mod crypto;
pub mod descriptor;
pub mod errors;
pub mod protocol;

pub use descriptor::{Descriptor, MEDIA_TYPE_NOTATION_PAYLOAD};
pub use errors::{CoseError, Result};
