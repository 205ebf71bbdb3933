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

//! Timestamp acquisition and the expired-certificate fallback.

mod common;

use chrono::{TimeZone, Utc};

use notation_cose::cose::{SignOptions, Signer, Verifier};
use notation_cose::crypto::timestamp::TimestampError;
use notation_cose::crypto::CertificatePool;
use notation_cose::{CoseError, Descriptor};

use common::{self_signed_p256, TestTsa};

fn sample_descriptor() -> Descriptor {
    Descriptor::new(
        "application/vnd.oci.image.manifest.v1+json",
        format!("sha256:{}", "cd".repeat(32)),
        2048,
    )
}

/// A signing certificate valid for one day in 2020.
fn signer_of_2020() -> common::CertData {
    let not_before = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().timestamp();
    let not_after = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap().timestamp();
    self_signed_p256("signer-2020.test", not_before, not_after)
}

fn stamp_of_2020() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap()
}

/// An expired signing certificate verifies through a token whose genTime
/// lies inside the certificate's validity window.
#[tokio::test]
async fn expired_certificate_falls_back_to_stamped_time() {
    let identity = signer_of_2020();
    let tsa = TestTsa::new(stamp_of_2020());

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let tsa_roots = tsa.roots();
    let options = SignOptions {
        tsa: Some(&tsa),
        tsa_roots: Some(&tsa_roots),
        ..Default::default()
    };
    let descriptor = sample_descriptor();
    let envelope = signer.sign(&descriptor, options).await.unwrap();

    let verifier = Verifier::builder()
        .roots(CertificatePool::from_certificates([&identity.cert]).unwrap())
        .tsa_roots(tsa.roots())
        .build();
    let verified = verifier.verify(&envelope).unwrap();
    assert_eq!(verified, descriptor);
}

/// Without the token the same certificate is simply expired.
#[tokio::test]
async fn expired_certificate_without_token_fails() {
    let identity = signer_of_2020();
    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let envelope = signer
        .sign(&sample_descriptor(), SignOptions::default())
        .await
        .unwrap();

    let verifier = Verifier::builder()
        .roots(CertificatePool::from_certificates([&identity.cert]).unwrap())
        .build();
    match verifier.verify(&envelope) {
        Err(CoseError::CertExpired) => {}
        other => panic!("expected CertExpired, got {other:?}"),
    }
}

/// A stamped time outside the certificate window does not rescue the chain.
#[tokio::test]
async fn stamp_outside_validity_window_fails() {
    let identity = signer_of_2020();
    let tsa = TestTsa::new(Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap());

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let tsa_roots = tsa.roots();
    let options = SignOptions {
        tsa: Some(&tsa),
        tsa_roots: Some(&tsa_roots),
        ..Default::default()
    };
    let envelope = signer.sign(&sample_descriptor(), options).await.unwrap();

    let verifier = Verifier::builder()
        .roots(CertificatePool::from_certificates([&identity.cert]).unwrap())
        .tsa_roots(tsa.roots())
        .build();
    match verifier.verify(&envelope) {
        Err(CoseError::CertExpired) => {}
        other => panic!("expected CertExpired, got {other:?}"),
    }
}

/// Tokens with an accuracy above one minute are rejected already at sign
/// time, aborting the call.
#[tokio::test]
async fn excessive_accuracy_is_rejected() {
    let now = Utc::now().timestamp();
    let identity = self_signed_p256("signer.test", now - 3600, now + 3600);
    let mut tsa = TestTsa::new(Utc::now());
    tsa.accuracy_seconds = Some(120);

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let tsa_roots = tsa.roots();
    let options = SignOptions {
        tsa: Some(&tsa),
        tsa_roots: Some(&tsa_roots),
        ..Default::default()
    };
    match signer.sign(&sample_descriptor(), options).await {
        Err(CoseError::Timestamp(TimestampError::AccuracyExceeded { seconds })) => {
            assert_eq!(seconds, 120)
        }
        other => panic!("expected AccuracyExceeded, got {other:?}"),
    }
}

/// A rejection status from the TSA aborts the sign call.
#[tokio::test]
async fn tsa_rejection_aborts_signing() {
    let now = Utc::now().timestamp();
    let identity = self_signed_p256("signer.test", now - 3600, now + 3600);
    let mut tsa = TestTsa::new(Utc::now());
    tsa.reject = true;

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let options = SignOptions {
        tsa: Some(&tsa),
        ..Default::default()
    };
    match signer.sign(&sample_descriptor(), options).await {
        Err(CoseError::Timestamp(TimestampError::Rejected { .. })) => {}
        other => panic!("expected Rejected, got {other:?}"),
    }
}

/// A response nonce that differs from the request nonce is refused.
#[tokio::test]
async fn nonce_mismatch_aborts_signing() {
    let now = Utc::now().timestamp();
    let identity = self_signed_p256("signer.test", now - 3600, now + 3600);
    let mut tsa = TestTsa::new(Utc::now());
    tsa.wrong_nonce = true;

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let options = SignOptions {
        tsa: Some(&tsa),
        ..Default::default()
    };
    match signer.sign(&sample_descriptor(), options).await {
        Err(CoseError::Timestamp(TimestampError::NonceMismatch)) => {}
        other => panic!("expected NonceMismatch, got {other:?}"),
    }
}

/// Enforced expiry validation requires a token even for valid chains.
#[tokio::test]
async fn enforced_expiry_validation_requires_a_token() {
    let now = Utc::now().timestamp();
    let identity = self_signed_p256("signer.test", now - 3600, now + 3600);
    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let envelope = signer
        .sign(&sample_descriptor(), SignOptions::default())
        .await
        .unwrap();

    let verifier = Verifier::builder()
        .roots(CertificatePool::from_certificates([&identity.cert]).unwrap())
        .enforce_expiry_validation(true)
        .build();
    match verifier.verify(&envelope) {
        Err(CoseError::Timestamp(TimestampError::MissingToken)) => {}
        other => panic!("expected MissingToken, got {other:?}"),
    }
}

/// With a token present, enforced expiry validation passes on a valid chain.
#[tokio::test]
async fn enforced_expiry_validation_with_token_succeeds() {
    let now = Utc::now().timestamp();
    let identity = self_signed_p256("signer.test", now - 3600, now + 3600);
    let tsa = TestTsa::new(Utc::now());

    let signer = Signer::new(identity.key.clone(), &[identity.cert.clone()]).unwrap();
    let tsa_roots = tsa.roots();
    let options = SignOptions {
        tsa: Some(&tsa),
        tsa_roots: Some(&tsa_roots),
        ..Default::default()
    };
    let envelope = signer.sign(&sample_descriptor(), options).await.unwrap();

    let verifier = Verifier::builder()
        .roots(CertificatePool::from_certificates([&identity.cert]).unwrap())
        .tsa_roots(tsa.roots())
        .enforce_expiry_validation(true)
        .build();
    assert_eq!(verifier.verify(&envelope).unwrap(), sample_descriptor());
}
