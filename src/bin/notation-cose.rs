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

//! COSE plug-in for Notation.
//!
//! Each subcommand takes a single JSON request argument and writes its
//! result to stdout: the raw envelope bytes for `sign`, the verified
//! descriptor as JSON for `verify`.

use std::io::Write;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

use notation_cose::cose::{SignOptions, Signer, Verifier};
use notation_cose::crypto::timestamp::HttpTimestamper;
use notation_cose::crypto::{certificates_from_pem, CertificatePool, SigningKey};
use notation_cose::protocol::{SignRequest, VerifyRequest};

#[derive(Parser)]
#[command(name = "notation-cose")]
#[command(about = "COSE plugin for Notation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign artifacts in COSE
    Sign {
        /// JSON sign request
        request: String,
    },
    /// Verify OCI artifacts against COSE signatures
    Verify {
        /// JSON verify request
        request: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sign { request } => run_sign(&request).await,
        Commands::Verify { request } => run_verify(&request),
    };
    if let Err(error) = result {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run_sign(request: &str) -> Result<(), Box<dyn std::error::Error>> {
    let request: SignRequest = serde_json::from_str(request)?;
    let profile = request
        .kms_profile
        .signing_profile()
        .ok_or("missing signing key pair in kmsProfile.id")?;

    let key = SigningKey::from_pem(&std::fs::read(&profile.key_path)?)?;
    let chain = certificates_from_pem(&std::fs::read(&profile.cert_path)?)?;
    let signer = Signer::new(key, &chain)?;

    let tsa_endpoint = profile
        .tsa_endpoint
        .or_else(|| request.sign_options.tsa.clone());
    let timestamper = tsa_endpoint.map(HttpTimestamper::new);

    let options = SignOptions {
        expiry: request.sign_options.expiry,
        tsa: timestamper
            .as_ref()
            .map(|t| t as &dyn notation_cose::crypto::timestamp::Timestamper),
        tsa_roots: None,
        tsa_deadline: Some(std::time::Duration::from_secs(15)),
    };

    let envelope = signer.sign(&request.descriptor, options).await?;
    std::io::stdout().write_all(&envelope)?;
    Ok(())
}

fn run_verify(request: &str) -> Result<(), Box<dyn std::error::Error>> {
    let request: VerifyRequest = serde_json::from_str(request)?;
    let roots = CertificatePool::from_pem(&std::fs::read(&request.kms_profile.id)?)?;
    let verifier = Verifier::builder().roots(roots).build();

    let descriptor = verifier.verify(&request.signature)?;
    let out = serde_json::to_vec(&descriptor)?;
    std::io::stdout().write_all(&out)?;
    Ok(())
}
