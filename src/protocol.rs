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

//! The JSON request contract between the enclosing CLI and this plug-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// A named KMS key profile.
///
/// For signing, `id` is a colon-delimited `<keyPath>:<certPath>[:<tsaEndpoint>]`
/// triple; for verification it is the path to a PEM bundle of trusted roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KmsProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin_name: String,
    pub id: String,
}

/// The request to sign an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub version: String,
    pub descriptor: Descriptor,
    #[serde(default)]
    pub sign_options: SignRequestOptions,
    pub kms_profile: KmsProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// TSA endpoint URL; the third element of the KMS profile triple takes
    /// precedence when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsa: Option<String>,
}

/// The request to verify a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub version: String,
    /// The envelope bytes, base64-encoded in JSON.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub verify_options: VerifyRequestOptions,
    pub kms_profile: KmsProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestOptions {}

/// Byte slices travel base64-encoded in JSON, the way Go marshals `[]byte`.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The parsed form of a signing KMS profile id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningProfile {
    pub key_path: String,
    pub cert_path: String,
    pub tsa_endpoint: Option<String>,
}

impl KmsProfile {
    /// Split a signing profile id into key path, certificate path, and the
    /// optional TSA endpoint.
    pub fn signing_profile(&self) -> Option<SigningProfile> {
        let mut parts = self.id.splitn(3, ':');
        let key_path = parts.next()?.to_string();
        let cert_path = parts.next()?.to_string();
        if key_path.is_empty() || cert_path.is_empty() {
            return None;
        }
        let tsa_endpoint = parts
            .next()
            .filter(|endpoint| !endpoint.is_empty())
            .map(str::to_string);
        Some(SigningProfile {
            key_path,
            cert_path,
            tsa_endpoint,
        })
    }
}
