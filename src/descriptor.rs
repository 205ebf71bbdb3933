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

//! OCI-style content descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Media type of the signing payload carried in the envelope.
pub const MEDIA_TYPE_NOTATION_PAYLOAD: &str = "application/vnd.cncf.notary.v2.descriptor+json";

/// Describes the content signed or to be signed, and serves as the signing
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the targeted content.
    pub media_type: String,

    /// Digest of the targeted content, algorithm-prefixed per the OCI digest
    /// grammar.
    pub digest: String,

    /// Size of the blob in bytes.
    pub size: i64,

    /// Optional user-defined attributes. A `BTreeMap` keeps the JSON payload
    /// deterministic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: i64) -> Self {
        Descriptor {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations: None,
        }
    }
}
