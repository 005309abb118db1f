//! Assertion kinds carried by a manifest.
//!
//! Assertions are a closed set of variants so that every consumer can match
//! them exhaustively. Each assertion has a stable label and a canonical byte
//! payload (see [`crate::codec::encode_assertion`]) whose hash is recorded in
//! the claim.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::encoding::base64_bytes;
use crate::error::CodecError;
use crate::manifest::digest;

/// Label of the actions assertion.
pub const ACTIONS_LABEL: &str = "c2pa.actions";

/// Label prefix of claim thumbnails; the file extension follows.
pub const THUMBNAIL_LABEL_PREFIX: &str = "c2pa.thumbnail.claim";

/// Action recorded as created.
pub const ACTION_CREATED: &str = "c2pa.created";

/// Action recorded when an existing asset is edited and re-signed.
pub const ACTION_OPENED: &str = "c2pa.opened";

/// One entry of the actions assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action: String,
    #[serde(
        rename = "softwareAgent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub software_agent: Option<String>,
    #[serde(
        rename = "digitalSourceType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub digital_source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl Action {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            software_agent: None,
            digital_source_type: None,
            when: None,
        }
    }

    pub fn with_software_agent(mut self, agent: impl Into<String>) -> Self {
        self.software_agent = Some(agent.into());
        self
    }
}

/// Typed assertion payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum AssertionData {
    /// Actions taken on the asset (`c2pa.actions`).
    Actions(Vec<Action>),
    /// Claim thumbnail image.
    Thumbnail {
        format: String,
        #[serde(with = "base64_bytes")]
        image: Vec<u8>,
    },
    /// JSON metadata (schema.org, EXIF, custom).
    Json(serde_json::Value),
    /// Opaque CBOR payload.
    Cbor(ciborium::Value),
}

impl AssertionData {
    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Actions(_) => "actions",
            Self::Thumbnail { .. } => "thumbnail",
            Self::Json(_) => "json",
            Self::Cbor(_) => "cbor",
        }
    }
}

/// A labelled assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assertion {
    pub label: String,
    #[serde(flatten)]
    pub data: AssertionData,
}

impl Assertion {
    pub fn actions(actions: Vec<Action>) -> Self {
        Self {
            label: ACTIONS_LABEL.to_string(),
            data: AssertionData::Actions(actions),
        }
    }

    /// Claim thumbnail; the label is derived from the MIME type.
    pub fn thumbnail(format: impl Into<String>, image: Vec<u8>) -> Self {
        let format = format.into();
        let ext = format.rsplit('/').next().unwrap_or("bin").to_string();
        Self {
            label: format!("{THUMBNAIL_LABEL_PREFIX}.{ext}"),
            data: AssertionData::Thumbnail { format, image },
        }
    }

    pub fn json(label: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            data: AssertionData::Json(value),
        }
    }

    pub fn cbor(label: impl Into<String>, value: ciborium::Value) -> Self {
        Self {
            label: label.into(),
            data: AssertionData::Cbor(value),
        }
    }

    /// Canonical byte payload.
    pub fn payload(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode_assertion(self)
    }

    /// Content hash of the canonical payload.
    pub fn hash(&self) -> Result<Vec<u8>, CodecError> {
        Ok(digest(&self.payload()?))
    }

    /// Actions, when this is an actions assertion.
    pub fn as_actions(&self) -> Option<&[Action]> {
        match &self.data {
            AssertionData::Actions(actions) => Some(actions),
            _ => None,
        }
    }
}
