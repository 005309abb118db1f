//! Manifest data model.
//!
//! A [`Manifest`] is the signed provenance record carried by an asset. Its
//! [`Claim`] is the signed core: it binds the asset content hash, hashed
//! references to every [`Assertion`] and the [`Ingredient`] list. Manifests are
//! immutable once signed; the signing pipeline always builds new ones.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::assertion::Assertion;
use crate::encoding::{base64_list, hex_bytes, option_hex_bytes};

/// Identifier of the content hash algorithm used in claims.
pub const HASH_ALG: &str = "sha3-256";

/// SHA3-256 digest of a byte slice.
pub fn digest(data: &[u8]) -> Vec<u8> {
    Sha3_256::digest(data).to_vec()
}

/// SHA3-256 digest of the concatenation of several slices.
pub fn digest_parts(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Half-open byte range `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub length: usize,
}

impl ByteRange {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Exclusive end offset. Saturates at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }
}

/// Signature algorithms accepted in claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningAlg {
    Es256,
    Es384,
    Es512,
    Ps256,
    Ps384,
    Ps512,
    Ed25519,
}

impl SigningAlg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Es256 => "es256",
            Self::Es384 => "es384",
            Self::Es512 => "es512",
            Self::Ps256 => "ps256",
            Self::Ps384 => "ps384",
            Self::Ps512 => "ps512",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for SigningAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "es256" => Ok(Self::Es256),
            "es384" => Ok(Self::Es384),
            "es512" => Ok(Self::Es512),
            "ps256" => Ok(Self::Ps256),
            "ps384" => Ok(Self::Ps384),
            "ps512" => Ok(Self::Ps512),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(format!("unsupported signing algorithm: {other}")),
        }
    }
}

/// How an ingredient relates to the manifest that lists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relationship {
    ParentOf,
    ComponentOf,
    InputTo,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "parentOf",
            Self::ComponentOf => "componentOf",
            Self::InputTo => "inputTo",
        }
    }
}

impl FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parentOf" => Ok(Self::ParentOf),
            "componentOf" => Ok(Self::ComponentOf),
            "inputTo" => Ok(Self::InputTo),
            other => Err(format!("unknown ingredient relationship: {other}")),
        }
    }
}

/// Hash binding the claim to the asset content (manifest segment excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetHash {
    pub alg: String,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
}

/// Claim-side reference to an assertion: its label and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedRef {
    pub label: String,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
}

/// Reference to a prior manifest (or a credential-less asset) this one was
/// derived from.
///
/// The referenced manifest, when present, is carried by identifier in the
/// same store; `manifest_hash` pins its canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingredient {
    pub title: String,
    pub relationship: Relationship,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "option_hex_bytes")]
    pub manifest_hash: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "option_hex_bytes")]
    pub asset_hash: Option<Vec<u8>>,
}

/// The signed core of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    pub claim_generator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub format: String,
    pub instance_id: String,
    pub created: DateTime<Utc>,
    pub signature_alg: SigningAlg,
    pub asset_hash: AssetHash,
    pub assertions: Vec<HashedRef>,
    pub ingredients: Vec<Ingredient>,
    /// Optional `x-` fields carried opaquely.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, ciborium::Value>,
}

/// Signature block: covers the claim bytes inside the encoded manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub alg: SigningAlg,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    /// DER certificates ordered leaf to root.
    #[serde(with = "base64_list")]
    pub cert_chain: Vec<Vec<u8>>,
    /// Location of the signed claim bytes within the encoded manifest.
    pub covered: ByteRange,
}

/// A signed provenance record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub id: String,
    pub claim: Claim,
    pub assertions: Vec<Assertion>,
    pub signature: Signature,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, ciborium::Value>,
}

impl Manifest {
    /// Look up an assertion by label.
    pub fn assertion(&self, label: &str) -> Option<&Assertion> {
        self.assertions.iter().find(|a| a.label == label)
    }

    /// The `parentOf` ingredient, if any.
    pub fn parent(&self) -> Option<&Ingredient> {
        self.claim
            .ingredients
            .iter()
            .find(|i| i.relationship == Relationship::ParentOf)
    }

    /// Identifiers of every manifest this one references through ingredients.
    pub fn ingredient_ids(&self) -> impl Iterator<Item = &str> {
        self.claim
            .ingredients
            .iter()
            .filter_map(|i| i.manifest_id.as_deref())
    }
}
