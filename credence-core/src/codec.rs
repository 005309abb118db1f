//! Canonical CBOR encoding of manifests and the manifest store.
//!
//! Every map is text-keyed with fields written in a fixed order; integers use
//! minimal heads and all lengths are definite. The claim is carried as a byte
//! string so the signed bytes can be located exactly inside the encoded
//! manifest, and the decoder re-encodes it to reject non-canonical input.
//!
//! Unknown keys are rejected everywhere except on the manifest and the claim,
//! where keys starting with `x-` are kept opaquely and written back unchanged.

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, SecondsFormat, Utc};
use ciborium::value::Value;
use tracing::debug;

use crate::assertion::{Action, Assertion, AssertionData};
use crate::error::CodecError;
use crate::manifest::{
    AssetHash, ByteRange, Claim, HashedRef, Ingredient, Manifest, Signature, SigningAlg,
};

/// Version written in the store envelope.
pub const STORE_VERSION: u64 = 1;

/// Version written in every claim.
pub const CLAIM_VERSION: u64 = 1;

const EXTENSION_PREFIX: &str = "x-";

/// Decoded store envelope: the active manifest id and the raw encoding of
/// each manifest in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStore {
    pub active_manifest: String,
    pub manifests: Vec<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Store envelope
// ---------------------------------------------------------------------------

/// Encode the store envelope around already-encoded manifests.
pub fn encode_store<M: AsRef<[u8]>>(
    active_manifest: &str,
    manifests: &[M],
) -> Result<Vec<u8>, CodecError> {
    let value = MapBuilder::new()
        .uint("store_version", STORE_VERSION)
        .text("active_manifest", active_manifest)
        .put(
            "manifests",
            Value::Array(
                manifests
                    .iter()
                    .map(|m| Value::Bytes(m.as_ref().to_vec()))
                    .collect(),
            ),
        )
        .build();
    to_vec(&value)
}

/// Decode the store envelope. Manifests are returned undecoded.
pub fn decode_store(bytes: &[u8]) -> Result<RawStore, CodecError> {
    let mut fields = Fields::new(from_slice(bytes)?, "store")?;

    let version = fields.uint("store_version")?;
    if version != STORE_VERSION {
        return Err(CodecError::SchemaVersionUnsupported {
            found: version,
            supported: STORE_VERSION,
        });
    }
    let active_manifest = fields.text("active_manifest")?;
    let manifests = fields
        .array("manifests")?
        .into_iter()
        .map(|v| expect_bytes(v, "store", "manifests[]"))
        .collect::<Result<Vec<_>, _>>()?;
    fields.finish()?;

    debug!(
        active = %active_manifest,
        manifests = manifests.len(),
        "Decoded manifest store envelope"
    );

    Ok(RawStore {
        active_manifest,
        manifests,
    })
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Encode a manifest deterministically.
pub fn encode(manifest: &Manifest) -> Result<Vec<u8>, CodecError> {
    check_unique_labels(&manifest.assertions)?;
    check_extension_keys(&manifest.extensions)?;

    let claim = encode_claim(&manifest.claim)?;
    let assertions = manifest
        .assertions
        .iter()
        .map(assertion_value)
        .collect::<Result<Vec<_>, _>>()?;

    let value = MapBuilder::new()
        .text("label", &manifest.id)
        .put("claim", Value::Bytes(claim))
        .put("assertions", Value::Array(assertions))
        .put("signature", signature_value(&manifest.signature))
        .extensions(&manifest.extensions)
        .build();
    to_vec(&value)
}

/// Decode a manifest and check that its signature covers the claim bytes.
pub fn decode(bytes: &[u8]) -> Result<Manifest, CodecError> {
    let mut fields = Fields::new(from_slice(bytes)?, "manifest")?;

    let id = fields.text("label")?;
    let claim_bytes = fields.bytes("claim")?;
    let assertion_values = fields.array("assertions")?;
    let signature_value = fields.required("signature")?;
    let extensions = fields.finish_with_extensions()?;

    let wrap = |err: CodecError| err.in_manifest(id.as_str());

    let claim = decode_claim(&claim_bytes).map_err(wrap)?;
    let assertions = assertion_values
        .into_iter()
        .map(decode_assertion)
        .collect::<Result<Vec<_>, _>>()
        .map_err(wrap)?;
    check_unique_labels(&assertions).map_err(wrap)?;
    let signature = decode_signature(signature_value).map_err(wrap)?;

    let expected = claim_range(&id, claim_bytes.len(), extensions.len());
    if signature.covered != expected
        || bytes.get(expected.start..expected.end()) != Some(claim_bytes.as_slice())
    {
        return Err(wrap(CodecError::Malformed(format!(
            "signature covers {} bytes at {} but the claim occupies {} bytes at {}",
            signature.covered.length,
            signature.covered.start,
            expected.length,
            expected.start
        ))));
    }

    let manifest = Manifest {
        id: id.clone(),
        claim,
        assertions,
        signature,
        extensions,
    };
    if encode(&manifest)? != bytes {
        return Err(wrap(CodecError::NonCanonical(
            "manifest does not re-encode to the same bytes".into(),
        )));
    }
    Ok(manifest)
}

/// Byte range of the claim payload inside the encoding of a manifest.
///
/// The manifest map starts with `label` and `claim`, so the offset only
/// depends on the identifier, the claim length and the number of map entries.
pub fn claim_range(manifest_id: &str, claim_len: usize, extension_count: usize) -> ByteRange {
    let start = head_len(4 + extension_count)
        + text_len("label")
        + text_len(manifest_id)
        + text_len("claim")
        + head_len(claim_len);
    ByteRange::new(start, claim_len)
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// Canonical claim bytes; this is the signed payload.
pub fn encode_claim(claim: &Claim) -> Result<Vec<u8>, CodecError> {
    check_extension_keys(&claim.extensions)?;

    let assertions = claim
        .assertions
        .iter()
        .map(|r| {
            MapBuilder::new()
                .text("label", &r.label)
                .put("hash", Value::Bytes(r.hash.clone()))
                .build()
        })
        .collect();
    let ingredients = claim.ingredients.iter().map(ingredient_value).collect();

    let value = MapBuilder::new()
        .uint("claim_version", CLAIM_VERSION)
        .text("claim_generator", &claim.claim_generator)
        .opt("title", claim.title.as_ref().map(|t| Value::Text(t.clone())))
        .text("format", &claim.format)
        .text("instance_id", &claim.instance_id)
        .text("created", format_time(&claim.created))
        .text("signature_alg", claim.signature_alg.as_str())
        .put(
            "asset_hash",
            MapBuilder::new()
                .text("alg", &claim.asset_hash.alg)
                .put("hash", Value::Bytes(claim.asset_hash.hash.clone()))
                .build(),
        )
        .put("assertions", Value::Array(assertions))
        .put("ingredients", Value::Array(ingredients))
        .extensions(&claim.extensions)
        .build();
    to_vec(&value)
}

/// Decode claim bytes, rejecting any encoding that is not canonical.
pub fn decode_claim(bytes: &[u8]) -> Result<Claim, CodecError> {
    let mut fields = Fields::new(from_slice(bytes)?, "claim")?;

    let version = fields.uint("claim_version")?;
    if version != CLAIM_VERSION {
        return Err(CodecError::SchemaVersionUnsupported {
            found: version,
            supported: CLAIM_VERSION,
        });
    }

    let claim_generator = fields.text("claim_generator")?;
    let title = fields.opt_text("title")?;
    let format = fields.text("format")?;
    let instance_id = fields.text("instance_id")?;
    let created = parse_time(&fields.text("created")?)?;
    let signature_alg = parse_alg(&fields.text("signature_alg")?)?;

    let mut hash_fields = Fields::new(fields.required("asset_hash")?, "claim.asset_hash")?;
    let asset_hash = AssetHash {
        alg: hash_fields.text("alg")?,
        hash: hash_fields.bytes("hash")?,
    };
    hash_fields.finish()?;

    let assertions = fields
        .array("assertions")?
        .into_iter()
        .map(|v| {
            let mut f = Fields::new(v, "claim.assertions[]")?;
            let reference = HashedRef {
                label: f.text("label")?,
                hash: f.bytes("hash")?,
            };
            f.finish()?;
            Ok(reference)
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    let ingredients = fields
        .array("ingredients")?
        .into_iter()
        .map(decode_ingredient)
        .collect::<Result<Vec<_>, _>>()?;

    let extensions = fields.finish_with_extensions()?;

    let claim = Claim {
        claim_generator,
        title,
        format,
        instance_id,
        created,
        signature_alg,
        asset_hash,
        assertions,
        ingredients,
        extensions,
    };

    if encode_claim(&claim)? != bytes {
        return Err(CodecError::NonCanonical(
            "claim does not re-encode to the same bytes".into(),
        ));
    }
    Ok(claim)
}

fn ingredient_value(ingredient: &Ingredient) -> Value {
    MapBuilder::new()
        .text("title", &ingredient.title)
        .text("relationship", ingredient.relationship.as_str())
        .opt(
            "manifest",
            ingredient.manifest_id.as_ref().map(|m| Value::Text(m.clone())),
        )
        .opt(
            "manifest_hash",
            ingredient.manifest_hash.as_ref().map(|h| Value::Bytes(h.clone())),
        )
        .opt(
            "asset_hash",
            ingredient.asset_hash.as_ref().map(|h| Value::Bytes(h.clone())),
        )
        .build()
}

fn decode_ingredient(value: Value) -> Result<Ingredient, CodecError> {
    let mut fields = Fields::new(value, "claim.ingredients[]")?;
    let title = fields.text("title")?;
    let relationship = fields
        .text("relationship")?
        .parse()
        .map_err(CodecError::Malformed)?;
    let ingredient = Ingredient {
        title,
        relationship,
        manifest_id: fields.opt_text("manifest")?,
        manifest_hash: fields.opt_bytes("manifest_hash")?,
        asset_hash: fields.opt_bytes("asset_hash")?,
    };
    fields.finish()?;
    Ok(ingredient)
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

/// Canonical payload of a single assertion; its hash is what the claim pins.
pub fn encode_assertion(assertion: &Assertion) -> Result<Vec<u8>, CodecError> {
    to_vec(&assertion_value(assertion)?)
}

fn assertion_value(assertion: &Assertion) -> Result<Value, CodecError> {
    let data = match &assertion.data {
        AssertionData::Actions(actions) => {
            Value::Array(actions.iter().map(action_value).collect())
        }
        AssertionData::Thumbnail { format, image } => MapBuilder::new()
            .text("format", format)
            .put("image", Value::Bytes(image.clone()))
            .build(),
        AssertionData::Json(json) => Value::serialized(json)
            .map_err(|e| CodecError::Malformed(format!("json assertion: {e:?}")))?,
        AssertionData::Cbor(value) => value.clone(),
    };

    Ok(MapBuilder::new()
        .text("label", &assertion.label)
        .text("kind", assertion.data.kind())
        .put("data", data)
        .build())
}

fn action_value(action: &Action) -> Value {
    let opt_text = |v: &Option<String>| v.as_ref().map(|s| Value::Text(s.clone()));
    MapBuilder::new()
        .text("action", &action.action)
        .opt("softwareAgent", opt_text(&action.software_agent))
        .opt("digitalSourceType", opt_text(&action.digital_source_type))
        .opt("when", opt_text(&action.when))
        .build()
}

fn decode_assertion(value: Value) -> Result<Assertion, CodecError> {
    let mut fields = Fields::new(value, "assertion")?;
    let label = fields.text("label")?;
    let kind = fields.text("kind")?;
    let data = fields.required("data")?;
    fields.finish()?;

    let data = match kind.as_str() {
        "actions" => AssertionData::Actions(
            expect_array(data, "assertion", "data")?
                .into_iter()
                .map(decode_action)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        "thumbnail" => {
            let mut f = Fields::new(data, "assertion.thumbnail")?;
            let thumbnail = AssertionData::Thumbnail {
                format: f.text("format")?,
                image: f.bytes("image")?,
            };
            f.finish()?;
            thumbnail
        }
        "json" => AssertionData::Json(
            data.deserialized()
                .map_err(|e| CodecError::Malformed(format!("json assertion {label}: {e:?}")))?,
        ),
        "cbor" => AssertionData::Cbor(data),
        other => {
            return Err(CodecError::UnknownRequiredField(format!(
                "assertion kind `{other}`"
            )))
        }
    };

    Ok(Assertion { label, data })
}

fn decode_action(value: Value) -> Result<Action, CodecError> {
    let mut fields = Fields::new(value, "action")?;
    let action = Action {
        action: fields.text("action")?,
        software_agent: fields.opt_text("softwareAgent")?,
        digital_source_type: fields.opt_text("digitalSourceType")?,
        when: fields.opt_text("when")?,
    };
    fields.finish()?;
    Ok(action)
}

fn check_unique_labels(assertions: &[Assertion]) -> Result<(), CodecError> {
    for (i, assertion) in assertions.iter().enumerate() {
        if assertions[..i].iter().any(|a| a.label == assertion.label) {
            return Err(CodecError::DuplicateAssertion(assertion.label.clone()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

fn signature_value(signature: &Signature) -> Value {
    MapBuilder::new()
        .text("alg", signature.alg.as_str())
        .put("sig", Value::Bytes(signature.value.clone()))
        .put(
            "certs",
            Value::Array(
                signature
                    .cert_chain
                    .iter()
                    .map(|c| Value::Bytes(c.clone()))
                    .collect(),
            ),
        )
        .put(
            "covers",
            MapBuilder::new()
                .uint("start", signature.covered.start as u64)
                .uint("length", signature.covered.length as u64)
                .build(),
        )
        .build()
}

fn decode_signature(value: Value) -> Result<Signature, CodecError> {
    let mut fields = Fields::new(value, "signature")?;
    let alg = parse_alg(&fields.text("alg")?)?;
    let sig = fields.bytes("sig")?;
    let cert_chain = fields
        .array("certs")?
        .into_iter()
        .map(|c| expect_bytes(c, "signature", "certs[]"))
        .collect::<Result<Vec<_>, _>>()?;

    let mut covers = Fields::new(fields.required("covers")?, "signature.covers")?;
    let covered = ByteRange::new(covers.usize("start")?, covers.usize("length")?);
    covers.finish()?;
    fields.finish()?;

    Ok(Signature {
        alg,
        value: sig,
        cert_chain,
        covered,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_vec(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)
        .map_err(|e| CodecError::Malformed(format!("encode failed: {e:?}")))?;
    Ok(out)
}

/// Decode exactly one CBOR item; anything after it is an error.
fn from_slice(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut reader = bytes;
    let value: Value = ciborium::from_reader(&mut reader).map_err(|e| match e {
        ciborium::de::Error::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            CodecError::Truncated
        }
        other => CodecError::Malformed(format!("{other:?}")),
    })?;
    if !reader.is_empty() {
        return Err(CodecError::Malformed(format!(
            "{} trailing bytes after item",
            reader.len()
        )));
    }
    Ok(value)
}

/// Size of a CBOR head carrying argument `n`.
fn head_len(n: usize) -> usize {
    match n as u64 {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

fn text_len(s: &str) -> usize {
    head_len(s.len()) + s.len()
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CodecError::Malformed(format!("created `{s}`: {e}")))
}

fn parse_alg(s: &str) -> Result<SigningAlg, CodecError> {
    s.parse().map_err(CodecError::Malformed)
}

fn check_extension_keys(extensions: &BTreeMap<String, Value>) -> Result<(), CodecError> {
    match extensions.keys().find(|k| !k.starts_with(EXTENSION_PREFIX)) {
        Some(key) => Err(CodecError::UnknownRequiredField(key.clone())),
        None => Ok(()),
    }
}

fn expect_text(value: Value, ctx: &str, key: &str) -> Result<String, CodecError> {
    match value {
        Value::Text(s) => Ok(s),
        _ => Err(CodecError::Malformed(format!("{ctx}.{key} must be text"))),
    }
}

fn expect_bytes(value: Value, ctx: &str, key: &str) -> Result<Vec<u8>, CodecError> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(CodecError::Malformed(format!("{ctx}.{key} must be a byte string"))),
    }
}

fn expect_array(value: Value, ctx: &str, key: &str) -> Result<Vec<Value>, CodecError> {
    match value {
        Value::Array(a) => Ok(a),
        _ => Err(CodecError::Malformed(format!("{ctx}.{key} must be an array"))),
    }
}

/// Fields of a decoded map, consumed one by one.
struct Fields {
    ctx: &'static str,
    entries: Vec<(String, Value)>,
}

impl Fields {
    fn new(value: Value, ctx: &'static str) -> Result<Self, CodecError> {
        let Value::Map(map) = value else {
            return Err(CodecError::Malformed(format!("{ctx} must be a map")));
        };
        let mut entries: Vec<(String, Value)> = Vec::with_capacity(map.len());
        for (key, value) in map {
            let Value::Text(key) = key else {
                return Err(CodecError::Malformed(format!("{ctx} has a non-text key")));
            };
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(CodecError::Malformed(format!("{ctx} repeats key `{key}`")));
            }
            entries.push((key, value));
        }
        Ok(Self { ctx, entries })
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    fn required(&mut self, key: &str) -> Result<Value, CodecError> {
        self.take(key)
            .ok_or_else(|| CodecError::Malformed(format!("{} is missing `{key}`", self.ctx)))
    }

    fn text(&mut self, key: &str) -> Result<String, CodecError> {
        expect_text(self.required(key)?, self.ctx, key)
    }

    fn opt_text(&mut self, key: &str) -> Result<Option<String>, CodecError> {
        let ctx = self.ctx;
        self.take(key).map(|v| expect_text(v, ctx, key)).transpose()
    }

    fn bytes(&mut self, key: &str) -> Result<Vec<u8>, CodecError> {
        expect_bytes(self.required(key)?, self.ctx, key)
    }

    fn opt_bytes(&mut self, key: &str) -> Result<Option<Vec<u8>>, CodecError> {
        let ctx = self.ctx;
        self.take(key).map(|v| expect_bytes(v, ctx, key)).transpose()
    }

    fn array(&mut self, key: &str) -> Result<Vec<Value>, CodecError> {
        expect_array(self.required(key)?, self.ctx, key)
    }

    fn uint(&mut self, key: &str) -> Result<u64, CodecError> {
        match self.required(key)? {
            Value::Integer(i) => u64::try_from(i).map_err(|_| {
                CodecError::Malformed(format!("{}.{key} must be unsigned", self.ctx))
            }),
            _ => Err(CodecError::Malformed(format!(
                "{}.{key} must be an integer",
                self.ctx
            ))),
        }
    }

    fn usize(&mut self, key: &str) -> Result<usize, CodecError> {
        let n = self.uint(key)?;
        usize::try_from(n)
            .map_err(|_| CodecError::Malformed(format!("{}.{key} out of range", self.ctx)))
    }

    /// Every field must have been consumed.
    fn finish(self) -> Result<(), CodecError> {
        match self.entries.into_iter().next() {
            Some((key, _)) => Err(CodecError::UnknownRequiredField(format!(
                "{}.{key}",
                self.ctx
            ))),
            None => Ok(()),
        }
    }

    /// Remaining fields must be `x-` extensions; they are returned sorted.
    fn finish_with_extensions(self) -> Result<BTreeMap<String, Value>, CodecError> {
        let mut extensions = BTreeMap::new();
        for (key, value) in self.entries {
            if !key.starts_with(EXTENSION_PREFIX) {
                return Err(CodecError::UnknownRequiredField(format!(
                    "{}.{key}",
                    self.ctx
                )));
            }
            extensions.insert(key, value);
        }
        Ok(extensions)
    }
}

/// Builds a text-keyed map in insertion order.
struct MapBuilder(Vec<(Value, Value)>);

impl MapBuilder {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn put(mut self, key: &str, value: Value) -> Self {
        self.0.push((Value::Text(key.to_string()), value));
        self
    }

    fn text(self, key: &str, value: impl Into<String>) -> Self {
        self.put(key, Value::Text(value.into()))
    }

    fn uint(self, key: &str, value: u64) -> Self {
        self.put(key, Value::Integer(value.into()))
    }

    fn opt(self, key: &str, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.put(key, value),
            None => self,
        }
    }

    fn extensions(mut self, extensions: &BTreeMap<String, Value>) -> Self {
        for (key, value) in extensions {
            self.0.push((Value::Text(key.clone()), value.clone()));
        }
        self
    }

    fn build(self) -> Value {
        Value::Map(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::ACTION_CREATED;
    use crate::manifest::{Relationship, HASH_ALG};
    use chrono::TimeZone;

    fn sample_manifest() -> Manifest {
        let assertions = vec![
            Assertion::actions(vec![
                Action::new(ACTION_CREATED).with_software_agent("codec-test")
            ]),
            Assertion::json("stds.schema-org.CreativeWork", serde_json::json!({"author": "Ada"})),
        ];
        let claim = Claim {
            claim_generator: "codec-test/1.0".into(),
            title: Some("photo.jpg".into()),
            format: "image/jpeg".into(),
            instance_id: "xmp:iid:0000".into(),
            created: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            signature_alg: SigningAlg::Es256,
            asset_hash: AssetHash {
                alg: HASH_ALG.into(),
                hash: vec![0xAB; 32],
            },
            assertions: assertions
                .iter()
                .map(|a| HashedRef {
                    label: a.label.clone(),
                    hash: a.hash().unwrap(),
                })
                .collect(),
            ingredients: vec![Ingredient {
                title: "parent.jpg".into(),
                relationship: Relationship::ParentOf,
                manifest_id: Some("urn:uuid:parent".into()),
                manifest_hash: Some(vec![1; 32]),
                asset_hash: None,
            }],
            extensions: BTreeMap::new(),
        };
        let id = "urn:uuid:child".to_string();
        let claim_len = encode_claim(&claim).unwrap().len();
        Manifest {
            signature: Signature {
                alg: SigningAlg::Es256,
                value: vec![7; 64],
                cert_chain: vec![vec![0x30, 0x82], vec![0x30, 0x83]],
                covered: claim_range(&id, claim_len, 0),
            },
            id,
            claim,
            assertions,
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn test_manifest_round_trip_is_deterministic() {
        let manifest = sample_manifest();
        let bytes = encode(&manifest).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, manifest);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_covered_range_points_at_claim_bytes() {
        let manifest = sample_manifest();
        let bytes = encode(&manifest).unwrap();
        let claim = encode_claim(&manifest.claim).unwrap();
        let range = manifest.signature.covered;

        assert_eq!(&bytes[range.start..range.end()], claim.as_slice());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = encode(&sample_manifest()).unwrap();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err, CodecError::Truncated);
        assert_eq!(decode(&[]).unwrap_err(), CodecError::Truncated);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample_manifest()).unwrap();
        bytes.push(0x00);
        assert!(matches!(decode(&bytes), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_extensions_survive_round_trip() {
        let mut manifest = sample_manifest();
        manifest
            .extensions
            .insert("x-vendor".into(), Value::Text("kept".into()));
        let claim_len = encode_claim(&manifest.claim).unwrap().len();
        manifest.signature.covered = claim_range(&manifest.id, claim_len, 1);

        let bytes = encode(&manifest).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.extensions.get("x-vendor"), Some(&Value::Text("kept".into())));
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_out_of_order_extensions_rejected() {
        let mut manifest = sample_manifest();
        manifest.extensions.insert("x-a".into(), Value::Integer(1.into()));
        manifest.extensions.insert("x-b".into(), Value::Integer(2.into()));
        let claim_len = encode_claim(&manifest.claim).unwrap().len();
        manifest.signature.covered = claim_range(&manifest.id, claim_len, 2);
        let bytes = encode(&manifest).unwrap();

        let Value::Map(mut entries) = from_slice(&bytes).unwrap() else {
            panic!("manifest is a map");
        };
        let last = entries.len() - 1;
        entries.swap(last - 1, last);
        let shuffled = to_vec(&Value::Map(entries)).unwrap();

        assert!(matches!(
            decode(&shuffled),
            Err(CodecError::InManifest { .. })
        ));
    }

    #[test]
    fn test_overflowing_covered_range_is_an_error() {
        let mut manifest = sample_manifest();
        manifest.signature.covered = ByteRange::new(usize::MAX, 10);
        let bytes = encode(&manifest).unwrap();

        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut manifest = sample_manifest();
        manifest
            .extensions
            .insert("vendor".into(), Value::Bool(true));
        assert!(matches!(
            encode(&manifest),
            Err(CodecError::UnknownRequiredField(_))
        ));
    }

    #[test]
    fn test_unknown_assertion_kind_rejected() {
        let value = MapBuilder::new()
            .text("label", "org.example")
            .text("kind", "hologram")
            .put("data", Value::Null)
            .build();
        assert!(matches!(
            decode_assertion(value),
            Err(CodecError::UnknownRequiredField(_))
        ));
    }

    #[test]
    fn test_duplicate_assertion_rejected() {
        let mut manifest = sample_manifest();
        manifest.assertions.push(manifest.assertions[0].clone());
        assert_eq!(
            encode(&manifest).unwrap_err(),
            CodecError::DuplicateAssertion("c2pa.actions".into())
        );
    }

    #[test]
    fn test_store_version_checked() {
        let value = MapBuilder::new()
            .uint("store_version", 9)
            .text("active_manifest", "urn:uuid:x")
            .put("manifests", Value::Array(vec![]))
            .build();
        let bytes = to_vec(&value).unwrap();
        assert_eq!(
            decode_store(&bytes).unwrap_err(),
            CodecError::SchemaVersionUnsupported {
                found: 9,
                supported: STORE_VERSION
            }
        );
    }

    #[test]
    fn test_store_round_trip() {
        let bytes = encode_store("urn:uuid:a", &[vec![1u8, 2], vec![3]]).unwrap();
        let store = decode_store(&bytes).unwrap();
        assert_eq!(store.active_manifest, "urn:uuid:a");
        assert_eq!(store.manifests, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_non_canonical_claim_rejected() {
        let claim = sample_manifest().claim;
        let bytes = encode_claim(&claim).unwrap();

        // Re-encode the same claim map with the first two fields swapped.
        let Value::Map(mut entries) = from_slice(&bytes).unwrap() else {
            panic!("claim is a map");
        };
        entries.swap(0, 1);
        let shuffled = to_vec(&Value::Map(entries)).unwrap();

        assert!(matches!(
            decode_claim(&shuffled),
            Err(CodecError::NonCanonical(_))
        ));
    }

    #[test]
    fn test_head_len_boundaries() {
        assert_eq!(head_len(23), 1);
        assert_eq!(head_len(24), 2);
        assert_eq!(head_len(255), 2);
        assert_eq!(head_len(256), 3);
        assert_eq!(head_len(65_536), 5);
    }
}
