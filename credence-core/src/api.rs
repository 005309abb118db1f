//! File-level JSON API used by the CLI and the C boundary.
//!
//! Inputs and outputs are JSON so that foreign callers only ever exchange
//! strings. Results are wrapped in a [`Response`] envelope:
//! `{"ok": ...}` on success, `{"error": {"code", "message"}}` otherwise.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::assertion::{Action, Assertion, AssertionData, ACTIONS_LABEL};
use crate::codec;
use crate::config::Settings;
use crate::container::{self, AssetFormat};
use crate::encoding::{base64_bytes, hex_bytes, option_hex_bytes};
use crate::error::{ContainerError, CredenceError, Result, StoreError};
use crate::manifest::{digest, Relationship, SigningAlg};
use crate::pipeline::{IngredientInput, SigningPipeline};
use crate::signer::{PemSigner, Signer};
use crate::store::ManifestStore;
use crate::trust::TrustEvaluator;

/// Validation state reported for assets that carry no manifest.
pub const NO_MANIFEST_STATE: &str = "NoManifest";

/// File name of the store bytes written by [`ingredient_from_path`].
pub const MANIFEST_DATA_FILE: &str = "manifest_store.crd";

/// Library name and version, e.g. `credence-core/0.1.0`.
pub fn version() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// MIME types of the formats that can carry an embedded store.
pub fn supported_formats() -> Vec<&'static str> {
    [AssetFormat::Jpeg, AssetFormat::Png]
        .iter()
        .map(AssetFormat::mime_type)
        .collect()
}

/// Caller description of the manifest to add.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDefinition {
    pub claim_generator: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub assertions: Vec<AssertionDefinition>,
    #[serde(default)]
    pub ingredients: Vec<IngredientDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertionDefinition {
    pub label: String,
    /// `actions`, `thumbnail`, `json` or `cbor`. Inferred from the label
    /// when absent.
    #[serde(default)]
    pub kind: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngredientDefinition {
    pub title: String,
    #[serde(default = "default_relationship")]
    pub relationship: Relationship,
    /// Ingredient asset, relative to the source asset's directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Manifest already present in the source asset's store.
    #[serde(default)]
    pub manifest_id: Option<String>,
}

fn default_relationship() -> Relationship {
    Relationship::ComponentOf
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionsData {
    Wrapped { actions: Vec<Action> },
    List(Vec<Action>),
    Single(Action),
}

#[derive(Deserialize)]
struct ThumbnailData {
    format: String,
    #[serde(with = "base64_bytes")]
    image: Vec<u8>,
}

impl AssertionDefinition {
    fn into_assertion(self) -> Result<Assertion> {
        let kind = self.kind.clone().unwrap_or_else(|| {
            if self.label == ACTIONS_LABEL {
                "actions".to_string()
            } else {
                "json".to_string()
            }
        });
        let invalid = |e: serde_json::Error| {
            CredenceError::InvalidDefinition(format!("assertion {}: {e}", self.label))
        };

        match kind.as_str() {
            "actions" => {
                let actions = match serde_json::from_value(self.data.clone()).map_err(invalid)? {
                    ActionsData::Wrapped { actions } | ActionsData::List(actions) => actions,
                    ActionsData::Single(action) => vec![action],
                };
                let mut assertion = Assertion::actions(actions);
                assertion.label = self.label;
                Ok(assertion)
            }
            "thumbnail" => {
                let thumb: ThumbnailData =
                    serde_json::from_value(self.data.clone()).map_err(invalid)?;
                let mut assertion = Assertion::thumbnail(thumb.format, thumb.image);
                assertion.label = self.label;
                Ok(assertion)
            }
            "json" => Ok(Assertion::json(self.label, self.data)),
            "cbor" => {
                let value = ciborium::Value::serialized(&self.data).map_err(|e| {
                    CredenceError::InvalidDefinition(format!("assertion {}: {e:?}", self.label))
                })?;
                Ok(Assertion::cbor(self.label, value))
            }
            other => Err(CredenceError::InvalidDefinition(format!(
                "assertion {}: unknown kind `{other}`",
                self.label
            ))),
        }
    }
}

impl IngredientDefinition {
    fn into_input(self, base: &Path) -> Result<IngredientInput> {
        match (self.path, self.manifest_id) {
            (Some(path), _) => {
                let path = base.join(path);
                let bytes = std::fs::read(&path)?;
                Ok(IngredientInput::Asset {
                    title: self.title,
                    bytes,
                    relationship: self.relationship,
                })
            }
            (None, Some(manifest_id)) => Ok(IngredientInput::Reference {
                manifest_id,
                title: self.title,
                relationship: self.relationship,
            }),
            (None, None) => Err(CredenceError::InvalidDefinition(format!(
                "ingredient {} needs a path or a manifest_id",
                self.title
            ))),
        }
    }
}

/// Signing credentials. `signcert` and `pkey` are PEM text or paths to PEM
/// files.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct SignerInfo {
    pub signcert: String,
    pub pkey: String,
    pub alg: String,
}

impl std::fmt::Debug for SignerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerInfo")
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SignerInfo {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn alg(&self) -> Result<SigningAlg> {
        self.alg.parse().map_err(CredenceError::InvalidDefinition)
    }

    pub fn signer(&self) -> Result<PemSigner> {
        let signcert = pem_or_file(&self.signcert)?;
        let pkey = zeroize::Zeroizing::new(pem_or_file(&self.pkey)?);
        Ok(PemSigner::from_pem(&pkey, &signcert, self.alg()?)?)
    }
}

fn pem_or_file(value: &str) -> Result<Vec<u8>> {
    if value.contains("-----BEGIN") {
        Ok(value.as_bytes().to_vec())
    } else {
        Ok(std::fs::read(value)?)
    }
}

/// Options for [`add_manifest`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddManifestOptions {
    /// Write the store to `<dest>.crd` instead of embedding it.
    #[serde(default)]
    pub sidecar: bool,
}

/// Summary of a successful [`add_manifest`].
#[derive(Debug, Clone, Serialize)]
pub struct AddManifestOutcome {
    pub manifest_id: String,
    pub dest: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<PathBuf>,
    pub store_size: usize,
}

fn load_store(path: &Path, asset: &[u8]) -> Result<Option<ManifestStore>> {
    let unsupported = match ManifestStore::parse(asset) {
        Ok(store) => return Ok(Some(store)),
        Err(StoreError::NoManifest) => false,
        Err(StoreError::Container(ContainerError::UnsupportedFormat)) => true,
        Err(e) => return Err(e.into()),
    };

    let sidecar = container::sidecar_path(path);
    if sidecar.exists() {
        debug!(sidecar = %sidecar.display(), "Reading sidecar manifest store");
        let store_bytes = std::fs::read(&sidecar)?;
        return Ok(Some(ManifestStore::from_sidecar(asset, &store_bytes)?));
    }
    if unsupported {
        return Err(ContainerError::UnsupportedFormat.into());
    }
    Ok(None)
}

/// Whether the asset at `path` carries a parsable manifest store, embedded
/// or in a sidecar.
pub fn has_manifest(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    std::fs::read(path)
        .ok()
        .and_then(|asset| load_store(path, &asset).ok())
        .flatten()
        .is_some()
}

/// A file written next to an ingredient description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub format: String,
    /// File name inside the data directory.
    pub identifier: String,
}

/// Description of an asset about to be used as an ingredient.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientInfo {
    pub title: String,
    pub format: String,
    #[serde(with = "hex_bytes")]
    pub asset_hash: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "option_hex_bytes")]
    pub manifest_hash: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_data: Option<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ResourceRef>,
}

/// Describe the asset at `path` as an ingredient.
///
/// When the asset carries a store, the store bytes and the active manifest's
/// thumbnail (if any) are written into `data_dir`, which is created as
/// needed. Assets in an unknown format without a sidecar are described by
/// their digest alone.
pub fn ingredient_from_path(
    path: impl AsRef<Path>,
    data_dir: impl AsRef<Path>,
) -> Result<IngredientInfo> {
    let (path, data_dir) = (path.as_ref(), data_dir.as_ref());
    let asset = std::fs::read(path)?;

    let store = match load_store(path, &asset) {
        Ok(store) => store,
        Err(CredenceError::Container(ContainerError::UnsupportedFormat)) => None,
        Err(e) => return Err(e),
    };

    let mut info = IngredientInfo {
        title: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: container::detect(&asset)
            .map_or("application/octet-stream", |f| f.mime_type())
            .to_string(),
        asset_hash: container::content_digest(&asset)?,
        active_manifest: None,
        manifest_hash: None,
        manifest_data: None,
        thumbnail: None,
    };

    let Some(store) = store else {
        debug!(path = %path.display(), "Ingredient carries no manifest");
        return Ok(info);
    };

    std::fs::create_dir_all(data_dir)?;
    let active = store.active_manifest();
    info.active_manifest = Some(active.id.clone());
    info.manifest_hash = store.raw(&active.id).map(digest);

    write_atomic(&data_dir.join(MANIFEST_DATA_FILE), &store.to_bytes()?)?;
    info.manifest_data = Some(ResourceRef {
        format: "application/cbor".to_string(),
        identifier: MANIFEST_DATA_FILE.to_string(),
    });

    let thumbnail = active.assertions.iter().find_map(|a| match &a.data {
        AssertionData::Thumbnail { format, image } => Some((format, image)),
        _ => None,
    });
    if let Some((format, image)) = thumbnail {
        let identifier = thumbnail_file_name(format);
        write_atomic(&data_dir.join(&identifier), image)?;
        info.thumbnail = Some(ResourceRef {
            format: format.clone(),
            identifier,
        });
    }

    info!(
        path = %path.display(),
        manifest = %active.id,
        data_dir = %data_dir.display(),
        "Described ingredient"
    );
    Ok(info)
}

/// `thumbnail.<subtype>`, keeping only alphanumerics of the MIME subtype.
fn thumbnail_file_name(format: &str) -> String {
    let ext: String = format
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if ext.is_empty() {
        "thumbnail.bin".to_string()
    } else {
        format!("thumbnail.{ext}")
    }
}

/// Parse and verify the asset at `path`.
///
/// Returns `{active_manifest, manifests, validation_state, validation}`.
/// An asset without a manifest is not an error: it yields
/// `validation_state: "NoManifest"` and no manifests.
pub fn verify_from_path(
    path: impl AsRef<Path>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Value> {
    let path = path.as_ref();
    let asset = std::fs::read(path)?;

    let Some(store) = load_store(path, &asset)? else {
        info!(path = %path.display(), "Asset carries no manifest");
        return Ok(json!({
            "active_manifest": null,
            "manifests": {},
            "validation_state": NO_MANIFEST_STATE,
        }));
    };

    let anchors = settings.load_anchors()?;
    let evaluator = TrustEvaluator::new(&anchors, now).with_trust_check(settings.verify_trust);
    let report = store.verify_with(&evaluator);

    let manifests = store
        .manifests()
        .map(|m| Ok((m.id.clone(), serde_json::to_value(m)?)))
        .collect::<Result<serde_json::Map<String, Value>>>()?;

    Ok(json!({
        "active_manifest": report.active_manifest,
        "manifests": manifests,
        "validation_state": report.status,
        "validation": report.manifests,
    }))
}

/// Sign `source` with the manifest described by `manifest_json` and write the
/// result to `dest` (or the store to `<dest>.crd` in sidecar mode).
pub fn add_manifest(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    manifest_json: &str,
    signer_info_json: &str,
    options: &AddManifestOptions,
    settings: &Settings,
) -> Result<AddManifestOutcome> {
    let definition: ManifestDefinition = serde_json::from_str(manifest_json)?;
    let signer = SignerInfo::from_json(signer_info_json)?.signer()?;
    add_manifest_with(source, dest, definition, &signer, options, settings)
}

/// [`add_manifest`] with an already-parsed definition and any [`Signer`].
pub fn add_manifest_with(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    definition: ManifestDefinition,
    signer: &dyn Signer,
    options: &AddManifestOptions,
    settings: &Settings,
) -> Result<AddManifestOutcome> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let asset = std::fs::read(source)?;

    let base = source.parent().unwrap_or_else(|| Path::new("."));
    let assertions = definition
        .assertions
        .into_iter()
        .map(AssertionDefinition::into_assertion)
        .collect::<Result<Vec<_>>>()?;
    let ingredients = definition
        .ingredients
        .into_iter()
        .map(|i| i.into_input(base))
        .collect::<Result<Vec<_>>>()?;

    let mut pipeline = SigningPipeline::new(definition.claim_generator)
        .with_max_store_size(settings.max_store_size);
    if let Some(title) = definition.title {
        pipeline = pipeline.with_title(title);
    }
    if let Some(format) = definition.format {
        pipeline = pipeline.with_format(format);
    }

    let (store_bytes, sidecar) = if options.sidecar {
        let existing_path = container::sidecar_path(source);
        let existing = if existing_path.exists() {
            Some(std::fs::read(&existing_path)?)
        } else {
            None
        };
        let store =
            pipeline.build_store(&asset, existing.as_deref(), assertions, ingredients, signer)?;

        let sidecar = container::sidecar_path(dest);
        if source != dest {
            write_atomic(dest, &asset)?;
        }
        write_atomic(&sidecar, &store)?;
        (store, Some(sidecar))
    } else {
        let signed = pipeline.sign(&asset, assertions, ingredients, signer)?;
        write_atomic(dest, &signed)?;
        (container::extract(&signed)?, None)
    };

    let manifest_id = codec::decode_store(&store_bytes)?.active_manifest;
    info!(
        manifest = %manifest_id,
        dest = %dest.display(),
        sidecar = options.sidecar,
        "Added manifest"
    );

    Ok(AddManifestOutcome {
        manifest_id,
        dest: dest.to_path_buf(),
        sidecar,
        store_size: store_bytes.len(),
    })
}

/// Write through a temporary file in the destination directory, then
/// rename over the destination.
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dest.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let failure = |e: std::io::Error| {
        CredenceError::Container(ContainerError::WriteFailure(format!(
            "{}: {e}",
            dest.display()
        )))
    };

    std::fs::write(&tmp, bytes).map_err(failure)?;
    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(failure(e));
    }
    Ok(())
}

/// Boundary error: a stable code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&CredenceError> for ErrorEnvelope {
    fn from(err: &CredenceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// JSON result envelope returned across the boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Value),
    Error(ErrorEnvelope),
}

impl Response {
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(value) => Self::Ok(value),
                Err(e) => Self::Error(ErrorEnvelope::new("INTERNAL_ERROR", e.to_string())),
            },
            Err(err) => Self::Error(ErrorEnvelope::from(&err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Serialized envelope; always valid JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"error":{"code":"INTERNAL_ERROR","message":"response serialization failed"}}"#
                .to_string()
        })
    }
}
