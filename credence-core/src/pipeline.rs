//! Manifest construction and signing.
//!
//! The pipeline builds a new manifest for an asset, signs its canonical claim
//! bytes and embeds the resulting store. Manifests already carried by the
//! asset or by ingredient assets are copied into the new store byte for byte;
//! signed manifests are never modified.

use chrono::{DateTime, Utc};
use openssl::x509::X509;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assertion::Assertion;
use crate::codec;
use crate::container;
use crate::crypto;
use crate::error::{ContainerError, SignError, StoreError};
use crate::manifest::{
    digest, AssetHash, Claim, HashedRef, Ingredient, Manifest, Relationship, Signature,
    SigningAlg, HASH_ALG,
};
use crate::signer::Signer;
use crate::store::ManifestStore;

/// MIME type used when the asset format is not recognised (sidecar mode).
pub const OCTET_STREAM: &str = "application/octet-stream";

/// An ingredient supplied by the caller.
#[derive(Debug, Clone)]
pub enum IngredientInput {
    /// A manifest already present in the asset's store, or brought in by an
    /// ingredient asset. Unknown identifiers are recorded as given.
    Reference {
        manifest_id: String,
        title: String,
        relationship: Relationship,
    },
    /// Another asset. Its store, if any, is merged into the new store.
    Asset {
        title: String,
        bytes: Vec<u8>,
        relationship: Relationship,
    },
}

/// Builds and signs manifests.
#[derive(Debug, Clone)]
pub struct SigningPipeline {
    claim_generator: String,
    title: Option<String>,
    format: Option<String>,
    created: Option<DateTime<Utc>>,
    max_store_size: usize,
}

/// Manifests collected for the new store, in discovery order.
#[derive(Default)]
struct Collected {
    manifests: Vec<(Manifest, Vec<u8>)>,
}

impl Collected {
    fn raw(&self, id: &str) -> Option<&[u8]> {
        self.manifests
            .iter()
            .find(|(m, _)| m.id == id)
            .map(|(_, raw)| raw.as_slice())
    }

    /// Copy every manifest of `store`; an identifier already present must
    /// carry identical bytes.
    fn merge(&mut self, store: &ManifestStore) -> Result<(), SignError> {
        for manifest in store.manifests() {
            let raw = store.raw(&manifest.id).unwrap_or_default();
            match self.raw(&manifest.id) {
                Some(existing) if existing == raw => {}
                Some(_) => return Err(SignError::ConflictingManifest(manifest.id.clone())),
                None => self.manifests.push((manifest.clone(), raw.to_vec())),
            }
        }
        Ok(())
    }
}

impl SigningPipeline {
    pub fn new(claim_generator: impl Into<String>) -> Self {
        Self {
            claim_generator: claim_generator.into(),
            title: None,
            format: None,
            created: None,
            max_store_size: usize::MAX,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Override the MIME type otherwise detected from the asset.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Fix the claim creation time (defaults to the time of signing).
    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_max_store_size(mut self, max: usize) -> Self {
        self.max_store_size = max;
        self
    }

    /// Sign `asset` and return a new asset with the store embedded.
    ///
    /// Any store already embedded is carried forward and its active manifest
    /// becomes the `parentOf` ingredient unless the caller supplies one.
    pub fn sign(
        &self,
        asset: &[u8],
        assertions: Vec<Assertion>,
        ingredients: Vec<IngredientInput>,
        signer: &dyn Signer,
    ) -> Result<Vec<u8>, SignError> {
        let format = container::detect(asset).ok_or(ContainerError::UnsupportedFormat)?;
        let existing = match ManifestStore::parse(asset) {
            Ok(store) => Some(store),
            Err(StoreError::NoManifest) => None,
            Err(e) => return Err(e.into()),
        };

        let asset_digest = container::content_digest(asset)?;
        let store = self.assemble(
            asset_digest,
            format.mime_type(),
            existing.as_ref(),
            assertions,
            ingredients,
            signer,
        )?;

        Ok(container::embed_with_limit(asset, &store, self.max_store_size)?)
    }

    /// Sign `asset` without modifying it and return the store bytes to be
    /// written as a sidecar. `existing` is a previous sidecar store, if any.
    pub fn build_store(
        &self,
        asset: &[u8],
        existing: Option<&[u8]>,
        assertions: Vec<Assertion>,
        ingredients: Vec<IngredientInput>,
        signer: &dyn Signer,
    ) -> Result<Vec<u8>, SignError> {
        let existing = existing
            .map(|bytes| ManifestStore::from_sidecar(asset, bytes))
            .transpose()?;
        let format = container::detect(asset).map_or(OCTET_STREAM, |f| f.mime_type());
        let asset_digest = container::content_digest(asset)?;

        let store = self.assemble(
            asset_digest,
            format,
            existing.as_ref(),
            assertions,
            ingredients,
            signer,
        )?;
        if store.len() > self.max_store_size {
            return Err(ContainerError::NoSpace {
                size: store.len(),
                max: self.max_store_size,
            }
            .into());
        }
        Ok(store)
    }

    fn assemble(
        &self,
        asset_digest: Vec<u8>,
        detected_format: &str,
        existing: Option<&ManifestStore>,
        assertions: Vec<Assertion>,
        inputs: Vec<IngredientInput>,
        signer: &dyn Signer,
    ) -> Result<Vec<u8>, SignError> {
        let alg = signer.alg();
        let cert_chain = signer.certs()?;
        check_signing_key(alg, &cert_chain)?;

        let mut collected = Collected::default();
        if let Some(store) = existing {
            collected.merge(store)?;
        }

        let mut ingredients = Vec::with_capacity(inputs.len() + 1);
        let has_parent = inputs.iter().any(|input| {
            matches!(
                input,
                IngredientInput::Reference { relationship: Relationship::ParentOf, .. }
                    | IngredientInput::Asset { relationship: Relationship::ParentOf, .. }
            )
        });
        if let (Some(store), false) = (existing, has_parent) {
            let parent = store.active_manifest();
            ingredients.push(Ingredient {
                title: parent
                    .claim
                    .title
                    .clone()
                    .unwrap_or_else(|| parent.claim.format.clone()),
                relationship: Relationship::ParentOf,
                manifest_id: Some(parent.id.clone()),
                manifest_hash: store.raw(&parent.id).map(digest),
                asset_hash: None,
            });
        }

        for input in inputs {
            ingredients.push(self.ingredient(input, &mut collected)?);
        }

        let hashed = assertions
            .iter()
            .map(|a| {
                Ok(HashedRef {
                    label: a.label.clone(),
                    hash: a.hash()?,
                })
            })
            .collect::<Result<Vec<_>, SignError>>()?;

        let claim = Claim {
            claim_generator: self.claim_generator.clone(),
            title: self.title.clone(),
            format: self
                .format
                .clone()
                .unwrap_or_else(|| detected_format.to_string()),
            instance_id: format!("xmp:iid:{}", Uuid::new_v4()),
            created: self.created.unwrap_or_else(Utc::now),
            signature_alg: alg,
            asset_hash: AssetHash {
                alg: HASH_ALG.to_string(),
                hash: asset_digest.clone(),
            },
            assertions: hashed,
            ingredients,
            extensions: Default::default(),
        };

        let claim_bytes = codec::encode_claim(&claim)?;
        let value = signer.sign(&claim_bytes)?;

        let id = format!("urn:uuid:{}", Uuid::new_v4());
        let manifest = Manifest {
            signature: Signature {
                alg,
                value,
                cert_chain,
                covered: codec::claim_range(&id, claim_bytes.len(), 0),
            },
            id: id.clone(),
            claim,
            assertions,
            extensions: Default::default(),
        };
        let raw = codec::encode(&manifest)?;
        debug!(manifest = %id, bytes = raw.len(), "Encoded manifest");

        let assertion_count = manifest.assertions.len();
        let ingredient_count = manifest.claim.ingredients.len();
        collected.manifests.push((manifest, raw));
        let store = ManifestStore::from_parts(collected.manifests, &id, asset_digest)?;
        let bytes = store.to_bytes()?;

        info!(
            manifest = %id,
            alg = %alg,
            assertions = assertion_count,
            ingredients = ingredient_count,
            store = bytes.len(),
            "Signed manifest"
        );
        Ok(bytes)
    }

    fn ingredient(
        &self,
        input: IngredientInput,
        collected: &mut Collected,
    ) -> Result<Ingredient, SignError> {
        match input {
            IngredientInput::Reference {
                manifest_id,
                title,
                relationship,
            } => {
                let manifest_hash = collected.raw(&manifest_id).map(digest);
                if manifest_hash.is_none() {
                    warn!(manifest = %manifest_id, "Ingredient references a manifest not in the store");
                }
                Ok(Ingredient {
                    title,
                    relationship,
                    manifest_id: Some(manifest_id),
                    manifest_hash,
                    asset_hash: None,
                })
            }
            IngredientInput::Asset {
                title,
                bytes,
                relationship,
            } => {
                let store = match container::detect(&bytes) {
                    Some(_) => match ManifestStore::parse(&bytes) {
                        Ok(store) => Some(store),
                        Err(StoreError::NoManifest) => None,
                        Err(e) => return Err(e.into()),
                    },
                    None => None,
                };
                let asset_hash = Some(container::content_digest(&bytes)?);

                let Some(store) = store else {
                    return Ok(Ingredient {
                        title,
                        relationship,
                        manifest_id: None,
                        manifest_hash: None,
                        asset_hash,
                    });
                };

                collected.merge(&store)?;
                let active = store.active_manifest();
                Ok(Ingredient {
                    title,
                    relationship,
                    manifest_id: Some(active.id.clone()),
                    manifest_hash: store.raw(&active.id).map(digest),
                    asset_hash,
                })
            }
        }
    }
}

/// The signer's algorithm must suit its leaf certificate key.
fn check_signing_key(alg: SigningAlg, cert_chain: &[Vec<u8>]) -> Result<(), SignError> {
    let leaf = cert_chain
        .first()
        .ok_or_else(|| SignError::SigningKeyRejected("signer has no certificates".into()))?;
    let key = X509::from_der(leaf)
        .and_then(|cert| cert.public_key())
        .map_err(|e| SignError::SigningKeyRejected(format!("unusable leaf certificate: {e}")))?;
    if !crypto::key_matches(alg, &key) {
        return Err(SignError::SigningKeyRejected(format!(
            "leaf certificate key is not usable with {alg}"
        )));
    }
    Ok(())
}
