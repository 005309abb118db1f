//! The manifest store of one asset.
//!
//! Manifests live in an arena in discovery order with an identifier index;
//! ingredient links are identifiers into the same store. Parsing validates
//! the active pointer, identifier uniqueness and that ingredient links form
//! a DAG. Verification walks the graph from the active manifest.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec;
use crate::container;
use crate::error::StoreError;
use crate::manifest::Manifest;
use crate::trust::{TrustAnchors, TrustEvaluator, TrustReport, TrustStatus};

struct Entry {
    manifest: Manifest,
    raw: Vec<u8>,
}

/// Manifests carried by one asset, with the active one designated.
pub struct ManifestStore {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    active: usize,
    content_digest: Vec<u8>,
}

/// Result of verifying a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub active_manifest: String,
    /// `Trusted` only if every reachable manifest is trusted; otherwise the
    /// most severe outcome among them.
    pub status: TrustStatus,
    /// One report per reachable manifest, active first.
    pub manifests: Vec<TrustReport>,
}

impl VerificationReport {
    pub fn report(&self, manifest_id: &str) -> Option<&TrustReport> {
        self.manifests.iter().find(|r| r.manifest_id == manifest_id)
    }

    pub fn active(&self) -> Option<&TrustReport> {
        self.report(&self.active_manifest)
    }
}

impl ManifestStore {
    /// Parse the store embedded in `asset`.
    pub fn parse(asset: &[u8]) -> Result<Self, StoreError> {
        let store_bytes = container::extract(asset)?;
        let content_digest = container::content_digest(asset)?;
        Self::from_bytes(&store_bytes, content_digest)
    }

    /// Parse a store kept outside the asset (sidecar). The asset is hashed as
    /// it is, since it carries no segment of its own.
    pub fn from_sidecar(asset: &[u8], store_bytes: &[u8]) -> Result<Self, StoreError> {
        let content_digest = container::content_digest(asset)?;
        Self::from_bytes(store_bytes, content_digest)
    }

    fn from_bytes(store_bytes: &[u8], content_digest: Vec<u8>) -> Result<Self, StoreError> {
        let raw_store = codec::decode_store(store_bytes)?;

        let mut entries = Vec::with_capacity(raw_store.manifests.len());
        let mut index = HashMap::with_capacity(raw_store.manifests.len());
        for raw in raw_store.manifests {
            let manifest = codec::decode(&raw)?;
            if index.insert(manifest.id.clone(), entries.len()).is_some() {
                return Err(StoreError::DuplicateManifest(manifest.id));
            }
            entries.push(Entry { manifest, raw });
        }

        let active = *index
            .get(&raw_store.active_manifest)
            .ok_or(StoreError::DanglingActivePointer(raw_store.active_manifest))?;

        let store = Self {
            entries,
            index,
            active,
            content_digest,
        };
        store.check_acyclic()?;

        debug!(
            manifests = store.entries.len(),
            active = %store.active_manifest().id,
            "Parsed manifest store"
        );
        Ok(store)
    }

    /// Build a store from already-encoded manifests (used when signing).
    pub(crate) fn from_parts(
        manifests: Vec<(Manifest, Vec<u8>)>,
        active_id: &str,
        content_digest: Vec<u8>,
    ) -> Result<Self, StoreError> {
        let mut entries = Vec::with_capacity(manifests.len());
        let mut index = HashMap::with_capacity(manifests.len());
        for (manifest, raw) in manifests {
            if index.insert(manifest.id.clone(), entries.len()).is_some() {
                return Err(StoreError::DuplicateManifest(manifest.id));
            }
            entries.push(Entry { manifest, raw });
        }
        let active = *index
            .get(active_id)
            .ok_or_else(|| StoreError::DanglingActivePointer(active_id.to_string()))?;

        let store = Self {
            entries,
            index,
            active,
            content_digest,
        };
        store.check_acyclic()?;
        Ok(store)
    }

    /// Reject cycles in the ingredient graph.
    ///
    /// Iterative three-colour DFS; links to manifests outside the store are
    /// left for verification to report.
    fn check_acyclic(&self) -> Result<(), StoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.entries.len()];
        for root in 0..self.entries.len() {
            if marks[root] != Mark::New {
                continue;
            }
            marks[root] = Mark::Open;
            let mut stack = vec![(root, 0usize)];

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let children = self.children(node);
                if *next >= children.len() {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                }
                let child = children[*next];
                *next += 1;

                match marks[child] {
                    Mark::Open => {
                        let id = self.entries[child].manifest.id.clone();
                        warn!(manifest = %id, "Cyclic provenance graph");
                        return Err(StoreError::CyclicProvenance(id));
                    }
                    Mark::New => {
                        marks[child] = Mark::Open;
                        stack.push((child, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    fn children(&self, node: usize) -> Vec<usize> {
        self.entries[node]
            .manifest
            .ingredient_ids()
            .filter_map(|id| self.index.get(id).copied())
            .collect()
    }

    pub fn active_manifest(&self) -> &Manifest {
        &self.entries[self.active].manifest
    }

    pub fn get(&self, id: &str) -> Option<&Manifest> {
        self.index.get(id).map(|&i| &self.entries[i].manifest)
    }

    /// Encoded bytes of a manifest as carried in the store.
    pub fn raw(&self, id: &str) -> Option<&[u8]> {
        self.index.get(id).map(|&i| self.entries[i].raw.as_slice())
    }

    /// Manifests in discovery order.
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.entries.iter().map(|e| &e.manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of the asset the store was parsed from, segment excluded.
    pub fn content_digest(&self) -> &[u8] {
        &self.content_digest
    }

    /// Store envelope bytes, manifests in discovery order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let raws: Vec<&[u8]> = self.entries.iter().map(|e| e.raw.as_slice()).collect();
        Ok(codec::encode_store(&self.active_manifest().id, &raws)?)
    }

    /// Evaluate the active manifest and every manifest reachable from it
    /// through ingredients, each once.
    pub fn verify(&self, anchors: &TrustAnchors, now: DateTime<Utc>) -> VerificationReport {
        self.verify_with(&TrustEvaluator::new(anchors, now))
    }

    pub fn verify_with(&self, evaluator: &TrustEvaluator<'_>) -> VerificationReport {
        let mut seen = HashSet::from([self.active]);
        let mut queue = VecDeque::from([self.active]);
        let mut reports = Vec::new();

        while let Some(node) = queue.pop_front() {
            let manifest = &self.entries[node].manifest;
            let asset_digest = (node == self.active).then_some(self.content_digest.as_slice());
            reports.push(evaluator.evaluate(manifest, asset_digest, self));

            for child in self.children(node) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        let status = reports
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(TrustStatus::Trusted);

        info!(
            active = %self.active_manifest().id,
            status = ?status,
            evaluated = reports.len(),
            "Verified manifest store"
        );

        VerificationReport {
            active_manifest: self.active_manifest().id.clone(),
            status,
            manifests: reports,
        }
    }
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("active", &self.active_manifest().id)
            .field(
                "manifests",
                &self.manifests().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
