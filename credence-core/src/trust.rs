//! Manifest trust evaluation.
//!
//! [`TrustEvaluator::evaluate`] checks one manifest in four steps: content
//! hashes, claim signature, certificate chain and ingredient references.
//! Failures are collected as [`Reason`]s; the manifest's [`TrustStatus`] is
//! the most severe outcome observed. Evaluation never reads the wall clock;
//! the caller supplies `now`.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::x509::{X509VerifyResult, X509};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec;
use crate::crypto;
use crate::error::TrustError;
use crate::manifest::{digest, Manifest, HASH_ALG};
use crate::store::ManifestStore;

/// Stable reason codes.
pub mod codes {
    pub const DATA_HASH_MISMATCH: &str = "assertion.dataHash.mismatch";
    pub const ASSERTION_HASH_MISMATCH: &str = "assertion.hashedURI.mismatch";
    pub const ASSERTION_MISSING: &str = "assertion.missing";
    pub const ASSERTION_UNDECLARED: &str = "assertion.undeclared";
    pub const SIGNATURE_MISMATCH: &str = "claimSignature.mismatch";
    pub const ALGORITHM_MISMATCH: &str = "algorithm.mismatch";
    pub const CREDENTIAL_INVALID: &str = "signingCredential.invalid";
    pub const CREDENTIAL_EXPIRED: &str = "signingCredential.expired";
    pub const CREDENTIAL_UNTRUSTED: &str = "signingCredential.untrusted";
    pub const INGREDIENT_MISSING: &str = "ingredient.manifest.missing";
    pub const INGREDIENT_HASH_MISMATCH: &str = "ingredient.hashedURI.mismatch";
}

/// Outcome of evaluating a manifest, ordered by increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustStatus {
    Trusted,
    ValidButUntrusted,
    MissingIngredient,
    InvalidSignature,
    HashMismatch,
}

impl TrustStatus {
    pub fn is_trusted(&self) -> bool {
        *self == Self::Trusted
    }
}

/// One observed failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub code: &'static str,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientStatus {
    /// Referenced manifest is in the store and its hash matches.
    Present,
    /// Referenced manifest is not in the store.
    Missing,
    /// Referenced manifest is present but its hash differs.
    HashMismatch,
    /// Ingredient carries no manifest reference.
    NoCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientCheck {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    pub status: IngredientStatus,
}

/// Per-manifest evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustReport {
    pub manifest_id: String,
    /// Worst outcome over all steps.
    pub status: TrustStatus,
    /// Outcome of this manifest's own hashes, signature and chain.
    pub signature_status: TrustStatus,
    pub ingredients: Vec<IngredientCheck>,
    pub reasons: Vec<Reason>,
}

/// Certificates accepted as roots of trust.
#[derive(Debug, Default)]
pub struct TrustAnchors {
    certs: Vec<X509>,
    fingerprints: HashSet<Vec<u8>>,
}

impl TrustAnchors {
    /// No anchors: nothing chains to trust.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load anchors from a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustError> {
        let certs = X509::stack_from_pem(pem)?;
        if certs.is_empty() {
            return Err(TrustError::InvalidCertificate(
                "trust anchor bundle contains no certificates".into(),
            ));
        }
        let fingerprints = certs
            .iter()
            .map(fingerprint)
            .collect::<Result<HashSet<_>, _>>()?;
        debug!(anchors = certs.len(), "Loaded trust anchors");
        Ok(Self {
            certs,
            fingerprints,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        Self::from_pem(&std::fs::read(path)?)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Whether `cert` is itself an anchor.
    fn contains(&self, cert: &X509) -> bool {
        fingerprint(cert)
            .map(|fp| self.fingerprints.contains(&fp))
            .unwrap_or(false)
    }

    /// Whether some anchor issued and signed `cert`.
    fn issued(&self, cert: &X509) -> bool {
        self.certs.iter().any(|anchor| {
            anchor.issued(cert) == X509VerifyResult::OK
                && anchor
                    .public_key()
                    .and_then(|key| cert.verify(&key))
                    .unwrap_or(false)
        })
    }
}

fn fingerprint(cert: &X509) -> Result<Vec<u8>, openssl::error::ErrorStack> {
    Ok(cert.digest(MessageDigest::sha256())?.to_vec())
}

/// Accumulates reasons and the worst status for one manifest.
struct Findings {
    status: TrustStatus,
    reasons: Vec<Reason>,
}

impl Findings {
    fn new() -> Self {
        Self {
            status: TrustStatus::Trusted,
            reasons: Vec::new(),
        }
    }

    fn fail(&mut self, status: TrustStatus, code: &'static str, explanation: impl Into<String>) {
        self.status = self.status.max(status);
        self.reasons.push(Reason {
            code,
            explanation: explanation.into(),
        });
    }
}

/// Evaluates manifests against a set of trust anchors at a fixed time.
pub struct TrustEvaluator<'a> {
    anchors: &'a TrustAnchors,
    now: DateTime<Utc>,
    check_trust: bool,
}

impl<'a> TrustEvaluator<'a> {
    pub fn new(anchors: &'a TrustAnchors, now: DateTime<Utc>) -> Self {
        Self {
            anchors,
            now,
            check_trust: true,
        }
    }

    /// When disabled, chains are not required to reach an anchor.
    pub fn with_trust_check(mut self, enabled: bool) -> Self {
        self.check_trust = enabled;
        self
    }

    /// Evaluate `manifest`. `asset_digest` is supplied for the active
    /// manifest only; ingredient manifests describe other assets.
    pub fn evaluate(
        &self,
        manifest: &Manifest,
        asset_digest: Option<&[u8]>,
        store: &ManifestStore,
    ) -> TrustReport {
        let mut own = Findings::new();

        self.check_hashes(manifest, asset_digest, &mut own);
        if own.status == TrustStatus::Trusted {
            if let Some(chain) = self.check_signature(manifest, store, &mut own) {
                self.check_chain(&chain, &mut own);
            }
        }
        let signature_status = own.status;

        let mut findings = own;
        let ingredients = self.check_ingredients(manifest, store, &mut findings);

        if findings.status.is_trusted() {
            debug!(manifest = %manifest.id, "Manifest trusted");
        } else {
            warn!(
                manifest = %manifest.id,
                status = ?findings.status,
                reasons = findings.reasons.len(),
                "Manifest failed validation"
            );
        }

        TrustReport {
            manifest_id: manifest.id.clone(),
            status: findings.status,
            signature_status,
            ingredients,
            reasons: findings.reasons,
        }
    }

    fn check_hashes(&self, manifest: &Manifest, asset_digest: Option<&[u8]>, out: &mut Findings) {
        let claim = &manifest.claim;

        if let Some(actual) = asset_digest {
            if claim.asset_hash.alg != HASH_ALG {
                out.fail(
                    TrustStatus::HashMismatch,
                    codes::DATA_HASH_MISMATCH,
                    format!("unsupported asset hash algorithm {}", claim.asset_hash.alg),
                );
            } else if claim.asset_hash.hash != actual {
                out.fail(
                    TrustStatus::HashMismatch,
                    codes::DATA_HASH_MISMATCH,
                    "asset content does not match the claimed hash",
                );
            }
        }

        for reference in &claim.assertions {
            let Some(assertion) = manifest.assertion(&reference.label) else {
                out.fail(
                    TrustStatus::HashMismatch,
                    codes::ASSERTION_MISSING,
                    format!("claimed assertion {} is absent", reference.label),
                );
                continue;
            };
            match assertion.hash() {
                Ok(hash) if hash == reference.hash => {}
                Ok(_) => out.fail(
                    TrustStatus::HashMismatch,
                    codes::ASSERTION_HASH_MISMATCH,
                    format!("assertion {} does not match its claimed hash", reference.label),
                ),
                Err(e) => out.fail(
                    TrustStatus::HashMismatch,
                    codes::ASSERTION_HASH_MISMATCH,
                    format!("assertion {} cannot be encoded: {e}", reference.label),
                ),
            }
        }

        for assertion in &manifest.assertions {
            if !claim.assertions.iter().any(|r| r.label == assertion.label) {
                out.fail(
                    TrustStatus::HashMismatch,
                    codes::ASSERTION_UNDECLARED,
                    format!("assertion {} is not referenced by the claim", assertion.label),
                );
            }
        }
    }

    /// Verify the claim signature with the leaf key. Returns the parsed
    /// chain when the signature holds.
    fn check_signature(
        &self,
        manifest: &Manifest,
        store: &ManifestStore,
        out: &mut Findings,
    ) -> Option<Vec<X509>> {
        let signature = &manifest.signature;

        if signature.alg != manifest.claim.signature_alg {
            out.fail(
                TrustStatus::InvalidSignature,
                codes::ALGORITHM_MISMATCH,
                format!(
                    "signature uses {} but the claim declares {}",
                    signature.alg, manifest.claim.signature_alg
                ),
            );
            return None;
        }

        let chain = match signature
            .cert_chain
            .iter()
            .map(|der| X509::from_der(der))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(chain) if !chain.is_empty() => chain,
            Ok(_) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::CREDENTIAL_INVALID,
                    "signature carries no certificates",
                );
                return None;
            }
            Err(e) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::CREDENTIAL_INVALID,
                    format!("unparsable certificate: {e}"),
                );
                return None;
            }
        };

        let leaf_key = match chain[0].public_key() {
            Ok(key) if crypto::key_matches(signature.alg, &key) => key,
            Ok(_) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::ALGORITHM_MISMATCH,
                    format!("leaf certificate key is not usable with {}", signature.alg),
                );
                return None;
            }
            Err(e) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::CREDENTIAL_INVALID,
                    format!("leaf certificate key: {e}"),
                );
                return None;
            }
        };

        let claim_bytes = match signed_bytes(manifest, store) {
            Ok(bytes) => bytes,
            Err(e) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::SIGNATURE_MISMATCH,
                    format!("claim bytes unavailable: {e}"),
                );
                return None;
            }
        };

        match crypto::verify(signature.alg, &leaf_key, &claim_bytes, &signature.value) {
            Ok(true) => Some(chain),
            Ok(false) | Err(_) => {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::SIGNATURE_MISMATCH,
                    "claim signature does not verify",
                );
                None
            }
        }
    }

    /// Walk the chain leaf to root, then look for an anchor.
    fn check_chain(&self, chain: &[X509], out: &mut Findings) {
        for pair in chain.windows(2) {
            let (cert, issuer) = (&pair[0], &pair[1]);
            let signed = issuer
                .public_key()
                .and_then(|key| cert.verify(&key))
                .unwrap_or(false);
            if issuer.issued(cert) != X509VerifyResult::OK || !signed {
                out.fail(
                    TrustStatus::InvalidSignature,
                    codes::CREDENTIAL_INVALID,
                    format!(
                        "certificate {:?} is not issued by the next certificate in the chain",
                        subject(cert)
                    ),
                );
                return;
            }
        }

        match Asn1Time::from_unix(self.now.timestamp()) {
            Ok(now) => {
                for cert in chain {
                    let started = cert.not_before().compare(&now).map(|o| o.is_le());
                    let ended = cert.not_after().compare(&now).map(|o| o.is_lt());
                    if !matches!((started, ended), (Ok(true), Ok(false))) {
                        out.fail(
                            TrustStatus::ValidButUntrusted,
                            codes::CREDENTIAL_EXPIRED,
                            format!(
                                "certificate {:?} is not valid at {}",
                                subject(cert),
                                self.now.to_rfc3339()
                            ),
                        );
                    }
                }
            }
            Err(e) => out.fail(
                TrustStatus::ValidButUntrusted,
                codes::CREDENTIAL_EXPIRED,
                format!("cannot represent validation time: {e}"),
            ),
        }

        if !self.check_trust {
            return;
        }
        let anchored = chain.iter().any(|cert| self.anchors.contains(cert))
            || chain
                .last()
                .map(|root| self.anchors.issued(root))
                .unwrap_or(false);
        if !anchored {
            out.fail(
                TrustStatus::ValidButUntrusted,
                codes::CREDENTIAL_UNTRUSTED,
                "certificate chain does not lead to a trust anchor",
            );
        }
    }

    fn check_ingredients(
        &self,
        manifest: &Manifest,
        store: &ManifestStore,
        out: &mut Findings,
    ) -> Vec<IngredientCheck> {
        manifest
            .claim
            .ingredients
            .iter()
            .map(|ingredient| {
                let status = match &ingredient.manifest_id {
                    None => IngredientStatus::NoCredentials,
                    Some(id) => match store.raw(id) {
                        None => {
                            out.fail(
                                TrustStatus::MissingIngredient,
                                codes::INGREDIENT_MISSING,
                                format!("ingredient manifest {id} is not in the store"),
                            );
                            IngredientStatus::Missing
                        }
                        Some(raw) => match &ingredient.manifest_hash {
                            Some(expected) if *expected != digest(raw) => {
                                out.fail(
                                    TrustStatus::HashMismatch,
                                    codes::INGREDIENT_HASH_MISMATCH,
                                    format!("ingredient manifest {id} does not match its hash"),
                                );
                                IngredientStatus::HashMismatch
                            }
                            _ => IngredientStatus::Present,
                        },
                    },
                };
                IngredientCheck {
                    title: ingredient.title.clone(),
                    manifest_id: ingredient.manifest_id.clone(),
                    status,
                }
            })
            .collect()
    }
}

/// The exact claim bytes the signature covers.
fn signed_bytes(manifest: &Manifest, store: &ManifestStore) -> Result<Vec<u8>, String> {
    let range = manifest.signature.covered;
    match store.raw(&manifest.id) {
        Some(raw) => raw
            .get(range.start..range.end())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| "covered range lies outside the manifest".to_string()),
        None => codec::encode_claim(&manifest.claim).map_err(|e| e.to_string()),
    }
}

fn subject(cert: &X509) -> String {
    cert.subject_name()
        .entries()
        .filter_map(|e| e.data().to_string().ok())
        .collect::<Vec<_>>()
        .join(", ")
}
