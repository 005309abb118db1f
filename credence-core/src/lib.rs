//! Credence Core - content-credential manifest engine
//!
//! This crate embeds signed provenance manifests into media assets, parses
//! them back out and evaluates whether they can be trusted.
//!
//! # Features
//!
//! - JPEG (APP11) and PNG (`crBX` chunk) containers, or a `.crd` sidecar
//! - Deterministic CBOR manifests with SHA3-256 hard bindings
//! - ES256/384/512, PS256/384/512 and Ed25519 signatures over X.509 chains
//! - Provenance graphs: ingredients link manifests inside one store
//! - Trust evaluation against a configurable set of anchors
//!
//! # Example
//!
//! ```no_run
//! use credence_core::{
//!     Action, Assertion, ManifestStore, PemSigner, SigningAlg, SigningPipeline, TrustAnchors,
//! };
//!
//! # fn example(asset: &[u8], key: &[u8], chain: &[u8], roots: &[u8]) -> credence_core::Result<()> {
//! let signer = PemSigner::from_pem(key, chain, SigningAlg::Es256)?;
//!
//! let signed = SigningPipeline::new("credence-example/1.0")
//!     .with_title("sunset.jpg")
//!     .sign(asset, vec![Assertion::actions(vec![Action::new("c2pa.created")])], vec![], &signer)?;
//!
//! let store = ManifestStore::parse(&signed)?;
//! let report = store.verify(&TrustAnchors::from_pem(roots)?, chrono::Utc::now());
//! assert!(report.status.is_trusted());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod assertion;
pub mod codec;
pub mod config;
pub mod container;
mod crypto;
mod encoding;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod signer;
pub mod store;
pub mod trust;

// Re-export main types for convenience
pub use assertion::{Action, Assertion, AssertionData};
pub use config::Settings;
pub use container::AssetFormat;
pub use error::{
    CodecError, ContainerError, CredenceError, Result, SignError, StoreError, TrustError,
};
pub use manifest::{ByteRange, Claim, Ingredient, Manifest, Relationship, SigningAlg};
pub use pipeline::{IngredientInput, SigningPipeline};
pub use signer::{PemSigner, Signer};
pub use store::{ManifestStore, VerificationReport};
pub use trust::{TrustAnchors, TrustEvaluator, TrustReport, TrustStatus};
