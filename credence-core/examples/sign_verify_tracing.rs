//! Example demonstrating sign/verify tracing instrumentation.
//!
//! Generates a throwaway CA and signer, signs a tiny JPEG, then verifies it
//! with and without the CA as trust anchor.
//!
//! Run with: cargo run -p credence-core --example sign_verify_tracing

use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use tracing_subscriber::{fmt, EnvFilter};

use credence_core::{
    Action, Assertion, ManifestStore, PemSigner, SigningAlg, SigningPipeline, TrustAnchors,
};

type Demo<T> = Result<T, Box<dyn std::error::Error>>;

fn certificate(
    key: &PKey<Private>,
    cn: &str,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> Demo<X509> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", cn)?;
    let name = name.build();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_subject_name(&name)?;
    builder.set_not_before(&*Asn1Time::days_from_now(0)?)?;
    builder.set_not_after(&*Asn1Time::days_from_now(1)?)?;
    builder.set_pubkey(key)?;
    match issuer {
        Some((cert, issuer_key)) => {
            builder.set_issuer_name(cert.subject_name())?;
            builder.sign(issuer_key, MessageDigest::sha256())?;
        }
        None => {
            builder.set_issuer_name(&name)?;
            builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
            builder.sign(key, MessageDigest::sha256())?;
        }
    }
    Ok(builder.build())
}

fn ec_key() -> Demo<PKey<Private>> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
}

fn jpeg() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    out.extend_from_slice(b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0xFF, 0xD9]);
    out
}

fn main() -> Demo<()> {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("credence_core=debug,info"))
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Credence Sign/Verify Tracing Demo ===\n");

    let root_key = ec_key()?;
    let root = certificate(&root_key, "Demo Root", None)?;
    let leaf_key = ec_key()?;
    let leaf = certificate(&leaf_key, "Demo Signer", Some((&root, &root_key)))?;

    let mut chain = leaf.to_pem()?;
    chain.extend(root.to_pem()?);
    let signer = PemSigner::from_pem(
        &leaf_key.private_key_to_pem_pkcs8()?,
        &chain,
        SigningAlg::Es256,
    )?;

    let signed = SigningPipeline::new("credence-demo/1.0")
        .with_title("demo.jpg")
        .sign(
            &jpeg(),
            vec![Assertion::actions(vec![Action::new("c2pa.created")])],
            vec![],
            &signer,
        )?;
    println!("\nSigned asset: {} bytes\n", signed.len());

    let store = ManifestStore::parse(&signed)?;
    let anchored = store.verify(&TrustAnchors::from_pem(&root.to_pem()?)?, chrono::Utc::now());
    let unanchored = store.verify(&TrustAnchors::empty(), chrono::Utc::now());

    println!("\nWith anchor:    {:?}", anchored.status);
    println!("Without anchor: {:?}", unanchored.status);
    Ok(())
}
