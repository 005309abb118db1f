//! CLI integration tests for credence-cli.
//!
//! These tests verify the CLI behavior by running the actual binary
//! and checking outputs, exit codes, and file artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the credence binary with a clean credential environment.
fn credence() -> Command {
    let mut cmd = Command::cargo_bin("credence").unwrap();
    for var in [
        "CREDENCE_SIGNING_KEY",
        "CREDENCE_SIGNING_CERT",
        "CREDENCE_SIGNING_KEY_PEM",
        "CREDENCE_SIGNING_CERT_PEM",
        "CREDENCE_SIGNING_ALG",
        "CREDENCE_TRUST_ANCHORS",
        "CREDENCE_VERIFY_TRUST",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn jpeg() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
    out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    out.extend(std::iter::repeat(0x10).take(64));
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn certificate(key: &PKey<Private>, cn: &str, issuer: Option<(&X509, &PKey<Private>)>) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(if issuer.is_some() { 2 } else { 1 }).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();
    builder.set_subject_name(&name).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.set_pubkey(key).unwrap();
    match issuer {
        Some((cert, issuer_key)) => {
            builder.set_issuer_name(cert.subject_name()).unwrap();
            builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder.set_issuer_name(&name).unwrap();
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
        }
    }
    builder.build()
}

/// Workspace with an unsigned JPEG, a signing key, its chain and the root.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root_key = ec_key();
        let root = certificate(&root_key, "CLI Test Root", None);
        let leaf_key = ec_key();
        let leaf = certificate(&leaf_key, "CLI Test Signer", Some((&root, &root_key)));

        let mut chain = leaf.to_pem().unwrap();
        chain.extend(root.to_pem().unwrap());
        fs::write(dir.path().join("signer.pem"), chain).unwrap();
        fs::write(
            dir.path().join("signer.key"),
            leaf_key.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("anchors.pem"), root.to_pem().unwrap()).unwrap();
        fs::write(dir.path().join("photo.jpg"), jpeg()).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn arg(&self, name: &str) -> String {
        self.path(name).to_string_lossy().into_owned()
    }

    /// Sign `input` into `output` with the workspace credentials.
    fn sign(&self, input: &str, output: &str, extra: &[&str]) {
        credence()
            .args(["sign", "--quiet", "--key", &self.arg("signer.key")])
            .args(["--cert", &self.arg("signer.pem")])
            .args(["-o", &self.arg(output)])
            .args(extra)
            .arg(self.arg(input))
            .assert()
            .success();
    }
}

fn tamper(path: &Path) {
    let mut bytes = fs::read(path).unwrap();
    let at = bytes.len() - 3;
    bytes[at] ^= 0xFF;
    fs::write(path, bytes).unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    credence()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Content credential signing and verification",
        ))
        .stdout(predicate::str::contains("sign"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("77"));
}

#[test]
fn test_version_displays_version() {
    credence()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("credence"));
}

#[test]
fn test_info_lists_formats() {
    credence()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("credence-core/"))
        .stdout(predicate::str::contains("image/jpeg"))
        .stdout(predicate::str::contains("image/png"));
}

#[test]
fn test_key_requires_cert() {
    credence()
        .args(["sign", "--key", "signer.key", "photo.jpg"])
        .assert()
        .code(2);
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_file_returns_input_error() {
    // Exit code 66 = EX_NOINPUT
    credence()
        .args(["verify", "nonexistent_file.jpg"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to verify"));
}

#[test]
fn test_unsigned_file_has_no_manifest() {
    let ws = Workspace::new();
    credence()
        .args(["verify", &ws.arg("photo.jpg")])
        .assert()
        .code(65)
        .stdout(predicate::str::contains("NO MANIFEST"));
}

#[test]
fn test_missing_credentials_is_config_error() {
    let ws = Workspace::new();
    credence()
        .args(["sign", &ws.arg("photo.jpg")])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("CREDENCE_SIGNING_KEY"));
}

// ============================================================================
// Dry Run Tests
// ============================================================================

#[test]
fn test_sign_dry_run_shows_preview() {
    let ws = Workspace::new();
    credence()
        .args(["sign", "--dry-run", "-o", &ws.arg("out.jpg"), &ws.arg("photo.jpg")])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN]"))
        .stdout(predicate::str::contains("Input file:"))
        .stdout(predicate::str::contains("from CREDENCE_SIGNING_KEY env"));

    assert!(!ws.path("out.jpg").exists(), "Dry run should not write output");
}

// ============================================================================
// Sign and Verify Roundtrip Tests
// ============================================================================

#[test]
fn test_sign_then_verify_trusted() {
    let ws = Workspace::new();
    ws.sign("photo.jpg", "signed.jpg", &[]);

    credence()
        .args(["verify", "--anchors", &ws.arg("anchors.pem"), &ws.arg("signed.jpg")])
        .assert()
        .success()
        .stdout(predicate::str::contains("TRUSTED"))
        .stdout(predicate::str::contains("photo.jpg"));

    // Original is left untouched.
    assert_eq!(fs::read(ws.path("photo.jpg")).unwrap(), jpeg());
}

#[test]
fn test_verify_without_anchor_is_untrusted() {
    let ws = Workspace::new();
    ws.sign("photo.jpg", "signed.jpg", &[]);

    credence()
        .args(["verify", &ws.arg("signed.jpg")])
        .assert()
        .code(77)
        .stdout(predicate::str::contains("VALID, UNTRUSTED"));

    credence()
        .args(["verify", "--no-trust-check", &ws.arg("signed.jpg")])
        .assert()
        .success();
}

#[test]
fn test_tampered_file_fails_verification() {
    let ws = Workspace::new();
    ws.sign("photo.jpg", "signed.jpg", &[]);
    tamper(&ws.path("signed.jpg"));

    credence()
        .args(["verify", "--anchors", &ws.arg("anchors.pem"), &ws.arg("signed.jpg")])
        .assert()
        .code(65)
        .stdout(predicate::str::contains("TAMPERED"))
        .stdout(predicate::str::contains("assertion.dataHash.mismatch"));
}

#[test]
fn test_verify_json_output() {
    let ws = Workspace::new();
    ws.sign("photo.jpg", "signed.jpg", &[]);

    let output = credence()
        .args(["verify", "--json", "--anchors", &ws.arg("anchors.pem"), &ws.arg("signed.jpg")])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["validation_state"], "Trusted");
    let active = report["active_manifest"].as_str().unwrap();
    assert!(active.starts_with("urn:uuid:"));
    assert!(report["manifests"][active]["claim"]["assertions"].is_array());
}

#[test]
fn test_sidecar_for_unknown_format() {
    let ws = Workspace::new();
    fs::write(ws.path("notes.txt"), b"field notes").unwrap();
    ws.sign("notes.txt", "notes.txt", &["--sidecar"]);

    assert!(ws.path("notes.txt.crd").exists());
    assert_eq!(fs::read(ws.path("notes.txt")).unwrap(), b"field notes");

    credence()
        .args(["verify", "--anchors", &ws.arg("anchors.pem"), &ws.arg("notes.txt")])
        .assert()
        .success();
}

#[test]
fn test_resign_keeps_history() {
    let ws = Workspace::new();
    ws.sign("photo.jpg", "v1.jpg", &[]);
    ws.sign("v1.jpg", "v2.jpg", &[]);

    let output = credence()
        .args(["verify", "--json", "--anchors", &ws.arg("anchors.pem"), &ws.arg("v2.jpg")])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["manifests"].as_object().unwrap().len(), 2);
    assert_eq!(report["validation"].as_array().unwrap().len(), 2);
}
