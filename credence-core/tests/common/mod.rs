//! Shared fixtures for integration tests.

#![allow(dead_code)]

use img_parts::png::PngChunk;
use img_parts::Bytes;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

/// Minimal baseline JPEG: SOI, APP0, DQT, SOS with a few bytes of scan data, EOI.
pub fn jpeg() -> Vec<u8> {
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

/// 1x1 greyscale PNG: IHDR, one IDAT, IEND.
pub fn png() -> Vec<u8> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    for (kind, data) in [
        (*b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0][..]),
        (*b"IDAT", &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01][..]),
        (*b"IEND", &[][..]),
    ] {
        let chunk = PngChunk::new(kind, Bytes::copy_from_slice(data));
        out.extend_from_slice(&chunk.encoder().bytes());
    }
    out
}

/// EC P-256 root CA and a signing leaf issued by it.
pub struct Pki {
    pub root: X509,
    pub leaf: X509,
    pub leaf_key: PKey<Private>,
}

impl Pki {
    pub fn new() -> Self {
        let root_key = ec_key();
        let root = certificate(&root_key, "Integration Root", None);
        let leaf_key = ec_key();
        let leaf = certificate(&leaf_key, "Integration Signer", Some((&root, &root_key)));
        Self {
            root,
            leaf,
            leaf_key,
        }
    }

    pub fn root_pem(&self) -> Vec<u8> {
        self.root.to_pem().unwrap()
    }

    pub fn key_pem(&self) -> Vec<u8> {
        self.leaf_key.private_key_to_pem_pkcs8().unwrap()
    }

    pub fn chain_pem(&self) -> Vec<u8> {
        let mut pem = self.leaf.to_pem().unwrap();
        pem.extend(self.root_pem());
        pem
    }

    /// `SignerInfo` JSON with the PEM material inline.
    pub fn signer_info_json(&self) -> String {
        serde_json::json!({
            "signcert": String::from_utf8(self.chain_pem()).unwrap(),
            "pkey": String::from_utf8(self.key_pem()).unwrap(),
            "alg": "es256",
        })
        .to_string()
    }
}

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn certificate(key: &PKey<Private>, cn: &str, issuer: Option<(&X509, &PKey<Private>)>) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(if issuer.is_some() { 2 } else { 1 })
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();

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
        Some((issuer_cert, issuer_key)) => {
            builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
            builder
                .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
                .unwrap();
            builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder.set_issuer_name(&name).unwrap();
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder
                .append_extension(KeyUsage::new().critical().key_cert_sign().build().unwrap())
                .unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
        }
    }
    builder.build()
}
