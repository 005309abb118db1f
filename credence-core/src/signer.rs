//! Claim signers.
//!
//! [`PemSigner`] signs with a PEM private key and an X.509 chain (leaf
//! first). The key is held as zeroizing PEM bytes and only parsed for the
//! duration of a single `sign` call.

use std::path::Path;

use openssl::pkey::PKey;
use openssl::x509::X509;
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::SignError;
use crate::manifest::SigningAlg;

/// Signs canonical claim bytes.
pub trait Signer {
    /// Algorithm written into the claim and signature block.
    fn alg(&self) -> SigningAlg;

    /// DER certificate chain, leaf first.
    fn certs(&self) -> Result<Vec<Vec<u8>>, SignError>;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError>;
}

/// X.509 certificate signer backed by OpenSSL.
///
/// # Security Note
///
/// The private key should be protected. In production, consider using
/// HSM or TEE-based key storage.
pub struct PemSigner {
    alg: SigningAlg,
    key_pem: Zeroizing<Vec<u8>>,
    certificate_chain: Vec<X509>,
}

impl std::fmt::Debug for PemSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemSigner")
            .field("alg", &self.alg)
            .field("certificates", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

impl PemSigner {
    /// Create a signer from a PEM private key and PEM certificate chain.
    ///
    /// The key must suit `alg` and match the leaf certificate's public key,
    /// otherwise [`SignError::SigningKeyRejected`] is returned.
    pub fn from_pem(key_pem: &[u8], cert_chain_pem: &[u8], alg: SigningAlg) -> Result<Self, SignError> {
        let certificate_chain = X509::stack_from_pem(cert_chain_pem)?;
        let Some(leaf) = certificate_chain.first() else {
            return Err(SignError::SigningKeyRejected(
                "certificate chain is empty".into(),
            ));
        };

        let key = PKey::private_key_from_pem(key_pem)?;
        if !crypto::key_matches(alg, &key) {
            return Err(SignError::SigningKeyRejected(format!(
                "private key is not usable with {alg}"
            )));
        }
        if !leaf.public_key()?.public_eq(&key) {
            return Err(SignError::SigningKeyRejected(
                "private key does not match the leaf certificate".into(),
            ));
        }

        Ok(Self {
            alg,
            key_pem: Zeroizing::new(key_pem.to_vec()),
            certificate_chain,
        })
    }

    /// Create a signer from file paths.
    pub fn from_files(
        key_path: impl AsRef<Path>,
        cert_path: impl AsRef<Path>,
        alg: SigningAlg,
    ) -> Result<Self, SignError> {
        let key_pem = Zeroizing::new(std::fs::read(key_path)?);
        let cert_pem = std::fs::read(cert_path)?;

        Self::from_pem(&key_pem, &cert_pem, alg)
    }

    /// Create a signer from environment variables.
    ///
    /// Supports two modes:
    ///
    /// 1. **File paths**: `CREDENCE_SIGNING_KEY` and `CREDENCE_SIGNING_CERT`
    /// 2. **Base64-encoded PEM content**: `CREDENCE_SIGNING_KEY_PEM` and
    ///    `CREDENCE_SIGNING_CERT_PEM`
    ///
    /// The base64 variants take precedence if both are set. The algorithm is
    /// read from `CREDENCE_SIGNING_ALG` (default `es256`).
    pub fn from_env() -> Result<Self, SignError> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let alg = match std::env::var("CREDENCE_SIGNING_ALG") {
            Ok(value) => value.parse().map_err(SignError::SigningKeyRejected)?,
            Err(_) => SigningAlg::Es256,
        };

        if let (Ok(key_b64), Ok(cert_b64)) = (
            std::env::var("CREDENCE_SIGNING_KEY_PEM"),
            std::env::var("CREDENCE_SIGNING_CERT_PEM"),
        ) {
            let key_b64 = Zeroizing::new(key_b64);
            let key_pem = Zeroizing::new(STANDARD.decode(key_b64.as_bytes()).map_err(|e| {
                SignError::SigningKeyRejected(format!("Invalid base64 key: {e}"))
            })?);
            let cert_pem = STANDARD.decode(&cert_b64).map_err(|e| {
                SignError::SigningKeyRejected(format!("Invalid base64 cert: {e}"))
            })?;

            return Self::from_pem(&key_pem, &cert_pem, alg);
        }

        let key_path = std::env::var("CREDENCE_SIGNING_KEY")
            .map_err(|_| SignError::MissingEnvVar("CREDENCE_SIGNING_KEY or CREDENCE_SIGNING_KEY_PEM"))?;
        let cert_path = std::env::var("CREDENCE_SIGNING_CERT").map_err(|_| {
            SignError::MissingEnvVar("CREDENCE_SIGNING_CERT or CREDENCE_SIGNING_CERT_PEM")
        })?;

        Self::from_files(key_path, cert_path, alg)
    }
}

impl Signer for PemSigner {
    fn alg(&self) -> SigningAlg {
        self.alg
    }

    fn certs(&self) -> Result<Vec<Vec<u8>>, SignError> {
        self.certificate_chain
            .iter()
            .map(|cert| cert.to_der().map_err(SignError::OpenSsl))
            .collect()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError> {
        let key = PKey::private_key_from_pem(&self.key_pem)?;
        Ok(crypto::sign(self.alg, &key, data)?)
    }
}

/// Certificate generation for tests: a CA root and leaves issued by it.
#[cfg(test)]
pub(crate) mod test_pki {
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::x509::extension::{BasicConstraints, KeyUsage};
    use openssl::x509::{X509Builder, X509NameBuilder, X509};

    use crate::manifest::SigningAlg;

    pub struct TestPki {
        pub root: X509,
        pub root_key: PKey<Private>,
        pub leaf: X509,
        pub leaf_key: PKey<Private>,
    }

    impl TestPki {
        pub fn root_pem(&self) -> Vec<u8> {
            self.root.to_pem().unwrap()
        }

        pub fn leaf_key_pem(&self) -> Vec<u8> {
            self.leaf_key.private_key_to_pem_pkcs8().unwrap()
        }

        /// Leaf followed by root.
        pub fn chain_pem(&self) -> Vec<u8> {
            let mut pem = self.leaf.to_pem().unwrap();
            pem.extend(self.root.to_pem().unwrap());
            pem
        }
    }

    pub fn key_for(alg: SigningAlg) -> PKey<Private> {
        match alg {
            SigningAlg::Es256 | SigningAlg::Es384 | SigningAlg::Es512 => {
                let nid = match alg {
                    SigningAlg::Es256 => Nid::X9_62_PRIME256V1,
                    SigningAlg::Es384 => Nid::SECP384R1,
                    _ => Nid::SECP521R1,
                };
                let group = EcGroup::from_curve_name(nid).unwrap();
                PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
            }
            SigningAlg::Ps256 | SigningAlg::Ps384 | SigningAlg::Ps512 => {
                PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
            }
            SigningAlg::Ed25519 => PKey::generate_ed25519().unwrap(),
        }
    }

    fn certificate(
        subject_key: &PKey<Private>,
        cn: &str,
        issuer: Option<(&X509, &PKey<Private>)>,
        serial: u32,
    ) -> X509 {
        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("O", "Credence Test").unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();
        builder.set_subject_name(&name).unwrap();

        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.set_pubkey(subject_key).unwrap();

        match issuer {
            Some((issuer_cert, issuer_key)) => {
                builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
                builder
                    .append_extension(
                        KeyUsage::new().critical().digital_signature().build().unwrap(),
                    )
                    .unwrap();
                builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
            }
            None => {
                builder.set_issuer_name(&name).unwrap();
                builder
                    .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                    .unwrap();
                builder
                    .append_extension(
                        KeyUsage::new()
                            .critical()
                            .key_cert_sign()
                            .digital_signature()
                            .build()
                            .unwrap(),
                    )
                    .unwrap();
                builder.sign(subject_key, MessageDigest::sha256()).unwrap();
            }
        }
        builder.build()
    }

    /// Fresh root CA (EC P-256) and a leaf for `alg` issued by it.
    pub fn generate(alg: SigningAlg) -> TestPki {
        let root_key = key_for(SigningAlg::Es256);
        let root = certificate(&root_key, "Credence Test Root", None, 1);
        let leaf_key = key_for(alg);
        let leaf = certificate(&leaf_key, "Credence Test Signer", Some((&root, &root_key)), 2);
        TestPki {
            root,
            root_key,
            leaf,
            leaf_key,
        }
    }

    /// A signer for `alg` with a fresh chain.
    pub fn signer(alg: SigningAlg) -> (super::PemSigner, TestPki) {
        let pki = generate(alg);
        let signer = super::PemSigner::from_pem(&pki.leaf_key_pem(), &pki.chain_pem(), alg)
            .expect("create signer");
        (signer, pki)
    }
}
