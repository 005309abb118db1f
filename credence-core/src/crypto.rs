//! Thin wrapper over the OpenSSL primitives used for claim signatures.

use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasParams, HasPrivate, HasPublic, Id, PKeyRef};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};

use crate::manifest::SigningAlg;

fn message_digest(alg: SigningAlg) -> Option<MessageDigest> {
    match alg {
        SigningAlg::Es256 | SigningAlg::Ps256 => Some(MessageDigest::sha256()),
        SigningAlg::Es384 | SigningAlg::Ps384 => Some(MessageDigest::sha384()),
        SigningAlg::Es512 | SigningAlg::Ps512 => Some(MessageDigest::sha512()),
        SigningAlg::Ed25519 => None,
    }
}

fn is_pss(alg: SigningAlg) -> bool {
    matches!(
        alg,
        SigningAlg::Ps256 | SigningAlg::Ps384 | SigningAlg::Ps512
    )
}

/// Whether `key` is usable with `alg` (key type and, for ECDSA, curve).
pub fn key_matches<T: HasParams>(alg: SigningAlg, key: &PKeyRef<T>) -> bool {
    let curve = match alg {
        SigningAlg::Es256 => Nid::X9_62_PRIME256V1,
        SigningAlg::Es384 => Nid::SECP384R1,
        SigningAlg::Es512 => Nid::SECP521R1,
        SigningAlg::Ps256 | SigningAlg::Ps384 | SigningAlg::Ps512 => return key.id() == Id::RSA,
        SigningAlg::Ed25519 => return key.id() == Id::ED25519,
    };
    key.id() == Id::EC
        && key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            == Some(curve)
}

/// Sign `data` with `key`. ECDSA signatures are DER encoded.
pub fn sign<T: HasPrivate>(
    alg: SigningAlg,
    key: &PKeyRef<T>,
    data: &[u8],
) -> Result<Vec<u8>, ErrorStack> {
    let Some(md) = message_digest(alg) else {
        let mut signer = Signer::new_without_digest(key)?;
        return signer.sign_oneshot_to_vec(data);
    };

    let mut signer = Signer::new(md, key)?;
    if is_pss(alg) {
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.set_rsa_mgf1_md(md)?;
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
    }
    signer.update(data)?;
    signer.sign_to_vec()
}

/// Verify `signature` over `data`. A well-formed but wrong signature is
/// `Ok(false)`.
pub fn verify<T: HasPublic>(
    alg: SigningAlg,
    key: &PKeyRef<T>,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, ErrorStack> {
    let Some(md) = message_digest(alg) else {
        let mut verifier = Verifier::new_without_digest(key)?;
        return verifier.verify_oneshot(signature, data);
    };

    let mut verifier = Verifier::new(md, key)?;
    if is_pss(alg) {
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_mgf1_md(md)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
    }
    verifier.update(data)?;
    verifier.verify(signature)
}
