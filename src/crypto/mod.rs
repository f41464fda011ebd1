//! Crypto facade
//!
//! Named handles for the digest, MAC, signature, and cipher operations the
//! protocol needs, plus the signature-OID registry. Algorithm bodies live
//! in the RustCrypto crates; nothing here touches the wire format.

mod keys;

pub use keys::PrivateKey;

use der::asn1::ObjectIdentifier;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::DecodePublicKey;

use crate::asn1::oids;
use crate::error::{CmpError, Result};

/// Supported one-way functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy peers only)
    Sha1,
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// The algorithm OID.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => oids::ID_SHA1,
            DigestAlgorithm::Sha256 => oids::ID_SHA256,
            DigestAlgorithm::Sha384 => oids::ID_SHA384,
            DigestAlgorithm::Sha512 => oids::ID_SHA512,
        }
    }

    /// Resolve an OID to a digest handle.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == oids::ID_SHA1 {
            Ok(DigestAlgorithm::Sha1)
        } else if *oid == oids::ID_SHA256 {
            Ok(DigestAlgorithm::Sha256)
        } else if *oid == oids::ID_SHA384 {
            Ok(DigestAlgorithm::Sha384)
        } else if *oid == oids::ID_SHA512 {
            Ok(DigestAlgorithm::Sha512)
        } else {
            Err(CmpError::UnsupportedAlgorithm(format!("digest {oid}")))
        }
    }

    /// One-shot digest.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Supported MAC algorithms for PBM protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacAlgorithm {
    /// HMAC-SHA1
    HmacSha1,
    /// HMAC-SHA256
    #[default]
    HmacSha256,
    /// HMAC-SHA384
    HmacSha384,
    /// HMAC-SHA512
    HmacSha512,
}

impl MacAlgorithm {
    /// The algorithm OID.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            MacAlgorithm::HmacSha1 => oids::ID_HMAC_SHA1,
            MacAlgorithm::HmacSha256 => oids::ID_HMAC_SHA256,
            MacAlgorithm::HmacSha384 => oids::ID_HMAC_SHA384,
            MacAlgorithm::HmacSha512 => oids::ID_HMAC_SHA512,
        }
    }

    /// Resolve an OID to a MAC handle.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == oids::ID_HMAC_SHA1 {
            Ok(MacAlgorithm::HmacSha1)
        } else if *oid == oids::ID_HMAC_SHA256 {
            Ok(MacAlgorithm::HmacSha256)
        } else if *oid == oids::ID_HMAC_SHA384 {
            Ok(MacAlgorithm::HmacSha384)
        } else if *oid == oids::ID_HMAC_SHA512 {
            Ok(MacAlgorithm::HmacSha512)
        } else {
            Err(CmpError::UnsupportedAlgorithm(format!("mac {oid}")))
        }
    }

    /// Compute the tag over `data` with `key`.
    pub fn tag(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        macro_rules! mac {
            ($digest:ty) => {{
                let mut m = Hmac::<$digest>::new_from_slice(key)
                    .map_err(|e| CmpError::BadKey(format!("HMAC key: {e}")))?;
                m.update(data);
                Ok(m.finalize().into_bytes().to_vec())
            }};
        }
        match self {
            MacAlgorithm::HmacSha1 => mac!(Sha1),
            MacAlgorithm::HmacSha256 => mac!(Sha256),
            MacAlgorithm::HmacSha384 => mac!(Sha384),
            MacAlgorithm::HmacSha512 => mac!(Sha512),
        }
    }

    /// Verify `tag` over `data` in constant time.
    pub fn verify(self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
        macro_rules! check {
            ($digest:ty) => {{
                let mut m = Hmac::<$digest>::new_from_slice(key)
                    .map_err(|e| CmpError::BadKey(format!("HMAC key: {e}")))?;
                m.update(data);
                m.verify_slice(tag)
                    .map_err(|_| CmpError::ErrorValidatingProtection("PBM tag mismatch".into()))
            }};
        }
        match self {
            MacAlgorithm::HmacSha1 => check!(Sha1),
            MacAlgorithm::HmacSha256 => check!(Sha256),
            MacAlgorithm::HmacSha384 => check!(Sha384),
            MacAlgorithm::HmacSha512 => check!(Sha512),
        }
    }
}

/// Public-key algorithm families the client can sign and verify with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// RSA with PKCS#1 v1.5 padding
    Rsa,
    /// ECDSA over P-256
    EcP256,
    /// Ed25519
    Ed25519,
}

impl KeyKind {
    /// OID of the subjectPublicKeyInfo algorithm for this family.
    pub fn spki_oid(self) -> ObjectIdentifier {
        match self {
            KeyKind::Rsa => oids::RSA_ENCRYPTION,
            KeyKind::EcP256 => oids::ID_EC_PUBLIC_KEY,
            KeyKind::Ed25519 => oids::ID_ED25519,
        }
    }
}

/// Decomposition of a signature algorithm OID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigAlgInfo {
    /// Digest half; `None` for algorithms with an intrinsic digest
    pub digest: Option<DigestAlgorithm>,
    /// Key family half
    pub key: KeyKind,
}

impl SigAlgInfo {
    /// Digest to use when hashing a certificate for certConf; algorithms
    /// without an explicit digest half fall back to SHA-256.
    pub fn confirm_digest(self) -> DigestAlgorithm {
        self.digest.unwrap_or(DigestAlgorithm::Sha256)
    }
}

/// sigid-lookup: map a signature OID to its (digest, key algorithm) pair.
pub fn sig_alg_info(oid: &ObjectIdentifier) -> Result<SigAlgInfo> {
    const TABLE: [(ObjectIdentifier, Option<DigestAlgorithm>, KeyKind); 6] = [
        (oids::SHA1_WITH_RSA, Some(DigestAlgorithm::Sha1), KeyKind::Rsa),
        (oids::SHA256_WITH_RSA, Some(DigestAlgorithm::Sha256), KeyKind::Rsa),
        (oids::SHA384_WITH_RSA, Some(DigestAlgorithm::Sha384), KeyKind::Rsa),
        (oids::SHA512_WITH_RSA, Some(DigestAlgorithm::Sha512), KeyKind::Rsa),
        (oids::ECDSA_WITH_SHA256, Some(DigestAlgorithm::Sha256), KeyKind::EcP256),
        (oids::ID_ED25519, None, KeyKind::Ed25519),
    ];
    TABLE
        .iter()
        .find(|(known, _, _)| known == oid)
        .map(|&(_, digest, key)| SigAlgInfo { digest, key })
        .ok_or_else(|| CmpError::WrongAlgorithmOid(format!("signature {oid}")))
}

/// Verify `sig` over `data` with the public key in `spki_der`, under the
/// signature algorithm named by `sig_oid`.
pub fn verify_signature(
    spki_der: &[u8],
    sig_oid: &ObjectIdentifier,
    data: &[u8],
    sig: &[u8],
) -> Result<()> {
    let info = sig_alg_info(sig_oid)?;
    match info.key {
        KeyKind::Rsa => {
            let key = RsaPublicKey::from_public_key_der(spki_der)
                .map_err(|e| CmpError::BadKey(format!("RSA SPKI: {e}")))?;
            let digest = info
                .digest
                .ok_or_else(|| CmpError::WrongAlgorithmOid(format!("{sig_oid}")))?;
            let hashed = digest.digest(data);
            let padding = match digest {
                DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
                DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
            };
            key.verify(padding, &hashed, sig)
                .map_err(|_| CmpError::ErrorValidatingProtection("RSA signature".into()))
        }
        KeyKind::EcP256 => {
            use p256::ecdsa::signature::Verifier;
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| CmpError::BadKey(format!("EC SPKI: {e}")))?;
            let sig = p256::ecdsa::Signature::from_der(sig)
                .map_err(|e| CmpError::Ecdsa(format!("signature DER: {e}")))?;
            key.verify(data, &sig)
                .map_err(|_| CmpError::ErrorValidatingProtection("ECDSA signature".into()))
        }
        KeyKind::Ed25519 => {
            use ed25519_dalek::Verifier;
            let key = ed25519_dalek::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| CmpError::BadKey(format!("Ed25519 SPKI: {e}")))?;
            let sig = ed25519_dalek::Signature::from_slice(sig)
                .map_err(|e| CmpError::BadKey(format!("Ed25519 signature: {e}")))?;
            key.verify(data, &sig)
                .map_err(|_| CmpError::ErrorValidatingProtection("Ed25519 signature".into()))
        }
    }
}

/// Decrypt `ciphertext` with an AES-CBC cipher named by `alg_oid`, without
/// padding removal. Used only for indirect-POP certificate decryption.
pub fn decrypt_symmetric(
    alg_oid: &ObjectIdentifier,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    use aes::cipher::block_padding::NoPadding;
    use aes::cipher::{BlockDecryptMut, KeyIvInit};

    fn run<C>(key: &[u8], iv: &[u8], ct: &[u8]) -> Result<Vec<u8>>
    where
        C: BlockDecryptMut + KeyIvInit,
    {
        let cipher = C::new_from_slices(key, iv)
            .map_err(|e| CmpError::BadKey(format!("cipher key/iv: {e}")))?;
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(ct)
            .map_err(|e| CmpError::InvalidParameter(format!("ciphertext: {e}")))
    }

    if *alg_oid == oids::AES128_CBC {
        run::<cbc::Decryptor<aes::Aes128>>(key, iv, ciphertext)
    } else if *alg_oid == oids::AES192_CBC {
        run::<cbc::Decryptor<aes::Aes192>>(key, iv, ciphertext)
    } else if *alg_oid == oids::AES256_CBC {
        run::<cbc::Decryptor<aes::Aes256>>(key, iv, ciphertext)
    } else {
        Err(CmpError::UnsupportedAlgorithm(format!("cipher {alg_oid}")))
    }
}

/// Draw `n` bytes from the operating system CSPRNG.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CmpError::RngFailure(e.to_string()))?;
    Ok(buf)
}
