//! Private key handling for protection signatures and POP

use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, EncodePublicKey};
use zeroize::Zeroizing;

use super::{DigestAlgorithm, KeyKind};
use crate::asn1::oids;
use crate::error::{CmpError, Result};

/// A client-held private key
///
/// Owns the key material; RSA and Ed25519 keys zeroize on drop inside
/// their own crates.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA (PKCS#1 v1.5 signatures, key-transport decryption)
    Rsa(RsaPrivateKey),
    /// ECDSA over P-256
    P256(p256::ecdsa::SigningKey),
    /// Ed25519
    Ed25519(Box<ed25519_dalek::SigningKey>),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "PrivateKey({})", self.kind_name())
    }
}

impl PrivateKey {
    /// Parse a PKCS#8 DER private key, dispatching on the algorithm OID.
    pub fn from_pkcs8_der(der_bytes: &[u8]) -> Result<Self> {
        let info = rsa::pkcs8::PrivateKeyInfo::try_from(der_bytes)
            .map_err(|e| CmpError::BadKey(format!("PKCS#8: {e}")))?;
        let oid = info.algorithm.oid;
        if oid == oids::RSA_ENCRYPTION {
            Ok(PrivateKey::Rsa(
                RsaPrivateKey::from_pkcs8_der(der_bytes)
                    .map_err(|e| CmpError::BadKey(format!("RSA key: {e}")))?,
            ))
        } else if oid == oids::ID_EC_PUBLIC_KEY {
            Ok(PrivateKey::P256(
                p256::ecdsa::SigningKey::from_pkcs8_der(der_bytes)
                    .map_err(|e| CmpError::BadKey(format!("P-256 key: {e}")))?,
            ))
        } else if oid == oids::ID_ED25519 {
            Ok(PrivateKey::Ed25519(Box::new(
                ed25519_dalek::SigningKey::from_pkcs8_der(der_bytes)
                    .map_err(|e| CmpError::BadKey(format!("Ed25519 key: {e}")))?,
            )))
        } else {
            Err(CmpError::UnsupportedAlgorithm(format!("private key {oid}")))
        }
    }

    /// Parse a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem_str: &str) -> Result<Self> {
        let parsed =
            pem::parse(pem_str).map_err(|e| CmpError::BadKey(format!("PEM: {e}")))?;
        if parsed.tag() != "PRIVATE KEY" {
            return Err(CmpError::BadKey(format!(
                "expected PRIVATE KEY, got {}",
                parsed.tag()
            )));
        }
        Self::from_pkcs8_der(parsed.contents())
    }

    /// Key family of this key.
    pub fn kind(&self) -> KeyKind {
        match self {
            PrivateKey::Rsa(_) => KeyKind::Rsa,
            PrivateKey::P256(_) => KeyKind::EcP256,
            PrivateKey::Ed25519(_) => KeyKind::Ed25519,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "rsa",
            PrivateKey::P256(_) => "p256",
            PrivateKey::Ed25519(_) => "ed25519",
        }
    }

    /// DER-encoded SubjectPublicKeyInfo of the matching public key.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            PrivateKey::Rsa(k) => rsa::RsaPublicKey::from(k)
                .to_public_key_der()
                .map_err(|e| CmpError::BadKey(format!("RSA SPKI: {e}")))?,
            PrivateKey::P256(k) => k
                .verifying_key()
                .to_public_key_der()
                .map_err(|e| CmpError::BadKey(format!("EC SPKI: {e}")))?,
            PrivateKey::Ed25519(k) => k
                .verifying_key()
                .to_public_key_der()
                .map_err(|e| CmpError::BadKey(format!("Ed25519 SPKI: {e}")))?,
        };
        Ok(doc.as_bytes().to_vec())
    }

    /// The signature AlgorithmIdentifier for this key with the given
    /// digest. RSA carries explicit NULL parameters; the others omit them.
    pub fn signature_alg(&self, digest: DigestAlgorithm) -> Result<AlgorithmIdentifierOwned> {
        let (oid, null_params) = match (self, digest) {
            (PrivateKey::Rsa(_), DigestAlgorithm::Sha1) => (oids::SHA1_WITH_RSA, true),
            (PrivateKey::Rsa(_), DigestAlgorithm::Sha256) => (oids::SHA256_WITH_RSA, true),
            (PrivateKey::Rsa(_), DigestAlgorithm::Sha384) => (oids::SHA384_WITH_RSA, true),
            (PrivateKey::Rsa(_), DigestAlgorithm::Sha512) => (oids::SHA512_WITH_RSA, true),
            (PrivateKey::P256(_), DigestAlgorithm::Sha256) => (oids::ECDSA_WITH_SHA256, false),
            (PrivateKey::P256(_), other) => {
                return Err(CmpError::UnsupportedAlgorithm(format!(
                    "ECDSA P-256 with {other:?}"
                )));
            }
            // Ed25519 ignores the digest preference
            (PrivateKey::Ed25519(_), _) => (oids::ID_ED25519, false),
        };
        Ok(AlgorithmIdentifierOwned {
            oid,
            parameters: null_params.then(|| der::Any::from(der::AnyRef::NULL)),
        })
    }

    /// Sign `data` under this key, hashing with `digest` where the
    /// algorithm calls for an explicit digest.
    pub fn sign(&self, digest: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PrivateKey::Rsa(k) => {
                let hashed = digest.digest(data);
                let padding = match digest {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                    DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
                    DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
                };
                k.sign(padding, &hashed).map_err(CmpError::Rsa)
            }
            PrivateKey::P256(k) => {
                use p256::ecdsa::signature::Signer;
                if digest != DigestAlgorithm::Sha256 {
                    return Err(CmpError::UnsupportedAlgorithm(format!(
                        "ECDSA P-256 with {digest:?}"
                    )));
                }
                let sig: p256::ecdsa::Signature = k.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            PrivateKey::Ed25519(k) => {
                use ed25519_dalek::Signer;
                Ok(k.sign(data).to_bytes().to_vec())
            }
        }
    }

    /// Decrypt a key-transport blob (indirect POP encSymmKey). Only RSA
    /// keys can do this.
    pub fn decrypt_key_transport(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            PrivateKey::Rsa(k) => k
                .decrypt(Pkcs1v15Encrypt, ciphertext)
                .map(Zeroizing::new)
                .map_err(CmpError::Rsa),
            _ => Err(CmpError::BadKey(
                "key transport decryption requires an RSA key".into(),
            )),
        }
    }

    /// True when `spki_der` holds the public half of this key.
    pub fn matches_spki(&self, spki_der: &[u8]) -> bool {
        self.public_key_der()
            .map(|ours| ours == spki_der)
            .unwrap_or(false)
    }
}
