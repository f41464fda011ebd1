//! Message protection engine (RFC 4210 §5.1.3)
//!
//! Computes and verifies `PKIProtection` over the DER-encoded
//! `ProtectedPart`. Two orthogonal modes: password-based MAC (§5.1.3.1)
//! and digital signature (§5.1.3.3). DH-based MAC is recognized and
//! refused.

mod discovery;

pub use discovery::{find_sender_cert, unprotected_exception, verify_incoming};

use der::asn1::BitString;
use zeroize::Zeroizing;

use crate::asn1::{oids, PbmParameter, PkiMessage};
use crate::crypto::{sig_alg_info, DigestAlgorithm, MacAlgorithm, PrivateKey};
use crate::error::{CmpError, Result};
use crate::truststore;

/// Credentials for protecting an outgoing message
pub enum ProtectionCredentials<'a> {
    /// Shared secret for password-based MAC
    Pbm {
        /// The raw shared secret octets
        secret: &'a [u8],
    },
    /// Private key for signature protection
    Signature {
        /// The signing key; must match the installed protectionAlg
        key: &'a PrivateKey,
    },
}

/// Derive the PBM base key: `owf^(iterationCount)(secret ∥ salt)`.
///
/// The intermediate and final buffers are zeroized on drop.
pub fn pbm_base_key(secret: &[u8], pbm: &PbmParameter) -> Result<Zeroizing<Vec<u8>>> {
    pbm.validate()?;
    let owf = DigestAlgorithm::from_oid(&pbm.owf.oid)?;

    let mut seed = Zeroizing::new(Vec::with_capacity(secret.len() + pbm.salt.as_bytes().len()));
    seed.extend_from_slice(secret);
    seed.extend_from_slice(pbm.salt.as_bytes());

    let mut base = Zeroizing::new(owf.digest(&seed));
    for _ in 1..pbm.iteration_count {
        base = Zeroizing::new(owf.digest(&base));
    }
    Ok(base)
}

/// Compute the protection value for a message whose header already carries
/// `protectionAlg`. Returns the byte-aligned BIT STRING.
pub fn compute_protection(
    msg: &PkiMessage,
    credentials: &ProtectionCredentials<'_>,
) -> Result<BitString> {
    let alg = msg
        .header
        .protection_alg
        .as_ref()
        .ok_or_else(|| CmpError::Configuration("protectionAlg not installed".into()))?;
    let protected = msg.protected_part_der()?;

    let tag = if alg.oid == oids::ID_PASSWORD_BASED_MAC {
        let ProtectionCredentials::Pbm { secret } = credentials else {
            return Err(CmpError::Configuration(
                "PBM protection requires a shared secret".into(),
            ));
        };
        let pbm = decode_pbm_params(alg)?;
        let base = pbm_base_key(secret, &pbm)?;
        let mac = MacAlgorithm::from_oid(&pbm.mac.oid)?;
        mac.tag(&base, &protected)?
    } else if alg.oid == oids::ID_DH_BASED_MAC {
        return Err(CmpError::UnsupportedAlgorithm("DHBasedMac".into()));
    } else {
        let ProtectionCredentials::Signature { key } = credentials else {
            return Err(CmpError::Configuration(
                "signature protection requires a private key".into(),
            ));
        };
        let info = sig_alg_info(&alg.oid)?;
        if info.key != key.kind() {
            return Err(CmpError::BadKey(format!(
                "protectionAlg {} does not match the supplied key",
                alg.oid
            )));
        }
        key.sign(info.digest.unwrap_or_default(), &protected)?
    };

    BitString::from_bytes(&tag).map_err(CmpError::Asn1)
}

/// Verify PBM protection by recomputing the tag; comparison is constant
/// time inside the MAC implementation.
pub fn verify_pbm(msg: &PkiMessage, secret: &[u8]) -> Result<()> {
    let alg = msg
        .header
        .protection_alg
        .as_ref()
        .ok_or(CmpError::MissingProtection)?;
    if alg.oid != oids::ID_PASSWORD_BASED_MAC {
        return Err(CmpError::WrongAlgorithmOid(format!("{}", alg.oid)));
    }
    let protection = msg.protection.as_ref().ok_or(CmpError::MissingProtection)?;
    let pbm = decode_pbm_params(alg)?;
    let base = pbm_base_key(secret, &pbm)?;
    let mac = MacAlgorithm::from_oid(&pbm.mac.oid)?;
    mac.verify(&base, &msg.protected_part_der()?, protection.raw_bytes())
}

/// Verify signature protection under a candidate sender certificate.
///
/// Checks that the certificate's key algorithm matches the signature OID,
/// that keyUsage (when present and not ignored) includes digitalSignature,
/// then verifies the signature itself.
pub fn verify_signature_protection(
    msg: &PkiMessage,
    sender_cert: &crate::asn1::CmpCertificate,
    ignore_key_usage: bool,
) -> Result<()> {
    let alg = msg
        .header
        .protection_alg
        .as_ref()
        .ok_or(CmpError::MissingProtection)?;
    let protection = msg.protection.as_ref().ok_or(CmpError::MissingProtection)?;
    let info = sig_alg_info(&alg.oid)?;

    let spki = &sender_cert.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != info.key.spki_oid() {
        return Err(CmpError::WrongAlgorithmOid(format!(
            "certificate key {} vs protection {}",
            spki.algorithm.oid, alg.oid
        )));
    }
    if !ignore_key_usage && !truststore::allows_digital_signature(sender_cert) {
        return Err(CmpError::MissingKeyUsageDigitalSignature);
    }
    let spki_der = truststore::spki_der(sender_cert)?;
    crate::crypto::verify_signature(
        &spki_der,
        &alg.oid,
        &msg.protected_part_der()?,
        protection.raw_bytes(),
    )
}

/// Decode PBMParameter out of the protectionAlg parameters; bounds are
/// checked before any use.
pub fn decode_pbm_params(alg: &spki::AlgorithmIdentifierOwned) -> Result<PbmParameter> {
    let any = alg
        .parameters
        .as_ref()
        .ok_or_else(|| CmpError::InvalidParameter("PBM without parameters".into()))?;
    let pbm: PbmParameter = any.decode_as().map_err(CmpError::Asn1)?;
    pbm.validate()?;
    Ok(pbm)
}
