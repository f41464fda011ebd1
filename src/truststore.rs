//! Certificate pools and best-effort chain checks
//!
//! The heavyweight PKIX path machinery stays external; this module covers
//! what the protocol itself needs: deduplicated pools, subject/issuer
//! walking, ring-backed signature checks, and validity windows.

use der::Encode;
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::asn1::CmpCertificate;
use crate::error::{CmpError, Result};

/// Maximum chain length walked when building or verifying paths.
const MAX_CHAIN_DEPTH: usize = 10;

/// An ordered, DER-deduplicated collection of certificates
#[derive(Debug, Clone, Default)]
pub struct CertPool {
    certs: Vec<CmpCertificate>,
}

impl CertPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from owned certificates, deduplicating.
    pub fn from_certs(certs: impl IntoIterator<Item = CmpCertificate>) -> Self {
        let mut pool = Self::new();
        for cert in certs {
            pool.push(cert);
        }
        pool
    }

    /// Append, skipping duplicates. Returns true when inserted.
    pub fn push(&mut self, cert: CmpCertificate) -> bool {
        if self.certs.contains(&cert) {
            return false;
        }
        self.certs.push(cert);
        true
    }

    /// Insert at the front, skipping duplicates. Returns true when inserted.
    pub fn push_front(&mut self, cert: CmpCertificate) -> bool {
        if self.certs.contains(&cert) {
            return false;
        }
        self.certs.insert(0, cert);
        true
    }

    /// The certificates, in iteration order.
    pub fn certs(&self) -> &[CmpCertificate] {
        &self.certs
    }

    /// Number of certificates held.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// True when no certificate is held.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// Encode a certificate to DER.
pub fn cert_der(cert: &CmpCertificate) -> Result<Vec<u8>> {
    cert.to_der().map_err(CmpError::Asn1)
}

/// Run `f` over the x509-parser view of a certificate.
fn with_parsed<T>(der_bytes: &[u8], f: impl FnOnce(&X509Certificate<'_>) -> T) -> Result<T> {
    let (_, parsed) = X509Certificate::from_der(der_bytes)
        .map_err(|e| CmpError::ErrorDecodingMessage(format!("certificate: {e}")))?;
    Ok(f(&parsed))
}

/// True when the certificate's validity window contains the current time.
pub fn validity_contains_now(cert: &CmpCertificate) -> bool {
    let Ok(der_bytes) = cert_der(cert) else {
        return false;
    };
    with_parsed(&der_bytes, |c| c.validity().is_valid()).unwrap_or(false)
}

/// True when the certificate is self-signed and its signature verifies
/// with its own key.
pub fn is_self_signed(cert: &CmpCertificate) -> bool {
    let Ok(der_bytes) = cert_der(cert) else {
        return false;
    };
    with_parsed(&der_bytes, |c| {
        c.subject() == c.issuer() && c.verify_signature(None).is_ok()
    })
    .unwrap_or(false)
}

/// True when `subject` was directly issued by `issuer`: the names link and
/// the signature verifies under the issuer key.
pub fn directly_issued(subject: &CmpCertificate, issuer: &CmpCertificate) -> bool {
    let (Ok(subj_der), Ok(iss_der)) = (cert_der(subject), cert_der(issuer)) else {
        return false;
    };
    let Ok((_, subj)) = X509Certificate::from_der(&subj_der) else {
        return false;
    };
    let Ok((_, iss)) = X509Certificate::from_der(&iss_der) else {
        return false;
    };
    subj.issuer() == iss.subject() && subj.verify_signature(Some(iss.public_key())).is_ok()
}

/// Best-effort chain from `leaf` up to, but excluding, a trust anchor.
///
/// Issuers are looked up in `untrusted`; link failures end the walk rather
/// than fail it. The leaf itself is not included.
pub fn build_chain(leaf: &CmpCertificate, untrusted: &CertPool) -> Vec<CmpCertificate> {
    let mut chain = Vec::new();
    let mut current = leaf.clone();
    for _ in 0..MAX_CHAIN_DEPTH {
        if is_self_signed(&current) {
            break;
        }
        let Some(issuer) = untrusted
            .certs()
            .iter()
            .find(|cand| !chain.contains(*cand) && directly_issued(&current, cand))
        else {
            break;
        };
        if is_self_signed(issuer) {
            // Reached a root; a trust anchor is never shipped in extraCerts.
            break;
        }
        chain.push(issuer.clone());
        current = issuer.clone();
    }
    chain
}

/// Verify that `leaf` chains to one of `anchors`, walking intermediate
/// issuers through `untrusted`. Signatures and validity windows are
/// checked at every step.
pub fn verify_chain(
    leaf: &CmpCertificate,
    anchors: &CertPool,
    untrusted: &CertPool,
) -> Result<()> {
    if anchors.is_empty() {
        return Err(CmpError::UntrustedServerCert("empty trust store".into()));
    }
    if !validity_contains_now(leaf) {
        return Err(CmpError::UntrustedServerCert(
            "certificate outside its validity window".into(),
        ));
    }
    // The leaf may itself be a trust anchor.
    if anchors.certs().contains(leaf) {
        return Ok(());
    }

    let mut current = leaf.clone();
    for _ in 0..MAX_CHAIN_DEPTH {
        if let Some(anchor) = anchors
            .certs()
            .iter()
            .find(|a| directly_issued(&current, a))
        {
            if !validity_contains_now(anchor) {
                return Err(CmpError::UntrustedServerCert(
                    "trust anchor outside its validity window".into(),
                ));
            }
            return Ok(());
        }
        let Some(issuer) = untrusted
            .certs()
            .iter()
            .find(|cand| *cand != &current && directly_issued(&current, cand))
        else {
            debug!("chain walk ended without reaching a trust anchor");
            return Err(CmpError::UntrustedServerCert(
                "no path to a trust anchor".into(),
            ));
        };
        if !validity_contains_now(issuer) {
            return Err(CmpError::UntrustedServerCert(
                "intermediate outside its validity window".into(),
            ));
        }
        current = issuer.clone();
    }
    Err(CmpError::UntrustedServerCert("chain too deep".into()))
}

/// Subject name DER of a certificate.
pub fn subject_der(cert: &CmpCertificate) -> Result<Vec<u8>> {
    cert.tbs_certificate.subject.to_der().map_err(CmpError::Asn1)
}

/// DER-encoded SubjectPublicKeyInfo of a certificate.
pub fn spki_der(cert: &CmpCertificate) -> Result<Vec<u8>> {
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(CmpError::Asn1)
}

/// Subject Key Identifier extension value, if present.
pub fn subject_key_id(cert: &CmpCertificate) -> Option<Vec<u8>> {
    let der_bytes = cert_der(cert).ok()?;
    let (_, parsed) = X509Certificate::from_der(&der_bytes).ok()?;
    parsed
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            x509_parser::extensions::ParsedExtension::SubjectKeyIdentifier(ski) => {
                Some(ski.0.to_vec())
            }
            _ => None,
        })
}

/// True when keyUsage is absent or includes digitalSignature.
pub fn allows_digital_signature(cert: &CmpCertificate) -> bool {
    let Ok(der_bytes) = cert_der(cert) else {
        return false;
    };
    let Ok((_, parsed)) = X509Certificate::from_der(&der_bytes) else {
        return false;
    };
    match parsed.key_usage() {
        Ok(Some(ku)) => ku.value.digital_signature(),
        Ok(None) => true,
        Err(_) => false,
    }
}
