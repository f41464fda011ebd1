//! Loading and saving keys, certificates, and CSRs (PEM or DER)

use std::path::Path;

use der::{Decode, Encode};
use x509_cert::request::CertReq;

use crate::asn1::CmpCertificate;
use crate::crypto::PrivateKey;
use crate::error::{CmpError, Result};

/// Load a single certificate from a PEM or DER file.
pub fn load_certificate(path: impl AsRef<Path>) -> Result<CmpCertificate> {
    let bytes = std::fs::read(path.as_ref())?;
    if looks_like_pem(&bytes) {
        let pem = pem::parse(&bytes).map_err(|e| CmpError::Other(format!("PEM: {e}")))?;
        expect_tag(&pem, "CERTIFICATE")?;
        decode_certificate(pem.contents())
    } else {
        decode_certificate(&bytes)
    }
}

/// Load every certificate from a PEM bundle (or a single DER file).
pub fn load_certificates(path: impl AsRef<Path>) -> Result<Vec<CmpCertificate>> {
    let bytes = std::fs::read(path.as_ref())?;
    if looks_like_pem(&bytes) {
        let pems =
            pem::parse_many(&bytes).map_err(|e| CmpError::Other(format!("PEM: {e}")))?;
        pems.iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(|p| decode_certificate(p.contents()))
            .collect()
    } else {
        Ok(vec![decode_certificate(&bytes)?])
    }
}

/// Load a PKCS#8 private key from a PEM or DER file.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKey> {
    let bytes = std::fs::read(path.as_ref())?;
    if looks_like_pem(&bytes) {
        let text = String::from_utf8(bytes)
            .map_err(|_| CmpError::BadKey("key file is not UTF-8".into()))?;
        PrivateKey::from_pkcs8_pem(&text)
    } else {
        PrivateKey::from_pkcs8_der(&bytes)
    }
}

/// Load a PKCS#10 certification request from a PEM or DER file.
pub fn load_csr(path: impl AsRef<Path>) -> Result<CertReq> {
    let bytes = std::fs::read(path.as_ref())?;
    let der_bytes = if looks_like_pem(&bytes) {
        let pem = pem::parse(&bytes).map_err(|e| CmpError::Other(format!("PEM: {e}")))?;
        expect_tag(&pem, "CERTIFICATE REQUEST")?;
        pem.contents().to_vec()
    } else {
        bytes
    };
    CertReq::from_der(&der_bytes)
        .map_err(|e| CmpError::ErrorDecodingMessage(format!("CSR: {e}")))
}

/// Write a certificate as PEM.
pub fn save_certificate_pem(path: impl AsRef<Path>, cert: &CmpCertificate) -> Result<()> {
    let der_bytes = cert.to_der().map_err(CmpError::Asn1)?;
    let pem = pem::Pem::new("CERTIFICATE", der_bytes);
    std::fs::write(path.as_ref(), pem::encode(&pem))?;
    Ok(())
}

fn decode_certificate(der_bytes: &[u8]) -> Result<CmpCertificate> {
    CmpCertificate::from_der(der_bytes)
        .map_err(|e| CmpError::ErrorDecodingMessage(format!("certificate: {e}")))
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.starts_with(b"-----BEGIN") || bytes.windows(10).any(|w| w == b"-----BEGIN")
}

fn expect_tag(pem: &pem::Pem, tag: &str) -> Result<()> {
    if pem.tag() != tag {
        return Err(CmpError::Other(format!(
            "expected {tag}, got {}",
            pem.tag()
        )));
    }
    Ok(())
}
