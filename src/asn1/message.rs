//! Top-level PKIMessage and the protection input

use der::asn1::BitString;
use der::Sequence;

use super::body::PkiBody;
use super::header::PkiHeader;

/// A certificate as CMP carries it.
///
/// ```asn1
/// CMPCertificate ::= CHOICE { x509v3PKCert Certificate }
/// ```
///
/// The single CHOICE alternative is untagged, so the wire form is exactly
/// an X.509 Certificate.
pub type CmpCertificate = x509_cert::Certificate;

/// ```asn1
/// PKIMessage ::= SEQUENCE {
///   header      PKIHeader,
///   body        PKIBody,
///   protection  [0] PKIProtection                            OPTIONAL,
///   extraCerts  [1] SEQUENCE SIZE (1..MAX) OF CMPCertificate OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkiMessage {
    /// Transaction bookkeeping and protection metadata
    pub header: PkiHeader,
    /// The typed payload
    pub body: PkiBody,
    /// MAC or signature over [`ProtectedPart`]
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub protection: Option<BitString>,
    /// Certificates useful to the recipient; never covered by protection
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub extra_certs: Option<Vec<CmpCertificate>>,
}

/// ```asn1
/// ProtectedPart ::= SEQUENCE { header PKIHeader, body PKIBody }
/// ```
///
/// The DER encoding of this value is the sole input to protection
/// computation; `protection` and `extraCerts` are never covered.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ProtectedPart {
    /// Header exactly as sent
    pub header: PkiHeader,
    /// Body exactly as sent
    pub body: PkiBody,
}

impl PkiMessage {
    /// An unprotected message with no extraCerts.
    pub fn new(header: PkiHeader, body: PkiBody) -> Self {
        Self {
            header,
            body,
            protection: None,
            extra_certs: None,
        }
    }

    /// The DER bytes protection is computed over.
    pub fn protected_part_der(&self) -> der::Result<Vec<u8>> {
        use der::Encode;
        ProtectedPart {
            header: self.header.clone(),
            body: self.body.clone(),
        }
        .to_der()
    }
}
