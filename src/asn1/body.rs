//! PKIBody and the per-exchange content types (RFC 4210 §5.1.2, §5.3)

use der::asn1::{GeneralizedTime, Null, OctetString};
use der::{Choice, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::crl::CertificateList;
use x509_cert::ext::Extensions;
use x509_cert::request::CertReq;

use super::crmf::{CertId, CertReqMessages, CertTemplate, EncryptedValue};
use super::header::{InfoTypeAndValue, PkiFreeText};
use super::message::{CmpCertificate, PkiMessage};
use super::status::{PkiStatus, PkiStatusInfo};

/// ```asn1
/// PKIBody ::= CHOICE {
///   ir [0] ..., ip [1] ..., cr [2] ..., cp [3] ..., p10cr [4] ...,
///   popdecc [5] ..., popdecr [6] ..., kur [7] ..., kup [8] ...,
///   krr [9] ..., krp [10] ..., rr [11] ..., rp [12] ..., ccr [13] ...,
///   ccp [14] ..., ckuann [15] ..., cann [16] ..., rann [17] ...,
///   crlann [18] ..., pkiconf [19] ..., nested [20] ..., genm [21] ...,
///   genp [22] ..., error [23] ..., certConf [24] ..., pollReq [25] ...,
///   pollRep [26] ... }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Choice)]
#[allow(clippy::large_enum_variant)]
pub enum PkiBody {
    /// Initialization request
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Ir(CertReqMessages),
    /// Initialization response
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    Ip(CertRepMessage),
    /// Certification request
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    Cr(CertReqMessages),
    /// Certification response
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", constructed = "true")]
    Cp(CertRepMessage),
    /// PKCS#10 certification request
    #[asn1(context_specific = "4", tag_mode = "EXPLICIT", constructed = "true")]
    P10cr(CertReq),
    /// POP decryption challenge
    #[asn1(context_specific = "5", tag_mode = "EXPLICIT", constructed = "true")]
    Popdecc(PopoDecKeyChallContent),
    /// POP decryption response
    #[asn1(context_specific = "6", tag_mode = "EXPLICIT", constructed = "true")]
    Popdecr(PopoDecKeyRespContent),
    /// Key update request
    #[asn1(context_specific = "7", tag_mode = "EXPLICIT", constructed = "true")]
    Kur(CertReqMessages),
    /// Key update response
    #[asn1(context_specific = "8", tag_mode = "EXPLICIT", constructed = "true")]
    Kup(CertRepMessage),
    /// Key recovery request
    #[asn1(context_specific = "9", tag_mode = "EXPLICIT", constructed = "true")]
    Krr(CertReqMessages),
    /// Key recovery response
    #[asn1(context_specific = "10", tag_mode = "EXPLICIT", constructed = "true")]
    Krp(KeyRecRepContent),
    /// Revocation request
    #[asn1(context_specific = "11", tag_mode = "EXPLICIT", constructed = "true")]
    Rr(RevReqContent),
    /// Revocation response
    #[asn1(context_specific = "12", tag_mode = "EXPLICIT", constructed = "true")]
    Rp(RevRepContent),
    /// Cross-certification request (structural support only)
    #[asn1(context_specific = "13", tag_mode = "EXPLICIT", constructed = "true")]
    Ccr(CertReqMessages),
    /// Cross-certification response (structural support only)
    #[asn1(context_specific = "14", tag_mode = "EXPLICIT", constructed = "true")]
    Ccp(CertRepMessage),
    /// CA key update announcement
    #[asn1(context_specific = "15", tag_mode = "EXPLICIT", constructed = "true")]
    Ckuann(CaKeyUpdAnnContent),
    /// Certificate announcement
    #[asn1(context_specific = "16", tag_mode = "EXPLICIT", constructed = "true")]
    Cann(CmpCertificate),
    /// Revocation announcement
    #[asn1(context_specific = "17", tag_mode = "EXPLICIT", constructed = "true")]
    Rann(RevAnnContent),
    /// CRL announcement
    #[asn1(context_specific = "18", tag_mode = "EXPLICIT", constructed = "true")]
    Crlann(CrlAnnContent),
    /// Confirmation of a certConf
    #[asn1(context_specific = "19", tag_mode = "EXPLICIT", constructed = "true")]
    Pkiconf(Null),
    /// Nested message
    #[asn1(context_specific = "20", tag_mode = "EXPLICIT", constructed = "true")]
    Nested(Vec<PkiMessage>),
    /// General message
    #[asn1(context_specific = "21", tag_mode = "EXPLICIT", constructed = "true")]
    Genm(GenMsgContent),
    /// General response
    #[asn1(context_specific = "22", tag_mode = "EXPLICIT", constructed = "true")]
    Genp(GenRepContent),
    /// Error message
    #[asn1(context_specific = "23", tag_mode = "EXPLICIT", constructed = "true")]
    Error(ErrorMsgContent),
    /// Certificate confirmation by the end entity
    #[asn1(context_specific = "24", tag_mode = "EXPLICIT", constructed = "true")]
    Certconf(CertConfirmContent),
    /// Polling request
    #[asn1(context_specific = "25", tag_mode = "EXPLICIT", constructed = "true")]
    Pollreq(PollReqContent),
    /// Polling response
    #[asn1(context_specific = "26", tag_mode = "EXPLICIT", constructed = "true")]
    Pollrep(PollRepContent),
}

impl PkiBody {
    /// Short wire name of this body type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PkiBody::Ir(_) => "ir",
            PkiBody::Ip(_) => "ip",
            PkiBody::Cr(_) => "cr",
            PkiBody::Cp(_) => "cp",
            PkiBody::P10cr(_) => "p10cr",
            PkiBody::Popdecc(_) => "popdecc",
            PkiBody::Popdecr(_) => "popdecr",
            PkiBody::Kur(_) => "kur",
            PkiBody::Kup(_) => "kup",
            PkiBody::Krr(_) => "krr",
            PkiBody::Krp(_) => "krp",
            PkiBody::Rr(_) => "rr",
            PkiBody::Rp(_) => "rp",
            PkiBody::Ccr(_) => "ccr",
            PkiBody::Ccp(_) => "ccp",
            PkiBody::Ckuann(_) => "ckuann",
            PkiBody::Cann(_) => "cann",
            PkiBody::Rann(_) => "rann",
            PkiBody::Crlann(_) => "crlann",
            PkiBody::Pkiconf(_) => "pkiconf",
            PkiBody::Nested(_) => "nested",
            PkiBody::Genm(_) => "genm",
            PkiBody::Genp(_) => "genp",
            PkiBody::Error(_) => "error",
            PkiBody::Certconf(_) => "certConf",
            PkiBody::Pollreq(_) => "pollReq",
            PkiBody::Pollrep(_) => "pollRep",
        }
    }
}

/// ```asn1
/// CertRepMessage ::= SEQUENCE {
///   caPubs    [1] SEQUENCE SIZE (1..MAX) OF CMPCertificate OPTIONAL,
///   response  SEQUENCE OF CertResponse }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertRepMessage {
    /// CA certificates the server wants the client to know about
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub ca_pubs: Option<Vec<CmpCertificate>>,
    /// One CertResponse per request (this client accepts exactly one)
    pub response: Vec<CertResponse>,
}

/// ```asn1
/// CertResponse ::= SEQUENCE {
///   certReqId         INTEGER,
///   status            PKIStatusInfo,
///   certifiedKeyPair  CertifiedKeyPair  OPTIONAL,
///   rspInfo           OCTET STRING      OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertResponse {
    /// Echo of the request's certReqId
    pub cert_req_id: i32,
    /// Outcome for this request
    pub status: PkiStatusInfo,
    /// The issued material, present on success
    pub certified_key_pair: Option<CertifiedKeyPair>,
    /// Server-defined response info
    pub rsp_info: Option<OctetString>,
}

/// ```asn1
/// CertifiedKeyPair ::= SEQUENCE {
///   certOrEncCert    CertOrEncCert,
///   privateKey       [0] EncryptedValue       OPTIONAL,
///   publicationInfo  [1] PKIPublicationInfo   OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertifiedKeyPair {
    /// The certificate, plain or encrypted for indirect POP
    pub cert_or_enc_cert: CertOrEncCert,
    /// Centrally generated private key (not requested by this client)
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub private_key: Option<EncryptedValue>,
    /// Where the CA published the certificate
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub publication_info: Option<PkiPublicationInfo>,
}

/// ```asn1
/// CertOrEncCert ::= CHOICE {
///   certificate    [0] CMPCertificate,
///   encryptedCert  [1] EncryptedValue }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Choice)]
#[allow(clippy::large_enum_variant)]
pub enum CertOrEncCert {
    /// Certificate in the clear
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Certificate(CmpCertificate),
    /// Certificate encrypted pending proof of possession
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    EncryptedCert(EncryptedValue),
}

/// ```asn1
/// PKIPublicationInfo ::= SEQUENCE {
///   action    INTEGER { dontPublish (0), pleasePublish (1) },
///   pubInfos  SEQUENCE SIZE (1..MAX) OF SinglePubInfo OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkiPublicationInfo {
    /// dontPublish (0) or pleasePublish (1)
    pub action: i32,
    /// Publication locations
    pub pub_infos: Option<Vec<SinglePubInfo>>,
}

/// ```asn1
/// SinglePubInfo ::= SEQUENCE {
///   pubMethod    INTEGER { dontCare (0), x500 (1), web (2), ldap (3) },
///   pubLocation  GeneralName OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct SinglePubInfo {
    /// Publication method
    pub pub_method: i32,
    /// Location to publish at
    pub pub_location: Option<x509_cert::ext::pkix::name::GeneralName>,
}

/// ```asn1
/// KeyRecRepContent ::= SEQUENCE {
///   status       PKIStatusInfo,
///   newSigCert   [0] CMPCertificate                       OPTIONAL,
///   caCerts      [1] SEQUENCE SIZE (1..MAX) OF CMPCertificate OPTIONAL,
///   keyPairHist  [2] SEQUENCE SIZE (1..MAX) OF CertifiedKeyPair OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct KeyRecRepContent {
    /// Outcome of the key recovery
    pub status: PkiStatusInfo,
    /// Replacement signing certificate
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub new_sig_cert: Option<CmpCertificate>,
    /// Relevant CA certificates
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub ca_certs: Option<Vec<CmpCertificate>>,
    /// Recovered key history
    #[asn1(context_specific = "2", optional = "true", tag_mode = "EXPLICIT")]
    pub key_pair_hist: Option<Vec<CertifiedKeyPair>>,
}

/// ```asn1
/// Challenge ::= SEQUENCE {
///   owf        AlgorithmIdentifier OPTIONAL,
///   witness    OCTET STRING,
///   challenge  OCTET STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct Challenge {
    /// One-way function over the challenge
    pub owf: Option<AlgorithmIdentifierOwned>,
    /// Hash of the random number
    pub witness: OctetString,
    /// Encrypted challenge content
    pub challenge: OctetString,
}

/// ```asn1
/// POPODecKeyChallContent ::= SEQUENCE OF Challenge
/// ```
pub type PopoDecKeyChallContent = Vec<Challenge>;

/// ```asn1
/// POPODecKeyRespContent ::= SEQUENCE OF INTEGER
/// ```
pub type PopoDecKeyRespContent = Vec<i32>;

/// ```asn1
/// RevReqContent ::= SEQUENCE OF RevDetails
/// ```
pub type RevReqContent = Vec<RevDetails>;

/// ```asn1
/// RevDetails ::= SEQUENCE {
///   certDetails      CertTemplate,
///   crlEntryDetails  Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct RevDetails {
    /// Identifies the certificate to revoke (issuer + serial)
    pub cert_details: CertTemplate,
    /// CRL entry extensions, typically the reason code
    pub crl_entry_details: Option<Extensions>,
}

/// ```asn1
/// RevRepContent ::= SEQUENCE {
///   status    SEQUENCE SIZE (1..MAX) OF PKIStatusInfo,
///   revCerts  [0] SEQUENCE SIZE (1..MAX) OF CertId          OPTIONAL,
///   crls      [1] SEQUENCE SIZE (1..MAX) OF CertificateList OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct RevRepContent {
    /// One status per requested revocation, in request order
    pub status: Vec<PkiStatusInfo>,
    /// Identifies the certificates for which revocation was granted
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub rev_certs: Option<Vec<CertId>>,
    /// Resulting CRLs
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub crls: Option<Vec<CertificateList>>,
}

/// ```asn1
/// CAKeyUpdAnnContent ::= SEQUENCE {
///   oldWithNew  CMPCertificate,
///   newWithOld  CMPCertificate,
///   newWithNew  CMPCertificate }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CaKeyUpdAnnContent {
    /// Old CA key signed with the new key
    pub old_with_new: CmpCertificate,
    /// New CA key signed with the old key
    pub new_with_old: CmpCertificate,
    /// New CA key self-signed
    pub new_with_new: CmpCertificate,
}

/// ```asn1
/// RevAnnContent ::= SEQUENCE {
///   status           PKIStatus,
///   certId           CertId,
///   willBeRevokedAt  GeneralizedTime,
///   badSinceDate     GeneralizedTime,
///   crlDetails       Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct RevAnnContent {
    /// Announcement status
    pub status: PkiStatus,
    /// Certificate being revoked
    pub cert_id: CertId,
    /// When the revocation takes effect
    pub will_be_revoked_at: GeneralizedTime,
    /// When the key is suspected compromised since
    pub bad_since_date: GeneralizedTime,
    /// Extra CRL details
    pub crl_details: Option<Extensions>,
}

/// ```asn1
/// CRLAnnContent ::= SEQUENCE OF CertificateList
/// ```
pub type CrlAnnContent = Vec<CertificateList>;

/// ```asn1
/// GenMsgContent ::= SEQUENCE OF InfoTypeAndValue
/// ```
pub type GenMsgContent = Vec<InfoTypeAndValue>;

/// ```asn1
/// GenRepContent ::= SEQUENCE OF InfoTypeAndValue
/// ```
pub type GenRepContent = Vec<InfoTypeAndValue>;

/// ```asn1
/// ErrorMsgContent ::= SEQUENCE {
///   pKIStatusInfo  PKIStatusInfo,
///   errorCode      INTEGER      OPTIONAL,
///   errorDetails   PKIFreeText  OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ErrorMsgContent {
    /// Status the error elaborates on
    pub pki_status_info: PkiStatusInfo,
    /// Implementation-specific error code
    pub error_code: Option<i64>,
    /// Implementation-specific error detail
    pub error_details: Option<PkiFreeText>,
}

/// ```asn1
/// CertConfirmContent ::= SEQUENCE OF CertStatus
/// ```
pub type CertConfirmContent = Vec<CertStatus>;

/// ```asn1
/// CertStatus ::= SEQUENCE {
///   certHash    OCTET STRING,
///   certReqId   INTEGER,
///   statusInfo  PKIStatusInfo OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertStatus {
    /// Digest of the certificate being confirmed
    pub cert_hash: OctetString,
    /// Request the confirmation refers to
    pub cert_req_id: i32,
    /// accepted when absent
    pub status_info: Option<PkiStatusInfo>,
}

/// ```asn1
/// PollReqContent ::= SEQUENCE OF SEQUENCE { certReqId INTEGER }
/// ```
pub type PollReqContent = Vec<PollReq>;

/// One element of PollReqContent.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PollReq {
    /// Outstanding request being polled for
    pub cert_req_id: i32,
}

/// ```asn1
/// PollRepContent ::= SEQUENCE OF SEQUENCE {
///   certReqId   INTEGER,
///   checkAfter  INTEGER,
///   reason      PKIFreeText OPTIONAL }
/// ```
pub type PollRepContent = Vec<PollRep>;

/// One element of PollRepContent.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PollRep {
    /// Outstanding request this poll answer refers to
    pub cert_req_id: i32,
    /// Seconds to wait before the next pollReq; negative is a peer error
    pub check_after: i64,
    /// Why the request is still pending
    pub reason: Option<PkiFreeText>,
}
