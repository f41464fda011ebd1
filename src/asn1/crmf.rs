//! CRMF request structures (RFC 4211)
//!
//! The CRMF module uses IMPLICIT tags; fields whose type is itself a
//! CHOICE (Name, Time, GeneralName) fall back to EXPLICIT per X.680.

use der::asn1::{BitString, Int, Null, OctetString};
use der::{Choice, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::time::Time;

use spki::SubjectPublicKeyInfoOwned;

/// ```asn1
/// CertReqMessages ::= SEQUENCE SIZE (1..MAX) OF CertReqMsg
/// ```
pub type CertReqMessages = Vec<CertReqMsg>;

/// ```asn1
/// Controls ::= SEQUENCE SIZE (1..MAX) OF AttributeTypeAndValue
/// ```
pub type Controls = Vec<AttributeTypeAndValue>;

/// ```asn1
/// CertReqMsg ::= SEQUENCE {
///   certReq   CertRequest,
///   popo      ProofOfPossession  OPTIONAL,
///   regInfo   SEQUENCE SIZE (1..MAX) OF AttributeTypeAndValue OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertReqMsg {
    /// The template-bearing request
    pub cert_req: CertRequest,
    /// Proof that the requester holds the private key
    pub popo: Option<ProofOfPossession>,
    /// Supplementary registration attributes
    pub reg_info: Option<Vec<AttributeTypeAndValue>>,
}

/// ```asn1
/// CertRequest ::= SEQUENCE {
///   certReqId     INTEGER,
///   certTemplate  CertTemplate,
///   controls      Controls OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertRequest {
    /// Matches request to response; this client pins it to 0 (−1 for P10CR)
    pub cert_req_id: i32,
    /// Requested certificate contents
    pub cert_template: CertTemplate,
    /// Registration controls such as OldCertId
    pub controls: Option<Controls>,
}

/// ```asn1
/// CertTemplate ::= SEQUENCE {
///   version       [0] Version                 OPTIONAL,
///   serialNumber  [1] INTEGER                 OPTIONAL,
///   signingAlg    [2] AlgorithmIdentifier     OPTIONAL,
///   issuer        [3] Name                    OPTIONAL,
///   validity      [4] OptionalValidity        OPTIONAL,
///   subject       [5] Name                    OPTIONAL,
///   publicKey     [6] SubjectPublicKeyInfo    OPTIONAL,
///   issuerUID     [7] UniqueIdentifier        OPTIONAL,
///   subjectUID    [8] UniqueIdentifier        OPTIONAL,
///   extensions    [9] Extensions              OPTIONAL }
/// ```
///
/// Every field is individually optional so that "omitted" stays
/// distinguishable from "present but empty".
#[derive(Clone, Debug, Default, PartialEq, Eq, Sequence)]
pub struct CertTemplate {
    /// X.509 version
    #[asn1(context_specific = "0", optional = "true", tag_mode = "IMPLICIT")]
    pub version: Option<u8>,
    /// Serial number (meaningful in revocation templates)
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT")]
    pub serial_number: Option<Int>,
    /// Requested signing algorithm
    #[asn1(context_specific = "2", optional = "true", tag_mode = "IMPLICIT")]
    pub signing_alg: Option<AlgorithmIdentifierOwned>,
    /// Issuer name (Name is a CHOICE, hence EXPLICIT)
    #[asn1(context_specific = "3", optional = "true", tag_mode = "EXPLICIT")]
    pub issuer: Option<Name>,
    /// Requested validity window
    #[asn1(context_specific = "4", optional = "true", tag_mode = "IMPLICIT")]
    pub validity: Option<OptionalValidity>,
    /// Subject name (Name is a CHOICE, hence EXPLICIT)
    #[asn1(context_specific = "5", optional = "true", tag_mode = "EXPLICIT")]
    pub subject: Option<Name>,
    /// Public key to certify
    #[asn1(context_specific = "6", optional = "true", tag_mode = "IMPLICIT")]
    pub public_key: Option<SubjectPublicKeyInfoOwned>,
    /// Issuer unique identifier
    #[asn1(context_specific = "7", optional = "true", tag_mode = "IMPLICIT")]
    pub issuer_uid: Option<BitString>,
    /// Subject unique identifier
    #[asn1(context_specific = "8", optional = "true", tag_mode = "IMPLICIT")]
    pub subject_uid: Option<BitString>,
    /// Requested extensions
    #[asn1(context_specific = "9", optional = "true", tag_mode = "IMPLICIT")]
    pub extensions: Option<Extensions>,
}

/// ```asn1
/// OptionalValidity ::= SEQUENCE {
///   notBefore  [0] Time OPTIONAL,
///   notAfter   [1] Time OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct OptionalValidity {
    /// Start of the requested window (Time is a CHOICE, hence EXPLICIT)
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub not_before: Option<Time>,
    /// End of the requested window
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub not_after: Option<Time>,
}

/// ```asn1
/// ProofOfPossession ::= CHOICE {
///   raVerified        [0] NULL,
///   signature         [1] POPOSigningKey,
///   keyEncipherment   [2] POPOPrivKey,
///   keyAgreement      [3] POPOPrivKey }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Choice)]
pub enum ProofOfPossession {
    /// The RA has already verified possession
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    RaVerified(Null),
    /// Signature over the DER-encoded CertRequest
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Signature(PopoSigningKey),
    /// POP for an encipherment-only key (POPOPrivKey is a CHOICE → EXPLICIT)
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    KeyEncipherment(PopoPrivKey),
    /// POP for an agreement-only key
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", constructed = "true")]
    KeyAgreement(PopoPrivKey),
}

/// ```asn1
/// POPOSigningKey ::= SEQUENCE {
///   poposkInput         [0] POPOSigningKeyInput OPTIONAL,
///   algorithmIdentifier AlgorithmIdentifier,
///   signature           BIT STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PopoSigningKey {
    /// Only present when the template omits subject or publicKey
    #[asn1(context_specific = "0", optional = "true", tag_mode = "IMPLICIT")]
    pub poposk_input: Option<PopoSigningKeyInput>,
    /// Signature algorithm used for the POP
    pub algorithm_identifier: AlgorithmIdentifierOwned,
    /// Signature over DER(CertRequest)
    pub signature: BitString,
}

/// ```asn1
/// POPOSigningKeyInput ::= SEQUENCE {
///   authInfo CHOICE {
///     sender        [0] GeneralName,
///     publicKeyMAC  PKMACValue },
///   publicKey  SubjectPublicKeyInfo }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PopoSigningKeyInput {
    /// Identity being claimed
    pub auth_info: PopoSkiAuthInfo,
    /// Key the POP covers
    pub public_key: SubjectPublicKeyInfoOwned,
}

/// The authInfo CHOICE inside [`PopoSigningKeyInput`].
#[derive(Clone, Debug, PartialEq, Eq, Choice)]
pub enum PopoSkiAuthInfo {
    /// Authenticated sender name (GeneralName is a CHOICE → EXPLICIT)
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Sender(GeneralName),
    /// Shared-secret MAC over the key
    PublicKeyMac(PkMacValue),
}

/// ```asn1
/// PKMACValue ::= SEQUENCE { algId AlgorithmIdentifier, value BIT STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkMacValue {
    /// MAC algorithm (id-PasswordBasedMac)
    pub alg_id: AlgorithmIdentifierOwned,
    /// MAC value
    pub value: BitString,
}

/// ```asn1
/// POPOPrivKey ::= CHOICE {
///   thisMessage        [0] BIT STRING,
///   subsequentMessage  [1] SubsequentMessage,
///   dhMAC              [2] BIT STRING, ... }
/// ```
///
/// Only the alternatives a client emits or meets are modeled.
#[derive(Clone, Debug, PartialEq, Eq, Choice)]
pub enum PopoPrivKey {
    /// Deprecated inline encrypted key; emitted empty as a placeholder
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    ThisMessage(BitString),
    /// POP deferred to a later exchange
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT")]
    SubsequentMessage(i32),
    /// DH-MAC alternative, carried structurally only
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    DhMac(BitString),
}

/// ```asn1
/// CertId ::= SEQUENCE { issuer GeneralName, serialNumber INTEGER }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertId {
    /// Issuer of the certificate being referenced
    pub issuer: GeneralName,
    /// Its serial number
    pub serial_number: Int,
}

/// ```asn1
/// EncryptedValue ::= SEQUENCE {
///   intendedAlg  [0] AlgorithmIdentifier  OPTIONAL,
///   symmAlg      [1] AlgorithmIdentifier  OPTIONAL,
///   encSymmKey   [2] BIT STRING           OPTIONAL,
///   keyAlg       [3] AlgorithmIdentifier  OPTIONAL,
///   valueHint    [4] OCTET STRING         OPTIONAL,
///   encValue     BIT STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncryptedValue {
    /// Intended use of the decrypted value
    #[asn1(context_specific = "0", optional = "true", tag_mode = "IMPLICIT")]
    pub intended_alg: Option<AlgorithmIdentifierOwned>,
    /// Symmetric cipher protecting encValue (IV in its parameters)
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT")]
    pub symm_alg: Option<AlgorithmIdentifierOwned>,
    /// Symmetric key, encrypted to the recipient's key-transport key
    #[asn1(context_specific = "2", optional = "true", tag_mode = "IMPLICIT")]
    pub enc_symm_key: Option<BitString>,
    /// Algorithm of the key used to encrypt encSymmKey
    #[asn1(context_specific = "3", optional = "true", tag_mode = "IMPLICIT")]
    pub key_alg: Option<AlgorithmIdentifierOwned>,
    /// Brief description of the content
    #[asn1(context_specific = "4", optional = "true", tag_mode = "IMPLICIT")]
    pub value_hint: Option<OctetString>,
    /// The encrypted payload
    pub enc_value: BitString,
}
