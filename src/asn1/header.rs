//! PKIHeader and its satellite types

use der::asn1::{GeneralizedTime, ObjectIdentifier, OctetString};
use der::{Any, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;

/// ```asn1
/// PKIFreeText ::= SEQUENCE SIZE (1..MAX) OF UTF8String
/// ```
pub type PkiFreeText = Vec<String>;

/// ```asn1
/// InfoTypeAndValue ::= SEQUENCE {
///   infoType   OBJECT IDENTIFIER,
///   infoValue  ANY DEFINED BY infoType OPTIONAL }
/// ```
///
/// The value stays an opaque [`Any`]; callers decode it lazily once they
/// have dispatched on `info_type`.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct InfoTypeAndValue {
    /// OID selecting the value interpretation
    pub info_type: ObjectIdentifier,
    /// Raw DER value, absent for marker ITAVs such as implicitConfirm
    pub info_value: Option<Any>,
}

impl InfoTypeAndValue {
    /// Marker ITAV with a NULL value (e.g. implicitConfirm).
    pub fn null(info_type: ObjectIdentifier) -> der::Result<Self> {
        Ok(Self {
            info_type,
            info_value: Some(Any::from(der::AnyRef::NULL)),
        })
    }
}

/// ```asn1
/// PKIHeader ::= SEQUENCE {
///   pvno           INTEGER { cmp1999(1), cmp2000(2) },
///   sender         GeneralName,
///   recipient      GeneralName,
///   messageTime    [0] GeneralizedTime        OPTIONAL,
///   protectionAlg  [1] AlgorithmIdentifier    OPTIONAL,
///   senderKID      [2] KeyIdentifier          OPTIONAL,
///   recipKID       [3] KeyIdentifier          OPTIONAL,
///   transactionID  [4] OCTET STRING           OPTIONAL,
///   senderNonce    [5] OCTET STRING           OPTIONAL,
///   recipNonce     [6] OCTET STRING           OPTIONAL,
///   freeText       [7] PKIFreeText            OPTIONAL,
///   generalInfo    [8] SEQUENCE SIZE (1..MAX) OF InfoTypeAndValue OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkiHeader {
    /// Protocol version, fixed at 2 by this client
    pub pvno: u8,
    /// Originator of this message
    pub sender: GeneralName,
    /// Intended recipient
    pub recipient: GeneralName,
    /// Time of production
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub message_time: Option<GeneralizedTime>,
    /// Algorithm protecting the message
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub protection_alg: Option<AlgorithmIdentifierOwned>,
    /// Key identifier of the sender (SKI or PBM reference value)
    #[asn1(context_specific = "2", optional = "true", tag_mode = "EXPLICIT")]
    pub sender_kid: Option<OctetString>,
    /// Key identifier of the recipient
    #[asn1(context_specific = "3", optional = "true", tag_mode = "EXPLICIT")]
    pub recip_kid: Option<OctetString>,
    /// Fixed for the life of the transaction
    #[asn1(context_specific = "4", optional = "true", tag_mode = "EXPLICIT")]
    pub transaction_id: Option<OctetString>,
    /// Fresh random nonce inserted by the sender
    #[asn1(context_specific = "5", optional = "true", tag_mode = "EXPLICIT")]
    pub sender_nonce: Option<OctetString>,
    /// Echo of the peer's last senderNonce
    #[asn1(context_specific = "6", optional = "true", tag_mode = "EXPLICIT")]
    pub recip_nonce: Option<OctetString>,
    /// Free-form text
    #[asn1(context_specific = "7", optional = "true", tag_mode = "EXPLICIT")]
    pub free_text: Option<PkiFreeText>,
    /// Additional typed attributes
    #[asn1(context_specific = "8", optional = "true", tag_mode = "EXPLICIT")]
    pub general_info: Option<Vec<InfoTypeAndValue>>,
}

impl PkiHeader {
    /// True when generalInfo carries an implicitConfirm marker.
    pub fn has_implicit_confirm(&self) -> bool {
        self.general_info
            .as_ref()
            .map(|gi| {
                gi.iter()
                    .any(|itav| itav.info_type == super::oids::ID_IT_IMPLICIT_CONFIRM)
            })
            .unwrap_or(false)
    }
}
