//! DER-serializable records for the CMP and CRMF wire structures
//!
//! Encode/decode is delegated to the `der` crate; X.509 structural types
//! (names, algorithm identifiers, certificates, extensions) come from
//! `x509-cert`/`spki`. No protocol logic lives here.

pub mod body;
pub mod crmf;
pub mod header;
pub mod message;
pub mod oids;
pub mod pbm;
pub mod status;

pub use body::{
    CertConfirmContent, CertOrEncCert, CertRepMessage, CertResponse, CertStatus,
    CertifiedKeyPair, ErrorMsgContent, PkiBody, PollRep, PollReq, RevDetails, RevRepContent,
};
pub use crmf::{
    CertId, CertReqMessages, CertReqMsg, CertRequest, CertTemplate, EncryptedValue,
    OptionalValidity, PopoPrivKey, PopoSigningKey, ProofOfPossession,
};
pub use header::{InfoTypeAndValue, PkiFreeText, PkiHeader};
pub use message::{CmpCertificate, PkiMessage, ProtectedPart};
pub use pbm::PbmParameter;
pub use status::{PkiStatus, PkiStatusInfo};
