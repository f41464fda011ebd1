//! Shared protocol constants and small caller-facing enums

use serde::{Deserialize, Serialize};

/// Lower bound for the PBM iteration count (RFC 4210 recommends >= 100).
pub const PBM_ITERATION_MIN: u32 = 100;

/// Upper bound for the PBM iteration count, guarding against DoS by decode.
pub const PBM_ITERATION_MAX: u32 = 100_000;

/// Number of random octets in a fresh transactionID and senderNonce.
pub const NONCE_LEN: usize = 16;

/// At most this many inbound extraCerts are absorbed into the untrusted pool.
pub const MAX_EXTRACERTS_ABSORBED: usize = 10;

/// Proof-of-possession method for certificate requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopoMethod {
    /// `raVerified`: the RA vouches for possession
    RaVerified,
    /// Sign the DER-encoded CertRequest with the enrollment key
    #[default]
    Signature,
    /// Key-encipherment placeholder (`thisMessage`, empty BIT STRING)
    KeyEncipherment,
    /// Key-agreement placeholder (`thisMessage`, empty BIT STRING)
    KeyAgreement,
}

/// CRL revocation reasons (RFC 5280 ReasonCode values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationReason {
    /// unspecified (0)
    Unspecified,
    /// keyCompromise (1)
    KeyCompromise,
    /// cACompromise (2)
    CaCompromise,
    /// affiliationChanged (3)
    AffiliationChanged,
    /// superseded (4)
    Superseded,
    /// cessationOfOperation (5)
    CessationOfOperation,
    /// certificateHold (6)
    CertificateHold,
    /// removeFromCRL (8)
    RemoveFromCrl,
    /// privilegeWithdrawn (9)
    PrivilegeWithdrawn,
    /// aACompromise (10)
    AaCompromise,
}

impl RevocationReason {
    /// The CRLReason ENUMERATED value on the wire.
    pub fn code(self) -> u8 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::CaCompromise => 2,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
            RevocationReason::CertificateHold => 6,
            RevocationReason::RemoveFromCrl => 8,
            RevocationReason::PrivilegeWithdrawn => 9,
            RevocationReason::AaCompromise => 10,
        }
    }
}

/// Names of the PKIFailureInfo bits 0..=26, in bit order.
pub const FAIL_INFO_NAMES: [&str; 27] = [
    "badAlg",
    "badMessageCheck",
    "badRequest",
    "badTime",
    "badCertId",
    "badDataFormat",
    "wrongAuthority",
    "incorrectData",
    "missingTimeStamp",
    "badPOP",
    "certRevoked",
    "certConfirmed",
    "wrongIntegrity",
    "badRecipientNonce",
    "timeNotAvailable",
    "unacceptedPolicy",
    "unacceptedExtension",
    "addInfoNotAvailable",
    "badSenderNonce",
    "badCertTemplate",
    "signerNotTrusted",
    "transactionIdInUse",
    "unsupportedVersion",
    "notAuthorized",
    "systemUnavail",
    "systemFailure",
    "duplicateCertReq",
];

/// Bit position of `badPOP` in PKIFailureInfo.
pub const FAIL_INFO_BAD_POP: u32 = 9;
/// Bit position of `incorrectData` in PKIFailureInfo.
pub const FAIL_INFO_INCORRECT_DATA: u32 = 7;
/// Bit position of `badCertId` in PKIFailureInfo.
pub const FAIL_INFO_BAD_CERT_ID: u32 = 4;

/// Render a PKIFailureInfo bit mask as a comma-separated list of bit names.
pub fn fail_info_names(mask: u32) -> String {
    let mut names = Vec::new();
    for (bit, name) in FAIL_INFO_NAMES.iter().enumerate() {
        if mask & (1 << bit) != 0 {
            names.push(*name);
        }
    }
    names.join(",")
}

/// Human-readable name for a PKIStatus value.
pub fn status_name(status: i32) -> &'static str {
    match status {
        0 => "accepted",
        1 => "grantedWithMods",
        2 => "rejection",
        3 => "waiting",
        4 => "revocationWarning",
        5 => "revocationNotification",
        6 => "keyUpdateWarning",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_info_names_renders_set_bits() {
        let mask = (1 << FAIL_INFO_BAD_POP) | 1;
        assert_eq!(fail_info_names(mask), "badAlg,badPOP");
    }

    #[test]
    fn fail_info_names_empty_for_zero() {
        assert_eq!(fail_info_names(0), "");
    }

    #[test]
    fn status_names_cover_rfc_values() {
        assert_eq!(status_name(0), "accepted");
        assert_eq!(status_name(3), "waiting");
        assert_eq!(status_name(6), "keyUpdateWarning");
        assert_eq!(status_name(7), "unknown");
    }

    #[test]
    fn revocation_reason_codes_match_rfc5280() {
        assert_eq!(RevocationReason::KeyCompromise.code(), 1);
        assert_eq!(RevocationReason::RemoveFromCrl.code(), 8);
    }
}
