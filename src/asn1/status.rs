//! PKIStatusInfo and the PKIFailureInfo bit field

use der::asn1::BitString;
use der::{Enumerated, Sequence};

use super::header::PkiFreeText;
use crate::types::{fail_info_names, status_name};

/// ```asn1
/// PKIStatus ::= INTEGER {
///   accepted (0), grantedWithMods (1), rejection (2), waiting (3),
///   revocationWarning (4), revocationNotification (5), keyUpdateWarning (6) }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumerated)]
#[asn1(type = "INTEGER")]
#[repr(u8)]
pub enum PkiStatus {
    /// accepted (0)
    Accepted = 0,
    /// grantedWithMods (1)
    GrantedWithMods = 1,
    /// rejection (2)
    Rejection = 2,
    /// waiting (3)
    Waiting = 3,
    /// revocationWarning (4)
    RevocationWarning = 4,
    /// revocationNotification (5)
    RevocationNotification = 5,
    /// keyUpdateWarning (6)
    KeyUpdateWarning = 6,
}

/// ```asn1
/// PKIStatusInfo ::= SEQUENCE {
///   status        PKIStatus,
///   statusString  PKIFreeText OPTIONAL,
///   failInfo      PKIFailureInfo OPTIONAL }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PkiStatusInfo {
    /// Outcome reported by the peer
    pub status: PkiStatus,
    /// Optional human-readable detail
    pub status_string: Option<PkiFreeText>,
    /// Optional failure bits (PKIFailureInfo BIT STRING)
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// A bare `accepted` status with no detail.
    pub fn accepted() -> Self {
        Self {
            status: PkiStatus::Accepted,
            status_string: None,
            fail_info: None,
        }
    }

    /// A `rejection` status carrying the given failure bits and text.
    pub fn rejection(fail_info_mask: u32, text: Option<String>) -> der::Result<Self> {
        let fail_info = if fail_info_mask != 0 {
            Some(mask_to_bits(fail_info_mask)?)
        } else {
            None
        };
        Ok(Self {
            status: PkiStatus::Rejection,
            status_string: text.map(|t| vec![t]),
            fail_info,
        })
    }

    /// Decoded failure bits as a mask over bit positions 0..=25.
    pub fn fail_info_mask(&self) -> u32 {
        self.fail_info.as_ref().map(bits_to_mask).unwrap_or(0)
    }

    /// Pretty-print: status name, comma-separated failure bit names, and
    /// quoted statusString entries.
    pub fn pretty(&self) -> String {
        let mut out = status_name(self.status as i32).to_string();
        let mask = self.fail_info_mask();
        if mask != 0 {
            out.push_str(&format!(" [{}]", fail_info_names(mask)));
        }
        if let Some(texts) = &self.status_string {
            for t in texts {
                out.push_str(&format!(" \"{t}\""));
            }
        }
        out
    }
}

/// Convert a PKIFailureInfo BIT STRING into a mask (bit n of the mask is
/// ASN.1 bit n).
pub fn bits_to_mask(bits: &BitString) -> u32 {
    let mut mask = 0u32;
    for (i, byte) in bits.raw_bytes().iter().enumerate() {
        for bit in 0..8usize {
            if byte & (0x80 >> bit) != 0 {
                let idx = i * 8 + bit;
                if idx < 32 {
                    mask |= 1 << idx;
                }
            }
        }
    }
    mask
}

/// Convert a failure mask into the corresponding BIT STRING.
pub fn mask_to_bits(mask: u32) -> der::Result<BitString> {
    if mask == 0 {
        return BitString::from_bytes(&[]);
    }
    let highest = 31 - mask.leading_zeros() as usize;
    let mut bytes = vec![0u8; highest / 8 + 1];
    for idx in 0..=highest {
        if mask & (1 << idx) != 0 {
            bytes[idx / 8] |= 0x80 >> (idx % 8);
        }
    }
    BitString::from_bytes(&bytes)
}
