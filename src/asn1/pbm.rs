//! Password-based MAC parameters (RFC 4210 §5.1.3.1)

use der::asn1::OctetString;
use der::Sequence;
use spki::AlgorithmIdentifierOwned;

use crate::error::{CmpError, Result};
use crate::types::{PBM_ITERATION_MAX, PBM_ITERATION_MIN};

/// ```asn1
/// PBMParameter ::= SEQUENCE {
///   salt            OCTET STRING,
///   owf             AlgorithmIdentifier,
///   iterationCount  INTEGER,
///   mac             AlgorithmIdentifier }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PbmParameter {
    /// Random salt appended to the shared secret
    pub salt: OctetString,
    /// One-way function iterated over secret ∥ salt
    pub owf: AlgorithmIdentifierOwned,
    /// Iteration count; must satisfy the crate bounds
    pub iteration_count: u32,
    /// MAC computed with the derived base key
    pub mac: AlgorithmIdentifierOwned,
}

impl PbmParameter {
    /// Build a parameter set, rejecting out-of-range iteration counts.
    pub fn new(
        salt: Vec<u8>,
        owf: AlgorithmIdentifierOwned,
        iteration_count: u32,
        mac: AlgorithmIdentifierOwned,
    ) -> Result<Self> {
        let param = Self {
            salt: OctetString::new(salt).map_err(CmpError::Asn1)?,
            owf,
            iteration_count,
            mac,
        };
        param.validate()?;
        Ok(param)
    }

    /// Enforce the iteration bounds. Runs on both the produce and the
    /// consume path, before any key derivation.
    pub fn validate(&self) -> Result<()> {
        if self.iteration_count < PBM_ITERATION_MIN || self.iteration_count > PBM_ITERATION_MAX
        {
            return Err(CmpError::InvalidParameter(format!(
                "PBM iteration count {} outside [{PBM_ITERATION_MIN}, {PBM_ITERATION_MAX}]",
                self.iteration_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::oids;
    use der::{Decode, Encode};

    fn alg(oid: der::asn1::ObjectIdentifier) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid,
            parameters: None,
        }
    }

    #[test]
    fn pbm_parameter_roundtrip() {
        let pbm = PbmParameter::new(
            vec![1u8; 16],
            alg(oids::ID_SHA256),
            500,
            alg(oids::ID_HMAC_SHA1),
        )
        .unwrap();
        let der = pbm.to_der().unwrap();
        let back = PbmParameter::from_der(&der).unwrap();
        assert_eq!(back, pbm);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn iteration_count_bounds_rejected() {
        for n in [0u32, 99, PBM_ITERATION_MAX + 1] {
            assert!(PbmParameter::new(
                vec![0u8; 16],
                alg(oids::ID_SHA256),
                n,
                alg(oids::ID_HMAC_SHA1),
            )
            .is_err());
        }
    }
}
