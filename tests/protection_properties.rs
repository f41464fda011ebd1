//! Property tests for the protection engine and codec round-trips

use der::asn1::{Null, OctetString};
use der::{Any, Decode, Encode};
use proptest::prelude::*;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use cmp_client::asn1::{
    oids, PbmParameter, PkiBody, PkiHeader, PkiMessage,
};
use cmp_client::protection::{compute_protection, pbm_base_key, verify_pbm, ProtectionCredentials};

fn alg(oid: der::asn1::ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}

fn pbm_message(salt: &[u8], iterations: u32, nonce: &[u8]) -> PkiMessage {
    let pbm = PbmParameter::new(
        salt.to_vec(),
        alg(oids::ID_SHA256),
        iterations,
        alg(oids::ID_HMAC_SHA1),
    )
    .unwrap();
    let header = PkiHeader {
        pvno: 2,
        sender: GeneralName::DirectoryName(Name::default()),
        recipient: GeneralName::DirectoryName(Name::default()),
        message_time: None,
        protection_alg: Some(AlgorithmIdentifierOwned {
            oid: oids::ID_PASSWORD_BASED_MAC,
            parameters: Some(Any::from_der(&pbm.to_der().unwrap()).unwrap()),
        }),
        sender_kid: None,
        recip_kid: None,
        transaction_id: None,
        sender_nonce: Some(OctetString::new(nonce.to_vec()).unwrap()),
        recip_nonce: None,
        free_text: None,
        general_info: None,
    };
    PkiMessage::new(header, PkiBody::Pkiconf(Null))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // verify(protect(M, k), k) holds for arbitrary secrets and salts.
    #[test]
    fn pbm_protect_verify_roundtrip(
        secret in proptest::collection::vec(any::<u8>(), 1..32),
        salt in proptest::collection::vec(any::<u8>(), 0..24),
        iterations in 100u32..300,
        nonce in proptest::collection::vec(any::<u8>(), 16..17),
    ) {
        let mut msg = pbm_message(&salt, iterations, &nonce);
        msg.protection = Some(
            compute_protection(&msg, &ProtectionCredentials::Pbm { secret: &secret }).unwrap(),
        );
        prop_assert!(verify_pbm(&msg, &secret).is_ok());
    }

    // protect(M, k1) == protect(M, k2) exactly when k1 == k2, given
    // identical PBMParameter.
    #[test]
    fn pbm_tags_agree_iff_secrets_agree(
        secret_a in proptest::collection::vec(any::<u8>(), 1..24),
        secret_b in proptest::collection::vec(any::<u8>(), 1..24),
    ) {
        let msg = pbm_message(&[7u8; 16], 120, &[9u8; 16]);
        let tag_a =
            compute_protection(&msg, &ProtectionCredentials::Pbm { secret: &secret_a }).unwrap();
        let tag_b =
            compute_protection(&msg, &ProtectionCredentials::Pbm { secret: &secret_b }).unwrap();
        prop_assert_eq!(tag_a == tag_b, secret_a == secret_b);
    }

    // The derived base key is owf^n(secret ∥ salt).
    #[test]
    fn pbm_base_key_matches_manual_iteration(
        secret in proptest::collection::vec(any::<u8>(), 1..16),
        salt in proptest::collection::vec(any::<u8>(), 0..16),
        iterations in 100u32..200,
    ) {
        let pbm = PbmParameter::new(
            salt.clone(),
            alg(oids::ID_SHA256),
            iterations,
            alg(oids::ID_HMAC_SHA1),
        )
        .unwrap();
        let mut expected = {
            let mut seed = secret.clone();
            seed.extend_from_slice(&salt);
            cmp_client::DigestAlgorithm::Sha256.digest(&seed)
        };
        for _ in 1..iterations {
            expected = cmp_client::DigestAlgorithm::Sha256.digest(&expected);
        }
        let base = pbm_base_key(&secret, &pbm).unwrap();
        prop_assert_eq!(&*base, &expected[..]);
    }

    // Messages survive the wire: decode(encode(m)) == m.
    #[test]
    fn message_der_roundtrip(
        salt in proptest::collection::vec(any::<u8>(), 0..24),
        nonce in proptest::collection::vec(any::<u8>(), 16..17),
    ) {
        let msg = pbm_message(&salt, 150, &nonce);
        let der_bytes = msg.to_der().unwrap();
        let back = PkiMessage::from_der(&der_bytes).unwrap();
        prop_assert_eq!(back, msg);
    }
}

// Tampering with the protected part must invalidate the tag.
#[test]
fn pbm_detects_header_tampering() {
    let mut msg = pbm_message(&[1u8; 16], 150, &[2u8; 16]);
    msg.protection = Some(
        compute_protection(&msg, &ProtectionCredentials::Pbm { secret: b"secret" }).unwrap(),
    );
    msg.header.sender_nonce = Some(OctetString::new(vec![3u8; 16]).unwrap());
    assert!(verify_pbm(&msg, b"secret").is_err());
}

// Fresh transaction identifiers are drawn from the CSPRNG and distinct.
#[test]
fn transaction_ids_are_distinct() {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..64 {
        let id = cmp_client::crypto::random_bytes(16).unwrap();
        assert!(seen.insert(id));
    }
}
