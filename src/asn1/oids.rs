//! Object identifiers used on the CMP/CRMF wire.
//!
//! All constants are dotted-decimal literals checked at compile time.

use der::asn1::ObjectIdentifier;

/// id-PasswordBasedMac (RFC 4210 §5.1.3.1)
pub const ID_PASSWORD_BASED_MAC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113533.7.66.13");

/// id-DHBasedMac — recognized, never supported
pub const ID_DH_BASED_MAC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113533.7.66.30");

// One-way functions (digests)

/// SHA-1
pub const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
/// SHA-224
pub const ID_SHA224: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");
/// SHA-256
pub const ID_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// SHA-384
pub const ID_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
/// SHA-512
pub const ID_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

// MAC algorithms

/// HMAC-SHA1 (RFC 3370)
pub const ID_HMAC_SHA1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.8.1.2");
/// HMAC-SHA256
pub const ID_HMAC_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.2.9");
/// HMAC-SHA384
pub const ID_HMAC_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.2.10");
/// HMAC-SHA512
pub const ID_HMAC_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.2.11");

// Signature algorithms

/// sha1WithRSAEncryption (verification of legacy peers only)
pub const SHA1_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
/// sha256WithRSAEncryption
pub const SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
/// sha384WithRSAEncryption
pub const SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
/// sha512WithRSAEncryption
pub const SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
/// ecdsa-with-SHA256
pub const ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
/// Ed25519
pub const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

// Public-key algorithms

/// rsaEncryption
pub const RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey
pub const ID_EC_PUBLIC_KEY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

// Symmetric ciphers (indirect POP certificate decryption)

/// aes128-CBC
pub const AES128_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2");
/// aes192-CBC
pub const AES192_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.22");
/// aes256-CBC
pub const AES256_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.42");

// X.509 extensions

/// subjectKeyIdentifier
pub const ID_CE_SUBJECT_KEY_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.14");
/// keyUsage
pub const ID_CE_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
/// subjectAltName
pub const ID_CE_SUBJECT_ALT_NAME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.17");
/// cRLReasons (CRL entry extension carried in RevDetails)
pub const ID_CE_CRL_REASONS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.21");
/// certificatePolicies
pub const ID_CE_CERT_POLICIES: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.32");

// CRMF registration controls

/// id-regCtrl-oldCertID (RFC 4211 §6.5)
pub const ID_REG_CTRL_OLD_CERT_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.5.1.5");

// CMP general-info / info-type OIDs

/// id-it-implicitConfirm (RFC 4210 §5.1.1.1)
pub const ID_IT_IMPLICIT_CONFIRM: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.4.13");
/// id-it-confirmWaitTime (RFC 4210 §5.1.1.2)
pub const ID_IT_CONFIRM_WAIT_TIME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.4.14");

// PKCS#9

/// pkcs-9-at-extensionRequest: extensions requested inside a PKCS#10 CSR
pub const ID_EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");
