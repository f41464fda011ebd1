//! CRMF request builder (RFC 4211)
//!
//! Populates a `CertTemplate` from the reference certificate, a PKCS#10
//! CSR, or raw identity inputs, merges extensions, and attaches the
//! selected proof of possession.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use der::asn1::{BitString, GeneralizedTime, Int, Null, OctetString};
use der::{Any, Decode, Encode};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::pkix::certpolicy::{CertificatePolicies, PolicyInformation};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::{Extension, Extensions};
use x509_cert::name::Name;
use x509_cert::request::CertReq;

use crate::asn1::crmf::{
    CertId, CertReqMsg, CertRequest, CertTemplate, OptionalValidity, PopoPrivKey,
    PopoSigningKey, ProofOfPossession,
};
use crate::asn1::oids;
use crate::context::Context;
use crate::error::{CmpError, Result};
use crate::types::PopoMethod;

/// Which certificate-request body the message factory is assembling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentKind {
    /// Initialization request (ir)
    Ir,
    /// Certification request (cr)
    Cr,
    /// Key update request (kur)
    Kur,
}

/// Build the single CertReqMsg for an ir/cr/kur body, with `certReqId = 0`.
pub fn build_cert_req_msg(ctx: &Context, kind: EnrollmentKind) -> Result<CertReqMsg> {
    let template = build_template(ctx, kind)?;
    let controls = build_controls(ctx, kind)?;
    let cert_req = CertRequest {
        cert_req_id: 0,
        cert_template: template,
        controls,
    };
    let popo = build_popo(ctx, &cert_req)?;
    Ok(CertReqMsg {
        cert_req,
        popo: Some(popo),
        reg_info: None,
    })
}

fn build_template(ctx: &Context, kind: EnrollmentKind) -> Result<CertTemplate> {
    let reference = ctx.reference_cert();

    let public_key = template_public_key(ctx)?;
    let subject = template_subject(ctx, kind);
    let issuer = ctx
        .issuer
        .clone()
        .or_else(|| reference.map(|cert| cert.tbs_certificate.issuer.clone()));
    let validity = template_validity(ctx)?;
    let extensions = template_extensions(ctx, subject.is_none())?;

    Ok(CertTemplate {
        version: None,
        serial_number: None,
        signing_alg: None,
        issuer,
        validity,
        subject,
        public_key,
        issuer_uid: None,
        subject_uid: None,
        extensions,
    })
}

/// publicKey: the new key's SPKI if present, else the CSR public key,
/// else the existing transaction key.
fn template_public_key(ctx: &Context) -> Result<Option<SubjectPublicKeyInfoOwned>> {
    if let Some(key) = &ctx.new_key {
        let der_bytes = key.public_key_der()?;
        return Ok(Some(
            SubjectPublicKeyInfoOwned::from_der(&der_bytes).map_err(CmpError::Asn1)?,
        ));
    }
    if let Some(csr) = &ctx.csr {
        return Ok(Some(csr.info.public_key.clone()));
    }
    if let Some(key) = &ctx.private_key {
        let der_bytes = key.public_key_der()?;
        return Ok(Some(
            SubjectPublicKeyInfoOwned::from_der(&der_bytes).map_err(CmpError::Asn1)?,
        ));
    }
    Ok(None)
}

/// subject: an explicit subjectName wins; KUR copies the reference
/// subject; ir/cr copy it only when no SAN is configured, because an
/// empty subject paired with a critical SAN is RFC 5280 conformant.
fn template_subject(ctx: &Context, kind: EnrollmentKind) -> Option<Name> {
    if let Some(subject) = &ctx.subject_name {
        return Some(subject.clone());
    }
    let reference_subject = ctx
        .reference_cert()
        .map(|cert| cert.tbs_certificate.subject.clone());
    match kind {
        EnrollmentKind::Kur => reference_subject,
        EnrollmentKind::Ir | EnrollmentKind::Cr => {
            if ctx.subject_alt_names.is_empty() {
                reference_subject
            } else {
                None
            }
        }
    }
}

fn template_validity(ctx: &Context) -> Result<Option<OptionalValidity>> {
    if ctx.validity_days == 0 {
        return Ok(None);
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CmpError::Other(format!("system clock: {e}")))?;
    let not_before = GeneralizedTime::from_unix_duration(now).map_err(CmpError::Asn1)?;
    let not_after = GeneralizedTime::from_unix_duration(
        now + Duration::from_secs(u64::from(ctx.validity_days) * 86_400),
    )
    .map_err(CmpError::Asn1)?;
    Ok(Some(OptionalValidity {
        not_before: Some(x509_cert::time::Time::GeneralTime(not_before)),
        not_after: Some(x509_cert::time::Time::GeneralTime(not_after)),
    }))
}

fn template_extensions(ctx: &Context, subject_omitted: bool) -> Result<Option<Extensions>> {
    // Start from CSR extensions, if a CSR was supplied.
    let mut extensions: Vec<Extension> = ctx
        .csr
        .as_ref()
        .and_then(csr_extensions)
        .unwrap_or_default();

    // Caller-supplied extensions override on OID collision.
    for ext in &ctx.req_extensions {
        extensions.retain(|existing| existing.extn_id != ext.extn_id);
        extensions.push(ext.clone());
    }

    // Subject alternative names: configured ones win; otherwise default
    // from the reference certificate unless suppressed.
    if !ctx.subject_alt_names.is_empty() {
        let critical = ctx.san_critical || subject_omitted;
        let san = san_extension(&ctx.subject_alt_names, critical)?;
        extensions.retain(|existing| existing.extn_id != oids::ID_CE_SUBJECT_ALT_NAME);
        extensions.push(san);
    } else if !ctx.san_nodefault
        && !extensions
            .iter()
            .any(|ext| ext.extn_id == oids::ID_CE_SUBJECT_ALT_NAME)
    {
        if let Some(san) = reference_san(ctx) {
            extensions.push(san);
        }
    }

    // Certificate policies.
    if !ctx.policies.is_empty() {
        let infos: Vec<PolicyInformation> = ctx
            .policies
            .iter()
            .map(|oid| PolicyInformation {
                policy_identifier: *oid,
                policy_qualifiers: None,
            })
            .collect();
        let value = CertificatePolicies(infos).to_der().map_err(CmpError::Asn1)?;
        extensions.retain(|existing| existing.extn_id != oids::ID_CE_CERT_POLICIES);
        extensions.push(Extension {
            extn_id: oids::ID_CE_CERT_POLICIES,
            critical: ctx.policies_critical,
            extn_value: OctetString::new(value).map_err(CmpError::Asn1)?,
        });
    }

    Ok(if extensions.is_empty() {
        None
    } else {
        Some(extensions)
    })
}

/// Extensions requested inside a PKCS#10 CSR (pkcs-9 extensionRequest).
fn csr_extensions(csr: &CertReq) -> Option<Vec<Extension>> {
    csr.info
        .attributes
        .iter()
        .find(|attr| attr.oid == oids::ID_EXTENSION_REQUEST)
        .and_then(|attr| attr.values.iter().next())
        .and_then(|value| value.decode_as::<Extensions>().ok())
}

fn san_extension(names: &[GeneralName], critical: bool) -> Result<Extension> {
    let value = names.to_vec().to_der().map_err(CmpError::Asn1)?;
    Ok(Extension {
        extn_id: oids::ID_CE_SUBJECT_ALT_NAME,
        critical,
        extn_value: OctetString::new(value).map_err(CmpError::Asn1)?,
    })
}

/// Copy the SubjectAltName extension from the reference certificate.
fn reference_san(ctx: &Context) -> Option<Extension> {
    ctx.reference_cert()
        .and_then(|cert| cert.tbs_certificate.extensions.as_ref())
        .and_then(|exts| {
            exts.iter()
                .find(|ext| ext.extn_id == oids::ID_CE_SUBJECT_ALT_NAME)
                .cloned()
        })
}

/// KUR carries a single OldCertId control naming the reference
/// certificate by issuer and serial.
fn build_controls(ctx: &Context, kind: EnrollmentKind) -> Result<Option<Vec<AttributeTypeAndValue>>> {
    if kind != EnrollmentKind::Kur {
        return Ok(None);
    }
    let reference = ctx.reference_cert().ok_or_else(|| {
        CmpError::Configuration("key update requires a reference certificate".into())
    })?;
    let cert_id = CertId {
        issuer: GeneralName::DirectoryName(reference.tbs_certificate.issuer.clone()),
        serial_number: Int::new(reference.tbs_certificate.serial_number.as_bytes())
            .map_err(CmpError::Asn1)?,
    };
    let value = Any::from_der(&cert_id.to_der().map_err(CmpError::Asn1)?)
        .map_err(CmpError::Asn1)?;
    Ok(Some(vec![AttributeTypeAndValue {
        oid: oids::ID_REG_CTRL_OLD_CERT_ID,
        value,
    }]))
}

fn build_popo(ctx: &Context, cert_req: &CertRequest) -> Result<ProofOfPossession> {
    match ctx.popo_method {
        PopoMethod::RaVerified => Ok(ProofOfPossession::RaVerified(Null)),
        PopoMethod::Signature => {
            let key = ctx.enrollment_key().ok_or_else(|| {
                CmpError::Configuration("signature POP requires a private key".into())
            })?;
            let der_bytes = cert_req.to_der().map_err(CmpError::Asn1)?;
            let signature = key.sign(ctx.digest, &der_bytes)?;
            Ok(ProofOfPossession::Signature(PopoSigningKey {
                poposk_input: None,
                algorithm_identifier: key.signature_alg(ctx.digest)?,
                signature: BitString::from_bytes(&signature).map_err(CmpError::Asn1)?,
            }))
        }
        // Placeholder; servers requiring full indirect POP will refuse it,
        // which surfaces as a configuration problem on the caller's side.
        PopoMethod::KeyEncipherment => Ok(ProofOfPossession::KeyEncipherment(
            PopoPrivKey::ThisMessage(BitString::from_bytes(&[]).map_err(CmpError::Asn1)?),
        )),
        PopoMethod::KeyAgreement => Ok(ProofOfPossession::KeyAgreement(
            PopoPrivKey::ThisMessage(BitString::from_bytes(&[]).map_err(CmpError::Asn1)?),
        )),
    }
}

/// A CertTemplate identifying `cert` by issuer and serial, as revocation
/// details use it.
pub fn revocation_template(cert: &crate::asn1::CmpCertificate) -> Result<CertTemplate> {
    Ok(CertTemplate {
        issuer: Some(cert.tbs_certificate.issuer.clone()),
        serial_number: Some(
            Int::new(cert.tbs_certificate.serial_number.as_bytes()).map_err(CmpError::Asn1)?,
        ),
        ..CertTemplate::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    fn ctx_with_key() -> Context {
        let mut ctx = Context::new();
        ctx.set_private_key(PrivateKey::P256(p256::ecdsa::SigningKey::random(
            &mut rand::rngs::OsRng,
        )));
        ctx
    }

    #[test]
    fn template_uses_configured_subject_and_validity() {
        let mut ctx = ctx_with_key();
        ctx.set_subject_name(crate::context::parse_name("CN=test").unwrap());
        ctx.set_validity_days(7);
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        let tmpl = &msg.cert_req.cert_template;
        assert!(tmpl.subject.is_some());
        assert!(tmpl.public_key.is_some());
        let validity = tmpl.validity.as_ref().unwrap();
        assert!(validity.not_before.is_some());
        assert!(validity.not_after.is_some());
        assert_eq!(msg.cert_req.cert_req_id, 0);
    }

    #[test]
    fn validity_omitted_for_zero_days() {
        let ctx = ctx_with_key();
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        assert!(msg.cert_req.cert_template.validity.is_none());
    }

    #[test]
    fn signature_popo_covers_cert_request() {
        let ctx = ctx_with_key();
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        let ProofOfPossession::Signature(popo) = msg.popo.as_ref().unwrap() else {
            panic!("expected signature POP");
        };
        let der_bytes = msg.cert_req.to_der().unwrap();
        let spki = ctx.private_key.as_ref().unwrap().public_key_der().unwrap();
        crate::crypto::verify_signature(
            &spki,
            &popo.algorithm_identifier.oid,
            &der_bytes,
            popo.signature.raw_bytes(),
        )
        .unwrap();
    }

    #[test]
    fn ra_verified_popo_when_selected() {
        let mut ctx = ctx_with_key();
        ctx.set_popo_method(crate::types::PopoMethod::RaVerified);
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        assert!(matches!(
            msg.popo,
            Some(ProofOfPossession::RaVerified(_))
        ));
    }

    #[test]
    fn configured_san_suppresses_subject_copy_for_ir() {
        let mut ctx = ctx_with_key();
        ctx.add_subject_alt_name(GeneralName::DnsName(
            der::asn1::Ia5String::new("host.example").unwrap(),
        ));
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        let tmpl = &msg.cert_req.cert_template;
        // No reference cert and no explicit subject: subject stays absent,
        // so the SAN extension must be critical.
        assert!(tmpl.subject.is_none());
        let exts = tmpl.extensions.as_ref().unwrap();
        let san = exts
            .iter()
            .find(|ext| ext.extn_id == oids::ID_CE_SUBJECT_ALT_NAME)
            .unwrap();
        assert!(san.critical);
    }

    #[test]
    fn caller_extension_overrides_on_oid_collision() {
        let mut ctx = ctx_with_key();
        let dup_oid = oids::ID_CE_KEY_USAGE;
        ctx.add_extension(Extension {
            extn_id: dup_oid,
            critical: false,
            extn_value: OctetString::new(vec![0x03, 0x02, 0x05, 0xA0]).unwrap(),
        });
        ctx.add_extension(Extension {
            extn_id: dup_oid,
            critical: true,
            extn_value: OctetString::new(vec![0x03, 0x02, 0x05, 0x80]).unwrap(),
        });
        let msg = build_cert_req_msg(&ctx, EnrollmentKind::Ir).unwrap();
        let exts = msg.cert_req.cert_template.extensions.as_ref().unwrap();
        let matching: Vec<_> = exts.iter().filter(|e| e.extn_id == dup_oid).collect();
        assert_eq!(matching.len(), 1);
        assert!(matching[0].critical);
    }

    #[test]
    fn kur_without_reference_cert_is_configuration_error() {
        let ctx = ctx_with_key();
        assert!(matches!(
            build_cert_req_msg(&ctx, EnrollmentKind::Kur),
            Err(CmpError::Configuration(_))
        ));
    }
}
