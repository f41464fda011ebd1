//! Message factory: assemble, protect, and dress outgoing PKIMessages
//! (RFC 4210 §5.1)

use der::asn1::OctetString;
use der::{Any, Decode, Encode};
use spki::AlgorithmIdentifierOwned;

use crate::asn1::body::{CertStatus, ErrorMsgContent, PollReq, RevDetails};
use crate::asn1::{
    oids, CmpCertificate, InfoTypeAndValue, PbmParameter, PkiBody, PkiMessage, PkiStatusInfo,
};
use crate::context::Context;
use crate::crmf::{build_cert_req_msg, revocation_template, EnrollmentKind};
use crate::crypto::{random_bytes, sig_alg_info};
use crate::error::{CmpError, Result};
use crate::header::build_header;
use crate::protection::{compute_protection, ProtectionCredentials};
use crate::truststore::{self, CertPool};
use crate::types::RevocationReason;

/// Build an ir/cr/kur request carrying one CertReqMsg with certReqId 0.
pub fn build_enrollment_request(ctx: &mut Context, kind: EnrollmentKind) -> Result<PkiMessage> {
    let req_msg = build_cert_req_msg(ctx, kind)?;
    let body = match kind {
        EnrollmentKind::Ir => PkiBody::Ir(vec![req_msg]),
        EnrollmentKind::Cr => PkiBody::Cr(vec![req_msg]),
        EnrollmentKind::Kur => PkiBody::Kur(vec![req_msg]),
    };
    finish(ctx, body, ctx.implicit_confirm)
}

/// Build a p10cr request carrying the caller-supplied PKCS#10 unchanged.
pub fn build_p10cr_request(ctx: &mut Context) -> Result<PkiMessage> {
    let csr = ctx
        .csr
        .clone()
        .ok_or_else(|| CmpError::Configuration("p10cr requires a PKCS#10 CSR".into()))?;
    finish(ctx, PkiBody::P10cr(csr), ctx.implicit_confirm)
}

/// Build an rr request for the reference certificate, with the optional
/// CRL reason extension.
pub fn build_rr_request(ctx: &mut Context) -> Result<PkiMessage> {
    let old_cert = ctx
        .old_cert
        .clone()
        .ok_or_else(|| CmpError::Configuration("revocation requires the certificate".into()))?;
    let cert_details = revocation_template(&old_cert)?;
    let crl_entry_details = match ctx.revocation_reason {
        None => None,
        Some(reason) => Some(vec![reason_code_extension(reason)?]),
    };
    let body = PkiBody::Rr(vec![RevDetails {
        cert_details,
        crl_entry_details,
    }]);
    finish(ctx, body, false)
}

/// Build a certConf for the enrolled certificate: accepted when
/// `fail_info == 0`, otherwise a rejection with the given bits and text.
pub fn build_cert_conf(
    ctx: &mut Context,
    cert: &CmpCertificate,
    fail_info: u32,
    reason: Option<String>,
) -> Result<PkiMessage> {
    let sig_info = sig_alg_info(&cert.signature_algorithm.oid)?;
    let cert_hash = sig_info
        .confirm_digest()
        .digest(&truststore::cert_der(cert)?);
    let status_info = if fail_info == 0 {
        PkiStatusInfo::accepted()
    } else {
        PkiStatusInfo::rejection(fail_info, reason)?
    };
    let body = PkiBody::Certconf(vec![CertStatus {
        cert_hash: OctetString::new(cert_hash).map_err(CmpError::Asn1)?,
        cert_req_id: 0,
        status_info: Some(status_info),
    }]);
    finish(ctx, body, false)
}

/// Build a pollReq for the outstanding request id.
pub fn build_poll_req(ctx: &mut Context, cert_req_id: i32) -> Result<PkiMessage> {
    finish(ctx, PkiBody::Pollreq(vec![PollReq { cert_req_id }]), false)
}

/// Build a genm carrying the configured ITAV stack (possibly empty).
pub fn build_genm(ctx: &mut Context) -> Result<PkiMessage> {
    let body = PkiBody::Genm(ctx.genm_itavs.clone());
    finish(ctx, body, false)
}

/// Build an error message wrapping a PKIStatusInfo.
pub fn build_error(
    ctx: &mut Context,
    status: PkiStatusInfo,
    error_code: Option<i64>,
    text: Option<String>,
) -> Result<PkiMessage> {
    let body = PkiBody::Error(ErrorMsgContent {
        pki_status_info: status,
        error_code,
        error_details: text.map(|t| vec![t]),
    });
    finish(ctx, body, false)
}

/// Common tail: header, optional implicitConfirm, protection, extraCerts.
fn finish(ctx: &mut Context, body: PkiBody, implicit_confirm: bool) -> Result<PkiMessage> {
    let mut header = build_header(ctx)?;
    if implicit_confirm {
        let itav = InfoTypeAndValue::null(oids::ID_IT_IMPLICIT_CONFIRM).map_err(CmpError::Asn1)?;
        header.general_info.get_or_insert_with(Vec::new).push(itav);
    }

    let mut msg = PkiMessage::new(header, body);
    if !ctx.unprotected_send {
        apply_protection(ctx, &mut msg)?;
    }
    msg.extra_certs = build_extra_certs(ctx)?;
    Ok(msg)
}

/// Install protectionAlg + senderKID and compute the protection value.
///
/// PBM wins when a shared secret is configured; otherwise signature
/// protection with the client certificate and key is required.
fn apply_protection(ctx: &mut Context, msg: &mut PkiMessage) -> Result<()> {
    if let Some(secret) = ctx.secret_value.clone() {
        let salt = random_bytes(ctx.pbm.salt_len)?;
        let pbm = PbmParameter::new(
            salt,
            AlgorithmIdentifierOwned {
                oid: ctx.pbm.owf.oid(),
                parameters: None,
            },
            ctx.pbm.iteration_count,
            AlgorithmIdentifierOwned {
                oid: ctx.pbm.mac.oid(),
                parameters: None,
            },
        )?;
        msg.header.protection_alg = Some(AlgorithmIdentifierOwned {
            oid: oids::ID_PASSWORD_BASED_MAC,
            parameters: Some(
                Any::from_der(&pbm.to_der().map_err(CmpError::Asn1)?).map_err(CmpError::Asn1)?,
            ),
        });
        if let Some(reference) = &ctx.reference_value {
            msg.header.sender_kid =
                Some(OctetString::new(reference.to_vec()).map_err(CmpError::Asn1)?);
        }
        msg.protection = Some(compute_protection(
            msg,
            &ProtectionCredentials::Pbm {
                secret: secret.as_slice(),
            },
        )?);
        Ok(())
    } else if let Some(key) = ctx.private_key.clone() {
        msg.header.protection_alg = Some(key.signature_alg(ctx.digest)?);
        if let Some(cert) = &ctx.client_cert {
            if let Some(ski) = truststore::subject_key_id(cert) {
                msg.header.sender_kid = Some(OctetString::new(ski).map_err(CmpError::Asn1)?);
            }
        }
        msg.protection = Some(compute_protection(
            msg,
            &ProtectionCredentials::Signature { key: &key },
        )?);
        Ok(())
    } else {
        Err(CmpError::Configuration(
            "no protection credentials: set a shared secret or a private key".into(),
        ))
    }
}

/// Outgoing extraCerts: the client certificate, then its best-effort
/// chain up to but excluding the trust anchor, then the configured
/// extras, deduplicated. Omitted entirely when empty.
fn build_extra_certs(ctx: &Context) -> Result<Option<Vec<CmpCertificate>>> {
    let mut pool = CertPool::new();
    if let Some(client) = &ctx.client_cert {
        pool.push(client.clone());
        for cert in truststore::build_chain(client, &ctx.untrusted) {
            pool.push(cert);
        }
    }
    for cert in &ctx.extra_certs_out {
        pool.push(cert.clone());
    }
    let certs = pool.certs().to_vec();
    Ok(if certs.is_empty() { None } else { Some(certs) })
}

/// CRL reason code as a crlEntryDetails extension.
fn reason_code_extension(reason: RevocationReason) -> Result<x509_cert::ext::Extension> {
    // CRLReason ::= ENUMERATED
    let value = vec![0x0A, 0x01, reason.code()];
    Ok(x509_cert::ext::Extension {
        extn_id: oids::ID_CE_CRL_REASONS,
        critical: false,
        extn_value: OctetString::new(value).map_err(CmpError::Asn1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;
    use crate::protection::verify_pbm;
    use crate::types::PopoMethod;

    fn pbm_ctx() -> Context {
        let mut ctx = Context::new();
        ctx.set_secret_value(b"insta".to_vec());
        ctx.set_reference_value(b"clientref".to_vec());
        ctx.set_subject_name(crate::context::parse_name("CN=test").unwrap());
        ctx.set_popo_method(PopoMethod::RaVerified);
        ctx
    }

    #[test]
    fn ir_request_is_pbm_protected_and_verifiable() {
        let mut ctx = pbm_ctx();
        let msg = build_enrollment_request(&mut ctx, EnrollmentKind::Ir).unwrap();
        assert!(matches!(msg.body, PkiBody::Ir(_)));
        assert!(msg.protection.is_some());
        assert_eq!(
            msg.header.protection_alg.as_ref().unwrap().oid,
            oids::ID_PASSWORD_BASED_MAC
        );
        assert_eq!(
            msg.header.sender_kid.as_ref().unwrap().as_bytes(),
            b"clientref"
        );
        verify_pbm(&msg, b"insta").unwrap();
    }

    #[test]
    fn implicit_confirm_itav_added_on_request() {
        let mut ctx = pbm_ctx();
        ctx.set_implicit_confirm(true);
        let msg = build_enrollment_request(&mut ctx, EnrollmentKind::Ir).unwrap();
        assert!(msg.header.has_implicit_confirm());
    }

    #[test]
    fn unprotected_send_skips_protection() {
        let mut ctx = pbm_ctx();
        ctx.set_unprotected_send(true);
        let msg = build_enrollment_request(&mut ctx, EnrollmentKind::Ir).unwrap();
        assert!(msg.protection.is_none());
        assert!(msg.header.protection_alg.is_none());
    }

    #[test]
    fn missing_credentials_is_configuration_error() {
        let mut ctx = Context::new();
        ctx.set_popo_method(PopoMethod::RaVerified);
        ctx.set_subject_name(crate::context::parse_name("CN=x").unwrap());
        assert!(matches!(
            build_enrollment_request(&mut ctx, EnrollmentKind::Ir),
            Err(CmpError::Configuration(_))
        ));
    }

    #[test]
    fn rr_requires_old_cert() {
        let mut ctx = pbm_ctx();
        assert!(matches!(
            build_rr_request(&mut ctx),
            Err(CmpError::Configuration(_))
        ));
    }

    #[test]
    fn poll_req_carries_request_id() {
        let mut ctx = pbm_ctx();
        let msg = build_poll_req(&mut ctx, 0).unwrap();
        let PkiBody::Pollreq(content) = &msg.body else {
            panic!("expected pollReq");
        };
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].cert_req_id, 0);
    }

    #[test]
    fn genm_body_carries_configured_itavs() {
        let mut ctx = pbm_ctx();
        ctx.add_genm_itav(
            InfoTypeAndValue::null(oids::ID_IT_CONFIRM_WAIT_TIME).unwrap(),
        );
        let msg = build_genm(&mut ctx).unwrap();
        let PkiBody::Genm(itavs) = &msg.body else {
            panic!("expected genm");
        };
        assert_eq!(itavs.len(), 1);
    }

    #[test]
    fn signature_protection_used_without_secret() {
        let mut ctx = Context::new();
        ctx.set_popo_method(PopoMethod::RaVerified);
        ctx.set_subject_name(crate::context::parse_name("CN=sig").unwrap());
        ctx.set_private_key(PrivateKey::P256(p256::ecdsa::SigningKey::random(
            &mut rand::rngs::OsRng,
        )));
        let msg = build_enrollment_request(&mut ctx, EnrollmentKind::Cr).unwrap();
        assert_eq!(
            msg.header.protection_alg.as_ref().unwrap().oid,
            oids::ECDSA_WITH_SHA256
        );
        assert!(msg.protection.is_some());
    }
}
