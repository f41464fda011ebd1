//! Sender-certificate discovery and the unprotected-message exceptions
//! (RFC 4210 §5.1.3.3 receive side, 3GPP TS 33.310)

use tracing::{debug, warn};
use x509_cert::ext::pkix::name::GeneralName;

use super::{verify_pbm, verify_signature_protection};
use crate::asn1::{oids, CertOrEncCert, CmpCertificate, PkiBody, PkiMessage, PkiStatus};
use crate::context::Context;
use crate::error::{CmpError, Result};
use crate::truststore::{
    self, is_self_signed, subject_key_id, validity_contains_now, verify_chain, CertPool,
};

/// Knobs for a discovery pass
pub struct DiscoveryOptions<'a> {
    /// The message under scrutiny answers an IR
    pub is_ir_response: bool,
    /// The 3GPP TS 33.310 exception is allowed
    pub permit_ta_in_extra_certs: bool,
    /// Skip the keyUsage digitalSignature requirement
    pub ignore_key_usage: bool,
    /// Newly enrolled certificate (response index 0), needed by the 3GPP rule
    pub enrolled_cert: Option<&'a CmpCertificate>,
}

/// Find and validate the certificate that signed `msg`.
///
/// Candidates come from `msg.extraCerts` first, then from the trust store.
/// A candidate is acceptable when its subject equals the header sender,
/// it is currently valid, and its SKI matches `senderKID` when that is
/// present. The first acceptable candidate that verifies the protection
/// AND either path-validates against the trust store or passes the 3GPP
/// exception wins.
pub fn find_sender_cert(
    msg: &PkiMessage,
    anchors: &CertPool,
    untrusted: &CertPool,
    opts: &DiscoveryOptions<'_>,
) -> Result<CmpCertificate> {
    let extra_certs = msg.extra_certs.as_deref().unwrap_or(&[]);

    // extraCerts prepended to the untrusted pool for issuer lookups
    let mut lookup_pool = CertPool::from_certs(extra_certs.iter().cloned());
    for cert in untrusted.certs() {
        lookup_pool.push(cert.clone());
    }

    let sender_name_der = match &msg.header.sender {
        GeneralName::DirectoryName(name) => {
            use der::Encode;
            name.to_der().map_err(CmpError::Asn1)?
        }
        other => {
            return Err(CmpError::UntrustedServerCert(format!(
                "sender is not a directoryName: {other:?}"
            )));
        }
    };

    let mut candidates: Vec<&CmpCertificate> = extra_certs.iter().collect();
    candidates.extend(anchors.certs().iter());

    let mut seen_acceptable = false;
    for candidate in candidates {
        if !is_acceptable(candidate, &sender_name_der, msg) {
            continue;
        }
        seen_acceptable = true;

        if verify_signature_protection(msg, candidate, opts.ignore_key_usage).is_err() {
            debug!("candidate sender cert does not verify the protection");
            continue;
        }

        // (a) normal validation against the trust store
        if verify_chain(candidate, anchors, &lookup_pool).is_ok() {
            return Ok(candidate.clone());
        }

        // (b) 3GPP exception: IR only, and only when explicitly enabled
        if opts.is_ir_response && opts.permit_ta_in_extra_certs {
            let ad_hoc = CertPool::from_certs(
                extra_certs.iter().filter(|c| is_self_signed(c)).cloned(),
            );
            if ad_hoc.is_empty() {
                continue;
            }
            let sender_ok = verify_chain(candidate, &ad_hoc, &lookup_pool).is_ok();
            let enrolled_ok = opts
                .enrolled_cert
                .map(|c| verify_chain(c, &ad_hoc, &lookup_pool).is_ok())
                .unwrap_or(false);
            if sender_ok && enrolled_ok {
                warn!("accepting sender certificate via extraCerts trust anchor (3GPP TS 33.310)");
                return Ok(candidate.clone());
            }
        }
    }

    Err(CmpError::UntrustedServerCert(if seen_acceptable {
        "no acceptable sender certificate validates".into()
    } else {
        "no certificate matches the sender name".into()
    }))
}

fn is_acceptable(candidate: &CmpCertificate, sender_name_der: &[u8], msg: &PkiMessage) -> bool {
    let subject_matches = truststore::subject_der(candidate)
        .map(|der_bytes| der_bytes == sender_name_der)
        .unwrap_or(false);
    if !subject_matches {
        return false;
    }
    if !validity_contains_now(candidate) {
        return false;
    }
    if let Some(kid) = &msg.header.sender_kid {
        return subject_key_id(candidate).as_deref() == Some(kid.as_bytes());
    }
    true
}

/// When `unprotectedErrors` is set, these bodies may be accepted without
/// valid protection. Returns a description for the WARN log, or None.
pub fn unprotected_exception(body: &PkiBody) -> Option<&'static str> {
    match body {
        PkiBody::Error(_) => Some("error message"),
        PkiBody::Pkiconf(_) => Some("pkiconf"),
        PkiBody::Rp(rp)
            if rp
                .status
                .first()
                .map(|s| s.status == PkiStatus::Rejection)
                .unwrap_or(false) =>
        {
            Some("revocation rejection")
        }
        PkiBody::Ip(rep) | PkiBody::Cp(rep) | PkiBody::Kup(rep)
            if rep.response.len() == 1
                && rep.response[0].status.status == PkiStatus::Rejection =>
        {
            Some("certificate rejection")
        }
        _ => None,
    }
}

/// Verify the protection of an inbound message against the context,
/// applying the unprotected-message exceptions when enabled.
///
/// On signature protection without a pinned server certificate the
/// validated sender certificate is cached in the context for the rest of
/// the transaction.
pub fn verify_incoming(ctx: &mut Context, msg: &PkiMessage) -> Result<()> {
    match try_verify(ctx, msg) {
        Ok(()) => Ok(()),
        Err(err) => {
            if ctx.unprotected_errors {
                if let Some(kind) = unprotected_exception(&msg.body) {
                    warn!("accepting unprotected or invalidly protected {kind}: {err}");
                    return Ok(());
                }
            }
            Err(err)
        }
    }
}

fn try_verify(ctx: &mut Context, msg: &PkiMessage) -> Result<()> {
    let alg = msg
        .header
        .protection_alg
        .as_ref()
        .ok_or(CmpError::MissingProtection)?;
    if msg.protection.is_none() {
        return Err(CmpError::MissingProtection);
    }

    if alg.oid == oids::ID_PASSWORD_BASED_MAC {
        let secret = ctx.secret_value.as_ref().ok_or_else(|| {
            CmpError::Configuration("PBM-protected reply but no shared secret configured".into())
        })?;
        return verify_pbm(msg, secret);
    }
    if alg.oid == oids::ID_DH_BASED_MAC {
        return Err(CmpError::UnsupportedAlgorithm("DHBasedMac".into()));
    }

    // Signature protection
    if let Some(expected) = &ctx.expected_sender {
        let matches = matches!(&msg.header.sender,
            GeneralName::DirectoryName(name) if name == expected);
        if !matches {
            return Err(CmpError::ErrorValidatingProtection(
                "sender name differs from the expected sender".into(),
            ));
        }
    }

    if let Some(pinned) = ctx.srv_cert.clone().or_else(|| ctx.validated_srv_cert.clone()) {
        return verify_signature_protection(msg, &pinned, ctx.ignore_key_usage);
    }

    let enrolled = enrolled_cert_hint(&msg.body);
    let opts = DiscoveryOptions {
        is_ir_response: matches!(msg.body, PkiBody::Ip(_)),
        permit_ta_in_extra_certs: ctx.permit_ta_in_extracerts_for_ir,
        ignore_key_usage: ctx.ignore_key_usage,
        enrolled_cert: enrolled.as_ref(),
    };
    let cert = find_sender_cert(msg, &ctx.trusted, &ctx.untrusted, &opts)?;
    debug!("validated and cached the server certificate for this transaction");
    ctx.validated_srv_cert = Some(cert);
    Ok(())
}

/// Plaintext enrolled certificate at response index 0, if any. Used only
/// as input to the 3GPP validation rule.
fn enrolled_cert_hint(body: &PkiBody) -> Option<CmpCertificate> {
    let rep = match body {
        PkiBody::Ip(rep) | PkiBody::Cp(rep) | PkiBody::Kup(rep) => rep,
        _ => return None,
    };
    match &rep.response.first()?.certified_key_pair.as_ref()?.cert_or_enc_cert {
        CertOrEncCert::Certificate(cert) => Some(cert.clone()),
        CertOrEncCert::EncryptedCert(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::{CertRepMessage, CertResponse, ErrorMsgContent, PkiStatusInfo};
    use der::asn1::Null;

    fn rejected_rep() -> CertRepMessage {
        CertRepMessage {
            ca_pubs: None,
            response: vec![CertResponse {
                cert_req_id: 0,
                status: PkiStatusInfo::rejection(1 << 9, None).unwrap(),
                certified_key_pair: None,
                rsp_info: None,
            }],
        }
    }

    #[test]
    fn error_and_pkiconf_are_exceptions() {
        let err_body = PkiBody::Error(ErrorMsgContent {
            pki_status_info: PkiStatusInfo::accepted(),
            error_code: None,
            error_details: None,
        });
        assert!(unprotected_exception(&err_body).is_some());
        assert!(unprotected_exception(&PkiBody::Pkiconf(Null)).is_some());
    }

    #[test]
    fn rejected_cert_response_is_exception() {
        assert!(unprotected_exception(&PkiBody::Ip(rejected_rep())).is_some());
        assert!(unprotected_exception(&PkiBody::Kup(rejected_rep())).is_some());
    }

    #[test]
    fn accepted_cert_response_is_not_exception() {
        let rep = CertRepMessage {
            ca_pubs: None,
            response: vec![CertResponse {
                cert_req_id: 0,
                status: PkiStatusInfo::accepted(),
                certified_key_pair: None,
                rsp_info: None,
            }],
        };
        assert!(unprotected_exception(&PkiBody::Ip(rep)).is_none());
    }

    #[test]
    fn multi_response_rejection_is_not_exception() {
        let mut rep = rejected_rep();
        rep.response.push(rep.response[0].clone());
        assert!(unprotected_exception(&PkiBody::Ip(rep)).is_none());
    }
}
