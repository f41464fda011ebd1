//! Response classifier: extract results from IP/CP/KUP and RP bodies
//! (RFC 4210 §5.3.4, §5.3.10)

use der::{Decode, Encode};
use tracing::{debug, warn};
use x509_cert::ext::pkix::name::GeneralName;

use crate::asn1::crmf::EncryptedValue;
use crate::asn1::{
    oids, CertOrEncCert, CertRepMessage, CmpCertificate, PkiBody, PkiMessage, PkiStatus,
};
use crate::context::{CertConfirmOutcome, Context};
use crate::error::{CmpError, Result};
use crate::truststore;
use crate::types::FAIL_INFO_INCORRECT_DATA;

/// What the driver should do next with a certificate response
pub enum ClassifyOutcome {
    /// The server is still working; poll with this request id
    Waiting {
        /// certReqId to place in the pollReq
        cert_req_id: i32,
    },
    /// A certificate was issued and extracted
    Enrolled(EnrolledCert),
}

/// An extracted enrollment result, before confirmation
pub struct EnrolledCert {
    /// The issued certificate
    pub cert: CmpCertificate,
    /// Failure bits to report in certConf (0 = accept)
    pub fail_info: u32,
    /// Optional rejection reason for certConf
    pub reason: Option<String>,
    /// A certConf/pkiconf handshake is still required
    pub needs_confirm: bool,
}

/// Process an IP/CP/KUP message.
///
/// `cert_req_id` is the outstanding request id; −1 (P10CR) learns the id
/// from the response. `is_kur` permits the keyUpdateWarning status.
pub fn classify_cert_response(
    ctx: &mut Context,
    msg: &PkiMessage,
    cert_req_id: &mut i32,
    is_kur: bool,
) -> Result<ClassifyOutcome> {
    let rep = cert_rep_of(msg)?;
    if rep.response.len() > 1 {
        return Err(CmpError::MultipleResponsesNotSupported);
    }
    let response = rep
        .response
        .first()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("empty CertRepMessage".into()))?;

    if *cert_req_id == -1 {
        // P10CR: the id is learned from the response.
        *cert_req_id = response.cert_req_id;
    } else if response.cert_req_id != *cert_req_id {
        return Err(CmpError::WrongCertId);
    }

    if response.status.status == PkiStatus::Waiting {
        debug!("server reports waiting; entering the polling loop");
        return Ok(ClassifyOutcome::Waiting {
            cert_req_id: *cert_req_id,
        });
    }

    ctx.record_status(&response.status);
    absorb_response_certs(ctx, msg, rep);

    match response.status.status {
        PkiStatus::Rejection => {
            return Err(CmpError::CertificateNotAccepted(ctx.status_snapshot()));
        }
        PkiStatus::KeyUpdateWarning if !is_kur => {
            return Err(CmpError::UnexpectedStatus(ctx.status_snapshot()));
        }
        PkiStatus::Accepted
        | PkiStatus::GrantedWithMods
        | PkiStatus::RevocationWarning
        | PkiStatus::RevocationNotification
        | PkiStatus::KeyUpdateWarning => {}
        PkiStatus::Waiting => unreachable!("handled above"),
    }

    let pair = response
        .certified_key_pair
        .as_ref()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("no certifiedKeyPair".into()))?;
    let cert = match &pair.cert_or_enc_cert {
        CertOrEncCert::Certificate(cert) => cert.clone(),
        CertOrEncCert::EncryptedCert(encrypted) => decrypt_indirect_pop(ctx, encrypted)?,
    };

    // The enrolled key must be the one we asked to certify.
    let mut fail_info = 0u32;
    if let Some(key) = ctx.enrollment_key() {
        let cert_spki = truststore::spki_der(&cert)?;
        if !key.matches_spki(&cert_spki) {
            warn!("enrolled certificate carries a different public key");
            fail_info |= 1 << FAIL_INFO_INCORRECT_DATA;
        }
    }

    // The caller gets the last word before confirmation.
    let mut reason = None;
    if let Some(cb) = &ctx.confirm_cb {
        match cb.check(&cert) {
            CertConfirmOutcome::Accept => {}
            CertConfirmOutcome::Reject {
                fail_info: cb_bits,
                reason: cb_reason,
            } => {
                fail_info = cb_bits;
                reason = cb_reason;
            }
        }
    }

    let needs_confirm = !ctx.disable_confirm && !msg.header.has_implicit_confirm();
    ctx.new_cert = Some(cert.clone());

    Ok(ClassifyOutcome::Enrolled(EnrolledCert {
        cert,
        fail_info,
        reason,
        needs_confirm,
    }))
}

/// Process an RP message; returns the revoked certificate on success.
pub fn classify_rev_response(ctx: &mut Context, msg: &PkiMessage) -> Result<CmpCertificate> {
    let PkiBody::Rp(rp) = &msg.body else {
        return Err(CmpError::UnexpectedBodyType {
            expected: "rp",
            got: msg.body.type_name(),
        });
    };
    if rp.status.len() > 1 {
        return Err(CmpError::MultipleResponsesNotSupported);
    }
    let status = rp
        .status
        .first()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("empty RevRepContent".into()))?;
    ctx.record_status(status);

    match status.status {
        PkiStatus::Accepted | PkiStatus::GrantedWithMods => {}
        PkiStatus::Rejection => {
            return Err(CmpError::RevocationRejected(ctx.status_snapshot()));
        }
        _ => return Err(CmpError::UnexpectedStatus(ctx.status_snapshot())),
    }

    let old_cert = ctx
        .old_cert
        .clone()
        .ok_or_else(|| CmpError::Configuration("no reference certificate".into()))?;

    // When the server names the revoked certificate, it must be ours.
    if let Some(rev_certs) = &rp.rev_certs {
        let cert_id = rev_certs.first().ok_or(CmpError::WrongCertId)?;
        let issuer_matches = match &cert_id.issuer {
            GeneralName::DirectoryName(name) => {
                name.to_der().map_err(CmpError::Asn1)?
                    == old_cert
                        .tbs_certificate
                        .issuer
                        .to_der()
                        .map_err(CmpError::Asn1)?
            }
            _ => false,
        };
        let serial_matches = cert_id.serial_number.as_bytes()
            == old_cert.tbs_certificate.serial_number.as_bytes();
        if !issuer_matches || !serial_matches {
            return Err(CmpError::WrongCertId);
        }
    }

    Ok(old_cert)
}

fn cert_rep_of(msg: &PkiMessage) -> Result<&CertRepMessage> {
    match &msg.body {
        PkiBody::Ip(rep) | PkiBody::Cp(rep) | PkiBody::Kup(rep) => Ok(rep),
        other => Err(CmpError::UnexpectedBodyType {
            expected: "ip/cp/kup",
            got: other.type_name(),
        }),
    }
}

/// Accumulate response certificates: extraCerts into the context list and
/// the untrusted pool; caPubs informationally, and into the trust store
/// only for PBM-protected responses.
fn absorb_response_certs(ctx: &mut Context, msg: &PkiMessage, rep: &CertRepMessage) {
    if let Some(extra) = &msg.extra_certs {
        for cert in extra {
            if !ctx.extra_certs_in.contains(cert) {
                ctx.extra_certs_in.push(cert.clone());
            }
            ctx.untrusted.push(cert.clone());
        }
    }
    if let Some(ca_pubs) = &rep.ca_pubs {
        let pbm_protected = msg.protection.is_some()
            && msg
                .header
                .protection_alg
                .as_ref()
                .map(|alg| alg.oid == oids::ID_PASSWORD_BASED_MAC)
                .unwrap_or(false);
        for cert in ca_pubs {
            if !ctx.ca_pubs.contains(cert) {
                ctx.ca_pubs.push(cert.clone());
            }
            if pbm_protected {
                ctx.trusted.push(cert.clone());
            }
        }
    }
}

/// Indirect POP: recover the certificate from an EncryptedValue.
///
/// encSymmKey is decrypted with the enrollment key, the IV is read from
/// the symmAlg parameters, and encValue is decrypted without padding
/// before DER-decoding the plaintext as a Certificate.
fn decrypt_indirect_pop(ctx: &Context, encrypted: &EncryptedValue) -> Result<CmpCertificate> {
    let key = ctx.enrollment_key().ok_or_else(|| {
        CmpError::Configuration("encrypted certificate but no private key".into())
    })?;
    let enc_symm_key = encrypted
        .enc_symm_key
        .as_ref()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("encryptedCert without encSymmKey".into()))?;
    let symm_key = key.decrypt_key_transport(enc_symm_key.raw_bytes())?;

    let symm_alg = encrypted
        .symm_alg
        .as_ref()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("encryptedCert without symmAlg".into()))?;
    let iv_any = symm_alg
        .parameters
        .as_ref()
        .ok_or_else(|| CmpError::ErrorDecodingMessage("symmAlg without IV".into()))?;
    let iv: der::asn1::OctetString = iv_any.decode_as().map_err(CmpError::Asn1)?;

    let plaintext = crate::crypto::decrypt_symmetric(
        &symm_alg.oid,
        &symm_key,
        iv.as_bytes(),
        encrypted.enc_value.raw_bytes(),
    )?;
    // The cipher ran without padding removal, so the DER value may be
    // followed by zero fill; decode one certificate and ignore the rest.
    let mut reader = der::SliceReader::new(&plaintext)
        .map_err(|e| CmpError::ErrorDecodingMessage(format!("decrypted certificate: {e}")))?;
    CmpCertificate::decode(&mut reader)
        .map_err(|e| CmpError::ErrorDecodingMessage(format!("decrypted certificate: {e}")))
}
