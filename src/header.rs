//! PKIHeader construction and inbound header checking (RFC 4210 §5.1.1)

use std::time::{SystemTime, UNIX_EPOCH};

use der::asn1::{GeneralizedTime, OctetString};
use tracing::{debug, warn};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use crate::asn1::{PkiHeader, PkiMessage};
use crate::context::Context;
use crate::crypto::random_bytes;
use crate::error::{CmpError, Result};
use crate::protection;
use crate::types::{MAX_EXTRACERTS_ABSORBED, NONCE_LEN};

/// Fill a request header from the context.
///
/// Installs pvno=2, sender and recipient names, messageTime, the nonce
/// pair, and the transaction ID (fresh when this is the first message).
/// The fresh senderNonce is cached for matching the next reply;
/// protectionAlg and senderKID are installed later by the message factory.
pub fn build_header(ctx: &mut Context) -> Result<PkiHeader> {
    let sender = ctx
        .client_cert
        .as_ref()
        .map(|cert| cert.tbs_certificate.subject.clone())
        .or_else(|| ctx.subject_name.clone())
        .unwrap_or_default();

    let recipient = ctx
        .srv_cert
        .as_ref()
        .map(|cert| cert.tbs_certificate.subject.clone())
        .or_else(|| ctx.recipient.clone())
        .or_else(|| {
            ctx.old_cert
                .as_ref()
                .map(|cert| cert.tbs_certificate.issuer.clone())
        })
        .or_else(|| {
            ctx.client_cert
                .as_ref()
                .map(|cert| cert.tbs_certificate.issuer.clone())
        })
        .unwrap_or_default();

    let transaction_id = match &ctx.transaction_id {
        Some(tid) => tid.clone(),
        None => {
            let tid = random_bytes(NONCE_LEN)?;
            ctx.transaction_id = Some(tid.clone());
            debug!(tid = %hex::encode(&tid), "starting transaction");
            tid
        }
    };

    let sender_nonce = random_bytes(NONCE_LEN)?;
    ctx.last_sender_nonce = Some(sender_nonce.clone());

    let recip_nonce = ctx
        .recip_nonce_to_echo
        .as_ref()
        .map(|nonce| OctetString::new(nonce.clone()))
        .transpose()
        .map_err(CmpError::Asn1)?;

    Ok(PkiHeader {
        pvno: 2,
        sender: GeneralName::DirectoryName(sender),
        recipient: GeneralName::DirectoryName(recipient),
        message_time: Some(now_generalized_time()?),
        protection_alg: None,
        sender_kid: None,
        recip_kid: None,
        transaction_id: Some(OctetString::new(transaction_id).map_err(CmpError::Asn1)?),
        sender_nonce: Some(OctetString::new(sender_nonce).map_err(CmpError::Asn1)?),
        recip_nonce,
        free_text: None,
        general_info: if ctx.general_info.is_empty() {
            None
        } else {
            Some(ctx.general_info.clone())
        },
    })
}

/// Check an inbound message and update the transaction bookkeeping.
///
/// Enforced in order: protection (or a permitted unprotected exception),
/// pvno=2, transactionID continuity, recipNonce correlation. On success
/// the inbound senderNonce becomes the next nonce to echo, the
/// transactionID is learned when not yet set, and the first ten inbound
/// extraCerts are absorbed into the untrusted pool.
pub fn check_received(ctx: &mut Context, msg: &PkiMessage) -> Result<()> {
    protection::verify_incoming(ctx, msg)?;

    if msg.header.pvno != 2 {
        return Err(CmpError::UnexpectedPvno(msg.header.pvno));
    }

    if let Some(expected_tid) = &ctx.transaction_id {
        let got = msg
            .header
            .transaction_id
            .as_ref()
            .ok_or(CmpError::TransactionIdUnmatched)?;
        if got.as_bytes() != expected_tid.as_slice() {
            return Err(CmpError::TransactionIdUnmatched);
        }
    }

    if let Some(expected_nonce) = &ctx.last_sender_nonce {
        let got = msg
            .header
            .recip_nonce
            .as_ref()
            .ok_or(CmpError::RecipNonceUnmatched)?;
        if got.as_bytes() != expected_nonce.as_slice() {
            return Err(CmpError::RecipNonceUnmatched);
        }
    }

    // Checks passed; update transaction state.
    if let Some(nonce) = &msg.header.sender_nonce {
        ctx.recip_nonce_to_echo = Some(nonce.as_bytes().to_vec());
    }
    if ctx.transaction_id.is_none() {
        if let Some(tid) = &msg.header.transaction_id {
            ctx.transaction_id = Some(tid.as_bytes().to_vec());
        }
    }

    if let Some(extra) = &msg.extra_certs {
        if extra.len() > MAX_EXTRACERTS_ABSORBED {
            warn!(
                count = extra.len(),
                "absorbing only the first {MAX_EXTRACERTS_ABSORBED} inbound extraCerts"
            );
        }
        for cert in extra.iter().take(MAX_EXTRACERTS_ABSORBED).rev() {
            ctx.untrusted.push_front(cert.clone());
        }
    }

    Ok(())
}

fn now_generalized_time() -> Result<GeneralizedTime> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CmpError::Other(format!("system clock: {e}")))?;
    GeneralizedTime::from_unix_duration(now).map_err(CmpError::Asn1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::PkiBody;
    use der::asn1::Null;

    fn reply_for(ctx: &Context) -> PkiMessage {
        let header = PkiHeader {
            pvno: 2,
            sender: GeneralName::DirectoryName(Name::default()),
            recipient: GeneralName::DirectoryName(Name::default()),
            message_time: None,
            protection_alg: None,
            sender_kid: None,
            recip_kid: None,
            transaction_id: ctx
                .transaction_id
                .as_ref()
                .map(|tid| OctetString::new(tid.clone()).unwrap()),
            sender_nonce: Some(OctetString::new(vec![5u8; 16]).unwrap()),
            recip_nonce: ctx
                .last_sender_nonce
                .as_ref()
                .map(|nonce| OctetString::new(nonce.clone()).unwrap()),
            free_text: None,
            general_info: None,
        };
        PkiMessage::new(header, PkiBody::Pkiconf(Null))
    }

    fn tolerant_ctx() -> Context {
        let mut ctx = Context::new();
        // Replies in these tests are unprotected pkiconf bodies.
        ctx.set_unprotected_errors(true);
        ctx
    }

    #[test]
    fn builder_fills_nonces_and_caches_them() {
        let mut ctx = tolerant_ctx();
        let header = build_header(&mut ctx).unwrap();
        assert_eq!(header.pvno, 2);
        assert_eq!(
            header.sender_nonce.as_ref().unwrap().as_bytes(),
            ctx.last_sender_nonce.as_ref().unwrap().as_slice()
        );
        assert_eq!(
            header.transaction_id.as_ref().unwrap().as_bytes(),
            ctx.transaction_id.as_ref().unwrap().as_slice()
        );
        assert_eq!(header.sender_nonce.as_ref().unwrap().as_bytes().len(), 16);
    }

    #[test]
    fn transaction_id_is_stable_across_messages() {
        let mut ctx = tolerant_ctx();
        let first = build_header(&mut ctx).unwrap();
        let second = build_header(&mut ctx).unwrap();
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_ne!(first.sender_nonce, second.sender_nonce);
    }

    #[test]
    fn reply_with_matching_correlation_is_accepted() {
        let mut ctx = tolerant_ctx();
        build_header(&mut ctx).unwrap();
        let reply = reply_for(&ctx);
        check_received(&mut ctx, &reply).unwrap();
        // The inbound senderNonce becomes the nonce to echo next.
        assert_eq!(ctx.recip_nonce_to_echo.as_deref(), Some(&[5u8; 16][..]));
    }

    #[test]
    fn transaction_id_mismatch_rejected_without_state_change() {
        let mut ctx = tolerant_ctx();
        build_header(&mut ctx).unwrap();
        let mut reply = reply_for(&ctx);
        let mut bad_tid = ctx.transaction_id.clone().unwrap();
        bad_tid[0] ^= 0x01;
        reply.header.transaction_id = Some(OctetString::new(bad_tid).unwrap());
        let err = check_received(&mut ctx, &reply).unwrap_err();
        assert!(matches!(err, CmpError::TransactionIdUnmatched));
        assert!(ctx.recip_nonce_to_echo.is_none());
    }

    #[test]
    fn recip_nonce_mismatch_rejected() {
        let mut ctx = tolerant_ctx();
        build_header(&mut ctx).unwrap();
        let mut reply = reply_for(&ctx);
        reply.header.recip_nonce = Some(OctetString::new(vec![0u8; 16]).unwrap());
        assert!(matches!(
            check_received(&mut ctx, &reply),
            Err(CmpError::RecipNonceUnmatched)
        ));
    }

    #[test]
    fn wrong_pvno_rejected() {
        let mut ctx = tolerant_ctx();
        build_header(&mut ctx).unwrap();
        let mut reply = reply_for(&ctx);
        reply.header.pvno = 3;
        assert!(matches!(
            check_received(&mut ctx, &reply),
            Err(CmpError::UnexpectedPvno(3))
        ));
    }

    #[test]
    fn unprotected_reply_rejected_without_exception_flag() {
        let mut ctx = Context::new();
        build_header(&mut ctx).unwrap();
        let reply = reply_for(&ctx);
        assert!(matches!(
            check_received(&mut ctx, &reply),
            Err(CmpError::MissingProtection)
        ));
    }

    #[test]
    fn transaction_id_learned_from_peer() {
        let mut ctx = tolerant_ctx();
        let mut reply = reply_for(&ctx);
        reply.header.transaction_id = Some(OctetString::new(vec![3u8; 16]).unwrap());
        check_received(&mut ctx, &reply).unwrap();
        assert_eq!(ctx.transaction_id.as_deref(), Some(&[3u8; 16][..]));
    }
}
