//! End-to-end transaction flows against a scripted responder

mod common;

use std::time::Duration;

use der::asn1::{Int, OctetString};
use der::Encode;
use x509_cert::ext::pkix::name::GeneralName;

use cmp_client::asn1::body::{PollRep, RevRepContent};
use cmp_client::asn1::crmf::CertId;
use cmp_client::asn1::{oids, InfoTypeAndValue, PkiBody, PkiStatusInfo};
use cmp_client::{parse_name, CmpError, Context, DigestAlgorithm, PbmOptions};

use common::*;

fn scenario_pbm_context() -> Context {
    let mut ctx = Context::new();
    ctx.set_secret_value(b"insta".to_vec())
        .set_reference_value(b"clientref".to_vec())
        .set_subject_name(parse_name("CN=test").unwrap())
        .set_popo_method(cmp_client::PopoMethod::RaVerified)
        .set_total_timeout(Duration::from_secs(120))
        .set_msg_timeout(Duration::from_secs(60));
    ctx.set_pbm_options(PbmOptions {
        salt_len: 16,
        owf: DigestAlgorithm::Sha256,
        iteration_count: 500,
        mac: cmp_client::MacAlgorithm::HmacSha1,
    })
    .unwrap();
    ctx
}

#[tokio::test]
async fn ir_happy_path_with_confirmation() {
    let ca = new_ca("Test CA");
    let enrolled = issue_leaf("CN=test", &ca, None);
    let server_name = parse_name("CN=CMP Server").unwrap();

    let mut ctx = scenario_pbm_context();
    ctx.set_new_key(enrolled.private_key());

    let server = MockServer::new();
    {
        let cert = enrolled.cert.clone();
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Ir(_)));
            pbm_reply(req, name.clone(), PkiBody::Ip(accepted_rep(&cert)), b"insta")
        });
    }
    {
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Certconf(_)));
            pbm_reply(req, name.clone(), PkiBody::Pkiconf(der::asn1::Null), b"insta")
        });
    }
    ctx.set_transfer(server.clone());

    let cert = ctx.execute_ir().await.unwrap();
    assert_eq!(cert, enrolled.cert);
    assert_eq!(ctx.new_cert(), Some(&enrolled.cert));
    assert_eq!(ctx.last_pki_status(), 0);
    assert_eq!(ctx.fail_info_code(), 0);

    // The certConf that went out accepted the certificate under id 0 and
    // hashed it with the digest of its signature algorithm.
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let PkiBody::Certconf(statuses) = &requests[1].body else {
        panic!("second request must be certConf");
    };
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].cert_req_id, 0);
    let expected_hash =
        DigestAlgorithm::Sha256.digest(&enrolled.cert.to_der().unwrap());
    assert_eq!(statuses[0].cert_hash.as_bytes(), expected_hash.as_slice());
}

#[tokio::test]
async fn kur_with_polling_loop() {
    let ca = new_ca("Test CA");
    let old = issue_leaf("CN=device", &ca, None);
    let renewed = issue_leaf("CN=device", &ca, None);
    let server_name = parse_name("CN=CMP Server").unwrap();

    let mut ctx = scenario_pbm_context();
    ctx.set_old_cert(old.cert.clone())
        .set_private_key(old.private_key())
        .set_new_key(renewed.private_key())
        .set_popo_method(cmp_client::PopoMethod::Signature)
        .set_digest(DigestAlgorithm::Sha256);

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Kur(_)));
            pbm_reply(req, name.clone(), PkiBody::Ip(waiting_rep()), b"insta")
        });
    }
    {
        let name = server_name.clone();
        server.push(move |req| {
            let PkiBody::Pollreq(content) = &req.body else {
                panic!("expected pollReq");
            };
            assert_eq!(content[0].cert_req_id, 0);
            pbm_reply(
                req,
                name.clone(),
                PkiBody::Pollrep(vec![PollRep {
                    cert_req_id: 0,
                    check_after: 1,
                    reason: None,
                }]),
                b"insta",
            )
        });
    }
    {
        let cert = renewed.cert.clone();
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Pollreq(_)));
            pbm_reply(req, name.clone(), PkiBody::Kup(accepted_rep(&cert)), b"insta")
        });
    }
    {
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Certconf(_)));
            pbm_reply(req, name.clone(), PkiBody::Pkiconf(der::asn1::Null), b"insta")
        });
    }
    ctx.set_transfer(server.clone());

    let started = std::time::Instant::now();
    let cert = ctx.execute_kur().await.unwrap();
    assert_eq!(cert, renewed.cert);
    // checkAfter=1 must actually suspend before the second pollReq.
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.requests().len(), 4);
}

#[tokio::test]
async fn rr_accepted_returns_revoked_cert() {
    let ca = new_ca("Test CA");
    let old = issue_leaf("CN=device", &ca, None);
    let server_name = parse_name("CN=CMP Server").unwrap();

    let mut ctx = scenario_pbm_context();
    ctx.set_old_cert(old.cert.clone())
        .set_revocation_reason(cmp_client::RevocationReason::KeyCompromise);

    let server = MockServer::new();
    {
        let name = server_name.clone();
        let issuer = old.cert.tbs_certificate.issuer.clone();
        let serial = old.cert.tbs_certificate.serial_number.clone();
        server.push(move |req| {
            let PkiBody::Rr(details) = &req.body else {
                panic!("expected rr");
            };
            // The request names the certificate and carries the reason.
            assert!(details[0].crl_entry_details.is_some());
            let body = PkiBody::Rp(RevRepContent {
                status: vec![PkiStatusInfo::accepted()],
                rev_certs: Some(vec![CertId {
                    issuer: GeneralName::DirectoryName(issuer.clone()),
                    serial_number: Int::new(serial.as_bytes()).unwrap(),
                }]),
                crls: None,
            });
            pbm_reply(req, name.clone(), body, b"insta")
        });
    }
    ctx.set_transfer(server.clone());

    let revoked = ctx.execute_rr().await.unwrap();
    assert_eq!(revoked, old.cert);
    assert_eq!(ctx.last_pki_status(), 0);
}

#[tokio::test]
async fn unprotected_rejection_tolerated_without_certconf() {
    let server_name = parse_name("CN=CMP Server").unwrap();
    let mut ctx = scenario_pbm_context();
    ctx.set_unprotected_errors(true);

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            // badPOP rejection, deliberately unprotected
            plain_reply(req, name.clone(), PkiBody::Ip(rejection_rep(1 << 9)))
        });
    }
    ctx.set_transfer(server.clone());

    let err = ctx.execute_ir().await.unwrap_err();
    assert!(matches!(err, CmpError::CertificateNotAccepted(_)));
    assert_eq!(ctx.last_pki_status(), 2);
    assert_ne!(ctx.fail_info_code() & (1 << 9), 0);
    // No certConf may follow a rejection.
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn transaction_id_mismatch_rejected() {
    let server_name = parse_name("CN=CMP Server").unwrap();
    let mut ctx = scenario_pbm_context();

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            let mut reply = plain_reply(req, name.clone(), PkiBody::Ip(waiting_rep()));
            let mut tid = req
                .header
                .transaction_id
                .as_ref()
                .unwrap()
                .as_bytes()
                .to_vec();
            tid[0] ^= 0x01;
            reply.header.transaction_id = Some(OctetString::new(tid).unwrap());
            pbm_protect(&mut reply, b"insta");
            reply
        });
    }
    ctx.set_transfer(server.clone());

    let err = ctx.execute_ir().await.unwrap_err();
    assert!(matches!(err, CmpError::TransactionIdUnmatched));
}

#[tokio::test]
async fn trust_anchor_from_extracerts_for_ir() {
    let server_root = new_ca("Server Root");
    let enrolled = issue_leaf("CN=test", &server_root, None);
    let client_ca = new_ca("Client CA");
    let client = issue_leaf("CN=client", &client_ca, None);

    let mut ctx = Context::new();
    ctx.set_client_cert(client.cert.clone())
        .set_private_key(client.private_key())
        .set_new_key(enrolled.private_key())
        .set_subject_name(parse_name("CN=test").unwrap())
        .set_permit_ta_in_extracerts_for_ir(true)
        .set_disable_confirm(true);

    let server = MockServer::new();
    {
        let root = server_root;
        let cert = enrolled.cert.clone();
        server.push(move |req| {
            let extra = vec![root.cert.clone()];
            signed_reply(req, &root, PkiBody::Ip(accepted_rep(&cert)), extra)
        });
    }
    ctx.set_transfer(server.clone());

    let cert = ctx.execute_ir().await.unwrap();
    assert_eq!(cert, enrolled.cert);
    // The self-signed anchor from extraCerts was cached for the rest of
    // the transaction.
    let cached = ctx.validated_srv_cert().unwrap();
    assert_eq!(
        cached.tbs_certificate.subject.to_string(),
        "CN=Server Root"
    );
}

#[tokio::test]
async fn trust_anchor_exception_requires_enrolled_chain() {
    let server_root = new_ca("Server Root");
    let unrelated_ca = new_ca("Unrelated CA");
    // The enrolled certificate does NOT chain to the extraCerts anchor.
    let enrolled = issue_leaf("CN=test", &unrelated_ca, None);
    let client_ca = new_ca("Client CA");
    let client = issue_leaf("CN=client", &client_ca, None);

    let mut ctx = Context::new();
    ctx.set_client_cert(client.cert.clone())
        .set_private_key(client.private_key())
        .set_new_key(enrolled.private_key())
        .set_subject_name(parse_name("CN=test").unwrap())
        .set_permit_ta_in_extracerts_for_ir(true)
        .set_disable_confirm(true);

    let server = MockServer::new();
    {
        let root = server_root;
        let cert = enrolled.cert.clone();
        server.push(move |req| {
            let extra = vec![root.cert.clone()];
            signed_reply(req, &root, PkiBody::Ip(accepted_rep(&cert)), extra)
        });
    }
    ctx.set_transfer(server.clone());

    let err = ctx.execute_ir().await.unwrap_err();
    assert!(matches!(err, CmpError::UntrustedServerCert(_)));
}

#[tokio::test]
async fn poll_deadline_bounds_the_transaction() {
    let server_name = parse_name("CN=CMP Server").unwrap();
    let mut ctx = scenario_pbm_context();
    ctx.set_total_timeout(Duration::from_secs(1));

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            pbm_reply(req, name.clone(), PkiBody::Ip(waiting_rep()), b"insta")
        });
    }
    {
        let name = server_name.clone();
        server.push(move |req| {
            pbm_reply(
                req,
                name.clone(),
                PkiBody::Pollrep(vec![PollRep {
                    cert_req_id: 0,
                    check_after: 3600,
                    reason: Some(vec!["backlogged".into()]),
                }]),
                b"insta",
            )
        });
    }
    ctx.set_transfer(server.clone());

    let err = ctx.execute_ir().await.unwrap_err();
    assert!(matches!(err, CmpError::TotalTimeout));
}

#[tokio::test]
async fn negative_check_after_rejected() {
    let server_name = parse_name("CN=CMP Server").unwrap();
    let mut ctx = scenario_pbm_context();

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            pbm_reply(req, name.clone(), PkiBody::Ip(waiting_rep()), b"insta")
        });
    }
    {
        let name = server_name.clone();
        server.push(move |req| {
            pbm_reply(
                req,
                name.clone(),
                PkiBody::Pollrep(vec![PollRep {
                    cert_req_id: 0,
                    check_after: -1,
                    reason: None,
                }]),
                b"insta",
            )
        });
    }
    ctx.set_transfer(server.clone());

    let err = ctx.execute_ir().await.unwrap_err();
    assert!(matches!(err, CmpError::InvalidParameter(_)));
}

#[tokio::test]
async fn implicit_confirm_skips_certconf() {
    let ca = new_ca("Test CA");
    let enrolled = issue_leaf("CN=test", &ca, None);
    let server_name = parse_name("CN=CMP Server").unwrap();

    let mut ctx = scenario_pbm_context();
    ctx.set_new_key(enrolled.private_key());
    ctx.set_implicit_confirm(true);

    let server = MockServer::new();
    {
        let cert = enrolled.cert.clone();
        let name = server_name.clone();
        server.push(move |req| {
            // The request must ask for implicit confirmation.
            assert!(req.header.has_implicit_confirm());
            let mut reply =
                plain_reply(req, name.clone(), PkiBody::Ip(accepted_rep(&cert)));
            reply.header.general_info = Some(vec![InfoTypeAndValue::null(
                oids::ID_IT_IMPLICIT_CONFIRM,
            )
            .unwrap()]);
            pbm_protect(&mut reply, b"insta");
            reply
        });
    }
    ctx.set_transfer(server.clone());

    let cert = ctx.execute_ir().await.unwrap();
    assert_eq!(cert, enrolled.cert);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn genm_returns_reply_itavs() {
    let server_name = parse_name("CN=CMP Server").unwrap();
    let mut ctx = scenario_pbm_context();
    ctx.add_genm_itav(InfoTypeAndValue::null(oids::ID_IT_CONFIRM_WAIT_TIME).unwrap());

    let server = MockServer::new();
    {
        let name = server_name.clone();
        server.push(move |req| {
            assert!(matches!(req.body, PkiBody::Genm(_)));
            let reply_itavs = vec![
                InfoTypeAndValue::null(oids::ID_IT_IMPLICIT_CONFIRM).unwrap(),
                InfoTypeAndValue::null(oids::ID_IT_CONFIRM_WAIT_TIME).unwrap(),
            ];
            pbm_reply(req, name.clone(), PkiBody::Genp(reply_itavs), b"insta")
        });
    }
    ctx.set_transfer(server.clone());

    let itavs = ctx.execute_genm().await.unwrap();
    assert_eq!(itavs.len(), 2);
}
