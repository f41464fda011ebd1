//! Shared fixtures: rcgen-minted test PKI and a scripted in-memory CMP
//! responder standing in for the transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use der::asn1::OctetString;
use der::{Any, Decode, Encode};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use cmp_client::asn1::body::{CertResponse, CertifiedKeyPair};
use cmp_client::asn1::{
    oids, CertOrEncCert, CertRepMessage, CmpCertificate, PbmParameter, PkiBody, PkiHeader,
    PkiMessage, PkiStatus, PkiStatusInfo,
};
use cmp_client::protection::{compute_protection, ProtectionCredentials};
use cmp_client::transport::MessageTransfer;
use cmp_client::{CmpError, PrivateKey, Result};

/// A certificate with both its rcgen handle (for issuing) and the wire
/// form the client consumes.
pub struct TestIdentity {
    pub cert: CmpCertificate,
    pub rc_cert: rcgen::Certificate,
    pub rc_key: KeyPair,
}

impl TestIdentity {
    /// The private key in the client's own representation.
    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_pkcs8_der(&self.rc_key.serialize_der()).unwrap()
    }

    /// The subject as an x509-cert Name.
    pub fn subject(&self) -> Name {
        self.cert.tbs_certificate.subject.clone()
    }
}

fn validity_window(params: &mut CertificateParams) {
    params.not_before = time::macros::datetime!(2020-01-01 00:00 UTC);
    params.not_after = time::macros::datetime!(2045-01-01 00:00 UTC);
}

/// Mint a self-signed CA.
pub fn new_ca(common_name: &str) -> TestIdentity {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![]).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    validity_window(&mut params);
    let cert = params.self_signed(&key).unwrap();
    TestIdentity {
        cert: CmpCertificate::from_der(cert.der()).unwrap(),
        rc_cert: cert,
        rc_key: key,
    }
}

/// Mint an end-entity certificate signed by `ca`, optionally for an
/// existing key pair.
pub fn issue_leaf(common_name: &str, ca: &TestIdentity, key: Option<KeyPair>) -> TestIdentity {
    let key = key.unwrap_or_else(|| KeyPair::generate().unwrap());
    let mut params = CertificateParams::new(vec![]).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    validity_window(&mut params);
    let cert = params.signed_by(&key, &ca.rc_cert, &ca.rc_key).unwrap();
    TestIdentity {
        cert: CmpCertificate::from_der(cert.der()).unwrap(),
        rc_cert: cert,
        rc_key: key,
    }
}

type Handler = Box<dyn Fn(&PkiMessage) -> PkiMessage + Send + Sync>;

/// A scripted CMP responder: each inbound request consumes the next
/// handler and returns its reply. Requests are recorded for assertions.
pub struct MockServer {
    handlers: Mutex<VecDeque<Handler>>,
    requests: Mutex<Vec<PkiMessage>>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue the next reply builder.
    pub fn push(self: &Arc<Self>, handler: impl Fn(&PkiMessage) -> PkiMessage + Send + Sync + 'static) {
        self.handlers.lock().unwrap().push_back(Box::new(handler));
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<PkiMessage> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransfer for MockServer {
    async fn transfer(&self, request: &[u8], _deadline: Option<Duration>) -> Result<Vec<u8>> {
        let msg = PkiMessage::from_der(request)
            .map_err(|e| CmpError::ErrorDecodingMessage(e.to_string()))?;
        self.requests.lock().unwrap().push(msg.clone());
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CmpError::FailedToReceivePkiMessage("script exhausted".into()))?;
        let reply = handler(&msg);
        reply.to_der().map_err(CmpError::Asn1)
    }
}

/// A reply header correlated to `request`: the transactionID is echoed,
/// the request's senderNonce becomes recipNonce, and a fixed server
/// nonce is inserted.
pub fn reply_header(request: &PkiMessage, sender: Name) -> PkiHeader {
    PkiHeader {
        pvno: 2,
        sender: GeneralName::DirectoryName(sender),
        recipient: request.header.sender.clone(),
        message_time: None,
        protection_alg: None,
        sender_kid: None,
        recip_kid: None,
        transaction_id: request.header.transaction_id.clone(),
        sender_nonce: Some(OctetString::new(vec![0x42; 16]).unwrap()),
        recip_nonce: request.header.sender_nonce.clone(),
        free_text: None,
        general_info: None,
    }
}

/// An unprotected reply to `request`.
pub fn plain_reply(request: &PkiMessage, sender: Name, body: PkiBody) -> PkiMessage {
    PkiMessage::new(reply_header(request, sender), body)
}

/// Install PBM protection on a reply in place.
pub fn pbm_protect(msg: &mut PkiMessage, secret: &[u8]) {
    let pbm = PbmParameter::new(
        vec![0x5A; 16],
        alg(oids::ID_SHA256),
        500,
        alg(oids::ID_HMAC_SHA1),
    )
    .unwrap();
    msg.header.protection_alg = Some(AlgorithmIdentifierOwned {
        oid: oids::ID_PASSWORD_BASED_MAC,
        parameters: Some(Any::from_der(&pbm.to_der().unwrap()).unwrap()),
    });
    msg.protection =
        Some(compute_protection(msg, &ProtectionCredentials::Pbm { secret }).unwrap());
}

/// A PBM-protected reply to `request`.
pub fn pbm_reply(request: &PkiMessage, sender: Name, body: PkiBody, secret: &[u8]) -> PkiMessage {
    let mut msg = plain_reply(request, sender, body);
    pbm_protect(&mut msg, secret);
    msg
}

/// A signature-protected reply, with the given extraCerts attached.
pub fn signed_reply(
    request: &PkiMessage,
    signer: &TestIdentity,
    body: PkiBody,
    extra_certs: Vec<CmpCertificate>,
) -> PkiMessage {
    let mut msg = plain_reply(request, signer.subject(), body);
    let key = signer.private_key();
    msg.header.protection_alg =
        Some(key.signature_alg(cmp_client::DigestAlgorithm::Sha256).unwrap());
    msg.protection =
        Some(compute_protection(&msg, &ProtectionCredentials::Signature { key: &key }).unwrap());
    msg.extra_certs = if extra_certs.is_empty() {
        None
    } else {
        Some(extra_certs)
    };
    msg
}

/// CertRepMessage with a single accepted response carrying `cert`.
pub fn accepted_rep(cert: &CmpCertificate) -> CertRepMessage {
    CertRepMessage {
        ca_pubs: None,
        response: vec![CertResponse {
            cert_req_id: 0,
            status: PkiStatusInfo::accepted(),
            certified_key_pair: Some(CertifiedKeyPair {
                cert_or_enc_cert: CertOrEncCert::Certificate(cert.clone()),
                private_key: None,
                publication_info: None,
            }),
            rsp_info: None,
        }],
    }
}

/// CertRepMessage with a single waiting response.
pub fn waiting_rep() -> CertRepMessage {
    CertRepMessage {
        ca_pubs: None,
        response: vec![CertResponse {
            cert_req_id: 0,
            status: PkiStatusInfo {
                status: PkiStatus::Waiting,
                status_string: None,
                fail_info: None,
            },
            certified_key_pair: None,
            rsp_info: None,
        }],
    }
}

/// CertRepMessage with a single rejection carrying `fail_info` bits.
pub fn rejection_rep(fail_info: u32) -> CertRepMessage {
    CertRepMessage {
        ca_pubs: None,
        response: vec![CertResponse {
            cert_req_id: 0,
            status: PkiStatusInfo::rejection(fail_info, Some("refused".into())).unwrap(),
            certified_key_pair: None,
            rsp_info: None,
        }],
    }
}

fn alg(oid: der::asn1::ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}
