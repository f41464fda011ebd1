//! Transaction context: caller-side configuration plus working memory
//!
//! A `Context` is created empty, mutated through setters, then handed to
//! one of the transaction entry points in [`crate::transaction`]. The
//! driver owns the transaction-scoped fields (nonces, deadline,
//! accumulated certificates) for the duration of a call and leaves the
//! result behind for retrieval. Contexts are not shared between
//! concurrent transactions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use der::asn1::ObjectIdentifier;
use der::Decode;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence};
use x509_cert::request::CertReq;
use zeroize::Zeroizing;

use crate::asn1::{CmpCertificate, InfoTypeAndValue, PkiStatusInfo};
use crate::crypto::{DigestAlgorithm, MacAlgorithm, PrivateKey};
use crate::error::{CmpError, Result};
use crate::transport::{MessageTransfer, TlsWrap};
use crate::truststore::CertPool;
use crate::types::{PopoMethod, RevocationReason, PBM_ITERATION_MAX, PBM_ITERATION_MIN};

/// Upper bound on retained error details (the bounded error list).
const MAX_ERROR_DETAILS: usize = 16;

/// Outcome of the caller's certificate-confirmation callback
#[derive(Debug, Clone)]
pub enum CertConfirmOutcome {
    /// Keep the certificate; send an accepting certConf
    Accept,
    /// Refuse the certificate with the given failure bits and reason
    Reject {
        /// PKIFailureInfo mask to report
        fail_info: u32,
        /// Optional reason string for the certConf statusInfo
        reason: Option<String>,
    },
}

/// Caller-supplied hook inspecting a newly enrolled certificate before
/// the client confirms it.
pub trait ConfirmationCallback: Send + Sync {
    /// Decide whether to accept `cert`.
    fn check(&self, cert: &CmpCertificate) -> CertConfirmOutcome;
}

/// PBM parameter knobs kept on the context
#[derive(Debug, Clone)]
pub struct PbmOptions {
    /// Salt length in octets
    pub salt_len: usize,
    /// One-way function
    pub owf: DigestAlgorithm,
    /// Iteration count, within the crate bounds
    pub iteration_count: u32,
    /// MAC algorithm
    pub mac: MacAlgorithm,
}

impl Default for PbmOptions {
    fn default() -> Self {
        Self {
            salt_len: 16,
            owf: DigestAlgorithm::Sha256,
            iteration_count: 500,
            mac: MacAlgorithm::HmacSha256,
        }
    }
}

/// Mutable configuration and working memory for one CMP transaction
pub struct Context {
    // Identity
    pub(crate) client_cert: Option<CmpCertificate>,
    pub(crate) private_key: Option<PrivateKey>,
    pub(crate) new_key: Option<PrivateKey>,
    pub(crate) reference_value: Option<Zeroizing<Vec<u8>>>,
    pub(crate) secret_value: Option<Zeroizing<Vec<u8>>>,
    pub(crate) old_cert: Option<CmpCertificate>,
    pub(crate) csr: Option<CertReq>,

    // Peer identity expectations
    pub(crate) srv_cert: Option<CmpCertificate>,
    pub(crate) trusted: CertPool,
    pub(crate) untrusted: CertPool,
    pub(crate) expected_sender: Option<Name>,

    // Message parameters
    pub(crate) recipient: Option<Name>,
    pub(crate) issuer: Option<Name>,
    pub(crate) subject_name: Option<Name>,
    pub(crate) validity_days: u32,
    pub(crate) req_extensions: Vec<Extension>,
    pub(crate) subject_alt_names: Vec<GeneralName>,
    pub(crate) policies: Vec<ObjectIdentifier>,
    pub(crate) popo_method: PopoMethod,
    pub(crate) revocation_reason: Option<RevocationReason>,
    pub(crate) digest: DigestAlgorithm,
    pub(crate) pbm: PbmOptions,
    pub(crate) general_info: Vec<InfoTypeAndValue>,
    pub(crate) genm_itavs: Vec<InfoTypeAndValue>,
    pub(crate) extra_certs_out: Vec<CmpCertificate>,

    // Flags
    pub(crate) implicit_confirm: bool,
    pub(crate) disable_confirm: bool,
    pub(crate) unprotected_send: bool,
    pub(crate) unprotected_errors: bool,
    pub(crate) ignore_key_usage: bool,
    pub(crate) permit_ta_in_extracerts_for_ir: bool,
    pub(crate) san_nodefault: bool,
    pub(crate) san_critical: bool,
    pub(crate) policies_critical: bool,

    // Transport
    pub(crate) server_host: String,
    pub(crate) server_port: u16,
    pub(crate) server_path: String,
    pub(crate) server_tls: bool,
    pub(crate) proxy: Option<(String, u16)>,
    pub(crate) msg_timeout: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) transfer: Option<Arc<dyn MessageTransfer>>,
    pub(crate) tls_wrap: Option<Arc<dyn TlsWrap>>,
    pub(crate) confirm_cb: Option<Arc<dyn ConfirmationCallback>>,

    // Transaction state
    pub(crate) transaction_id: Option<Vec<u8>>,
    pub(crate) last_sender_nonce: Option<Vec<u8>>,
    pub(crate) recip_nonce_to_echo: Option<Vec<u8>>,
    pub(crate) extra_certs_in: Vec<CmpCertificate>,
    pub(crate) ca_pubs: Vec<CmpCertificate>,
    pub(crate) last_status: Option<PkiStatusInfo>,
    pub(crate) last_pki_status: i32,
    pub(crate) fail_info_code: u32,
    pub(crate) status_strings: Vec<String>,
    pub(crate) new_cert: Option<CmpCertificate>,
    pub(crate) validated_srv_cert: Option<CmpCertificate>,
    pub(crate) end_time: Option<Instant>,
    pub(crate) error_details: VecDeque<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// An empty context with protocol defaults.
    pub fn new() -> Self {
        Self {
            client_cert: None,
            private_key: None,
            new_key: None,
            reference_value: None,
            secret_value: None,
            old_cert: None,
            csr: None,
            srv_cert: None,
            trusted: CertPool::new(),
            untrusted: CertPool::new(),
            expected_sender: None,
            recipient: None,
            issuer: None,
            subject_name: None,
            validity_days: 0,
            req_extensions: Vec::new(),
            subject_alt_names: Vec::new(),
            policies: Vec::new(),
            popo_method: PopoMethod::default(),
            revocation_reason: None,
            digest: DigestAlgorithm::default(),
            pbm: PbmOptions::default(),
            general_info: Vec::new(),
            genm_itavs: Vec::new(),
            extra_certs_out: Vec::new(),
            implicit_confirm: false,
            disable_confirm: false,
            unprotected_send: false,
            unprotected_errors: false,
            ignore_key_usage: false,
            permit_ta_in_extracerts_for_ir: false,
            san_nodefault: false,
            san_critical: false,
            policies_critical: false,
            server_host: String::new(),
            server_port: 80,
            server_path: "/".into(),
            server_tls: false,
            proxy: None,
            msg_timeout: Duration::from_secs(120),
            total_timeout: Duration::ZERO,
            transfer: None,
            tls_wrap: None,
            confirm_cb: None,
            transaction_id: None,
            last_sender_nonce: None,
            recip_nonce_to_echo: None,
            extra_certs_in: Vec::new(),
            ca_pubs: Vec::new(),
            last_status: None,
            last_pki_status: -1,
            fail_info_code: 0,
            status_strings: Vec::new(),
            new_cert: None,
            validated_srv_cert: None,
            end_time: None,
            error_details: VecDeque::new(),
        }
    }

    // ---- identity -------------------------------------------------------

    /// Set the client certificate used for signature protection.
    pub fn set_client_cert(&mut self, cert: CmpCertificate) -> &mut Self {
        self.client_cert = Some(cert);
        self
    }

    /// Set the private key matching the client certificate.
    pub fn set_private_key(&mut self, key: PrivateKey) -> &mut Self {
        self.private_key = Some(key);
        self
    }

    /// Set the key the new certificate shall certify (falls back to the
    /// transaction key when absent).
    pub fn set_new_key(&mut self, key: PrivateKey) -> &mut Self {
        self.new_key = Some(key);
        self
    }

    /// Set the PBM reference value (user-id octets, sent as senderKID).
    pub fn set_reference_value(&mut self, reference: impl Into<Vec<u8>>) -> &mut Self {
        self.reference_value = Some(Zeroizing::new(reference.into()));
        self
    }

    /// Set the PBM shared secret.
    pub fn set_secret_value(&mut self, secret: impl Into<Vec<u8>>) -> &mut Self {
        self.secret_value = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Set the reference certificate for KUR and RR.
    pub fn set_old_cert(&mut self, cert: CmpCertificate) -> &mut Self {
        self.old_cert = Some(cert);
        self
    }

    /// Supply a PKCS#10 CSR (P10CR body, or template inputs for ir/cr).
    pub fn set_csr(&mut self, csr: CertReq) -> &mut Self {
        self.csr = Some(csr);
        self
    }

    // ---- peer expectations ----------------------------------------------

    /// Pin the server certificate, short-circuiting discovery.
    pub fn pin_server_cert(&mut self, cert: CmpCertificate) -> &mut Self {
        self.srv_cert = Some(cert);
        self
    }

    /// Add a trust anchor.
    pub fn add_trust_anchor(&mut self, cert: CmpCertificate) -> &mut Self {
        self.trusted.push(cert);
        self
    }

    /// Add an untrusted intermediate.
    pub fn add_untrusted_cert(&mut self, cert: CmpCertificate) -> &mut Self {
        self.untrusted.push(cert);
        self
    }

    /// Require the response sender to carry exactly this name.
    pub fn set_expected_sender(&mut self, name: Name) -> &mut Self {
        self.expected_sender = Some(name);
        self
    }

    // ---- message parameters ---------------------------------------------

    /// Set the recipient name placed in request headers.
    pub fn set_recipient(&mut self, name: Name) -> &mut Self {
        self.recipient = Some(name);
        self
    }

    /// Set the issuer requested in the certificate template.
    pub fn set_issuer(&mut self, name: Name) -> &mut Self {
        self.issuer = Some(name);
        self
    }

    /// Set the subject requested in the certificate template.
    pub fn set_subject_name(&mut self, name: Name) -> &mut Self {
        self.subject_name = Some(name);
        self
    }

    /// Request a validity of `days` days (0 omits the field).
    pub fn set_validity_days(&mut self, days: u32) -> &mut Self {
        self.validity_days = days;
        self
    }

    /// Add a requested extension; caller-supplied extensions win over CSR
    /// extensions on OID collision.
    pub fn add_extension(&mut self, ext: Extension) -> &mut Self {
        self.req_extensions.push(ext);
        self
    }

    /// Add a subject alternative name.
    pub fn add_subject_alt_name(&mut self, san: GeneralName) -> &mut Self {
        self.subject_alt_names.push(san);
        self
    }

    /// Add a certificate policy OID.
    pub fn add_policy(&mut self, policy: ObjectIdentifier) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Select the proof-of-possession method.
    pub fn set_popo_method(&mut self, method: PopoMethod) -> &mut Self {
        self.popo_method = method;
        self
    }

    /// Select the CRL reason sent with revocation requests.
    pub fn set_revocation_reason(&mut self, reason: RevocationReason) -> &mut Self {
        self.revocation_reason = Some(reason);
        self
    }

    /// Select the digest for signature protection and POP.
    pub fn set_digest(&mut self, digest: DigestAlgorithm) -> &mut Self {
        self.digest = digest;
        self
    }

    /// Configure PBM parameters; the iteration count is bounds-checked.
    pub fn set_pbm_options(&mut self, pbm: PbmOptions) -> Result<&mut Self> {
        if pbm.iteration_count < PBM_ITERATION_MIN || pbm.iteration_count > PBM_ITERATION_MAX {
            return Err(CmpError::InvalidParameter(format!(
                "PBM iteration count {} outside [{PBM_ITERATION_MIN}, {PBM_ITERATION_MAX}]",
                pbm.iteration_count
            )));
        }
        self.pbm = pbm;
        Ok(self)
    }

    /// Add a generalInfo ITAV copied into every request header.
    pub fn add_general_info(&mut self, itav: InfoTypeAndValue) -> &mut Self {
        self.general_info.push(itav);
        self
    }

    /// Add an ITAV for the next GENM body.
    pub fn add_genm_itav(&mut self, itav: InfoTypeAndValue) -> &mut Self {
        self.genm_itavs.push(itav);
        self
    }

    /// Add a certificate appended to outgoing extraCerts.
    pub fn add_extra_cert_out(&mut self, cert: CmpCertificate) -> &mut Self {
        self.extra_certs_out.push(cert);
        self
    }

    // ---- flags -----------------------------------------------------------

    /// Request implicit confirmation (RFC 4210 §5.1.1.1).
    pub fn set_implicit_confirm(&mut self, on: bool) -> &mut Self {
        self.implicit_confirm = on;
        self
    }

    /// Never send certConf, even when the server did not grant
    /// implicitConfirm.
    pub fn set_disable_confirm(&mut self, on: bool) -> &mut Self {
        self.disable_confirm = on;
        self
    }

    /// Send requests without protection.
    pub fn set_unprotected_send(&mut self, on: bool) -> &mut Self {
        self.unprotected_send = on;
        self
    }

    /// Tolerate unprotected negative responses (§4.3.4 whitelist).
    pub fn set_unprotected_errors(&mut self, on: bool) -> &mut Self {
        self.unprotected_errors = on;
        self
    }

    /// Skip the keyUsage digitalSignature check on the sender certificate.
    pub fn set_ignore_key_usage(&mut self, on: bool) -> &mut Self {
        self.ignore_key_usage = on;
        self
    }

    /// Allow the 3GPP TS 33.310 trust-anchor-in-extraCerts rule for IR.
    pub fn set_permit_ta_in_extracerts_for_ir(&mut self, on: bool) -> &mut Self {
        self.permit_ta_in_extracerts_for_ir = on;
        self
    }

    /// Suppress copying SANs from the reference certificate.
    pub fn set_san_nodefault(&mut self, on: bool) -> &mut Self {
        self.san_nodefault = on;
        self
    }

    /// Mark the SubjectAltName extension critical.
    pub fn set_san_critical(&mut self, on: bool) -> &mut Self {
        self.san_critical = on;
        self
    }

    /// Mark the certificatePolicies extension critical.
    pub fn set_policies_critical(&mut self, on: bool) -> &mut Self {
        self.policies_critical = on;
        self
    }

    // ---- transport -------------------------------------------------------

    /// Set the CMP server endpoint.
    pub fn set_server(
        &mut self,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        tls: bool,
    ) -> &mut Self {
        self.server_host = host.into();
        self.server_port = port;
        self.server_path = path.into();
        self.server_tls = tls;
        self
    }

    /// Route through an HTTP proxy.
    pub fn set_proxy(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.proxy = Some((host.into(), port));
        self
    }

    /// Per-message timeout; zero disables the per-message limit.
    pub fn set_msg_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.msg_timeout = timeout;
        self
    }

    /// Whole-transaction timeout; zero means unbounded.
    pub fn set_total_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.total_timeout = timeout;
        self
    }

    /// Install a custom transfer function (tests, alternative transports).
    pub fn set_transfer(&mut self, transfer: Arc<dyn MessageTransfer>) -> &mut Self {
        self.transfer = Some(transfer);
        self
    }

    /// Install the TLS wrap used by the default HTTP transfer.
    pub fn set_tls_wrap(&mut self, wrap: Arc<dyn TlsWrap>) -> &mut Self {
        self.tls_wrap = Some(wrap);
        self
    }

    /// Install the certificate-confirmation callback.
    pub fn set_confirmation_callback(&mut self, cb: Arc<dyn ConfirmationCallback>) -> &mut Self {
        self.confirm_cb = Some(cb);
        self
    }

    // ---- getters ---------------------------------------------------------

    /// Last PKIStatus seen in this transaction, −1 before any response.
    pub fn last_pki_status(&self) -> i32 {
        self.last_pki_status
    }

    /// Failure-info bits of the last PKIStatusInfo.
    pub fn fail_info_code(&self) -> u32 {
        self.fail_info_code
    }

    /// statusString entries of the last PKIStatusInfo.
    pub fn status_strings(&self) -> &[String] {
        &self.status_strings
    }

    /// extraCerts accumulated from responses in this transaction.
    pub fn extra_certs_in(&self) -> &[CmpCertificate] {
        &self.extra_certs_in
    }

    /// caPubs surfaced by responses in this transaction.
    pub fn ca_pubs(&self) -> &[CmpCertificate] {
        &self.ca_pubs
    }

    /// The newly enrolled certificate, once a transaction succeeded.
    pub fn new_cert(&self) -> Option<&CmpCertificate> {
        self.new_cert.as_ref()
    }

    /// The server certificate validated during this transaction.
    pub fn validated_srv_cert(&self) -> Option<&CmpCertificate> {
        self.validated_srv_cert.as_ref()
    }

    /// Bounded list of accumulated error details, oldest first.
    pub fn error_details(&self) -> impl Iterator<Item = &str> {
        self.error_details.iter().map(String::as_str)
    }

    /// Pretty-printed snapshot of the last PKIStatusInfo, empty before
    /// any response.
    pub fn status_snapshot(&self) -> String {
        self.last_status
            .as_ref()
            .map(PkiStatusInfo::pretty)
            .unwrap_or_default()
    }

    // ---- internals -------------------------------------------------------

    /// Record a PKIStatusInfo from a response.
    pub(crate) fn record_status(&mut self, status: &PkiStatusInfo) {
        self.last_pki_status = status.status as i32;
        self.fail_info_code = status.fail_info_mask();
        self.status_strings = status.status_string.clone().unwrap_or_default();
        self.last_status = Some(status.clone());
    }

    /// Append to the bounded error list, evicting the oldest entries.
    pub(crate) fn push_error_detail(&mut self, detail: String) {
        if self.error_details.len() == MAX_ERROR_DETAILS {
            self.error_details.pop_front();
        }
        self.error_details.push_back(detail);
    }

    /// Reset transaction-scoped state at an entry point.
    pub(crate) fn start_transaction(&mut self) {
        self.transaction_id = None;
        self.last_sender_nonce = None;
        self.recip_nonce_to_echo = None;
        self.extra_certs_in.clear();
        self.ca_pubs.clear();
        self.last_status = None;
        self.last_pki_status = -1;
        self.fail_info_code = 0;
        self.status_strings.clear();
        self.new_cert = None;
        self.validated_srv_cert = None;
        self.error_details.clear();
        self.end_time = if self.total_timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + self.total_timeout)
        };
    }

    /// Time left before the transaction deadline; `None` is unbounded.
    pub(crate) fn remaining_total(&self) -> Result<Option<Duration>> {
        match self.end_time {
            None => Ok(None),
            Some(end) => {
                let now = Instant::now();
                if now >= end {
                    Err(CmpError::TotalTimeout)
                } else {
                    Ok(Some(end - now))
                }
            }
        }
    }

    /// Deadline for the next exchange: min(msgtimeout, end_time − now).
    pub(crate) fn per_request_deadline(&self) -> Result<Option<Duration>> {
        let total = self.remaining_total()?;
        let msg = (!self.msg_timeout.is_zero()).then_some(self.msg_timeout);
        Ok(match (msg, total) {
            (Some(m), Some(t)) => Some(m.min(t)),
            (Some(m), None) => Some(m),
            (None, Some(t)) => Some(t),
            (None, None) => None,
        })
    }

    /// The key whose public half goes into the template: newPkey ?: pkey.
    pub(crate) fn enrollment_key(&self) -> Option<&PrivateKey> {
        self.new_key.as_ref().or(self.private_key.as_ref())
    }

    /// The reference certificate for template population: oldClCert ?: clCert.
    pub(crate) fn reference_cert(&self) -> Option<&CmpCertificate> {
        self.old_cert.as_ref().or(self.client_cert.as_ref())
    }
}

/// Parse a textual distinguished name such as `CN=test,O=Example` into a
/// [`Name`].
pub fn parse_name(text: &str) -> Result<Name> {
    let der_bytes = RdnSequence::encode_from_string(text).map_err(CmpError::Asn1)?;
    Name::from_der(&der_bytes).map_err(CmpError::Asn1)
}
