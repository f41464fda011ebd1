//! Transaction driver: sequence one enrollment, revocation, or query
//! (RFC 4210 §5.3, transaction behavior per appendix D/E profiles)

use std::sync::Arc;
use std::time::{Duration, Instant};

use der::{Decode, Encode};
use tracing::{debug, info};

use crate::asn1::{CmpCertificate, InfoTypeAndValue, PkiBody, PkiMessage};
use crate::context::Context;
use crate::crmf::EnrollmentKind;
use crate::error::{CmpError, Result};
use crate::factory;
use crate::header::check_received;
use crate::response::{classify_cert_response, classify_rev_response, ClassifyOutcome};
use crate::transport::{HttpEndpoint, HttpTransfer, MessageTransfer};

/// Margin kept between the last permissible poll and the transaction
/// deadline.
const POLL_DEADLINE_MARGIN: Duration = Duration::from_secs(5);

/// Which reply bodies a send/receive round accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Any of ip/cp/kup; peers are loose about which of the three they
    /// answer with, so all certificate responses are taken
    CertResponse,
    /// ip/cp/kup or pollRep, while polling
    CertResponseOrPollRep,
    /// rp
    RevResponse,
    /// genp
    GenResponse,
    /// pkiconf
    PkiConf,
}

impl Expect {
    fn matches(self, body: &PkiBody) -> bool {
        let is_cert_response =
            matches!(body, PkiBody::Ip(_) | PkiBody::Cp(_) | PkiBody::Kup(_));
        match self {
            Expect::CertResponse => is_cert_response,
            Expect::CertResponseOrPollRep => {
                is_cert_response || matches!(body, PkiBody::Pollrep(_))
            }
            Expect::RevResponse => matches!(body, PkiBody::Rp(_)),
            Expect::GenResponse => matches!(body, PkiBody::Genp(_)),
            Expect::PkiConf => matches!(body, PkiBody::Pkiconf(_)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Expect::CertResponse => "ip/cp/kup",
            Expect::CertResponseOrPollRep => "ip/cp/kup or pollRep",
            Expect::RevResponse => "rp",
            Expect::GenResponse => "genp",
            Expect::PkiConf => "pkiconf",
        }
    }
}

impl Context {
    /// Run an initialization request (ir/ip), returning the new
    /// certificate.
    pub async fn execute_ir(&mut self) -> Result<CmpCertificate> {
        self.execute_enrollment(EnrollmentKind::Ir, false).await
    }

    /// Run a certification request (cr/cp).
    pub async fn execute_cr(&mut self) -> Result<CmpCertificate> {
        self.execute_enrollment(EnrollmentKind::Cr, false).await
    }

    /// Run a key update (kur/kup).
    pub async fn execute_kur(&mut self) -> Result<CmpCertificate> {
        self.execute_enrollment(EnrollmentKind::Kur, false).await
    }

    /// Run a PKCS#10 certification request (p10cr/cp).
    pub async fn execute_p10cr(&mut self) -> Result<CmpCertificate> {
        self.execute_enrollment(EnrollmentKind::Cr, true).await
    }

    /// Run a revocation request (rr/rp), returning the revoked
    /// certificate.
    pub async fn execute_rr(&mut self) -> Result<CmpCertificate> {
        self.start_transaction();
        let request = factory::build_rr_request(self)?;
        let reply = self.send_receive(request, Expect::RevResponse).await?;
        let revoked = classify_rev_response(self, &reply)?;
        info!("revocation accepted by the CA");
        Ok(revoked)
    }

    /// Run a general message (genm/genp), returning the reply ITAVs.
    pub async fn execute_genm(&mut self) -> Result<Vec<InfoTypeAndValue>> {
        self.start_transaction();
        let request = factory::build_genm(self)?;
        let reply = self.send_receive(request, Expect::GenResponse).await?;
        match reply.body {
            PkiBody::Genp(itavs) => Ok(itavs),
            other => Err(CmpError::UnexpectedBodyType {
                expected: "genp",
                got: other.type_name(),
            }),
        }
    }

    async fn execute_enrollment(
        &mut self,
        kind: EnrollmentKind,
        p10cr: bool,
    ) -> Result<CmpCertificate> {
        self.start_transaction();

        let request = if p10cr {
            factory::build_p10cr_request(self)?
        } else {
            factory::build_enrollment_request(self, kind)?
        };
        let mut cert_req_id: i32 = if p10cr { -1 } else { 0 };

        let mut reply = self.send_receive(request, Expect::CertResponse).await?;

        let enrolled = loop {
            match classify_cert_response(self, &reply, &mut cert_req_id, kind == EnrollmentKind::Kur)?
            {
                ClassifyOutcome::Enrolled(enrolled) => break enrolled,
                ClassifyOutcome::Waiting { cert_req_id: rid } => {
                    reply = self.poll_until_response(rid).await?;
                }
            }
        };

        if enrolled.needs_confirm {
            let conf =
                factory::build_cert_conf(self, &enrolled.cert, enrolled.fail_info, enrolled.reason)?;
            self.send_receive(conf, Expect::PkiConf).await?;
            debug!("certConf acknowledged with pkiconf");
        }

        if enrolled.fail_info != 0 {
            return Err(
                CmpError::CertificateNotAccepted(crate::types::fail_info_names(
                    enrolled.fail_info,
                ))
                .with_status(&self.status_snapshot()),
            );
        }

        info!("enrollment completed");
        Ok(enrolled.cert)
    }

    /// The polling subroutine: issue pollReq until a terminal ip/cp/kup
    /// arrives, honoring checkAfter and the transaction deadline.
    async fn poll_until_response(&mut self, cert_req_id: i32) -> Result<PkiMessage> {
        loop {
            let poll_req = factory::build_poll_req(self, cert_req_id)?;
            let reply = self
                .send_receive(poll_req, Expect::CertResponseOrPollRep)
                .await?;

            let PkiBody::Pollrep(content) = &reply.body else {
                return Ok(reply);
            };
            if content.len() > 1 {
                return Err(CmpError::MultipleResponsesNotSupported);
            }
            let poll_rep = content
                .first()
                .ok_or_else(|| CmpError::ErrorDecodingMessage("empty pollRep".into()))?;
            if poll_rep.check_after < 0 {
                return Err(CmpError::InvalidParameter(format!(
                    "negative checkAfter: {}",
                    poll_rep.check_after
                )));
            }
            if let Some(reason) = &poll_rep.reason {
                debug!(reason = ?reason, "server reports the request still pending");
            }

            let mut wait = Duration::from_secs(poll_rep.check_after as u64);
            if let Some(end) = self.end_time {
                let now = Instant::now();
                let latest = end
                    .checked_sub(POLL_DEADLINE_MARGIN)
                    .unwrap_or(end);
                if now >= latest {
                    return Err(CmpError::TotalTimeout);
                }
                wait = wait.min(latest - now);
            }
            debug!(seconds = wait.as_secs(), "sleeping before the next pollReq");
            tokio::time::sleep(wait).await;
        }
    }

    /// One protected exchange: serialize, transfer, decode, check, and
    /// match the reply body against `expect`.
    async fn send_receive(&mut self, request: PkiMessage, expect: Expect) -> Result<PkiMessage> {
        let deadline = self.per_request_deadline()?;
        let encoded = request.to_der().map_err(CmpError::Asn1)?;
        debug!(
            body = request.body.type_name(),
            len = encoded.len(),
            "sending CMP request"
        );

        let transfer = self.transfer_impl();
        let reply_bytes = match transfer.transfer(&encoded, deadline).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.push_error_detail(format!("transfer failed: {err}"));
                return Err(err);
            }
        };

        let reply = PkiMessage::from_der(&reply_bytes)
            .map_err(|e| CmpError::ErrorDecodingMessage(e.to_string()))?;
        debug!(body = reply.body.type_name(), "received CMP reply");

        check_received(self, &reply)?;

        if expect.matches(&reply.body) {
            return Ok(reply);
        }

        // An unexpected error body surfaces with its status detail.
        if let PkiBody::Error(err_content) = &reply.body {
            self.record_status(&err_content.pki_status_info);
            let mut detail = self.status_snapshot();
            if let Some(texts) = &err_content.error_details {
                for text in texts {
                    detail.push_str(&format!(" \"{text}\""));
                }
            }
            if let Some(code) = err_content.error_code {
                detail.push_str(&format!(" (errorCode {code})"));
            }
            self.push_error_detail(detail.clone());
            return Err(CmpError::Rejected(detail));
        }

        Err(CmpError::UnexpectedBodyType {
            expected: expect.name(),
            got: reply.body.type_name(),
        })
    }

    /// The configured transfer, or the default HTTP transfer built from
    /// the endpoint settings.
    fn transfer_impl(&self) -> Arc<dyn MessageTransfer> {
        if let Some(transfer) = &self.transfer {
            return transfer.clone();
        }
        Arc::new(HttpTransfer::new(
            HttpEndpoint {
                host: self.server_host.clone(),
                port: self.server_port,
                path: self.server_path.clone(),
                tls: self.server_tls,
                proxy: self.proxy.clone(),
            },
            self.tls_wrap.clone(),
        ))
    }
}
