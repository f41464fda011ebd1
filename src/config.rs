//! Configuration Module
//!
//! TOML configuration that maps onto the Context setters, so the CLI (and
//! embedding applications) can describe a whole transaction declaratively.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{parse_name, Context, PbmOptions};
use crate::crypto::{DigestAlgorithm, MacAlgorithm};
use crate::error::{CmpError, Result};
use crate::material;
use crate::transport::RustlsWrap;
use crate::types::{PopoMethod, RevocationReason};

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server endpoint and timeouts
    pub server: ServerConfig,
    /// Client credentials
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Peer trust settings
    #[serde(default)]
    pub peer: PeerConfig,
    /// Certificate template knobs
    #[serde(default)]
    pub template: TemplateConfig,
    /// Password-based MAC parameters
    #[serde(default)]
    pub pbm: PbmConfig,
    /// Protocol behavior flags
    #[serde(default)]
    pub options: OptionsConfig,
}

/// CMP server endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request path
    #[serde(default = "default_path")]
    pub path: String,
    /// Connect with TLS
    #[serde(default)]
    pub tls: bool,
    /// PEM bundle of TLS roots (required when `tls` is set)
    pub tls_roots: Option<PathBuf>,
    /// HTTP proxy host
    pub proxy_host: Option<String>,
    /// HTTP proxy port
    pub proxy_port: Option<u16>,
    /// Per-message timeout in seconds (0 disables)
    #[serde(default = "default_msg_timeout")]
    pub msg_timeout_secs: u64,
    /// Whole-transaction timeout in seconds (0 means unbounded)
    #[serde(default)]
    pub total_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 80,
            path: default_path(),
            tls: false,
            tls_roots: None,
            proxy_host: None,
            proxy_port: None,
            msg_timeout_secs: default_msg_timeout(),
            total_timeout_secs: 0,
        }
    }
}

fn default_path() -> String {
    "/".into()
}

fn default_msg_timeout() -> u64 {
    120
}

/// Client credential configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Client certificate (PEM/DER)
    pub cert: Option<PathBuf>,
    /// Matching PKCS#8 private key
    pub key: Option<PathBuf>,
    /// Key the new certificate shall certify
    pub new_key: Option<PathBuf>,
    /// Reference certificate for kur/rr
    pub old_cert: Option<PathBuf>,
    /// PKCS#10 CSR for p10cr
    pub csr: Option<PathBuf>,
    /// PBM shared secret
    pub secret: Option<String>,
    /// PBM reference value (sent as senderKID)
    pub reference: Option<String>,
}

/// Peer trust configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Pinned server certificate
    pub server_cert: Option<PathBuf>,
    /// Trust anchor bundle
    pub trusted: Option<PathBuf>,
    /// Untrusted intermediate bundle
    pub untrusted: Option<PathBuf>,
    /// Required response sender DN, e.g. `CN=CMP Server`
    pub expected_sender: Option<String>,
}

/// Certificate template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Requested subject DN
    pub subject: Option<String>,
    /// Requested issuer DN
    pub issuer: Option<String>,
    /// Recipient DN for request headers
    pub recipient: Option<String>,
    /// Requested validity in days (0 omits)
    #[serde(default)]
    pub validity_days: u32,
    /// DNS subject alternative names
    #[serde(default)]
    pub san_dns: Vec<String>,
    /// Mark the SAN extension critical
    #[serde(default)]
    pub san_critical: bool,
    /// Do not default SANs from the reference certificate
    #[serde(default)]
    pub san_nodefault: bool,
    /// Certificate policy OIDs
    #[serde(default)]
    pub policies: Vec<String>,
    /// Mark certificatePolicies critical
    #[serde(default)]
    pub policies_critical: bool,
    /// Proof-of-possession method
    #[serde(default)]
    pub popo: PopoMethod,
    /// Revocation reason for rr
    pub revocation_reason: Option<RevocationReason>,
    /// Digest for signature protection and POP ("sha256", "sha384", ...)
    pub digest: Option<String>,
}

/// PBM parameter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbmConfig {
    /// Salt length in octets
    pub salt_len: usize,
    /// One-way function name
    pub owf: String,
    /// Iteration count
    pub iteration_count: u32,
    /// MAC algorithm name ("hmac-sha1", "hmac-sha256", ...)
    pub mac: String,
}

impl Default for PbmConfig {
    fn default() -> Self {
        Self {
            salt_len: 16,
            owf: "sha256".into(),
            iteration_count: 500,
            mac: "hmac-sha256".into(),
        }
    }
}

/// Protocol behavior flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Request implicit confirmation
    #[serde(default)]
    pub implicit_confirm: bool,
    /// Never send certConf
    #[serde(default)]
    pub disable_confirm: bool,
    /// Send requests unprotected
    #[serde(default)]
    pub unprotected_send: bool,
    /// Tolerate unprotected negative responses
    #[serde(default)]
    pub unprotected_errors: bool,
    /// Skip the keyUsage digitalSignature check
    #[serde(default)]
    pub ignore_keyusage: bool,
    /// Allow the 3GPP trust-anchor-in-extraCerts rule for ir
    #[serde(default)]
    pub permit_ta_in_extracerts_for_ir: bool,
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text)
            .map_err(|e| CmpError::Configuration(format!("config parse: {e}")))
    }

    /// Build a ready-to-run [`Context`] from this configuration.
    pub fn build_context(&self) -> Result<Context> {
        let mut ctx = Context::new();

        ctx.set_server(
            self.server.host.clone(),
            self.server.port,
            self.server.path.clone(),
            self.server.tls,
        );
        if let (Some(host), Some(port)) = (&self.server.proxy_host, self.server.proxy_port) {
            ctx.set_proxy(host.clone(), port);
        }
        ctx.set_msg_timeout(Duration::from_secs(self.server.msg_timeout_secs));
        ctx.set_total_timeout(Duration::from_secs(self.server.total_timeout_secs));
        if self.server.tls {
            let roots = self.server.tls_roots.as_ref().ok_or_else(|| {
                CmpError::Configuration("server.tls_roots required with tls = true".into())
            })?;
            let pem_bytes = std::fs::read(roots)?;
            ctx.set_tls_wrap(std::sync::Arc::new(RustlsWrap::from_root_pem(&pem_bytes)?));
        }

        if let Some(path) = &self.identity.cert {
            ctx.set_client_cert(material::load_certificate(path)?);
        }
        if let Some(path) = &self.identity.key {
            ctx.set_private_key(material::load_private_key(path)?);
        }
        if let Some(path) = &self.identity.new_key {
            ctx.set_new_key(material::load_private_key(path)?);
        }
        if let Some(path) = &self.identity.old_cert {
            ctx.set_old_cert(material::load_certificate(path)?);
        }
        if let Some(path) = &self.identity.csr {
            ctx.set_csr(material::load_csr(path)?);
        }
        if let Some(secret) = &self.identity.secret {
            ctx.set_secret_value(secret.as_bytes().to_vec());
        }
        if let Some(reference) = &self.identity.reference {
            ctx.set_reference_value(reference.as_bytes().to_vec());
        }

        if let Some(path) = &self.peer.server_cert {
            ctx.pin_server_cert(material::load_certificate(path)?);
        }
        if let Some(path) = &self.peer.trusted {
            for cert in material::load_certificates(path)? {
                ctx.add_trust_anchor(cert);
            }
        }
        if let Some(path) = &self.peer.untrusted {
            for cert in material::load_certificates(path)? {
                ctx.add_untrusted_cert(cert);
            }
        }
        if let Some(sender) = &self.peer.expected_sender {
            ctx.set_expected_sender(parse_name(sender)?);
        }

        if let Some(subject) = &self.template.subject {
            ctx.set_subject_name(parse_name(subject)?);
        }
        if let Some(issuer) = &self.template.issuer {
            ctx.set_issuer(parse_name(issuer)?);
        }
        if let Some(recipient) = &self.template.recipient {
            ctx.set_recipient(parse_name(recipient)?);
        }
        ctx.set_validity_days(self.template.validity_days);
        for dns in &self.template.san_dns {
            let name = der::asn1::Ia5String::new(dns).map_err(CmpError::Asn1)?;
            ctx.add_subject_alt_name(x509_cert::ext::pkix::name::GeneralName::DnsName(name));
        }
        ctx.set_san_critical(self.template.san_critical);
        ctx.set_san_nodefault(self.template.san_nodefault);
        for policy in &self.template.policies {
            let oid = policy
                .parse()
                .map_err(|e| CmpError::Configuration(format!("policy OID {policy}: {e:?}")))?;
            ctx.add_policy(oid);
        }
        ctx.set_policies_critical(self.template.policies_critical);
        ctx.set_popo_method(self.template.popo);
        if let Some(reason) = self.template.revocation_reason {
            ctx.set_revocation_reason(reason);
        }
        if let Some(digest) = &self.template.digest {
            ctx.set_digest(parse_digest(digest)?);
        }

        ctx.set_pbm_options(PbmOptions {
            salt_len: self.pbm.salt_len,
            owf: parse_digest(&self.pbm.owf)?,
            iteration_count: self.pbm.iteration_count,
            mac: parse_mac(&self.pbm.mac)?,
        })?;

        ctx.set_implicit_confirm(self.options.implicit_confirm);
        ctx.set_disable_confirm(self.options.disable_confirm);
        ctx.set_unprotected_send(self.options.unprotected_send);
        ctx.set_unprotected_errors(self.options.unprotected_errors);
        ctx.set_ignore_key_usage(self.options.ignore_keyusage);
        ctx.set_permit_ta_in_extracerts_for_ir(self.options.permit_ta_in_extracerts_for_ir);

        Ok(ctx)
    }
}

fn parse_digest(name: &str) -> Result<DigestAlgorithm> {
    match name.to_ascii_lowercase().as_str() {
        "sha1" => Ok(DigestAlgorithm::Sha1),
        "sha256" => Ok(DigestAlgorithm::Sha256),
        "sha384" => Ok(DigestAlgorithm::Sha384),
        "sha512" => Ok(DigestAlgorithm::Sha512),
        other => Err(CmpError::UnsupportedAlgorithm(format!("digest {other}"))),
    }
}

fn parse_mac(name: &str) -> Result<MacAlgorithm> {
    match name.to_ascii_lowercase().as_str() {
        "hmac-sha1" => Ok(MacAlgorithm::HmacSha1),
        "hmac-sha256" => Ok(MacAlgorithm::HmacSha256),
        "hmac-sha384" => Ok(MacAlgorithm::HmacSha384),
        "hmac-sha512" => Ok(MacAlgorithm::HmacSha512),
        other => Err(CmpError::UnsupportedAlgorithm(format!("mac {other}"))),
    }
}
