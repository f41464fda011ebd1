//! # CMP Client - Certificate Management Protocol (RFC 4210)
//!
//! Client-side CMP with CRMF (RFC 4211) request construction. A relying
//! party configures a [`Context`], then drives protected request/response
//! exchanges against a CA or RA over HTTP(S): enrollment (ir/cr/kur/
//! p10cr), revocation (rr), and general queries (genm).
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//! - `asn1`: DER records for every CMP/CRMF wire structure
//! - `crypto`: facade over digests, MACs, signatures, and ciphers
//! - `protection`: PBM and signature protection, sender-cert discovery
//! - `header`: PKIHeader construction and inbound correlation checks
//! - `crmf`: CertTemplate/POPO request builder
//! - `factory`: typed PKIMessage assembly and outgoing protection
//! - `response`: response classification and certificate extraction
//! - `transport`: HTTP framing, proxy tunneling, timeouts
//! - `transaction`: the per-exchange state machine and polling loop
//! - `context`: caller-owned configuration and working memory
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmp_client::{Context, PopoMethod};
//!
//! # async fn run() -> cmp_client::Result<()> {
//! let mut ctx = Context::new();
//! ctx.set_server("ca.example.org", 8080, "/pkix/", false)
//!     .set_secret_value(b"shared-secret".to_vec())
//!     .set_reference_value(b"keyid-1".to_vec())
//!     .set_subject_name(cmp_client::parse_name("CN=device-42")?)
//!     .set_popo_method(PopoMethod::RaVerified);
//! let cert = ctx.execute_ir().await?;
//! # let _ = cert;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod asn1;
pub mod config;
pub mod context;
pub mod crmf;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod header;
pub mod material;
pub mod protection;
pub mod response;
pub mod transaction;
pub mod transport;
pub mod truststore;
pub mod types;

// Re-export commonly used types
pub use context::{parse_name, CertConfirmOutcome, ConfirmationCallback, Context, PbmOptions};
pub use crypto::{DigestAlgorithm, MacAlgorithm, PrivateKey};
pub use error::{CmpError, Result};
pub use types::{PopoMethod, RevocationReason};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::asn1::{CmpCertificate, InfoTypeAndValue, PkiMessage, PkiStatusInfo};
    pub use crate::config::Config;
    pub use crate::context::{
        parse_name, CertConfirmOutcome, ConfirmationCallback, Context, PbmOptions,
    };
    pub use crate::crypto::{DigestAlgorithm, MacAlgorithm, PrivateKey};
    pub use crate::error::{CmpError, Result};
    pub use crate::transport::{MessageTransfer, TlsWrap};
    pub use crate::types::{PopoMethod, RevocationReason};
}
