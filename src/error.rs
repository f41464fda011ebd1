//! Error types for CMP transactions

use thiserror::Error;

/// Result type alias for CMP operations
pub type Result<T> = std::result::Result<T, CmpError>;

/// Main error type for CMP client operations
#[derive(Error, Debug)]
pub enum CmpError {
    /// Missing or inconsistent caller configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid caller-supplied parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Algorithm not supported by the crypto facade
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material does not match the requested operation
    #[error("Bad key: {0}")]
    BadKey(String),

    /// DER encode/decode errors
    #[error("ASN.1 error: {0}")]
    Asn1(#[from] der::Error),

    /// RSA errors
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    /// ECDSA errors
    #[error("ECDSA error: {0}")]
    Ecdsa(String),

    /// Random number generation failed
    #[error("RNG failure: {0}")]
    RngFailure(String),

    /// Inbound transactionID does not match the cached one
    #[error("Transaction ID unmatched")]
    TransactionIdUnmatched,

    /// Inbound recipNonce does not match the last sent senderNonce
    #[error("Recipient nonce unmatched")]
    RecipNonceUnmatched,

    /// Inbound pvno differs from 2
    #[error("Unexpected pvno: {0}")]
    UnexpectedPvno(u8),

    /// Received a body type other than the expected one
    #[error("Unexpected body type: expected {expected}, got {got}")]
    UnexpectedBodyType {
        /// Name of the expected body type(s)
        expected: &'static str,
        /// Name of the received body type
        got: &'static str,
    },

    /// Received a PKIStatus the current flow cannot accept
    #[error("Unexpected PKIStatus: {0}")]
    UnexpectedStatus(String),

    /// A waiting status arrived where polling is not allowed
    #[error("Waiting status not allowed here")]
    WaitingNotAllowed,

    /// More than one CertResponse or PollRep in a single message
    #[error("Multiple responses not supported")]
    MultipleResponsesNotSupported,

    /// RP carried a CertId that does not match the revoked certificate
    #[error("Wrong CertID in revocation response")]
    WrongCertId,

    /// protectionAlg carries an OID the engine does not recognize
    #[error("Wrong algorithm OID: {0}")]
    WrongAlgorithmOid(String),

    /// Signature or MAC over the protected part did not verify
    #[error("Error validating protection: {0}")]
    ErrorValidatingProtection(String),

    /// A received message that must be protected is not
    #[error("Missing protection")]
    MissingProtection,

    /// Sender certificate lacks the digitalSignature keyUsage bit
    #[error("Sender certificate lacks digitalSignature key usage")]
    MissingKeyUsageDigitalSignature,

    /// No acceptable sender certificate could be validated
    #[error("No trusted server certificate found: {0}")]
    UntrustedServerCert(String),

    /// Enrolled certificate's public key does not match the request key
    #[error("Certificate does not match the enrollment key")]
    CertificateKeyMismatch,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sending the request failed
    #[error("Failed to send request: {0}")]
    FailedToSendRequest(String),

    /// Receiving the reply failed
    #[error("Failed to receive PKIMessage: {0}")]
    FailedToReceivePkiMessage(String),

    /// The reply did not decode as a PKIMessage
    #[error("Error decoding message: {0}")]
    ErrorDecodingMessage(String),

    /// The per-message deadline expired while reading
    #[error("Read timed out")]
    ReadTimeout,

    /// Connecting to the server (or proxy) failed
    #[error("Error connecting: {0}")]
    ErrorConnecting(String),

    /// The per-message deadline expired while connecting
    #[error("Connect timed out")]
    ConnectTimeout,

    /// The whole-transaction deadline expired
    #[error("Total transaction time exceeded")]
    TotalTimeout,

    /// TLS layer errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// The CA rejected the request
    #[error("Request rejected by CA: {0}")]
    Rejected(String),

    /// The enrolled certificate was not accepted (failInfo set)
    #[error("Certificate not accepted: {0}")]
    CertificateNotAccepted(String),

    /// Revocation was refused by the CA
    #[error("Revocation rejected: {0}")]
    RevocationRejected(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

impl CmpError {
    /// Attach a pretty-printed status snapshot to an application failure.
    pub(crate) fn with_status(self, snapshot: &str) -> Self {
        if snapshot.is_empty() {
            return self;
        }
        match self {
            CmpError::Rejected(d) => CmpError::Rejected(format!("{d}; {snapshot}")),
            CmpError::CertificateNotAccepted(d) => {
                CmpError::CertificateNotAccepted(format!("{d}; {snapshot}"))
            }
            CmpError::RevocationRejected(d) => {
                CmpError::RevocationRejected(format!("{d}; {snapshot}"))
            }
            other => other,
        }
    }
}
