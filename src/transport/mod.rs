//! HTTP transport adaptor (RFC 4210 over HTTP, RFC 6712)
//!
//! Frames a DER-encoded PKIMessage as an HTTP POST with
//! `Content-Type: application/pkixcmp`, optionally tunneling through an
//! HTTP proxy (`CONNECT` for TLS, absolute-form for plaintext), under a
//! per-exchange deadline supplied by the transaction driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{CmpError, Result};

/// Byte stream the HTTP framing runs over, plain or TLS-wrapped
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Pluggable transfer function: ship request bytes, return reply bytes.
///
/// The default implementation is [`HttpTransfer`]; tests substitute a
/// scripted in-memory transfer.
#[async_trait]
pub trait MessageTransfer: Send + Sync {
    /// Perform one request/reply exchange within `deadline` (None means
    /// unbounded).
    async fn transfer(&self, request: &[u8], deadline: Option<Duration>) -> Result<Vec<u8>>;
}

/// Pluggable TLS wrap applied to an established TCP (or tunneled) stream.
#[async_trait]
pub trait TlsWrap: Send + Sync {
    /// Upgrade `stream` to TLS against `host`.
    async fn wrap(&self, stream: TcpStream, host: &str) -> Result<Box<dyn IoStream>>;
}

/// Default TLS wrap backed by rustls
pub struct RustlsWrap {
    config: Arc<rustls::ClientConfig>,
}

impl RustlsWrap {
    /// Wrap with an explicit client configuration.
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self { config }
    }

    /// Client configuration trusting the given PEM-encoded roots.
    pub fn from_root_pem(pem_bytes: &[u8]) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        let mut reader = std::io::BufReader::new(pem_bytes);
        for item in rustls_pemfile::certs(&mut reader) {
            let der_cert = item.map_err(|e| CmpError::Tls(format!("root PEM: {e}")))?;
            roots
                .add(der_cert)
                .map_err(|e| CmpError::Tls(format!("root store: {e}")))?;
        }
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config)))
    }
}

#[async_trait]
impl TlsWrap for RustlsWrap {
    async fn wrap(&self, stream: TcpStream, host: &str) -> Result<Box<dyn IoStream>> {
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| CmpError::Tls(format!("server name: {e}")))?;
        let connector = tokio_rustls::TlsConnector::from(self.config.clone());
        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| CmpError::Tls(e.to_string()))?;
        Ok(Box::new(tls))
    }
}

/// HTTP endpoint configuration for [`HttpTransfer`]
#[derive(Clone)]
pub struct HttpEndpoint {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Request path; a missing leading `/` is supplied
    pub path: String,
    /// Use TLS towards the server
    pub tls: bool,
    /// Optional HTTP proxy (host, port)
    pub proxy: Option<(String, u16)>,
}

impl HttpEndpoint {
    fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}

/// Default transfer implementation over TCP, optionally proxied and
/// TLS-wrapped
pub struct HttpTransfer {
    endpoint: HttpEndpoint,
    tls_wrap: Option<Arc<dyn TlsWrap>>,
}

impl HttpTransfer {
    /// Build a transfer for `endpoint`; `tls_wrap` is required when the
    /// endpoint requests TLS.
    pub fn new(endpoint: HttpEndpoint, tls_wrap: Option<Arc<dyn TlsWrap>>) -> Self {
        Self { endpoint, tls_wrap }
    }

    async fn connect(&self, deadline: Option<Duration>) -> Result<Box<dyn IoStream>> {
        let (connect_host, connect_port) = match &self.endpoint.proxy {
            Some((host, port)) => (host.clone(), *port),
            None => (self.endpoint.host.clone(), self.endpoint.port),
        };

        let tcp = with_deadline(
            deadline,
            TcpStream::connect((connect_host.as_str(), connect_port)),
            CmpError::ConnectTimeout,
        )
        .await?
        .map_err(|e| CmpError::ErrorConnecting(format!("{connect_host}:{connect_port}: {e}")))?;

        let via_proxy = self.endpoint.proxy.is_some();
        if self.endpoint.tls {
            let wrap = self
                .tls_wrap
                .as_ref()
                .ok_or_else(|| CmpError::Tls("no TLS wrap configured".into()))?;
            let tcp = if via_proxy {
                self.open_tunnel(tcp, deadline).await?
            } else {
                tcp
            };
            wrap.wrap(tcp, &self.endpoint.host).await
        } else {
            Ok(Box::new(tcp))
        }
    }

    /// Issue an HTTP/1.1 CONNECT and drain the proxy's response headers.
    async fn open_tunnel(
        &self,
        mut tcp: TcpStream,
        deadline: Option<Duration>,
    ) -> Result<TcpStream> {
        let authority = format!("{}:{}", self.endpoint.host, self.endpoint.port);
        let connect = format!(
            "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
        );
        with_deadline(
            deadline,
            tcp.write_all(connect.as_bytes()),
            CmpError::ConnectTimeout,
        )
        .await?
        .map_err(|e| CmpError::ErrorConnecting(format!("proxy CONNECT: {e}")))?;

        let mut reader = BufReader::new(tcp);
        let status = with_deadline(
            deadline,
            read_header_line(&mut reader),
            CmpError::ConnectTimeout,
        )
        .await??;
        let code = parse_status_line(&status)?;
        if !(200..300).contains(&code) {
            return Err(CmpError::ErrorConnecting(format!(
                "proxy refused CONNECT: {status}"
            )));
        }
        // Discard the remaining proxy headers.
        loop {
            let line = with_deadline(
                deadline,
                read_header_line(&mut reader),
                CmpError::ConnectTimeout,
            )
            .await??;
            if line.is_empty() {
                break;
            }
        }
        Ok(reader.into_inner())
    }

    fn request_head(&self, body_len: usize) -> String {
        // Plaintext through a proxy uses the absolute-form request target.
        let target = if self.endpoint.proxy.is_some() && !self.endpoint.tls {
            format!(
                "http://{}:{}{}",
                self.endpoint.host,
                self.endpoint.port,
                self.endpoint.normalized_path()
            )
        } else {
            self.endpoint.normalized_path()
        };
        format!(
            "POST {target} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Pragma: no-cache\r\n\
             Content-Type: application/pkixcmp\r\n\
             Content-Length: {body_len}\r\n\
             Connection: close\r\n\r\n",
            self.endpoint.host, self.endpoint.port
        )
    }
}

#[async_trait]
impl MessageTransfer for HttpTransfer {
    async fn transfer(&self, request: &[u8], deadline: Option<Duration>) -> Result<Vec<u8>> {
        let mut stream = self.connect(deadline).await?;

        let head = self.request_head(request.len());
        let mut out = Vec::with_capacity(head.len() + request.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(request);
        with_deadline(deadline, stream.write_all(&out), CmpError::ReadTimeout)
            .await?
            .map_err(|e| CmpError::FailedToSendRequest(e.to_string()))?;
        with_deadline(deadline, stream.flush(), CmpError::ReadTimeout)
            .await?
            .map_err(|e| CmpError::FailedToSendRequest(e.to_string()))?;

        let reply = with_deadline(deadline, read_http_response(stream), CmpError::ReadTimeout)
            .await??;
        debug!(len = reply.len(), "received CMP reply body");
        Ok(reply)
    }
}

/// Read one CRLF-terminated header line (without the terminator).
async fn read_header_line<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = reader.read_u8().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CmpError::FailedToReceivePkiMessage("connection closed in headers".into())
            } else {
                CmpError::FailedToReceivePkiMessage(e.to_string())
            }
        })?;
        if byte == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return String::from_utf8(line)
                .map_err(|_| CmpError::FailedToReceivePkiMessage("non-UTF8 header".into()));
        }
        if line.len() > 8192 {
            return Err(CmpError::FailedToReceivePkiMessage("header too long".into()));
        }
        line.push(byte);
    }
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.split_whitespace();
    let version = parts
        .next()
        .ok_or_else(|| CmpError::FailedToReceivePkiMessage("empty status line".into()))?;
    if !version.starts_with("HTTP/1.") {
        return Err(CmpError::FailedToReceivePkiMessage(format!(
            "unexpected HTTP version: {version}"
        )));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| CmpError::FailedToReceivePkiMessage(format!("bad status line: {line}")))
}

/// Read status line, headers, and a Content-Length-delimited body.
async fn read_http_response<S: AsyncRead + Unpin + Send>(stream: S) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(stream);
    let status_line = read_header_line(&mut reader).await?;
    let code = parse_status_line(&status_line)?;

    let mut content_length: Option<usize> = None;
    loop {
        let line = read_header_line(&mut reader).await?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }

    if !(200..300).contains(&code) {
        return Err(CmpError::FailedToReceivePkiMessage(format!(
            "HTTP status {code}"
        )));
    }
    let len = content_length.ok_or_else(|| {
        CmpError::FailedToReceivePkiMessage("missing Content-Length".into())
    })?;
    if len == 0 {
        return Err(CmpError::ReadTimeout);
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CmpError::ReadTimeout
        } else {
            CmpError::FailedToReceivePkiMessage(e.to_string())
        }
    })?;
    Ok(body)
}

/// Run `fut` under the optional deadline, mapping expiry to `on_timeout`.
async fn with_deadline<F, T>(
    deadline: Option<Duration>,
    fut: F,
    on_timeout: CmpError,
) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    match deadline {
        Some(limit) => timeout(limit, fut).await.map_err(|_| on_timeout),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn endpoint(port: u16, tls: bool, proxy: Option<(String, u16)>) -> HttpEndpoint {
        HttpEndpoint {
            host: "127.0.0.1".into(),
            port,
            path: "pkix/".into(),
            tls,
            proxy,
        }
    }

    #[test]
    fn path_gets_leading_slash() {
        let ep = endpoint(8080, false, None);
        assert_eq!(ep.normalized_path(), "/pkix/");
    }

    #[test]
    fn absolute_form_for_plaintext_proxy() {
        let transfer = HttpTransfer::new(
            endpoint(8080, false, Some(("proxy.example".into(), 3128))),
            None,
        );
        let head = transfer.request_head(10);
        assert!(head.starts_with("POST http://127.0.0.1:8080/pkix/ HTTP/1.1\r\n"));
        assert!(head.contains("Content-Type: application/pkixcmp\r\n"));
        assert!(head.contains("Pragma: no-cache\r\n"));
    }

    #[test]
    fn origin_form_without_proxy() {
        let transfer = HttpTransfer::new(endpoint(8080, false, None), None);
        assert!(transfer.request_head(0).starts_with("POST /pkix/ HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn exchange_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            let reply = b"HTTP/1.1 200 OK\r\nContent-Type: application/pkixcmp\r\nContent-Length: 3\r\n\r\nxyz";
            sock.write_all(reply).await.unwrap();
            req
        });

        let transfer = HttpTransfer::new(endpoint(port, false, None), None);
        let body = transfer
            .transfer(b"req", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(body, b"xyz");

        let seen = server.await.unwrap();
        assert!(seen.starts_with("POST /pkix/ HTTP/1.1\r\n"));
        assert!(seen.contains("Content-Length: 3\r\n"));
        assert!(seen.ends_with("req"));
    }

    #[tokio::test]
    async fn non_2xx_is_receive_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 503 Unavailable\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });
        let transfer = HttpTransfer::new(endpoint(port, false, None), None);
        let err = transfer
            .transfer(b"req", Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, CmpError::FailedToReceivePkiMessage(_)));
    }

    #[tokio::test]
    async fn connect_refused_maps_to_error_connecting() {
        // Port 1 is essentially never listening.
        let transfer = HttpTransfer::new(endpoint(1, false, None), None);
        let err = transfer
            .transfer(b"req", Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, CmpError::ErrorConnecting(_)));
    }

    #[tokio::test]
    async fn stalled_read_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = sock.read(&mut buf).await.unwrap();
            // Never reply; hold the socket open past the client deadline.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let transfer = HttpTransfer::new(endpoint(port, false, None), None);
        let err = transfer
            .transfer(b"req", Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, CmpError::ReadTimeout));
    }
}
