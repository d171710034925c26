//! SBI HTTP/2 Client
//!
//! HTTP/2 client implementation using hyper for SBI communication.
//! Plaintext targets are spoken to with prior knowledge (h2c); `https`
//! targets negotiate h2 over rustls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http2::SendRequest;
use hyper::{Method, Request, Uri};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use crate::error::{SbiError, SbiResult};
use crate::message::{SbiRequest, SbiResponse};
use crate::tls;
use crate::types::UriScheme;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT: u64 = 5;
/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// SBI Client configuration
#[derive(Debug, Clone)]
pub struct SbiClientConfig {
    /// URI scheme (http or https)
    pub scheme: UriScheme,
    /// Target host (FQDN or IP)
    pub host: String,
    /// Target port
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
    /// CA certificate path
    pub ca_cert: Option<String>,
}

impl Default for SbiClientConfig {
    fn default() -> Self {
        Self {
            scheme: UriScheme::Http,
            host: "localhost".to_string(),
            port: 80,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            ca_cert: None,
        }
    }
}

impl SbiClientConfig {
    /// Create a new client configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Build a configuration from a base URI such as `http://127.0.0.10:8000`.
    ///
    /// The port defaults to the scheme's well-known port.
    pub fn from_uri(base_uri: &str) -> SbiResult<Self> {
        let uri: Uri = base_uri
            .parse()
            .map_err(|e| SbiError::InvalidUri(format!("{base_uri}: {e}")))?;

        let scheme = uri
            .scheme_str()
            .and_then(UriScheme::from_str)
            .ok_or_else(|| SbiError::InvalidUri(format!("{base_uri}: missing http(s) scheme")))?;
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SbiError::InvalidUri(format!("{base_uri}: missing host")))?;
        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

        Ok(Self::new(host, port).with_scheme(scheme))
    }

    /// Set the URI scheme
    pub fn with_scheme(mut self, scheme: UriScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Trust the given CA bundle for https targets
    pub fn with_ca_cert(mut self, path: impl Into<String>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Build the base URI
    pub fn base_uri(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Connection state for HTTP/2
struct ConnectionState {
    sender: SendRequest<Full<Bytes>>,
}

/// SBI Client - HTTP/2 client for SBI communication
pub struct SbiClient {
    /// Client configuration
    config: SbiClientConfig,
    /// Connection state (lazily initialized)
    connection: Arc<Mutex<Option<ConnectionState>>>,
}

impl SbiClient {
    /// Create a new SBI client
    pub fn new(config: SbiClientConfig) -> Self {
        Self {
            config,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a client with host and port
    pub fn with_host_port(host: impl Into<String>, port: u16) -> Self {
        Self::new(SbiClientConfig::new(host, port))
    }

    /// Create a client targeting a base URI
    pub fn from_uri(base_uri: &str) -> SbiResult<Self> {
        Ok(Self::new(SbiClientConfig::from_uri(base_uri)?))
    }

    /// Get the client configuration
    pub fn config(&self) -> &SbiClientConfig {
        &self.config
    }

    /// Run the HTTP/2 handshake over an established stream
    async fn handshake<T>(io: T) -> SbiResult<SendRequest<Full<Bytes>>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(io))
            .await
            .map_err(|e| SbiError::ConnectionError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::debug!("HTTP/2 connection error: {e}");
            }
        });

        Ok(sender)
    }

    /// Connect to the server
    async fn connect(&self) -> SbiResult<SendRequest<Full<Bytes>>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SbiError::Timeout)?
            .map_err(|e| SbiError::ConnectionError(format!("{addr}: {e}")))?;

        if self.config.scheme == UriScheme::Https {
            let tls_config = tls::build_client_config(self.config.ca_cert.as_deref())?;
            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(self.config.host.clone())
                .map_err(|e| SbiError::TlsError(format!("Invalid server name: {e}")))?;

            let tls_stream = tokio::time::timeout(
                self.config.connect_timeout,
                connector.connect(server_name, stream),
            )
            .await
            .map_err(|_| SbiError::Timeout)?
            .map_err(|e| SbiError::TlsError(format!("TLS handshake failed: {e}")))?;

            Self::handshake(tls_stream).await
        } else {
            Self::handshake(stream).await
        }
    }

    /// Get or create a connection
    async fn get_connection(&self) -> SbiResult<SendRequest<Full<Bytes>>> {
        let mut conn_guard = self.connection.lock().await;

        if let Some(ref state) = *conn_guard {
            if state.sender.is_ready() {
                return Ok(state.sender.clone());
            }
        }

        let sender = self.connect().await?;
        *conn_guard = Some(ConnectionState {
            sender: sender.clone(),
        });
        Ok(sender)
    }

    /// Send an SBI request and receive a response
    pub async fn send_request(&self, request: SbiRequest) -> SbiResult<SbiResponse> {
        let mut sender = self.get_connection().await?;

        let uri_str = if request.header.uri.starts_with("http") {
            request.header.uri.clone()
        } else {
            format!("{}{}", self.config.base_uri(), request.header.uri)
        };

        let uri_with_params = if request.http.params.is_empty() {
            uri_str
        } else {
            let params: Vec<String> = request
                .http
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("{}?{}", uri_str, params.join("&"))
        };

        let uri: Uri = uri_with_params
            .parse()
            .map_err(|e| SbiError::InvalidUri(format!("{uri_with_params}: {e}")))?;

        let method = match request.header.method.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "PATCH" => Method::PATCH,
            other => return Err(SbiError::InvalidMethod(other.to_string())),
        };

        let body = request
            .http
            .content
            .map(|c| Full::new(Bytes::from(c)))
            .unwrap_or_else(|| Full::new(Bytes::new()));

        let mut req_builder = Request::builder().method(method).uri(uri);
        for (key, value) in &request.http.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        let http_request = req_builder
            .body(body)
            .map_err(|e| SbiError::ClientError(e.to_string()))?;

        let response = tokio::time::timeout(
            self.config.request_timeout,
            sender.send_request(http_request),
        )
        .await
        .map_err(|_| SbiError::Timeout)?
        .map_err(|e| SbiError::HyperError(e.to_string()))?;

        Self::convert_response(response).await
    }

    /// Convert hyper response to SbiResponse
    async fn convert_response(response: hyper::Response<Incoming>) -> SbiResult<SbiResponse> {
        let mut sbi_response = SbiResponse::with_status(response.status().as_u16());

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }
        sbi_response.http.headers = headers;

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| SbiError::InvalidResponse(e.to_string()))?
            .to_bytes();

        if !body_bytes.is_empty() {
            sbi_response
                .http
                .set_content(String::from_utf8_lossy(&body_bytes).to_string());
        }

        Ok(sbi_response)
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::get(path)).await
    }

    /// Send a PUT request with JSON body
    pub async fn put_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> SbiResult<SbiResponse> {
        let request = SbiRequest::put(path).with_json_body(body)?;
        self.send_request(request).await
    }

    /// Send a DELETE request
    pub async fn delete(&self, path: &str) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::delete(path)).await
    }

    /// Close the connection
    pub async fn close(&self) {
        let mut conn_guard = self.connection.lock().await;
        *conn_guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config() {
        let config = SbiClientConfig::new("localhost", 8080)
            .with_scheme(UriScheme::Https)
            .with_connect_timeout(Duration::from_secs(10));

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.base_uri(), "https://localhost:8080");
    }

    #[test]
    fn test_config_from_uri() {
        let config = SbiClientConfig::from_uri("http://127.0.0.10:8000").unwrap();
        assert_eq!(config.scheme, UriScheme::Http);
        assert_eq!(config.host, "127.0.0.10");
        assert_eq!(config.port, 8000);

        let config = SbiClientConfig::from_uri("https://nrf.example").unwrap();
        assert_eq!(config.scheme, UriScheme::Https);
        assert_eq!(config.port, 443);
    }

    #[test]
    fn test_config_from_bad_uri() {
        assert!(matches!(
            SbiClientConfig::from_uri("127.0.0.10:8000"),
            Err(SbiError::InvalidUri(_))
        ));
        assert!(matches!(
            SbiClientConfig::from_uri("ftp://nrf.example"),
            Err(SbiError::InvalidUri(_))
        ));
        assert!(SbiClientConfig::from_uri("not a uri").is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Port 1 on loopback is not expected to be listening.
        let client = SbiClient::new(
            SbiClientConfig::new("127.0.0.1", 1).with_connect_timeout(Duration::from_secs(1)),
        );
        let err = client.get("/").await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_https_uses_configured_ca_bundle() {
        // Accepting is not needed: the TCP connect completes from the backlog.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = SbiClientConfig::from_uri(&format!("https://127.0.0.1:{}", addr.port()))
            .unwrap()
            .with_ca_cert("/nonexistent/nrf-ca.pem");
        assert_eq!(config.ca_cert.as_deref(), Some("/nonexistent/nrf-ca.pem"));

        let err = SbiClient::new(config).get("/").await.unwrap_err();
        assert!(matches!(err, SbiError::TlsError(_)), "unexpected error: {err}");
        assert!(err.to_string().contains("/nonexistent/nrf-ca.pem"));
    }
}
