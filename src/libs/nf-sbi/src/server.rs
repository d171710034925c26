//! SBI HTTP Server
//!
//! HTTP/1.1 + HTTP/2 server implementation using hyper for SBI
//! communication. The listener is bound when the server is built, so bind
//! failures surface before anything is spawned; serving runs until
//! [`SbiServer::shutdown`] is called and then drains in-flight requests for a
//! bounded time.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{SbiError, SbiResult};
use crate::message::{ProblemDetails, SbiHeader, SbiHttpMessage, SbiRequest, SbiResponse};
use crate::tls;
use crate::types::UriScheme;

/// Default graceful shutdown budget in seconds
const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 5;

/// Server configuration
#[derive(Debug, Clone)]
pub struct SbiServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// URI scheme
    pub scheme: UriScheme,
    /// TLS private key path
    pub private_key: Option<String>,
    /// TLS certificate path
    pub cert: Option<String>,
    /// Budget for draining in-flight requests at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for SbiServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            scheme: UriScheme::Http,
            private_key: None,
            cert: None,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }
}

impl SbiServerConfig {
    /// Create a new server configuration
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Create configuration with host and port
    pub fn with_host_port(host: impl AsRef<str>, port: u16) -> SbiResult<Self> {
        let addr: SocketAddr = format!("{}:{}", host.as_ref(), port)
            .parse()
            .map_err(|e| SbiError::InvalidUri(format!("Invalid address: {}", e)))?;
        Ok(Self::new(addr))
    }

    /// Enable HTTPS with certificates
    pub fn with_tls(mut self, private_key: impl Into<String>, cert: impl Into<String>) -> Self {
        self.scheme = UriScheme::Https;
        self.private_key = Some(private_key.into());
        self.cert = Some(cert.into());
        self
    }

    /// Set the graceful shutdown budget
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Request handler trait
pub trait SbiRequestHandler: Send + Sync + 'static {
    /// Handle an incoming SBI request
    fn handle(&self, request: SbiRequest) -> Pin<Box<dyn Future<Output = SbiResponse> + Send>>;
}

/// Function-based request handler
impl<F, Fut> SbiRequestHandler for F
where
    F: Fn(SbiRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SbiResponse> + Send + 'static,
{
    fn handle(&self, request: SbiRequest) -> Pin<Box<dyn Future<Output = SbiResponse> + Send>> {
        Box::pin(self(request))
    }
}

/// Hyper service wrapper
struct SbiService<H: SbiRequestHandler> {
    handler: Arc<H>,
}

impl<H: SbiRequestHandler> Clone for SbiService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H: SbiRequestHandler> Service<Request<Incoming>> for SbiService<H> {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let sbi_request = convert_request(req).await;
            let sbi_response = handler.handle(sbi_request).await;
            Ok(convert_response(sbi_response))
        })
    }
}

/// Convert hyper request to SbiRequest
async fn convert_request(req: Request<Incoming>) -> SbiRequest {
    let method = req.method().to_string();
    // HTTP/2 requests carry an absolute URI; handlers route on path and query.
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut http = SbiHttpMessage::new();
    for (key, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            http.set_header(key.as_str(), v.to_string());
        }
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                http.set_param(key.to_string(), value.to_string());
            }
        }
    }

    if let Ok(body) = req.into_body().collect().await {
        let bytes = body.to_bytes();
        if !bytes.is_empty() {
            http.set_content(String::from_utf8_lossy(&bytes).to_string());
        }
    }

    SbiRequest {
        header: SbiHeader::with_method_uri(method, uri),
        http,
    }
}

/// Convert SbiResponse to hyper response
fn convert_response(sbi_response: SbiResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(sbi_response.status);

    for (key, value) in &sbi_response.http.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    let body = sbi_response
        .http
        .content
        .map(|c| Full::new(Bytes::from(c)))
        .unwrap_or_else(|| Full::new(Bytes::new()));

    builder.body(body).unwrap_or_else(|e| {
        log::error!("Failed to build response: {e}");
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Serve one accepted connection until it closes or shutdown is requested.
async fn serve_connection<I, H>(
    builder: auto::Builder<TokioExecutor>,
    io: I,
    service: SbiService<H>,
    shutdown: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: SbiRequestHandler,
{
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                log::debug!("HTTP connection error: {e}");
            }
        }
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                log::debug!("HTTP connection error during shutdown: {e}");
            }
        }
    }
}

/// SBI Server - HTTP server for SBI communication
pub struct SbiServer {
    /// Server configuration
    config: SbiServerConfig,
    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,
    /// Listener, taken by `serve`
    listener: Mutex<Option<TcpListener>>,
    /// Present when serving https
    tls_acceptor: Option<TlsAcceptor>,
    /// Asks the accept loop to stop
    shutdown: CancellationToken,
    /// Cancelled once the accept loop has exited
    stopped: CancellationToken,
}

impl SbiServer {
    /// Bind the listener and load TLS material.
    ///
    /// Fails with [`SbiError::BindError`] when the address cannot be bound
    /// and with [`SbiError::TlsError`] when https is requested without a
    /// usable cert/key pair.
    pub async fn bind(config: SbiServerConfig) -> SbiResult<Self> {
        let tls_acceptor = match config.scheme {
            UriScheme::Http => None,
            UriScheme::Https => {
                let (Some(cert), Some(key)) = (&config.cert, &config.private_key) else {
                    return Err(SbiError::TlsError(
                        "https scheme requires a certificate and a private key".to_string(),
                    ));
                };
                let tls_config = tls::load_server_config(cert, key)?;
                Some(TlsAcceptor::from(Arc::new(tls_config)))
            }
        };

        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| SbiError::BindError {
                addr: config.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            local_addr,
            listener: Mutex::new(Some(listener)),
            tls_acceptor,
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        })
    }

    /// Get the server configuration
    pub fn config(&self) -> &SbiServerConfig {
        &self.config
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and serve connections until shutdown is requested.
    ///
    /// Returns once the listener is closed and in-flight requests have
    /// drained, or with [`SbiError::ShutdownTimeout`] when draining exceeded
    /// the configured budget. Connections still open at that point are left
    /// to finish on their own.
    pub async fn serve<H: SbiRequestHandler>(&self, handler: H) -> SbiResult<()> {
        let (listener, _stopped) = {
            let mut slot = self
                .listener
                .lock()
                .map_err(|_| SbiError::Internal("listener lock poisoned".to_string()))?;
            let listener = slot
                .take()
                .ok_or_else(|| SbiError::ServerError("Server already serving or shut down".to_string()))?;
            (listener, self.stopped.clone().drop_guard())
        };

        let service = SbiService {
            handler: Arc::new(handler),
        };
        let builder = auto::Builder::new(TokioExecutor::new());
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            log::trace!("Accepted SBI connection from {peer}");
                            let service = service.clone();
                            let builder = builder.clone();
                            let shutdown = self.shutdown.clone();

                            match self.tls_acceptor.clone() {
                                Some(acceptor) => {
                                    connections.spawn(async move {
                                        match acceptor.accept(stream).await {
                                            Ok(tls_stream) => {
                                                serve_connection(builder, tls_stream, service, shutdown).await
                                            }
                                            Err(e) => log::warn!("TLS handshake with {peer} failed: {e}"),
                                        }
                                    });
                                }
                                None => {
                                    connections.spawn(serve_connection(builder, stream, service, shutdown));
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("Accept error: {e}");
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    break;
                }
            }
        }

        drop(listener);
        connections.close();

        tokio::time::timeout(self.config.shutdown_timeout, connections.wait())
            .await
            .map_err(|_| SbiError::ShutdownTimeout("HTTP server connection drain"))
    }

    /// Stop accepting and wait, bounded by the configured timeout, for the
    /// accept loop to drain and exit.
    pub async fn shutdown(&self) -> SbiResult<()> {
        self.shutdown.cancel();

        {
            let mut slot = self
                .listener
                .lock()
                .map_err(|_| SbiError::Internal("listener lock poisoned".to_string()))?;
            if slot.take().is_some() {
                // Never served: closing the listener is the whole shutdown.
                self.stopped.cancel();
                return Ok(());
            }
        }

        tokio::time::timeout(self.config.shutdown_timeout, self.stopped.cancelled())
            .await
            .map_err(|_| SbiError::ShutdownTimeout("HTTP server shutdown"))
    }

    /// Check whether the accept loop has exited (or never ran and was shut down)
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }
}

/// Helper function to send an error response
pub fn send_error(status: u16, title: &str, detail: &str, cause: Option<&str>) -> SbiResponse {
    let problem = ProblemDetails::with_status(status as i32)
        .with_title(title)
        .with_detail(detail);

    let problem = if let Some(c) = cause {
        problem.with_cause(c)
    } else {
        problem
    };

    match serde_json::to_string(&problem) {
        Ok(json) => SbiResponse::with_status(status)
            .with_body(json, crate::message::CONTENT_TYPE_PROBLEM),
        Err(_) => SbiResponse::with_status(status),
    }
}

/// Send a 404 Not Found error response
pub fn send_not_found(detail: &str, cause: Option<&str>) -> SbiResponse {
    send_error(404, "Not Found", detail, cause)
}

/// Send a 405 Method Not Allowed error response
pub fn send_method_not_allowed(method: &str, resource: &str) -> SbiResponse {
    send_error(
        405,
        "Method Not Allowed",
        &format!("Method {} not allowed for resource {}", method, resource),
        Some("METHOD_NOT_ALLOWED"),
    )
}
