//! Actuator transport seam and the HTTP/1.1 adapter.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http_body_util::Full;
use thiserror::Error;
use tracing::debug;

use crate::command::ActuatorResource;

/// Reply to a state-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Changed,
    Content,
    Failed(u16),
}

impl ReplyStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Changed | Self::Content)
    }

    /// 204 maps to `Changed`, any other 2xx to `Content`.
    pub fn from_http(status: http::StatusCode) -> Self {
        if status == http::StatusCode::NO_CONTENT {
            Self::Changed
        } else if status.is_success() {
            Self::Content
        } else {
            Self::Failed(status.as_u16())
        }
    }
}

/// The actuator never answered.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Io(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Delivers one state-change request to one actuator.
///
/// Implementations do not enforce a deadline; the dispatcher wraps every
/// call in its own timeout.
pub trait ActuatorTransport: Send + Sync + 'static {
    fn put(
        &self,
        address: &str,
        resource: ActuatorResource,
        body: Vec<u8>,
    ) -> impl Future<Output = TransportResult<ReplyStatus>> + Send;
}

/// JSON `PUT` over HTTP/1.1 to `http://{address}:{port}{resource}`, with
/// IPv6 addresses bracketed.
#[derive(Debug, Clone)]
pub struct HttpActuatorTransport {
    port: u16,
}

impl HttpActuatorTransport {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl ActuatorTransport for HttpActuatorTransport {
    fn put(
        &self,
        address: &str,
        resource: ActuatorResource,
        body: Vec<u8>,
    ) -> impl Future<Output = TransportResult<ReplyStatus>> + Send {
        let authority = authority_for(address, self.port);
        async move { http_put(&authority, resource.path(), body).await }
    }
}

/// `host:port` authority for an actuator address. IP literals go through
/// `SocketAddr` so IPv6 comes out bracketed (`[fd00::2]:5683`); anything else
/// is treated as a hostname.
fn authority_for(address: &str, port: u16) -> String {
    let host = address.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{address}:{port}"),
    }
}

async fn http_put(authority: &str, path: &str, body: Vec<u8>) -> TransportResult<ReplyStatus> {
    let uri = format!("http://{authority}{path}");

    let stream = tokio::net::TcpStream::connect(authority)
        .await
        .map_err(|e| TransportError::Io(format!("connect {authority}: {e}")))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| TransportError::Io(format!("handshake {authority}: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method(http::Method::PUT)
        .uri(&uri)
        .header(http::header::HOST, authority)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::USER_AGENT, "hivekeeper-dispatch/0.1")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| TransportError::Io(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| TransportError::Io(format!("request {uri}: {e}")))?;

    debug!(status = %resp.status(), %uri, "actuator replied");
    Ok(ReplyStatus::from_http(resp.status()))
}
