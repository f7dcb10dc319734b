//! Listener address handling and the HTTP/1 accept loop shared by the
//! management listener and the HTTP-01 responder.

use std::convert::Infallible;
use std::ffi::CString;
use std::future::Future;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LISTEN_BACKLOG: i32 = 128;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listener address '{address}': {reason}")]
    Parse { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve a configured listener string.
///
/// Accepts `a.b.c.d:port`, `[v6]:port` and `[v6%zone]:port`, where the zone
/// is an interface name or a numeric scope id.
pub fn parse_listener(address: &str) -> Result<SocketAddr, ListenerError> {
    let invalid = |reason: &str| ListenerError::Parse {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let Some(rest) = address.strip_prefix('[') else {
        return address
            .parse::<SocketAddrV4>()
            .map(SocketAddr::V4)
            .map_err(|e| invalid(&e.to_string()));
    };

    let (host, port) = rest
        .split_once("]:")
        .ok_or_else(|| invalid("expected [address]:port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;

    let (ip, scope_id) = match host.split_once('%') {
        Some((ip, zone)) => (ip, resolve_zone(zone).map_err(|r| invalid(&r))?),
        None => (host, 0),
    };
    let ip: Ipv6Addr = ip.parse().map_err(|_| invalid("invalid IPv6 address"))?;

    Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, scope_id)))
}

fn resolve_zone(zone: &str) -> Result<u32, String> {
    if let Ok(index) = zone.parse::<u32>() {
        return Ok(index);
    }

    let name = CString::new(zone).map_err(|_| format!("invalid zone '{zone}'"))?;
    // SAFETY: `name` is a valid NUL-terminated string that outlives the call
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(format!("unknown interface '{zone}'"));
    }
    Ok(index)
}

/// Bind one configured listener address.
///
/// IPv6 sockets are IPv6-only so `0.0.0.0:p` and `[::]:p` can be bound side
/// by side. Must be called from within a Tokio runtime.
pub fn bind_listener(address: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_listener(address)?;
    let bind_err = |source| ListenerError::Bind {
        address: address.to_string(),
        source,
    };

    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true).map_err(bind_err)?;
    }
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    let std_listener: std::net::TcpListener = socket.into();
    let listener = TcpListener::from_std(std_listener).map_err(bind_err)?;

    debug!(address = %address, "Bound listener");
    Ok(listener)
}

/// Bind every address, failing on the first that cannot be bound.
pub fn bind_all(addresses: &[String]) -> Result<Vec<TcpListener>, ListenerError> {
    addresses.iter().map(|a| bind_listener(a)).collect()
}

/// Serve HTTP/1 connections on `listener` until `shutdown` is cancelled.
///
/// Every connection runs in its own task; an I/O error ends that
/// connection only. In-flight connections are shut down gracefully.
pub async fn serve<H, Fut>(listener: TcpListener, name: &'static str, handler: H, shutdown: CancellationToken)
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(listener = name, address = %local, "Listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(listener = name, error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler(req).await) }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!(listener = name, peer = %peer, error = %e, "Connection error");
            }
        });
    }

    debug!(listener = name, address = %local, "Listener stopped");
}

/// Build a response with a fixed body.
pub fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body)
}
