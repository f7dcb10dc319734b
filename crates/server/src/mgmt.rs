//! Management listener
//!
//! # Endpoints
//!
//! | Method | Path                     | Purpose                                   |
//! |--------|--------------------------|-------------------------------------------|
//! | GET    | `/health`                | Liveness                                  |
//! | POST   | `/v1/certificates`       | Issue or renew a domain set (JSON)        |
//! | GET    | `/v1/certificates/<id>`  | Status of an earlier request              |
//! | POST   | `/sign`                  | Issue for a PEM CSR, answer the PEM chain |
//!
//! Request bodies are limited to the configured `max-size`. A stored
//! certificate outside the renewal window answers repeated requests; pass
//! `"force": true` to issue a new one anyway.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Method, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::Request;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use macen_config::MgmtConfig;

use crate::acme::OrderError;
use crate::cert;
use crate::net::{self, ListenerError};
use crate::orchestrator::{Orchestrator, Outcome};
use crate::types::{CertificateRequest, DomainSet};

const CERTIFICATES_PATH: &str = "/v1/certificates";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IssueBody {
    domains: Vec<String>,
    #[serde(default)]
    validator: Option<String>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default = "default_wait")]
    wait: bool,
    /// Issue anew even when a fresh certificate is stored
    #[serde(default)]
    force: bool,
}

fn default_wait() -> bool {
    true
}

/// Request routing for the management listener.
#[derive(Debug, Clone)]
pub struct ManagementApi {
    orchestrator: Arc<Orchestrator>,
    max_size: u64,
}

impl ManagementApi {
    pub fn new(orchestrator: Arc<Orchestrator>, max_size: u64) -> Self {
        Self {
            orchestrator,
            max_size,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(method = %method, path = %path, "Management request");

        match (method, path.as_str()) {
            (Method::GET, "/health") => net::text(StatusCode::OK, "ok\n"),
            (Method::POST, CERTIFICATES_PATH) => match self.read_body(req).await {
                Ok(body) => self.issue(&body).await,
                Err(response) => response,
            },
            (Method::GET, p) if p.starts_with(CERTIFICATES_PATH) => {
                self.status(&p[CERTIFICATES_PATH.len()..])
            }
            (Method::POST, "/sign") => match self.read_body(req).await {
                Ok(body) => self.sign(&body).await,
                Err(response) => response,
            },
            (_, "/health" | CERTIFICATES_PATH | "/sign") => {
                net::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
            }
            _ => net::text(StatusCode::NOT_FOUND, "not found\n"),
        }
    }

    /// Read the whole body, refusing anything above `max_size`.
    async fn read_body<B>(&self, req: Request<B>) -> Result<Bytes, Response<Full<Bytes>>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let too_large = || net::text(StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n");

        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_size) {
            return Err(too_large());
        }

        let limit = usize::try_from(self.max_size).unwrap_or(usize::MAX);
        match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.is::<LengthLimitError>() => Err(too_large()),
            Err(e) => Err(net::text(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {e}\n"),
            )),
        }
    }

    async fn issue(&self, body: &[u8]) -> Response<Full<Bytes>> {
        let parsed: IssueBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &format!("invalid request: {e}")),
        };
        let domains = match DomainSet::new(&parsed.domains) {
            Ok(domains) => domains,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        info!(domains = %domains, wait = parsed.wait, "Certificate requested");
        let request = CertificateRequest::new(domains)
            .with_validator(parsed.validator)
            .with_storage(parsed.storage)
            .with_force_renewal(parsed.force);

        if !parsed.wait {
            let id = self.orchestrator.submit(request);
            return self.status_response(StatusCode::ACCEPTED, &id);
        }

        let (id, outcome) = self.orchestrator.issue(request).await;
        match outcome {
            Ok(certificate) => json_response(
                StatusCode::OK,
                &json!({
                    "id": id,
                    "state": "done",
                    "domains": certificate.domains,
                    "not_after": certificate.not_after,
                    "certificate": certificate.chain_pem,
                }),
            ),
            Err(e) => json_response(
                error_status(&e),
                &json!({
                    "id": id,
                    "state": if e.is_cancelled() { "cancelled" } else { "error" },
                    "error": e.to_string(),
                }),
            ),
        }
    }

    fn status(&self, rest: &str) -> Response<Full<Bytes>> {
        let Some(id) = rest
            .strip_prefix('/')
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            return json_error(StatusCode::NOT_FOUND, "unknown request");
        };
        self.status_response(StatusCode::OK, &id)
    }

    fn status_response(&self, code: StatusCode, id: &Uuid) -> Response<Full<Bytes>> {
        match self.orchestrator.status(id) {
            Some(status) => json_response(code, &status),
            None => json_error(StatusCode::NOT_FOUND, "unknown request"),
        }
    }

    async fn sign(&self, body: &[u8]) -> Response<Full<Bytes>> {
        let (domains, csr_der) = match cert::parse_csr_pem(body) {
            Ok(parsed) => parsed,
            Err(e) => return net::text(StatusCode::BAD_REQUEST, format!("{e}\n")),
        };

        info!(domains = %domains, "CSR signing requested");
        let request = CertificateRequest::new(domains).with_csr(csr_der);
        let (_, outcome): (Uuid, Outcome) = self.orchestrator.issue(request).await;
        match outcome {
            Ok(certificate) => net::respond(StatusCode::OK, "application/x-pem-file", certificate.chain_pem),
            Err(e) => net::text(error_status(&e), format!("{e}\n")),
        }
    }
}

fn error_status(error: &OrderError) -> StatusCode {
    match error {
        OrderError::Configuration(_) => StatusCode::BAD_REQUEST,
        OrderError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        OrderError::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
        OrderError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        OrderError::Protocol(_) | OrderError::Challenge(_) => StatusCode::BAD_GATEWAY,
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => net::respond(status, "application/json", body),
        Err(e) => net::text(StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")),
    }
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

/// Bound management listeners.
#[derive(Debug)]
pub struct ManagementListener {
    local_addrs: Vec<SocketAddr>,
}

impl ManagementListener {
    /// Bind every `[mgmt]` listener and start serving until `shutdown`.
    pub fn bind(
        config: &MgmtConfig,
        orchestrator: Arc<Orchestrator>,
        shutdown: CancellationToken,
    ) -> Result<Self, ListenerError> {
        let bound = net::bind_all(&config.listeners)?;
        let api = Arc::new(ManagementApi::new(orchestrator, config.max_size));

        let mut local_addrs = Vec::with_capacity(bound.len());
        for listener in bound {
            if let Ok(addr) = listener.local_addr() {
                local_addrs.push(addr);
            }
            let api = Arc::clone(&api);
            let handler = move |req: Request<Incoming>| {
                let api = Arc::clone(&api);
                async move { api.handle(req).await }
            };
            tokio::spawn(net::serve(listener, "mgmt", handler, shutdown.clone()));
        }

        info!(listeners = ?config.listeners, max_size = config.max_size, "Management listener ready");
        Ok(Self { local_addrs })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }
}
