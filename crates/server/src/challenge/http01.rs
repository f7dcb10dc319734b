//! HTTP-01 challenge responder
//!
//! Serves pending key authorizations at
//! `/.well-known/acme-challenge/<token>` on the verification's listeners.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::ChallengeResponder;
use crate::acme::{Challenge, ChallengeError, ChallengeKind};
use crate::net::{self, ListenerError};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Pending HTTP-01 challenges
///
/// Maps challenge token to key authorization. Clones share state, so the
/// listeners see tokens registered by any in-flight order.
#[derive(Debug, Clone, Default)]
pub struct ChallengeTokens {
    challenges: Arc<DashMap<String, String>>,
}

impl ChallengeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending challenge
    pub fn add_challenge(&self, token: &str, key_authorization: &str) {
        debug!(token = %token, "Registering HTTP-01 challenge");
        self.challenges
            .insert(token.to_string(), key_authorization.to_string());
    }

    /// Remove a completed or expired challenge
    pub fn remove_challenge(&self, token: &str) {
        if self.challenges.remove(token).is_some() {
            debug!(token = %token, "Removed HTTP-01 challenge");
        }
    }

    /// Key authorization for `token`, if it is active
    pub fn get_response(&self, token: &str) -> Option<String> {
        let result = self.challenges.get(token).map(|v| v.clone());
        if result.is_some() {
            trace!(token = %token, "Challenge token found");
        } else {
            trace!(token = %token, "Challenge token not found");
        }
        result
    }

    /// `Some(token)` if the path is below the challenge prefix
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
    }

    pub fn pending_count(&self) -> usize {
        self.challenges.len()
    }

    fn handle(&self, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return net::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        }

        let response = Self::extract_token(req.uri().path())
            .filter(|t| !t.is_empty())
            .and_then(|token| self.get_response(token));

        match response {
            Some(key_authorization) => {
                debug!(path = %req.uri().path(), "Serving HTTP-01 challenge");
                net::respond(StatusCode::OK, "application/octet-stream", key_authorization)
            }
            None => net::text(StatusCode::NOT_FOUND, "not found\n"),
        }
    }
}

/// `type = http01`
#[derive(Debug)]
pub struct Http01Responder {
    name: String,
    tokens: ChallengeTokens,
    local_addrs: Vec<SocketAddr>,
}

impl Http01Responder {
    /// Bind every listener and start serving. The listeners stop when
    /// `shutdown` is cancelled.
    pub fn bind(
        name: &str,
        listeners: &[String],
        shutdown: CancellationToken,
    ) -> Result<Self, ChallengeError> {
        let bound = net::bind_all(listeners).map_err(|e| match e {
            ListenerError::Parse { address, reason } => ChallengeError::Bind {
                address,
                message: reason,
            },
            ListenerError::Bind { address, source } => ChallengeError::Bind {
                address,
                message: source.to_string(),
            },
        })?;

        let tokens = ChallengeTokens::new();
        let mut local_addrs = Vec::with_capacity(bound.len());
        for listener in bound {
            if let Ok(addr) = listener.local_addr() {
                local_addrs.push(addr);
            }
            let tokens = tokens.clone();
            let handler = move |req: Request<Incoming>| {
                let tokens = tokens.clone();
                async move { tokens.handle(&req) }
            };
            tokio::spawn(net::serve(listener, "http-01", handler, shutdown.clone()));
        }

        info!(verification = %name, listeners = ?listeners, "HTTP-01 responder ready");

        Ok(Self {
            name: name.to_string(),
            tokens,
            local_addrs,
        })
    }

    /// Addresses the listeners are actually bound to
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn tokens(&self) -> &ChallengeTokens {
        &self.tokens
    }
}

#[async_trait]
impl ChallengeResponder for Http01Responder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Http01
    }

    async fn prepare(&self, domain: &str, challenge: &Challenge) -> Result<(), ChallengeError> {
        debug!(verification = %self.name, domain = %domain, token = %challenge.token, "Publishing HTTP-01 proof");
        self.tokens
            .add_challenge(&challenge.token, &challenge.key_authorization);
        Ok(())
    }

    async fn cleanup(&self, domain: &str, challenge: &Challenge) {
        trace!(verification = %self.name, domain = %domain, token = %challenge.token, "Withdrawing HTTP-01 proof");
        self.tokens.remove_challenge(&challenge.token);
    }
}
