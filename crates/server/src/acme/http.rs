//! HTTP transport for `instant-acme` that remembers `Retry-After` hints.
//!
//! The protocol client does not expose response headers, so the transport
//! records the last hint per request URL. Orders look up the hints for
//! their own order and authorization URLs when polling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::header::RETRY_AFTER;
use http::{HeaderMap, Request, Response};
use http_body_util::{BodyExt, Full};
use instant_acme::{BytesResponse, HttpClient};
use tracing::trace;

/// Last `Retry-After` seen per URL.
#[derive(Debug, Clone, Default)]
pub struct RetryHints(Arc<DashMap<String, Duration>>);

impl RetryHints {
    pub fn get(&self, url: &str) -> Option<Duration> {
        self.0.get(url).map(|hint| *hint)
    }

    /// Remember the hint carried by `headers`, or forget the previous one.
    pub fn record(&self, url: &str, headers: &HeaderMap) {
        match parse_retry_after(headers, Utc::now()) {
            Some(delay) => {
                trace!(url = %url, delay_ms = delay.as_millis() as u64, "Service asked to retry later");
                self.0.insert(url.to_string(), delay);
            }
            None => {
                self.0.remove(url);
            }
        }
    }

    pub fn forget(&self, url: &str) {
        self.0.remove(url);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `Retry-After` as delay-seconds or HTTP-date, relative to `now`.
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    // A date in the past means "now"
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// `reqwest`-backed transport feeding [`RetryHints`].
#[derive(Debug, Clone)]
pub struct HintingHttpClient {
    client: reqwest::Client,
    hints: RetryHints,
}

impl HintingHttpClient {
    pub fn new(hints: RetryHints) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("macen/", env!("CARGO_PKG_VERSION")))
            .https_only(true)
            .build()?;
        Ok(Self { client, hints })
    }

    async fn send(
        client: reqwest::Client,
        hints: RetryHints,
        req: Request<Full<Bytes>>,
    ) -> Result<BytesResponse, instant_acme::Error> {
        let (parts, body) = req.into_parts();
        let url = parts.uri.to_string();
        let body = body
            .collect()
            .await
            .map_err(|e| instant_acme::Error::Other(Box::new(e)))?
            .to_bytes();

        let response = client
            .request(parts.method, &url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(|e| instant_acme::Error::Other(Box::new(e)))?;

        hints.record(&url, response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| instant_acme::Error::Other(Box::new(e)))?;

        let mut converted = Response::new(Full::new(bytes));
        *converted.status_mut() = status;
        *converted.headers_mut() = headers;
        Ok(BytesResponse::from(converted))
    }
}

impl HttpClient for HintingHttpClient {
    fn request(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Pin<Box<dyn Future<Output = Result<BytesResponse, instant_acme::Error>> + Send>> {
        Box::pin(Self::send(self.client.clone(), self.hints.clone(), req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_retry_after() {
        let now = DateTime::parse_from_rfc3339("2015-10-21T07:28:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_retry_after(&headers("120"), now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after(&headers("Wed, 21 Oct 2015 07:28:30 GMT"), now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after(&headers("Wed, 21 Oct 2015 07:00:00 GMT"), now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after(&headers("soon"), now), None);
        assert_eq!(parse_retry_after(&HeaderMap::new(), now), None);
    }

    #[test]
    fn test_hints_follow_latest_response() {
        let hints = RetryHints::default();
        let url = "https://acme.test/order/1";

        hints.record(url, &headers("3"));
        assert_eq!(hints.get(url), Some(Duration::from_secs(3)));

        hints.record(url, &HeaderMap::new());
        assert_eq!(hints.get(url), None);

        hints.record(url, &headers("1"));
        hints.forget(url);
        assert!(hints.is_empty());
    }
}
