// src/proxy.rs
//! # Fetch proxy
//! Relays a client-chosen remote resource (story images) without letting the
//! service be used to reach internal addresses or to pull unbounded payloads.
//!
//! - `validate`: http/https only; every resolved address must be public.
//! - `fetch`: no redirect following; advertised and streamed size both capped;
//!   only allow-listed headers are forwarded.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{BoxStream, Stream, StreamExt};
use metrics::counter;
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

use crate::source::USER_AGENT;

/// Hard ceiling for any proxied or scraped payload (10 MiB).
pub const MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000, immutable";

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid URL: {0}")]
    Invalid(String),

    #[error("could not resolve hostname: {0}")]
    Unresolvable(String),

    #[error("denied: {host} resolves to a non-public address {addr}")]
    Forbidden { host: String, addr: IpAddr },

    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("payload of {declared} bytes exceeds limit of {limit} bytes")]
    TooLarge { declared: u64, limit: u64 },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Invalid(_) | Self::Unresolvable(_) | Self::Forbidden { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::Unresolvable(_) => "unresolvable",
            Self::Forbidden { .. } => "forbidden",
            Self::Upstream(_) => "upstream",
            Self::TooLarge { .. } => "too_large",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        warn!(target: "proxy", error = %self, "proxy request rejected");
        counter!("proxy_rejected_total", "reason" => self.reason()).increment(1);
        let body = match self.status() {
            StatusCode::BAD_REQUEST => "Invalid or forbidden URL",
            StatusCode::PAYLOAD_TOO_LARGE => "Image exceeds maximum size",
            _ => "Failed to fetch image",
        };
        (self.status(), body).into_response()
    }
}

/// Hostname resolution, pluggable so address policy can be exercised offline.
#[async_trait::async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// System resolver (getaddrinfo through tokio).
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Loopback, link-local, private (RFC 1918), IPv6 unique-local and unspecified addresses.
/// IPv4-mapped IPv6 addresses are judged by their IPv4 form.
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_forbidden_v4(v4),
            None => is_forbidden_v6(v6),
        },
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || ip.is_unspecified()
        // link-local multicast 224.0.0.0/24
        || (a == 224 && b == 0 && c == 0)
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local unicast fe80::/10
        || (first & 0xffc0) == 0xfe80
        // link-local multicast ff02::/16
        || first == 0xff02
}

/// Reject a response whose advertised length is over `limit`.
pub fn check_declared_length(declared: Option<u64>, limit: u64) -> Result<(), ProxyError> {
    match declared {
        Some(n) if n > limit => Err(ProxyError::TooLarge { declared: n, limit }),
        _ => Ok(()),
    }
}

/// Pass chunks through until `limit` bytes have been yielded, then end the stream.
/// The chunk that crosses the limit is cut so the total is exactly `limit`.
pub fn cap_stream<S, E>(inner: S, limit: u64) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    inner.scan(limit, move |remaining, chunk| {
        let next = match chunk {
            Ok(_) if *remaining == 0 => {
                warn!(target: "proxy", limit, "payload truncated at size cap");
                None
            }
            Ok(mut bytes) => {
                if bytes.len() as u64 > *remaining {
                    bytes.truncate(*remaining as usize);
                }
                *remaining -= bytes.len() as u64;
                Some(Ok(bytes))
            }
            Err(e) => Some(Err(e)),
        };
        futures::future::ready(next)
    })
}

/// Upstream response reduced to what may be relayed.
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from_stream(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}

#[derive(Clone)]
pub struct FetchProxy {
    http: reqwest::Client,
    resolver: Arc<dyn Resolve>,
    max_bytes: u64,
}

impl FetchProxy {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            // the validated address is the one we connect to, not an env proxy
            .no_proxy()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            resolver: Arc::new(SystemResolver),
            max_bytes: MAX_PAYLOAD_BYTES,
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Parse, check the scheme and make sure no resolved address is internal.
    pub async fn validate(&self, raw: &str) -> Result<Url, ProxyError> {
        let url = Url::parse(raw).map_err(|_| ProxyError::Invalid("invalid URL format".into()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ProxyError::Invalid(format!(
                "invalid URL scheme: {}",
                url.scheme()
            )));
        }

        let host_label = url.host_str().unwrap_or_default().to_string();
        let addrs: Vec<IpAddr> = match url.host() {
            Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(Host::Domain(domain)) => {
                let port = url.port_or_known_default().unwrap_or(80);
                self.resolver
                    .resolve(domain, port)
                    .await
                    .map_err(|_| ProxyError::Unresolvable(host_label.clone()))?
            }
            None => return Err(ProxyError::Invalid("missing host".into())),
        };
        if addrs.is_empty() {
            return Err(ProxyError::Unresolvable(host_label));
        }

        if let Some(addr) = addrs.into_iter().find(|ip| is_forbidden_ip(*ip)) {
            return Err(ProxyError::Forbidden {
                host: host_label,
                addr,
            });
        }
        Ok(url)
    }

    /// Fetch an already validated URL. Redirects come back as-is.
    pub async fn fetch(&self, url: Url) -> Result<ProxiedResponse, ProxyError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        check_declared_length(resp.content_length(), self.max_bytes)?;

        let upstream = resp.headers();
        let mut headers = HeaderMap::new();
        if let Some(ct) = upstream.get(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, ct.clone());
        }
        if let Some(len) = resp.content_length().filter(|n| *n > 0) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_VALUE),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        // Surface redirects so the client can send the target back through validation.
        if status.is_redirection() {
            if let Some(loc) = upstream.get(header::LOCATION) {
                headers.insert(header::LOCATION, loc.clone());
            }
        }

        counter!("proxy_requests_total").increment(1);
        Ok(ProxiedResponse {
            status,
            headers,
            body: cap_stream(resp.bytes_stream(), self.max_bytes).boxed(),
        })
    }

    /// `validate` then `fetch`.
    pub async fn relay(&self, raw: &str) -> Result<ProxiedResponse, ProxyError> {
        let url = self.validate(raw).await?;
        self.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn forbidden_ranges() {
        for s in [
            "127.0.0.1",
            "127.8.9.10",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "224.0.0.251",
            "::1",
            "::",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "ff02::1",
            "::ffff:10.0.0.1",
            "::ffff:127.0.0.1",
        ] {
            assert!(is_forbidden_ip(ip(s)), "{s} should be forbidden");
        }
    }

    #[test]
    fn public_ranges() {
        for s in [
            "93.184.216.34",
            "8.8.8.8",
            "172.32.0.1",
            "192.169.0.1",
            "2606:4700::1111",
            "::ffff:1.1.1.1",
        ] {
            assert!(!is_forbidden_ip(ip(s)), "{s} should be allowed");
        }
    }

    #[test]
    fn declared_length_check() {
        assert!(check_declared_length(None, 10).is_ok());
        assert!(check_declared_length(Some(10), 10).is_ok());
        let err = check_declared_length(Some(11), 10).unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cap_stream_cuts_at_exact_limit() {
        let chunks: Vec<Result<Bytes, io::Error>> = (0..5)
            .map(|_| Ok(Bytes::from(vec![7u8; 4])))
            .collect();
        let out: Vec<Bytes> = cap_stream(futures::stream::iter(chunks), 10)
            .try_collect()
            .await
            .unwrap();
        let total: usize = out.iter().map(|b| b.len()).sum();
        assert_eq!(total, 10);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].len(), 2);
    }

    #[tokio::test]
    async fn cap_stream_passes_short_bodies() {
        let chunks: Vec<Result<Bytes, io::Error>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let out: Vec<Bytes> = cap_stream(futures::stream::iter(chunks), 10)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.concat(), b"abcde".to_vec());
    }

    #[tokio::test]
    async fn rejects_bad_scheme_and_garbage() {
        let p = FetchProxy::new().unwrap();
        assert!(matches!(
            p.validate("ftp://example.com/a.png").await,
            Err(ProxyError::Invalid(_))
        ));
        assert!(matches!(
            p.validate("not a url").await,
            Err(ProxyError::Invalid(_))
        ));
        assert!(matches!(
            p.validate("file:///etc/passwd").await,
            Err(ProxyError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn rejects_literal_internal_addresses() {
        let p = FetchProxy::new().unwrap();
        for raw in [
            "http://127.0.0.1/a.png",
            "http://[::1]:8080/a.png",
            "http://169.254.169.254/latest/meta-data",
            "https://10.0.0.5/",
        ] {
            assert!(
                matches!(p.validate(raw).await, Err(ProxyError::Forbidden { .. })),
                "{raw} should be forbidden"
            );
        }
    }
}
