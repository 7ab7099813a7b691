//! Helpers that sit next to the request wrapper: debug endpoint access,
//! browser security headers, redirect target validation and
//! `Accept-Encoding` checks.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{
    ACCEPT_ENCODING, CONTENT_SECURITY_POLICY, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS,
};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use ipnet::IpNet;
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use wicket_core::WicketError;
use wicket_core::config::DebugConfig;

// ── Debug access ─────────────────────────────────────────────────

/// Decides whether a request may reach debug endpoints.
pub trait DebugAccess: Send + Sync {
    fn allow(&self, parts: &Parts) -> bool;
}

/// Allows loopback clients, configured networks, and GET requests carrying
/// the configured `debugkey` query parameter.
///
/// Requests that came through a proxy (`X-Forwarded-For` present) are only
/// allowed with the key.
#[derive(Debug, Clone, Default)]
pub struct DebugAccessPolicy {
    allowed: Vec<IpNet>,
    key: Option<String>,
}

impl DebugAccessPolicy {
    pub fn new(allowed: Vec<IpNet>, key: Option<String>) -> Self {
        let key = key.filter(|k| !k.is_empty());
        Self { allowed, key }
    }

    /// Parse allowed addresses (plain IPs or CIDRs) and read the key file.
    pub fn from_config(cfg: &DebugConfig) -> Result<Self, WicketError> {
        let allowed = cfg
            .allow_ips
            .iter()
            .map(|s| parse_net(s))
            .collect::<Result<Vec<_>, _>>()?;
        let key = match &cfg.key_path {
            Some(path) => Some(std::fs::read_to_string(path)?.trim().to_owned()),
            None => None,
        };
        Ok(Self::new(allowed, key))
    }

    fn allowed_by_key(&self, parts: &Parts) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        if parts.method != Method::GET {
            return false;
        }
        parts.uri.query().is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(k, v)| k == "debugkey" && v == key.as_str())
        })
    }
}

fn parse_net(s: &str) -> Result<IpNet, WicketError> {
    s.parse::<IpNet>()
        .or_else(|_| s.parse::<IpAddr>().map(IpNet::from))
        .map_err(|_| WicketError::InvalidAddress(s.to_owned()))
}

impl DebugAccess for DebugAccessPolicy {
    fn allow(&self, parts: &Parts) -> bool {
        if self.allowed_by_key(parts) {
            return true;
        }
        if parts.headers.contains_key("x-forwarded-for") {
            return false;
        }
        let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() else {
            return false;
        };
        let ip = addr.ip().to_canonical();
        ip.is_loopback() || self.allowed.iter().any(|net| net.contains(&ip))
    }
}

/// Middleware rejecting requests the policy doesn't allow with 403.
///
/// ```ignore
/// router.layer(axum::middleware::from_fn_with_state(policy, protect_debug))
/// ```
pub async fn protect_debug(
    State(policy): State<Arc<dyn DebugAccess>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    if !policy.allow(&parts) {
        tracing::debug!(uri = %parts.uri, "debug access denied");
        return (StatusCode::FORBIDDEN, "debug access denied\n").into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

// ── Browser headers ──────────────────────────────────────────────

const HSTS: HeaderValue = HeaderValue::from_static("max-age=63072000; includeSubDomains");
const CSP: HeaderValue = HeaderValue::from_static(
    "default-src 'self'; frame-ancestors 'none'; form-action 'self'; base-uri 'self'; \
     block-all-mixed-content; object-src 'none'",
);

fn browser_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (STRICT_TRANSPORT_SECURITY, HSTS),
        (CONTENT_SECURITY_POLICY, CSP),
        (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
    ]
}

/// Set security headers suitable for pages served to browsers.
pub fn add_browser_headers(headers: &mut HeaderMap) {
    for (name, value) in browser_headers() {
        headers.insert(name, value);
    }
}

/// Middleware adding browser security headers the handler didn't set itself.
pub async fn browser_headers_layer(request: Request<Body>, next: Next) -> Response {
    let mut resp = next.run(request).await;
    let headers = resp.headers_mut();
    for (name, value) in browser_headers() {
        headers.entry(name).or_insert(value);
    }
    resp
}

// ── Redirects ────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedirectError {
    #[error("invalid redirect URL {0:?}")]
    Invalid(String),

    #[error("disallowed target host {host:?} in redirect URL {url:?}")]
    DisallowedHost { host: String, url: String },
}

/// Validate a user-supplied redirect target.
///
/// Same-origin paths are always allowed. Absolute and scheme-relative URLs
/// are allowed only when their host is in `allowed_hosts`. The target may
/// arrive query-escaped; the unescaped form is what gets checked and
/// returned. An empty target stays empty.
pub fn clean_redirect_url(raw: &str, allowed_hosts: &[&str]) -> Result<String, RedirectError> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let target: Cow<'_, str> = match query_unescape(raw) {
        Some(unescaped) if unescaped != raw => Cow::Owned(unescaped),
        _ => Cow::Borrowed(raw),
    };
    if !has_safe_redirect_prefix(&target) {
        return Err(RedirectError::Invalid(target.into_owned()));
    }
    if target.starts_with('/') && !target.starts_with("//") {
        return Ok(target.into_owned());
    }

    let parsed = if target.starts_with("//") {
        Url::parse(&format!("http:{target}"))
    } else {
        Url::parse(&target)
    }
    .map_err(|_| RedirectError::Invalid(target.to_string()))?;

    let host = parsed
        .host_str()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        Ok(target.into_owned())
    } else {
        Err(RedirectError::DisallowedHost {
            host: host.to_owned(),
            url: target.into_owned(),
        })
    }
}

/// Query-unescape `s` (`+` is a space). `None` if any `%` is not followed by
/// two hex digits or the result is not UTF-8.
fn query_unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let malformed = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    });
    if malformed {
        return None;
    }
    urlencoding::decode(&s.replace('+', " "))
        .ok()
        .map(Cow::into_owned)
}

fn has_safe_redirect_prefix(url: &str) -> bool {
    let starts_with_fold =
        |prefix: &str| url.get(..prefix.len()).is_some_and(|p| p.eq_ignore_ascii_case(prefix));
    url.starts_with('/') || starts_with_fold("http://") || starts_with_fold("https://")
}

// ── Content negotiation ──────────────────────────────────────────

/// Whether the `Accept-Encoding` header lists `enc`.
pub fn accepts_encoding(headers: &HeaderMap, enc: &str) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|part| part.split(';').next().unwrap_or_default().trim())
        .any(|coding| coding == enc)
}
