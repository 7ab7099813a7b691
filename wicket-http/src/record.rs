use crate::request_id::request_id;
use axum::extract::ConnectInfo;
use chrono::{DateTime, Utc};
use http::header::{HOST, REFERER, USER_AGENT};
use http::request::Parts;
use http::uri::Scheme;
use http::HeaderName;
use std::net::SocketAddr;
use wicket_core::AccessLogRecord;

/// Request extension set by a TLS-terminating acceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTransport;

/// Fill a new access record from what is known before the handler runs.
pub fn access_record(parts: &Parts, when: DateTime<Utc>) -> AccessLogRecord {
    AccessLogRecord {
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default(),
        proto: format!("{:?}", parts.version),
        tls: parts.uri.scheme() == Some(&Scheme::HTTPS)
            || parts.extensions.get::<SecureTransport>().is_some(),
        host: header(parts, HOST)
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or_default()
            .to_owned(),
        method: parts.method.to_string(),
        request_uri: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_owned(),
        user_agent: header(parts, USER_AGENT).unwrap_or_default().to_owned(),
        referer: header(parts, REFERER).unwrap_or_default().to_owned(),
        request_id: request_id(parts).unwrap_or_default().to_owned(),
        ..AccessLogRecord::new(when)
    }
}

fn header(parts: &Parts, name: HeaderName) -> Option<&str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}
