use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured access log entry, one per handled request.
///
/// Empty fields are left out of the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogRecord {
    /// Time the request started.
    pub when: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_addr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proto: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub tls: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, rename = "requestURI", skip_serializing_if = "String::is_empty")]
    pub request_uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub referer: String,
    #[serde(default, rename = "requestID", skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// Time spent serving the request.
    #[serde(default, rename = "duration", skip_serializing_if = "is_zero_f64")]
    pub seconds: f64,
    /// Status code sent (or derived) for the request.
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub code: u16,
    /// Error text, server-side only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
    /// Response body bytes written.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub bytes: u64,
}

impl AccessLogRecord {
    pub fn new(when: DateTime<Utc>) -> Self {
        Self {
            when,
            ..Self::default()
        }
    }

    /// Set `seconds` from the start time to `now`. A clock that went
    /// backwards records zero.
    pub fn set_elapsed(&mut self, now: DateTime<Utc>) {
        self.seconds = (now - self.when)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
    }

    pub fn request_id(&self) -> Option<&str> {
        (!self.request_id.is_empty()).then_some(self.request_id.as_str())
    }
}

impl fmt::Display for AccessLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {} {}", self.method, self.request_uri, self.code),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}
