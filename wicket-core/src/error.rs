use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt;
use thiserror::Error;

/// Unified error type for Wicket setup (configuration, wiring).
#[derive(Error, Debug)]
pub enum WicketError {
    #[error("Config error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for WicketError {
    fn from(err: figment::Error) -> Self {
        WicketError::Config(Box::new(err))
    }
}

/// Panic payload and error value meaning "abandon this connection without
/// writing a response".
///
/// Handlers either return [`HandlerError::Abort`] or panic with
/// `std::panic::panic_any(AbortHandler)`; both end up in front of the hosting
/// transport as the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbortHandler;

impl fmt::Display for AbortHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("abort handler")
    }
}

impl std::error::Error for AbortHandler {}

/// An error with embedded HTTP response information.
///
/// Only `message` (and the request id) is ever sent to the client. `cause`
/// is for server-side logs.
#[derive(Debug)]
pub struct HttpError {
    /// Response code to send; 0 means 500.
    pub code: u16,
    /// Response body to send to the client.
    pub message: String,
    /// Detailed error to log on the server.
    pub cause: Option<anyhow::Error>,
    /// Extra response headers, replacing same-named defaults.
    pub headers: HeaderMap,
}

impl HttpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            headers: HeaderMap::new(),
        }
    }

    /// Attach a server-side cause.
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Status to send. A zero or out-of-range code becomes 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Text recorded in the access log: the message, then the cause.
    pub fn log_text(&self) -> String {
        match (&self.cause, self.message.is_empty()) {
            (None, _) => self.message.clone(),
            (Some(cause), true) => format!("{cause:#}"),
            (Some(cause), false) => format!("{}: {cause:#}", self.message),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "httperror{{{}, {:?}, {cause:#}}}", self.code, self.message),
            None => write!(f, "httperror{{{}, {:?}}}", self.code, self.message),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| &**e as &(dyn std::error::Error + 'static))
    }
}

/// A message that is safe to show to the user as-is.
///
/// Converts into a typed [`HttpError`] without a status code, so it is sent
/// as a 500 with this message as the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleError(String);

impl VisibleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisibleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for VisibleError {}

impl From<VisibleError> for HttpError {
    fn from(err: VisibleError) -> Self {
        HttpError::new(0, err.0)
    }
}

/// What a handler reports instead of writing a response itself.
#[derive(Debug)]
pub enum HandlerError {
    /// Explicit status, client-safe message and optional headers.
    Http(HttpError),
    /// Anything else. Served as a generic 500; the text is only logged.
    Other(anyhow::Error),
    /// Abandon the connection without a response.
    Abort,
}

impl HandlerError {
    pub fn internal<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        HandlerError::Other(anyhow::Error::msg(message))
    }

    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            HandlerError::Http(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, HandlerError::Abort)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Http(err) => fmt::Display::fmt(err, f),
            HandlerError::Other(err) => write!(f, "{err:#}"),
            HandlerError::Abort => fmt::Display::fmt(&AbortHandler, f),
        }
    }
}

impl From<HttpError> for HandlerError {
    fn from(err: HttpError) -> Self {
        HandlerError::Http(err)
    }
}

impl From<VisibleError> for HandlerError {
    fn from(err: VisibleError) -> Self {
        HandlerError::Http(err.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Other(err)
    }
}

impl From<AbortHandler> for HandlerError {
    fn from(_: AbortHandler) -> Self {
        HandlerError::Abort
    }
}
