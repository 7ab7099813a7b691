use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use thiserror::Error;
use wicket_core::HandlerError;

/// Errors returned by [`ResponseWriter`] operations.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("response writer does not support {0}")]
    Unsupported(&'static str),

    #[error("connection was hijacked")]
    Hijacked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WriterError> for HandlerError {
    fn from(err: WriterError) -> Self {
        HandlerError::Other(err.into())
    }
}

/// The response side of a request as seen by a handler.
///
/// Headers may be changed until the status is written. Writing body bytes
/// before a status implies 200.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    fn write(&mut self, buf: &[u8]) -> Result<usize, WriterError>;

    /// Push buffered bytes to the client, if the writer can.
    fn flush(&mut self) -> Result<(), WriterError> {
        Err(WriterError::Unsupported("flush"))
    }

    /// Take over the underlying connection.
    ///
    /// After a successful hijack nothing more is written through this writer.
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        Err(WriterError::Unsupported("hijack"))
    }
}

/// Collects a response in memory for the transport to send once the handler
/// returns.
///
/// Hijacking hands out the connection's pending upgrade, if the transport
/// provided one.
#[derive(Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    upgrade: Option<OnUpgrade>,
    hijacked: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upgrade(upgrade: Option<OnUpgrade>) -> Self {
        Self {
            upgrade,
            ..Self::default()
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// The response to send. A hijacked connection that never set a status
    /// answers 101, anything else defaults to 200.
    pub fn into_response(self) -> Response<Bytes> {
        let status = match (self.status, self.hijacked) {
            (Some(status), _) => status,
            (None, true) => StatusCode::SWITCHING_PROTOCOLS,
            (None, false) => StatusCode::OK,
        };
        let mut resp = Response::new(self.body.freeze());
        *resp.status_mut() = status;
        *resp.headers_mut() = self.headers;
        resp
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() && !self.hijacked {
            self.status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, WriterError> {
        if self.hijacked {
            return Err(WriterError::Hijacked);
        }
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        if self.hijacked {
            return Err(WriterError::Hijacked);
        }
        let upgrade = self.upgrade.take().ok_or(WriterError::Unsupported("hijack"))?;
        self.hijacked = true;
        Ok(upgrade)
    }
}
