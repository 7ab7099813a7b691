use crate::writer::{ResponseWriter, WriterError};
use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;
use wicket_observability::LogSink;

/// Wraps the handler's writer and records what was sent.
///
/// Tracks the first status written (0 until then), body bytes and whether
/// the connection was hijacked. A second status is dropped and reported
/// through the sink instead of reaching the inner writer.
pub struct ResponseObserver<'a> {
    inner: &'a mut dyn ResponseWriter,
    sink: &'a dyn LogSink,
    code: u16,
    bytes: u64,
    hijacked: bool,
}

impl<'a> ResponseObserver<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, sink: &'a dyn LogSink) -> Self {
        Self {
            inner,
            sink,
            code: 0,
            bytes: 0,
            hijacked: false,
        }
    }

    /// Status sent so far, or 0.
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn hijacked(&self) -> bool {
        self.hijacked
    }

    /// Flush if the inner writer can, without reporting when it can't.
    pub(crate) fn try_flush(&mut self) {
        if let Err(e) = self.inner.flush() {
            tracing::trace!(error = %e, "flush after panic failed");
        }
    }
}

impl ResponseWriter for ResponseObserver<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.code != 0 {
            self.sink.unexpected(&format!(
                "HTTP handler set status code twice ({} and {})",
                self.code,
                status.as_u16()
            ));
            return;
        }
        self.code = status.as_u16();
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, WriterError> {
        if self.code == 0 {
            self.code = 200;
        }
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        match self.inner.flush() {
            Err(WriterError::Unsupported(_)) => {
                self.sink
                    .unexpected("tried to flush a response writer that can't flush");
                Ok(())
            }
            other => other,
        }
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        let upgrade = self.inner.hijack()?;
        self.hijacked = true;
        Ok(upgrade)
    }
}
