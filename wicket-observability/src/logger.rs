use wicket_core::AccessLogRecord;

/// Destination for access log lines and handler diagnostics.
pub trait LogSink: Send + Sync {
    /// Emit the finished access log record for one request.
    fn access(&self, record: &AccessLogRecord);

    /// Report a handler bug that was detected and worked around, such as
    /// setting the status twice.
    fn unexpected(&self, message: &str);
}

/// Sends access lines and diagnostics through `tracing`.
///
/// Access lines go to the `access` target: `info` below 500, `warn` for
/// server errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn access(&self, r: &AccessLogRecord) {
        if r.code >= 500 {
            tracing::warn!(
                target: "access",
                method = %r.method,
                uri = %r.request_uri,
                code = r.code,
                bytes = r.bytes,
                seconds = r.seconds,
                remote_addr = %r.remote_addr,
                request_id = %r.request_id,
                err = %r.err,
                "{r}"
            );
        } else {
            tracing::info!(
                target: "access",
                method = %r.method,
                uri = %r.request_uri,
                code = r.code,
                bytes = r.bytes,
                seconds = r.seconds,
                remote_addr = %r.remote_addr,
                request_id = %r.request_id,
                "{r}"
            );
        }
    }

    fn unexpected(&self, message: &str) {
        tracing::warn!(target: "access", "[unexpected] {message}");
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl LogSink for DiscardSink {
    #[inline]
    fn access(&self, _record: &AccessLogRecord) {}

    #[inline]
    fn unexpected(&self, _message: &str) {}
}
