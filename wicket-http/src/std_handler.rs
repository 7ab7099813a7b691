//! The request wrapper: runs a [`ReturnHandler`], turns its errors (and
//! panics) into responses and emits one access record plus counter updates
//! per request.

use crate::handler::ReturnHandler;
use crate::observer::ResponseObserver;
use crate::options::{HandlerOptions, OnCompletionFn, OnErrorFn, OnStartFn};
use crate::record::access_record;
use crate::writer::ResponseWriter;
use axum::body::Body;
use futures::FutureExt;
use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, Request, StatusCode};
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wicket_core::{AbortHandler, AccessLogRecord, Clock, HandlerError, HttpError, SystemClock};
use wicket_observability::{
    BucketedStats, LabelCounter, LogSink, TracingSink, family_label, response_code_label,
};

/// Status logged when the client went away before the handler finished.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
const NOSNIFF: HeaderValue = HeaderValue::from_static("nosniff");

/// How a request ended, as far as the transport is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// Send whatever was written.
    Complete,
    /// The handler asked to abort: drop the connection without a response.
    Aborted,
}

/// What the handler's result means for the response.
enum Outcome<'e> {
    Hijacked,
    Cancelled,
    Typed(&'e HttpError),
    Failed(&'e HandlerError),
    Success,
}

fn classify(err: Option<&HandlerError>, hijacked: bool, cancelled: bool) -> Outcome<'_> {
    if hijacked {
        return Outcome::Hijacked;
    }
    match err {
        None => Outcome::Success,
        Some(_) if cancelled => Outcome::Cancelled,
        Some(HandlerError::Http(e)) => Outcome::Typed(e),
        Some(other) => Outcome::Failed(other),
    }
}

/// Wraps a [`ReturnHandler`] with access logging, error responses, panic
/// recovery and status/bucket counters.
pub struct StdHandler<H> {
    handler: H,
    quiet: bool,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    status_family: Option<Arc<dyn LabelCounter>>,
    status_full: Option<Arc<dyn LabelCounter>>,
    bucketed: Option<BucketedStats>,
    on_start: Option<OnStartFn>,
    on_error: Option<OnErrorFn>,
    on_completion: Option<OnCompletionFn>,
}

impl<H: ReturnHandler> StdHandler<H> {
    pub fn new(handler: H, opts: HandlerOptions) -> Self {
        Self {
            handler,
            quiet: opts.quiet_logging_if_successful,
            sink: opts.log_sink.unwrap_or_else(|| Arc::new(TracingSink)),
            clock: opts.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            status_family: opts.status_code_counters,
            status_full: opts.status_code_counters_full,
            bucketed: opts.bucketed_stats,
            on_start: opts.on_start,
            on_error: opts.on_error,
            on_completion: opts.on_completion,
        }
    }

    /// Serve one request, writing the response to `w`.
    ///
    /// A handler panic is re-raised once the request has been logged and
    /// counted. An abort (returned or panicked) yields [`Served::Aborted`] or
    /// resumes the [`AbortHandler`] panic respectively; in both cases the
    /// error body written to `w` must not be sent.
    pub async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) -> Served {
        let (parts, body) = req.into_parts();
        let mut record = access_record(&parts, self.clock.now());
        let ticket = self.bucketed.as_ref().map(|bs| bs.begin(&parts));
        if let Some(on_start) = &self.on_start {
            on_start(&parts, &record);
        }
        let cancel = parts.extensions.get::<CancellationToken>().cloned();
        let req = Request::from_parts(parts, body);

        let mut lw = ResponseObserver::new(w, &*self.sink);
        let result = AssertUnwindSafe(self.handler.serve_http(&mut lw, req))
            .catch_unwind()
            .await;
        let (err, panic) = match result {
            Ok(res) => (res.err(), None),
            Err(payload) if (*payload).is::<AbortHandler>() => {
                (Some(HandlerError::Abort), Some(payload))
            }
            Err(payload) => {
                let err = HandlerError::Other(anyhow::anyhow!(
                    "panic: {}\n\n{}",
                    panic_message(&*payload),
                    Backtrace::force_capture()
                ));
                (Some(err), Some(payload))
            }
        };

        let cancelled = cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        let mut code = lw.code();
        match classify(err.as_ref(), lw.hijacked(), cancelled) {
            Outcome::Hijacked => {
                if code == 0 {
                    code = StatusCode::SWITCHING_PROTOCOLS.as_u16();
                }
            }
            Outcome::Cancelled => {
                code = CLIENT_CLOSED_REQUEST;
                record.err = "context canceled".to_owned();
            }
            Outcome::Typed(herr) => {
                record.err = herr.log_text();
                if lw.code() != 0 {
                    self.sink.unexpected(&format!(
                        "handler returned HttpError {herr}, but already sent a response with code {}",
                        lw.code()
                    ));
                } else {
                    code = self.write_http_error(&mut lw, &record, herr);
                }
            }
            Outcome::Failed(e) => {
                record.err = e.to_string();
                if lw.code() == 0 {
                    code = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
                    write_internal_error(&mut lw, &record);
                }
            }
            Outcome::Success => {
                if code == 0 {
                    code = StatusCode::OK.as_u16();
                }
            }
        }

        record.code = code;
        record.bytes = lw.bytes();
        record.set_elapsed(self.clock.now());

        if let Some(on_completion) = &self.on_completion {
            on_completion(&record);
        }
        if let (Some(bs), Some(ticket)) = (&self.bucketed, ticket) {
            bs.finish(ticket, code);
        }
        if !self.quiet || (code != 200 && code != 304) {
            self.sink.access(&record);
        }
        if let Some(counter) = &self.status_family {
            counter.add(&family_label(code), 1);
        }
        if let Some(counter) = &self.status_full {
            counter.add(&response_code_label(code), 1);
        }

        if let Some(payload) = panic {
            lw.try_flush();
            std::panic::resume_unwind(payload);
        }
        if err.as_ref().is_some_and(HandlerError::is_abort) {
            Served::Aborted
        } else {
            Served::Complete
        }
    }

    fn write_http_error(
        &self,
        lw: &mut ResponseObserver<'_>,
        record: &AccessLogRecord,
        herr: &HttpError,
    ) -> u16 {
        let status = herr.status();
        if status.as_u16() != herr.code {
            self.sink.unexpected(&format!(
                "HttpError {herr} did not contain an HTTP status code, sending internal server error"
            ));
        }

        if let Some(on_error) = &self.on_error {
            on_error(&mut *lw, record, herr);
            return match lw.code() {
                0 => status.as_u16(),
                written => written,
            };
        }

        let headers = lw.headers_mut();
        set_error_headers(headers);
        for name in herr.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &herr.headers {
            headers.append(name.clone(), value.clone());
        }
        lw.write_header(status);
        write_error_body(lw, &herr.message, record.request_id());
        status.as_u16()
    }
}

fn set_error_headers(headers: &mut http::HeaderMap) {
    headers.insert(CONTENT_TYPE, TEXT_PLAIN);
    headers.insert(X_CONTENT_TYPE_OPTIONS, NOSNIFF);
}

fn write_internal_error(lw: &mut ResponseObserver<'_>, record: &AccessLogRecord) {
    set_error_headers(lw.headers_mut());
    lw.write_header(StatusCode::INTERNAL_SERVER_ERROR);
    write_error_body(lw, "internal server error", record.request_id());
}

/// The message on its own line, then the request id on its own line.
fn write_error_body(lw: &mut ResponseObserver<'_>, message: &str, request_id: Option<&str>) {
    let mut body = String::with_capacity(message.len() + 40);
    body.push_str(message);
    body.push('\n');
    if let Some(id) = request_id {
        body.push_str(id);
        body.push('\n');
    }
    if let Err(e) = lw.write(body.as_bytes()) {
        tracing::debug!(error = %e, "failed to write error response body");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<HttpError>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<HandlerError>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<anyhow::Error>() {
        format!("{e:#}")
    } else {
        "non-string panic payload".to_owned()
    }
}
