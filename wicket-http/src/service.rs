use crate::handler::ReturnHandler;
use crate::options::HandlerOptions;
use crate::std_handler::{Served, StdHandler};
use crate::writer::BufferedWriter;
use axum::body::Body;
use axum::response::Response;
use futures::future::BoxFuture;
use http::Request;
use hyper::upgrade::OnUpgrade;
use std::convert::Infallible;
use std::panic::resume_unwind;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::warn;
use wicket_core::AbortHandler;

/// [`StdHandler`] as a tower service, for mounting in an axum router or
/// serving directly with hyper.
///
/// The handler runs on its own task so a client disconnect (the transport
/// dropping the response future) does not skip the access record: the
/// request's [`CancellationToken`] is cancelled and the task still logs the
/// request, as 499 if the handler gave up with an error.
///
/// The response is buffered and sent after the handler returns. An aborted
/// request resumes the [`AbortHandler`] panic so the transport drops the
/// connection.
pub struct StdService<H> {
    inner: Arc<StdHandler<H>>,
}

impl<H> Clone for StdService<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ReturnHandler> StdService<H> {
    pub fn new(handler: H, opts: HandlerOptions) -> Self {
        Self {
            inner: Arc::new(StdHandler::new(handler, opts)),
        }
    }
}

impl<H: ReturnHandler> Service<Request<Body>> for StdService<H> {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        let token = CancellationToken::new();
        req.extensions_mut().insert(token.clone());
        Box::pin(async move {
            let task = tokio::spawn(async move {
                let upgrade = req.extensions_mut().remove::<OnUpgrade>();
                let mut writer = BufferedWriter::with_upgrade(upgrade);
                let served = inner.serve(&mut writer, req).await;
                (served, writer)
            });

            let disconnect = token.drop_guard();
            let joined = task.await;
            disconnect.disarm();

            match joined {
                Ok((Served::Complete, writer)) => Ok(writer.into_response().map(Body::from)),
                Ok((Served::Aborted, _)) => resume_unwind(Box::new(AbortHandler)),
                Err(e) => match e.try_into_panic() {
                    Ok(payload) => resume_unwind(payload),
                    Err(e) => {
                        warn!(error = %e, "handler task did not finish, dropping connection");
                        resume_unwind(Box::new(AbortHandler))
                    }
                },
            }
        })
    }
}
