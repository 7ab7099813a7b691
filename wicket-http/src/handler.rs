use crate::writer::ResponseWriter;
use async_trait::async_trait;
use axum::body::Body;
use http::Request;
use std::sync::Arc;
use wicket_core::HandlerError;

/// A request handler that reports failure by returning an error instead of
/// writing an error response itself.
///
/// Returning `Ok` means the handler wrote whatever it wanted to `w` (possibly
/// nothing, which is sent as an empty 200).
#[async_trait]
pub trait ReturnHandler: Send + Sync + 'static {
    async fn serve_http(
        &self,
        w: &mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: ReturnHandler + ?Sized> ReturnHandler for Arc<H> {
    async fn serve_http(
        &self,
        w: &mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> Result<(), HandlerError> {
        (**self).serve_http(w, req).await
    }
}

/// Adapter for handlers that don't need to await anything.
pub struct HandlerFn<F>(F);

/// Wrap a synchronous closure as a [`ReturnHandler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Body>) -> Result<(), HandlerError>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> ReturnHandler for HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Body>) -> Result<(), HandlerError>
        + Send
        + Sync
        + 'static,
{
    async fn serve_http(
        &self,
        w: &mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> Result<(), HandlerError> {
        (self.0)(w, &req)
    }
}
