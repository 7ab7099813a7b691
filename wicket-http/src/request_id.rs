use http::request::Parts;
use http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const REQUEST_ID_PREFIX: &str = "REQ-";

/// Generates `REQ-` followed by a random UUID in simple form.
///
/// Use with `tower_http::request_id::SetRequestIdLayer`; the wrapper picks
/// the id up from the request extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeWicketRequestId;

impl MakeRequestId for MakeWicketRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = format!("{REQUEST_ID_PREFIX}{}", Uuid::new_v4().simple());
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The id assigned by the request id layer, if any.
pub fn request_id(parts: &Parts) -> Option<&str> {
    parts
        .extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .filter(|id| !id.is_empty())
}
