//! Demo routes served through the request wrapper.

use axum::body::Body;
use http::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use http::{HeaderValue, Request, StatusCode};
use wicket_core::{HandlerError, HttpError, VisibleError};
use wicket_http::{ResponseWriter, add_browser_headers, clean_redirect_url};

const INDEX: &str = "<!doctype html>
<title>wicket</title>
<ul>
<li><a href=\"/hello?name=you\">/hello</a>
<li><a href=\"/fail\">/fail</a>
<li><a href=\"/teapot\">/teapot</a>
<li><a href=\"/quota\">/quota</a>
<li><a href=\"/go?next=%2Fhello\">/go</a>
<li><a href=\"/panic\">/panic</a>
<li><a href=\"/metrics\">/metrics</a>
<li><a href=\"/debug/vars\">/debug/vars</a>
</ul>
";

fn query_param(req: &Request<Body>, key: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn index(w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    add_browser_headers(w.headers_mut());
    w.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    w.write(INDEX.as_bytes())?;
    Ok(())
}

pub fn hello(w: &mut dyn ResponseWriter, req: &Request<Body>) -> Result<(), HandlerError> {
    let name = query_param(req, "name").unwrap_or_else(|| "world".to_owned());
    if name.len() > 64 {
        return Err(HttpError::new(400, "name too long").into());
    }
    w.write(format!("hello, {name}\n").as_bytes())?;
    Ok(())
}

pub fn fail(_w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    Err(anyhow::anyhow!("connection refused").context("loading greeting").into())
}

pub fn teapot(_w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    Err(HttpError::new(418, "I'm a teapot")
        .with_header(RETRY_AFTER, HeaderValue::from_static("120"))
        .into())
}

pub fn quota(_w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    Err(VisibleError::new("daily quota exceeded, try again tomorrow").into())
}

pub fn go(w: &mut dyn ResponseWriter, req: &Request<Body>) -> Result<(), HandlerError> {
    let next = query_param(req, "next").unwrap_or_default();
    let target = clean_redirect_url(&next, &[])
        .map_err(|e| HttpError::new(400, "invalid redirect").with_cause(e))?;
    let target = if target.is_empty() { "/".to_owned() } else { target };
    let location = HeaderValue::try_from(target)
        .map_err(|e| HttpError::new(400, "invalid redirect").with_cause(e))?;
    w.headers_mut().insert(LOCATION, location);
    w.write_header(StatusCode::SEE_OTHER);
    Ok(())
}

/// Everything no route claims, scanner traffic included.
pub fn not_found(_w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    Err(HttpError::new(404, "not found").into())
}

pub fn panic(_w: &mut dyn ResponseWriter, _req: &Request<Body>) -> Result<(), HandlerError> {
    panic!("deliberate panic from /panic");
}
