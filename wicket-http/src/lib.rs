pub mod guard;
pub mod handler;
pub mod observer;
pub mod options;
pub mod record;
pub mod request_id;
pub mod service;
pub mod std_handler;
pub mod writer;

pub use guard::{
    DebugAccess, DebugAccessPolicy, RedirectError, accepts_encoding, add_browser_headers,
    browser_headers_layer, clean_redirect_url, protect_debug,
};
pub use handler::{HandlerFn, ReturnHandler, handler_fn};
pub use observer::ResponseObserver;
pub use options::{HandlerOptions, OnCompletionFn, OnErrorFn, OnStartFn};
pub use record::{SecureTransport, access_record};
pub use request_id::{MakeWicketRequestId, request_id};
pub use service::StdService;
pub use std_handler::{CLIENT_CLOSED_REQUEST, Served, StdHandler};
pub use writer::{BufferedWriter, ResponseWriter, WriterError};
