pub mod access_log;
pub mod clock;
pub mod config;
pub mod error;

pub use access_log::AccessLogRecord;
pub use clock::{Clock, SystemClock};
pub use config::WicketConfig;
pub use error::{AbortHandler, HandlerError, HttpError, VisibleError, WicketError};
