//! The JSON-lines request surface: routing, per-family handlers and the
//! queries they share.

mod error;
mod handlers;
mod helpers;
mod queries;
mod router;
mod types;

pub use error::bad_json;
pub use router::handle_request;
pub use types::{AppState, Request};
