//! Tower layers comunes a los tres listeners.
//!
//! `RequestIdLayer` debe quedar por fuera de `LoggingLayer`: el span de
//! logging lee el [`RequestId`] que deja en las extensions.

mod logging;
mod request_id;

pub use logging::{LoggingLayer, LoggingMiddleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, RequestIdLayer, RequestIdMiddleware};
