//! Hash-routed backend pool.
//!
//! - `BackendRouter`: seleccion determinista de backend por path
//! - `proxy`: forwarding de la request al backend seleccionado

pub mod proxy;
mod router;

pub use proxy::{ProxyError, forward};
pub use router::{BackendRouter, RouterError};
