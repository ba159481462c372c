//! Test helpers para portico-server.

#![allow(dead_code, unused_imports)]

pub mod client;
pub mod doubles;
pub mod tls;

pub use client::{TestClient, TestResponse, client};
pub use doubles::*;
pub use tls::self_signed;
