//! HTTP handlers.

pub mod cache;
pub mod health;
pub mod invalidate;
pub mod proxy;
