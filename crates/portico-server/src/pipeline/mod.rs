//! Cache-aside request pipeline.
//!
//! Este modulo contiene:
//! - `CacheAsidePipeline`: lookup, fill e invalidacion sobre un `CacheStore`
//! - `InFlightFillSet`: coalescing de misses concurrentes por key

mod cache_aside;
mod inflight;

pub use cache_aside::{
    CacheAsidePipeline, CacheStatus, PipelineConfig, PipelineError, PipelineResponse,
};
pub use inflight::{FillGuard, FillOutcome, FillRole, FillWaiter, InFlightFillSet};
