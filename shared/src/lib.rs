//! Integration layer for Fiber services: Kafka producers and workers, push
//! notifications over FCM, and shared process bootstrap.

// Module tree lives under fiber_common/; everything is re-exported at the
// crate root so callers write `fiber_common::kafka`, `fiber_common::push`.
mod fiber_common;
pub use fiber_common::*;
