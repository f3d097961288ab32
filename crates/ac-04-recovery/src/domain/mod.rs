//! Recovery domain: pure state machines and value types.

pub mod backoff;
pub mod checkpoint;
pub mod circuit_breaker;
pub mod error;
