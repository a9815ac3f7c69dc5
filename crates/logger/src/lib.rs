//! Shared tracing setup for the Uppe binaries.

mod tracing;

pub use crate::tracing::{LogFormat, init_tracing, init_tracing_with};
