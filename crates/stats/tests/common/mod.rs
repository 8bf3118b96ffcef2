/// Tracing setup and tree fixtures.
pub mod harness;
