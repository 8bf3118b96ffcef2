//! Common types shared by every component.
//!
//! This module provides the building blocks used across the crate. It includes:
//! 1. **Attributes:** Visibility, class, type, tags, and metadata of observables.
//! 2. **Constants:** Hard caps on pools, bins, and identifiers.
//! 3. **Error Handling:** The crate-wide error enum and `Result` alias.

/// Instrumentation attributes.
pub mod attrs;

/// Process-wide constants.
pub mod constants;

/// Error types.
pub mod error;

pub use attrs::{InstrumentAttrs, InstrumentClass, InstrumentType, ValueSemantic, Visibility};
pub use error::{Result, StatsError};
