//! Error definitions for the instrumentation and report subsystem.
//!
//! This module defines the single error type shared by every component. It provides:
//! 1. **Instrument Errors:** Illegal counter updates, bad parents, invalid histogram shapes.
//! 2. **Expression Errors:** Parse failures, unresolved paths, and dependency cycles.
//! 3. **Report Errors:** Duplicate names, malformed triggers, exhausted sub-report identifiers.
//! 4. **Lifecycle Errors:** Phase violations, stale arena handles, detached timers.
//! 5. **I/O Errors:** Wrapping `std::io`, YAML, JSON, and CSV failures for report files.

use std::path::PathBuf;

use thiserror::Error;

use crate::sim::phase::Phase;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StatsError>;

/// All failures raised by counters, statistics, histograms, timers, and reports.
#[derive(Debug, Error)]
pub enum StatsError {
    /// An update was attempted that the instrument's behavior forbids.
    ///
    /// Raised when assigning to a `Normal`/`Integral` counter, incrementing a
    /// `Latest` counter, or double-starting/stopping a cycle counter.
    #[error("illegal behavior on `{location}`: {reason}")]
    IllegalBehavior {
        /// Location of the offending instrument.
        location: String,
        /// What was attempted.
        reason: String,
    },

    /// A node was registered under a parent of the wrong kind.
    #[error("bad parent for `{name}`: {reason}")]
    BadParent {
        /// Name of the node being added.
        name: String,
        /// Why the parent was rejected.
        reason: String,
    },

    /// A path did not resolve to any node.
    #[error("unresolved path `{path}` relative to `{context}`")]
    UnresolvedPath {
        /// The path as written.
        path: String,
        /// Location of the node the path was resolved against.
        context: String,
    },

    /// A statistic definition depends on itself through some chain.
    #[error("cyclic statistic expression through `{location}`")]
    CyclicExpression {
        /// Location of a statistic on the cycle.
        location: String,
    },

    /// A non-empty statistic name was used twice in one report.
    #[error("duplicate statistic name `{name}` in report `{report}`")]
    DuplicateStatName {
        /// The colliding name.
        name: String,
        /// The report that already holds it.
        report: String,
    },

    /// Syntax error in an expression, filter, or report definition.
    #[error("parse error in `{input}` at offset {offset}: {message}")]
    Parse {
        /// The text being parsed.
        input: String,
        /// Byte offset of the failure.
        offset: usize,
        /// Description of the failure.
        message: String,
    },

    /// A trigger definition is nested or malformed.
    #[error("trigger error: {0}")]
    Trigger(String),

    /// The state-timer pool hit its hard cap.
    #[error("state timer pool exhausted ({cap} timers active)")]
    PoolExhausted {
        /// The configured cap.
        cap: usize,
    },

    /// A structural mutation was attempted in the wrong lifecycle phase.
    #[error("operation `{operation}` not permitted in phase {phase:?}")]
    Phase {
        /// What was attempted.
        operation: String,
        /// The phase the tree was in.
        phase: Phase,
    },

    /// The report-definition parser ran out of sub-report identifiers.
    #[error("out of sub-report identifiers (limit {limit})")]
    OutOfUid {
        /// The identifier limit.
        limit: u32,
    },

    /// A handle refers to a node slot that has since been reused or removed.
    #[error("stale node handle #{index} (generation {generation})")]
    StaleNode {
        /// Arena index.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// A node exists but is not of the kind the operation requires.
    #[error("node `{location}` is not a {expected}")]
    WrongNodeKind {
        /// Location of the node.
        location: String,
        /// The expected kind.
        expected: &'static str,
    },

    /// Two siblings share a name.
    #[error("node `{parent}` already has a child named `{name}`")]
    DuplicateNodeName {
        /// Location of the parent.
        parent: String,
        /// The colliding name.
        name: String,
    },

    /// A registry already holds an entry with this name.
    #[error("duplicate registration `{0}`")]
    DuplicateRegistration(String),

    /// Histogram bounds or bin width are inconsistent.
    #[error("invalid histogram `{name}`: {reason}")]
    InvalidHistogram {
        /// Histogram name.
        name: String,
        /// Which constraint was violated.
        reason: String,
    },

    /// `end_state` named a state that is not the active one.
    #[error("state `{state}` is not active in state set `{set}`")]
    NoActiveState {
        /// State set name.
        set: String,
        /// State that was expected to be active.
        state: String,
    },

    /// A timer handle outlived the unit that owns its pool.
    #[error("state timer handle used after its unit was torn down")]
    DetachedTimer,

    /// Aggregated failure at the end of a report-definition document.
    #[error("{} error(s) in report definition {}:\n  {}", errors.len(), file.display(), errors.join("\n  "))]
    ReportDefinition {
        /// The file being consumed (or `<string>`).
        file: PathBuf,
        /// Every error collected while walking the document.
        errors: Vec<String>,
    },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML decoding failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding or decoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// CSV writer failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl StatsError {
    /// Builds an [`StatsError::IllegalBehavior`].
    pub fn illegal(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IllegalBehavior {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`StatsError::Parse`].
    pub fn parse(input: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            offset,
            message: message.into(),
        }
    }

    /// Builds an [`StatsError::UnresolvedPath`].
    pub fn unresolved(path: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnresolvedPath {
            path: path.into(),
            context: context.into(),
        }
    }
}
