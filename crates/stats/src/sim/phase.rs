//! Lifecycle phases of the simulation tree.

/// Phase of the simulation tree.
///
/// Instruments are created in `Building` or `Configuring`. `finalize` resolves every
/// statistic expression and moves to `Finalized`, after which the structure is frozen
/// until `Teardown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Nodes are being constructed.
    #[default]
    Building,
    /// Parameters are being applied; nodes may still be added.
    Configuring,
    /// Expressions are being resolved.
    Finalizing,
    /// Structure frozen; the simulation runs.
    Finalized,
    /// Nodes are being destroyed bottom-up.
    Teardown,
}

impl Phase {
    /// Returns true while new nodes may be attached.
    #[inline]
    pub const fn allows_construction(self) -> bool {
        matches!(self, Self::Building | Self::Configuring)
    }
}
