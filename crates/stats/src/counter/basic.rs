//! Plain counter with `Normal`, `Integral`, or `Latest` behavior.

use super::{CounterBehavior, IllegalUpdate};

/// Counter owning its value.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Counter {
    value: u64,
    behavior: CounterBehavior,
}

impl Counter {
    /// Creates a zeroed counter.
    pub const fn new(behavior: CounterBehavior) -> Self {
        Self { value: 0, behavior }
    }

    /// Current value.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.value
    }

    /// Update discipline.
    #[inline]
    pub const fn behavior(&self) -> CounterBehavior {
        self.behavior
    }

    /// Adds `k`; only for add-only behaviors. Returns the new value.
    #[inline]
    pub const fn increment(&mut self, k: u64) -> Result<u64, IllegalUpdate> {
        if !self.behavior.is_add_only() {
            return Err(IllegalUpdate::IncrementLatest);
        }
        self.value = self.value.wrapping_add(k);
        Ok(self.value)
    }

    /// Assigns `v`; only for `Latest`.
    #[inline]
    pub const fn set(&mut self, v: u64) -> Result<u64, IllegalUpdate> {
        if self.behavior.is_add_only() {
            return Err(IllegalUpdate::AssignAddOnly(self.behavior));
        }
        self.value = v;
        Ok(v)
    }
}
