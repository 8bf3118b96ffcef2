//! Counter that reads an externally owned integer.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::CounterBehavior;

/// Where a read-only counter gets its value.
#[derive(Clone)]
pub enum CounterSource {
    /// A shared cell owned by model code.
    Shared(Rc<Cell<u64>>),
    /// An arbitrary read function.
    Callback(Rc<dyn Fn() -> u64>),
}

impl CounterSource {
    /// Reads the current value.
    #[inline]
    pub fn read(&self) -> u64 {
        match self {
            Self::Shared(cell) => cell.get(),
            Self::Callback(f) => f(),
        }
    }
}

impl fmt::Debug for CounterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared(cell) => f.debug_tuple("Shared").field(&cell.get()).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<Rc<Cell<u64>>> for CounterSource {
    fn from(cell: Rc<Cell<u64>>) -> Self {
        Self::Shared(cell)
    }
}

/// Counter view on external state.
#[derive(Clone, Debug)]
pub struct ReadOnlyCounter {
    source: CounterSource,
    behavior: CounterBehavior,
}

impl ReadOnlyCounter {
    /// Creates a read-only counter over `source`.
    pub fn new(source: impl Into<CounterSource>, behavior: CounterBehavior) -> Self {
        Self {
            source: source.into(),
            behavior,
        }
    }

    /// Current value of the source.
    #[inline]
    pub fn get(&self) -> u64 {
        self.source.read()
    }

    /// Declared behavior of the underlying value.
    #[inline]
    pub const fn behavior(&self) -> CounterBehavior {
        self.behavior
    }
}
