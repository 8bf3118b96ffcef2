//! Bin layout shared by every histogram kind.

use crate::common::constants::MAX_HISTOGRAM_BINS;
use crate::common::{Result, StatsError};

/// Where a value lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinSlot {
    /// Below `lower`.
    Underflow,
    /// Regular bin index.
    Bin(usize),
    /// Above `upper`.
    Overflow,
}

/// Integer range split into power-of-two wide bins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinLayout {
    lower: u64,
    upper: u64,
    values_per_bin: u64,
    shift: u32,
    names: Option<Vec<String>>,
}

impl BinLayout {
    /// Validates `[lower, upper]` with `values_per_bin` values in each bin.
    ///
    /// Requires `upper > lower`, a power-of-two bin width, and a range that divides
    /// evenly into bins.
    pub fn new(name: &str, lower: u64, upper: u64, values_per_bin: u64) -> Result<Self> {
        let invalid = |reason: String| StatsError::InvalidHistogram {
            name: name.to_string(),
            reason,
        };
        if upper <= lower {
            return Err(invalid(format!(
                "upper bound {upper} must exceed lower bound {lower}"
            )));
        }
        if !values_per_bin.is_power_of_two() {
            return Err(invalid(format!(
                "values per bin ({values_per_bin}) must be a power of two"
            )));
        }
        let span = upper - lower;
        if span % values_per_bin != 0 {
            return Err(invalid(format!(
                "range {lower}..={upper} does not divide into bins of {values_per_bin}"
            )));
        }
        let bins = span / values_per_bin + 1;
        if bins > MAX_HISTOGRAM_BINS {
            return Err(invalid(format!(
                "{bins} bins exceed the limit of {MAX_HISTOGRAM_BINS}"
            )));
        }
        Ok(Self {
            lower,
            upper,
            values_per_bin,
            shift: values_per_bin.trailing_zeros(),
            names: None,
        })
    }

    /// One bin per name, covering `[0, names.len() - 1]`.
    pub fn named(name: &str, names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(StatsError::InvalidHistogram {
                name: name.to_string(),
                reason: "an enumerated histogram needs at least one state".to_string(),
            });
        }
        Ok(Self {
            lower: 0,
            upper: names.len() as u64 - 1,
            values_per_bin: 1,
            shift: 0,
            names: Some(names),
        })
    }

    /// Lowest value of the first bin.
    pub const fn lower(&self) -> u64 {
        self.lower
    }

    /// Highest in-range value.
    pub const fn upper(&self) -> u64 {
        self.upper
    }

    /// Bin width.
    pub const fn values_per_bin(&self) -> u64 {
        self.values_per_bin
    }

    /// Number of regular bins.
    pub const fn num_bins(&self) -> usize {
        (((self.upper - self.lower) >> self.shift) + 1) as usize
    }

    /// First value of bin `i`.
    pub const fn bin_start(&self, i: usize) -> u64 {
        self.lower + ((i as u64) << self.shift)
    }

    /// Slot for `value`.
    #[inline]
    pub const fn slot(&self, value: u64) -> BinSlot {
        if value < self.lower {
            BinSlot::Underflow
        } else if value > self.upper {
            BinSlot::Overflow
        } else {
            BinSlot::Bin(((value - self.lower) >> self.shift) as usize)
        }
    }

    /// Counter name of bin `i`: the enum variant name, or `bin_<first value>`.
    pub fn bin_name(&self, i: usize) -> String {
        match self.names.as_ref().and_then(|names| names.get(i)) {
            Some(name) => name.clone(),
            None => format!("bin_{}", self.bin_start(i)),
        }
    }

    /// True for enumerated layouts.
    pub const fn is_named(&self) -> bool {
        self.names.is_some()
    }
}
