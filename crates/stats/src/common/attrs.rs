//! Instrumentation attributes carried by every observable node.
//!
//! Counters, statistic definitions, histograms, and parameters all expose the same
//! attribute record. Reports and the filter language read these attributes to decide
//! what to include by default.

use std::collections::BTreeSet;
use std::fmt;

/// Prominence hint in `[0, MAX]`. Larger values are more likely to appear in default reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Visibility(pub u32);

impl Visibility {
    /// Never shown unless explicitly requested.
    pub const HIDDEN: Self = Self(0);
    /// Support-level detail, useful when debugging a model.
    pub const SUPPORT: Self = Self(1_000_000);
    /// Detailed breakdowns.
    pub const DETAIL: Self = Self(10_000_000);
    /// Ordinary statistics.
    pub const NORMAL: Self = Self(100_000_000);
    /// Summary-level statistics.
    pub const SUMMARY: Self = Self(200_000_000);
    /// Critical statistics that should always appear.
    pub const CRITICAL: Self = Self(1_000_000_000);
    /// Largest representable visibility.
    pub const MAX: Self = Self(u32::MAX);

    /// Looks up a named reference point (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hidden" => Some(Self::HIDDEN),
            "support" => Some(Self::SUPPORT),
            "detail" => Some(Self::DETAIL),
            "normal" => Some(Self::NORMAL),
            "summary" => Some(Self::SUMMARY),
            "critical" => Some(Self::CRITICAL),
            "max" => Some(Self::MAX),
            _ => None,
        }
    }

    /// Resolves an `AUTO` (`None`) request against a container default.
    #[inline]
    pub fn resolve(requested: Option<Self>, container_default: Self) -> Self {
        requested.unwrap_or(container_default)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Importance class in `[0, MAX]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InstrumentClass(pub u32);

impl InstrumentClass {
    /// Unclassified.
    pub const OTHER: Self = Self(0);
    /// Important to most users of the model.
    pub const IMPORTANT: Self = Self(50);
    /// Critical to every user of the model.
    pub const CRITICAL: Self = Self(100);
}

/// Kind of observable, as seen by filters and formatters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentType {
    /// A named arithmetic expression.
    StatisticDef,
    /// A plain, cycle, or read-only counter.
    Counter,
    /// A model parameter.
    Parameter,
    /// A histogram node.
    Histogram,
}

impl InstrumentType {
    /// Parses the filter-language spelling (`counter`, `stat`, `param`, `histogram`).
    pub fn from_filter_name(name: &str) -> Option<Self> {
        match name {
            "counter" => Some(Self::Counter),
            "stat" | "statistic" | "statistic_def" => Some(Self::StatisticDef),
            "param" | "parameter" => Some(Self::Parameter),
            "histogram" | "hist" => Some(Self::Histogram),
            _ => None,
        }
    }
}

/// How a statistic's value should be interpreted by formatters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ValueSemantic {
    /// A plain quantity.
    #[default]
    Absolute,
    /// A value in `[0, 100]`.
    Percentage,
    /// A value in `[0, 1]`.
    Fractional,
}

/// Attribute record attached to every instrumented node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentAttrs {
    /// Free-form description shown next to the value.
    pub description: String,
    /// Prominence hint.
    pub visibility: Visibility,
    /// Importance class.
    pub class: InstrumentClass,
    /// Observable kind.
    pub ty: InstrumentType,
    /// Free-form tags matched by the filter language.
    pub tags: BTreeSet<String>,
    /// Ordered key/value metadata.
    pub metadata: Vec<(String, String)>,
}

impl InstrumentAttrs {
    /// Creates attributes with `NORMAL` visibility and `OTHER` class.
    pub fn new(ty: InstrumentType, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            visibility: Visibility::NORMAL,
            class: InstrumentClass::OTHER,
            ty,
            tags: BTreeSet::new(),
            metadata: Vec::new(),
        }
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the class.
    #[must_use]
    pub const fn with_class(mut self, class: InstrumentClass) -> Self {
        self.class = class;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let _ = self.tags.insert(tag.into());
        self
    }

    /// Appends a metadata entry, replacing any existing value for `key`.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.metadata.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.metadata.push((key, value));
        }
    }

    /// Returns the metadata value for `key`, if present.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
