//! Dotted path parsing and wildcard segments.
//!
//! Paths are dot-separated. A leading `.` is a no-op (explicitly relative) and every
//! further empty segment moves one level up, so `..x` names the sibling `x` of the
//! context and `...x` its uncle. Segments may contain `*` (any run) and `?` (one
//! character); each wildcard contributes one capture.

use std::cmp::Ordering;

use regex::Regex;

use crate::common::{Result, StatsError};

/// One step of a parsed path.
#[derive(Clone, Debug)]
pub enum PathStep {
    /// Move to the parent.
    Parent,
    /// Move to the child with this exact name.
    Child(String),
    /// Fan out to every child whose name matches.
    Pattern(SegmentPattern),
}

/// A single path segment containing wildcards.
#[derive(Clone, Debug)]
pub struct SegmentPattern {
    source: String,
    regex: Regex,
}

impl SegmentPattern {
    /// Compiles a wildcard segment.
    pub fn new(segment: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(segment.len() + 8);
        pattern.push('^');
        for ch in segment.chars() {
            match ch {
                '*' => pattern.push_str("(.*?)"),
                '?' => pattern.push_str("(.)"),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        let regex = Regex::new(&pattern)
            .map_err(|e| StatsError::parse(segment, 0, format!("bad wildcard segment: {e}")))?;
        Ok(Self {
            source: segment.to_string(),
            regex,
        })
    }

    /// The segment as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the wildcard captures if `name` matches.
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(name)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

/// Returns true if `segment` contains a wildcard character.
pub fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// Splits `path` into steps.
pub fn parse_path(path: &str) -> Result<Vec<PathStep>> {
    let body = path.strip_prefix('.').unwrap_or(path);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let mut steps = Vec::new();
    for segment in body.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            steps.push(PathStep::Parent);
        } else if has_wildcard(segment) {
            steps.push(PathStep::Pattern(SegmentPattern::new(segment)?));
        } else {
            steps.push(PathStep::Child(segment.to_string()));
        }
    }
    Ok(steps)
}

/// Compares two names so embedded numbers sort numerically (`core2` < `core10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((sa, ca)), Some((sb, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let ea = digit_run_end(a, sa);
                    let eb = digit_run_end(b, sb);
                    let na = a[sa..ea].trim_start_matches('0');
                    let nb = b[sb..eb].trim_start_matches('0');
                    let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    while ai.peek().is_some_and(|(i, _)| *i < ea) {
                        let _ = ai.next();
                    }
                    while bi.peek().is_some_and(|(i, _)| *i < eb) {
                        let _ = bi.next();
                    }
                } else {
                    let ord = ca.cmp(&cb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    let _ = ai.next();
                    let _ = bi.next();
                }
            }
        }
    }
}

fn digit_run_end(s: &str, start: usize) -> usize {
    s[start..]
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| start + i)
}

/// Expands `%0`/`%l` (full location) and `%N`/`%-N` (1-based wildcard capture,
/// negative counting from the end) in `template`.
pub fn substitute(template: &str, location: &str, captures: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template.char_indices().peekable();
    while let Some((at, c)) = rest.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if rest.next_if(|(_, n)| *n == 'l').is_some() {
            out.push_str(location);
            continue;
        }
        let negative = rest.next_if(|(_, n)| *n == '-').is_some();
        let mut digits = String::new();
        while let Some((_, d)) = rest.next_if(|(_, n)| n.is_ascii_digit()) {
            digits.push(d);
        }
        let index: usize = digits.parse().map_err(|_| {
            StatsError::parse(template, at, "`%` must be followed by `l` or a capture index")
        })?;
        if index == 0 {
            if negative {
                return Err(StatsError::parse(template, at, "capture `%-0` is not valid"));
            }
            out.push_str(location);
            continue;
        }
        let slot = if negative {
            captures.len().checked_sub(index)
        } else {
            Some(index - 1).filter(|i| *i < captures.len())
        };
        let capture = slot.and_then(|i| captures.get(i)).ok_or_else(|| {
            StatsError::parse(
                template,
                at,
                format!("capture index out of range ({} captured)", captures.len()),
            )
        })?;
        out.push_str(capture);
    }
    Ok(out)
}
