//! Reading-line parser.
//!
//! A reading line is `<name> <value>` where the name starts with the
//! configured sensor tag. Lines without the tag (boot banners, debug
//! chatter) are skipped without complaint.

use crate::registry::{GaugeRegistry, MetricsError};
use regex::Regex;
use thiserror::Error;

/// Default tag every reading name starts with.
pub const DEFAULT_PREFIX_PATTERN: &str = "^grove_sensor";

/// Reasons a tagged line could not be turned into a gauge update.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected `<name> <value>`, found {found} token(s)")]
    TokenCount { found: usize },
    #[error("gauge update rejected: {0}")]
    Registry(#[from] MetricsError),
}

/// Numeric value of a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    Integer(i64),
    Float(f64),
}

impl ReadingValue {
    /// Parses a raw value token with the digits-are-integers rule.
    ///
    /// A token made only of ASCII digits is an integer. Anything else is
    /// read as a float from its longest numeric prefix, so `-5` becomes
    /// `Float(-5.0)` and `45.2C` becomes `Float(45.2)`. An all-digit token
    /// that overflows `i64` is read as a float as well. A token with no
    /// numeric prefix at all is `Float(NaN)`; it still updates the gauge.
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(v) = raw.parse::<i64>() {
                return Self::Integer(v);
            }
        }

        Self::Float(float_prefix(raw))
    }

    /// Value as stored in a gauge.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Parses the longest leading substring of `s` that forms a decimal float.
///
/// Returns NaN when no such prefix exists.
fn float_prefix(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// One tagged line split into its name and raw value token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading<'a> {
    pub name: &'a str,
    pub raw_value: &'a str,
}

impl Reading<'_> {
    /// Applies [`ReadingValue::parse`] to the raw token.
    pub fn value(&self) -> ReadingValue {
        ReadingValue::parse(self.raw_value)
    }
}

/// What happened to a single line.
#[derive(Debug)]
pub enum LineOutcome {
    /// The line does not carry the sensor tag.
    Ignored,
    /// A gauge was created or updated.
    Recorded { name: String, value: ReadingValue },
    /// The line was tagged but malformed; nothing was updated.
    Rejected(ParseError),
}

impl LineOutcome {
    /// True if the registry was updated.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Turns raw serial lines into gauge updates.
#[derive(Debug, Clone)]
pub struct LineParser {
    prefix: Regex,
}

impl LineParser {
    /// Creates a parser that accepts lines matching `prefix`.
    pub fn new(prefix: Regex) -> Self {
        Self { prefix }
    }

    /// Compiles `pattern` and builds a parser from it.
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::new)
    }

    /// Returns the prefix pattern in use.
    pub fn pattern(&self) -> &str {
        self.prefix.as_str()
    }

    /// Splits a tagged line into a [`Reading`].
    ///
    /// Returns `Ok(None)` for lines without the tag.
    pub fn split<'a>(&self, text: &'a str) -> Result<Option<Reading<'a>>, ParseError> {
        if !self.prefix.is_match(text) {
            return Ok(None);
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            [name, raw_value] => Ok(Some(Reading {
                name: *name,
                raw_value: *raw_value,
            })),
            other => Err(ParseError::TokenCount { found: other.len() }),
        }
    }

    /// Processes one line and updates `registry` if it holds a valid reading.
    ///
    /// Malformed lines are logged and dropped; this never fails.
    pub fn apply(&self, line: &[u8], registry: &mut GaugeRegistry) -> LineOutcome {
        let text = String::from_utf8_lossy(line);

        match self.record(&text, registry) {
            Ok(Some((name, value))) => {
                tracing::trace!(name = %name, value = value.as_f64(), "Reading recorded");
                LineOutcome::Recorded { name, value }
            }
            Ok(None) => LineOutcome::Ignored,
            Err(e) => {
                tracing::warn!(line = %text.trim_end(), error = %e, "Dropping malformed reading");
                LineOutcome::Rejected(e)
            }
        }
    }

    fn record(
        &self,
        text: &str,
        registry: &mut GaugeRegistry,
    ) -> Result<Option<(String, ReadingValue)>, ParseError> {
        let Some(reading) = self.split(text)? else {
            return Ok(None);
        };
        let value = reading.value();
        registry.set(reading.name, value.as_f64())?;
        Ok(Some((reading.name.to_owned(), value)))
    }
}
