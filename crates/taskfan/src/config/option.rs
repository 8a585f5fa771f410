use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// A raw concurrency setting, before it is resolved to a worker count.
///
/// Settings arrive from environment variables (always strings) or from code
/// (booleans and numbers). Every valid shape resolves to a count of at least
/// one:
///
/// | Value                  | Resolves to                     |
/// |------------------------|---------------------------------|
/// | `Unset`                | the default concurrency         |
/// | `Bool(true)`           | the default concurrency         |
/// | `Bool(false)`          | `1`                             |
/// | `Int(n)`               | `max(n, 1)`                     |
/// | `Float(x)`, integral   | same as `Int`                   |
/// | `Text("true"/"false")` | same as `Bool`                  |
/// | `Text(numeric)`        | same as the parsed number       |
///
/// Anything else fails with [`Error::InvalidConcurrencyOption`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ConcurrencyOption {
    #[default]
    Unset,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConcurrencyOption {
    /// Coerces this option into a worker count, using `default` for the
    /// unset and `true` cases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConcurrencyOption`] for strings that are neither
    /// boolean nor integer tokens, and for non-integral numbers.
    pub fn parse(&self, default: usize) -> Result<usize> {
        match self {
            Self::Unset | Self::Bool(true) => Ok(default),
            Self::Bool(false) => Ok(1),
            Self::Int(n) => Ok(clamp_count(*n)),
            Self::Float(x) => integral(*x)
                .map(clamp_count)
                .ok_or_else(|| self.invalid()),
            Self::Text(text) => match text.as_str() {
                "true" => Ok(default),
                "false" => Ok(1),
                _ => parse_number(text)
                    .map(clamp_count)
                    .ok_or_else(|| self.invalid()),
            },
        }
    }

    fn invalid(&self) -> Error {
        Error::InvalidConcurrencyOption {
            value: self.to_string(),
        }
    }
}

impl fmt::Display for ConcurrencyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("undefined"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for ConcurrencyOption {
    type Err = Error;

    /// Validates `s` eagerly so command-line parsers can reject bad values up
    /// front. The resulting option is always `Text`.
    fn from_str(s: &str) -> Result<Self> {
        let option = Self::Text(s.to_owned());
        option.parse(1)?;
        Ok(option)
    }
}

impl From<bool> for ConcurrencyOption {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ConcurrencyOption {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ConcurrencyOption {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for ConcurrencyOption {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for ConcurrencyOption {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ConcurrencyOption {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for ConcurrencyOption {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ConcurrencyOption {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl<T: Into<ConcurrencyOption>> From<Option<T>> for ConcurrencyOption {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unset, Into::into)
    }
}

fn clamp_count(n: i64) -> usize {
    if n < 1 {
        1
    } else {
        usize::try_from(n).unwrap_or(usize::MAX)
    }
}

/// Returns the integer value of `x` if it is finite and has no fractional
/// part. Values beyond `i64` saturate.
fn integral(x: f64) -> Option<i64> {
    if x.is_finite() && x.fract() == 0.0 {
        // `as` saturates for out-of-range floats.
        Some(x as i64)
    } else {
        None
    }
}

/// Numeric coercion for string settings. Blank strings count as zero, and
/// unsigned `0x`, `0o` and `0b` literals are accepted.
fn parse_number(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    if let Some(n) = parse_prefixed(trimmed) {
        return n;
    }
    match trimmed.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => trimmed.parse::<f64>().ok().and_then(integral),
    }
}

/// Parses a radix-prefixed literal. Returns `None` when `text` has no prefix,
/// and `Some(None)` when it has one but the digits are invalid.
fn parse_prefixed(text: &str) -> Option<Option<i64>> {
    let radix = match text.get(..2)? {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };
    let digits = &text[2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Some(None);
    }
    // Digits are valid, so the only failure left is overflow.
    Some(Some(i64::from_str_radix(digits, radix).unwrap_or(i64::MAX)))
}
