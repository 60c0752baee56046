//! Canonical timeframe representation and per-provider codecs.
//!
//! The orchestration layer speaks one canonical notation: a bare minute count
//! (`"1"`, `"5"`, `"240"`) or `{N}{D|W|M}` for day, week, and month multiples
//! (`"1D"`, `"2W"`, `"6M"`). Every provider maps this bidirectionally to its
//! own native vocabulary through a [`TimeframeCodec`]; the two must be
//! inverses of each other on every value the provider declares.

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A timeframe string could not be interpreted.
#[derive(Debug, Error)]
pub enum TimeframeError {
    /// The text matches neither a minute count nor a recognized unit suffix.
    #[error("Invalid timeframe format: {0}")]
    InvalidFormat(String),

    /// The numeric magnitude is zero or not a valid number.
    #[error("Invalid timeframe value: {0}")]
    InvalidValue(String),

    /// The value is well-formed but outside this provider's vocabulary.
    #[error("Unsupported timeframe for this provider: {0}")]
    Unsupported(String),
}

/// Canonical bar interval: minutes, or day/week/month multiples.
///
/// Sub-daily intervals are always expressed in minutes, so one hour is
/// `Minutes(60)` and renders as `"60"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Minutes(u32),
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl Timeframe {
    /// Magnitude component, unit-agnostic.
    pub fn amount(&self) -> u32 {
        match *self {
            Timeframe::Minutes(n)
            | Timeframe::Days(n)
            | Timeframe::Weeks(n)
            | Timeframe::Months(n) => n,
        }
    }

    /// Whether the interval is shorter than one hour.
    pub fn is_sub_hour(&self) -> bool {
        matches!(self, Timeframe::Minutes(n) if *n < 60)
    }

    /// Whether the interval is intraday (shorter than one day).
    pub fn is_intraday(&self) -> bool {
        matches!(self, Timeframe::Minutes(_))
    }

    /// The span of a single bar, used to advance the download cursor past the
    /// last row a page returned.
    ///
    /// Months have no fixed length; the cursor falls back to one day and the
    /// dedup pass absorbs the resulting overlap.
    pub fn bar_span(&self) -> Duration {
        match *self {
            Timeframe::Minutes(n) => Duration::minutes(i64::from(n)),
            Timeframe::Days(n) => Duration::days(i64::from(n)),
            Timeframe::Weeks(n) => Duration::weeks(i64::from(n)),
            Timeframe::Months(_) => Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Timeframe::Minutes(n) => write!(f, "{n}"),
            Timeframe::Days(n) => write!(f, "{n}D"),
            Timeframe::Weeks(n) => write!(f, "{n}W"),
            Timeframe::Months(n) => write!(f, "{n}M"),
        }
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TimeframeError::InvalidFormat(s.to_string()));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            let mins: u32 = s
                .parse()
                .map_err(|_| TimeframeError::InvalidValue(s.to_string()))?;
            if mins == 0 {
                return Err(TimeframeError::InvalidValue(s.to_string()));
            }
            return Ok(Timeframe::Minutes(mins));
        }

        let (digits, unit) = s.split_at(s.len() - 1);
        let amount: u32 = digits
            .parse()
            .map_err(|_| TimeframeError::InvalidValue(digits.to_string()))?;
        if amount == 0 {
            return Err(TimeframeError::InvalidValue(digits.to_string()));
        }
        match unit {
            "D" => Ok(Timeframe::Days(amount)),
            "W" => Ok(Timeframe::Weeks(amount)),
            "M" => Ok(Timeframe::Months(amount)),
            _ => Err(TimeframeError::InvalidFormat(s.to_string())),
        }
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Bidirectional translation between the canonical timeframe and one
/// provider's native vocabulary.
///
/// Both directions are pure and total over the vocabulary the provider
/// declares, and round-trip: `to_native(to_canonical(v)) == v` for every
/// native `v`, and `to_canonical(to_native(c)) == c` for every canonical `c`
/// produced that way.
pub trait TimeframeCodec: Send + Sync {
    /// Parses a provider-native timeframe into the canonical form.
    fn to_canonical(&self, native: &str) -> Result<Timeframe, TimeframeError>;

    /// Renders a canonical timeframe in the provider's native form.
    fn to_native(&self, timeframe: &Timeframe) -> Result<String, TimeframeError>;
}

/// Suffix-letter vocabulary used by crypto exchange APIs: `1m`, `5m`, `4h`,
/// `1d`, `1w`, `1M` (lowercase `m` is minutes, uppercase `M` is months).
///
/// Whole-hour minute counts fold into the hour suffix, so the normalized
/// native form for canonical `"240"` is `"4h"`, never `"240m"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixCodec;

impl TimeframeCodec for SuffixCodec {
    fn to_canonical(&self, native: &str) -> Result<Timeframe, TimeframeError> {
        if native.len() < 2 {
            return Err(TimeframeError::InvalidFormat(native.to_string()));
        }
        let (digits, unit) = native.split_at(native.len() - 1);
        let amount: u32 = digits
            .parse()
            .map_err(|_| TimeframeError::InvalidValue(digits.to_string()))?;
        if amount == 0 {
            return Err(TimeframeError::InvalidValue(digits.to_string()));
        }
        match unit {
            "m" => Ok(Timeframe::Minutes(amount)),
            "h" => Ok(Timeframe::Minutes(amount * 60)),
            "d" => Ok(Timeframe::Days(amount)),
            "w" => Ok(Timeframe::Weeks(amount)),
            "M" => Ok(Timeframe::Months(amount)),
            _ => Err(TimeframeError::InvalidFormat(native.to_string())),
        }
    }

    fn to_native(&self, timeframe: &Timeframe) -> Result<String, TimeframeError> {
        match *timeframe {
            Timeframe::Minutes(n) if n >= 60 && n % 60 == 0 => Ok(format!("{}h", n / 60)),
            Timeframe::Minutes(n) => Ok(format!("{n}m")),
            Timeframe::Days(n) => Ok(format!("{n}d")),
            Timeframe::Weeks(n) => Ok(format!("{n}w")),
            Timeframe::Months(n) => Ok(format!("{n}M")),
        }
    }
}

/// Enumerated resolution names used by the Capital.com API.
const RESOLUTIONS: &[(&str, &str)] = &[
    ("1", "MINUTE"),
    ("5", "MINUTE_5"),
    ("10", "MINUTE_10"),
    ("15", "MINUTE_15"),
    ("30", "MINUTE_30"),
    ("60", "HOUR"),
    ("120", "HOUR_2"),
    ("240", "HOUR_4"),
    ("1D", "DAY"),
    ("1W", "WEEK"),
    ("1M", "MONTH"),
];

/// Fixed table of named resolutions (`MINUTE_5`, `HOUR`, `DAY`, ...).
///
/// Unlike [`SuffixCodec`], the vocabulary is a closed enumeration; canonical
/// values without a table entry are rejected as [`TimeframeError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionCodec;

impl TimeframeCodec for ResolutionCodec {
    fn to_canonical(&self, native: &str) -> Result<Timeframe, TimeframeError> {
        let upper = native.to_uppercase();
        let canonical = RESOLUTIONS
            .iter()
            .find(|(_, res)| *res == upper)
            .map(|(canon, _)| *canon)
            .ok_or_else(|| TimeframeError::InvalidFormat(native.to_string()))?;
        canonical.parse()
    }

    fn to_native(&self, timeframe: &Timeframe) -> Result<String, TimeframeError> {
        let canonical = timeframe.to_string();
        RESOLUTIONS
            .iter()
            .find(|(canon, _)| *canon == canonical)
            .map(|(_, res)| res.to_string())
            .ok_or(TimeframeError::Unsupported(canonical))
    }
}
