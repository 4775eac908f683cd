//! Store-native timestamps and their normalization to [`DateTime<Utc>`].
//!
//! The document store keeps time as a `{ seconds, nanoseconds }` pair
//! ([`StoreTimestamp`]). Documents written by other clients, or by hand, may
//! instead carry an RFC 3339 string or raw epoch milliseconds, and older
//! documents may be missing the field entirely. Every read path funnels the
//! raw value through [`TimestampInput`] and [`normalize`] so the rest of the
//! crate only ever sees one date type.
//!
//! # Fallback
//!
//! Inputs that cannot be converted normalize to "now". This is lossy: a
//! caller that receives a date for a malformed input must not treat it as
//! meaningful.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The store's own timestamp representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTimestamp {
    /// Whole seconds since the Unix epoch.
    pub seconds: i64,
    /// Sub-second part, `0..1_000_000_000`.
    pub nanoseconds: u32,
}

impl StoreTimestamp {
    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_date(Utc::now())
    }

    #[must_use]
    pub fn from_date(date: DateTime<Utc>) -> Self {
        Self {
            seconds: date.timestamp(),
            nanoseconds: date.timestamp_subsec_nanos(),
        }
    }

    /// Convert to a date; `None` when the pair is out of chrono's range.
    #[must_use]
    pub fn to_date(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds)
    }

    /// Microseconds since the epoch (saturating).
    #[must_use]
    pub fn to_micros(self) -> i64 {
        self.seconds
            .saturating_mul(1_000_000)
            .saturating_add(i64::from(self.nanoseconds / 1_000))
    }

    #[must_use]
    pub fn from_micros(micros: i64) -> Self {
        let seconds = micros.div_euclid(1_000_000);
        // rem_euclid keeps this in 0..1_000_000, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanoseconds = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Wire encoding used inside documents.
    #[must_use]
    pub fn to_value(self) -> Value {
        json!({ "seconds": self.seconds, "nanoseconds": self.nanoseconds })
    }

    /// Parse the wire encoding; `None` for any other shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let seconds = object.get("seconds")?.as_i64()?;
        let nanoseconds = match object.get("nanoseconds") {
            None => 0,
            Some(raw) => u32::try_from(raw.as_u64()?).ok()?,
        };
        Some(Self {
            seconds,
            nanoseconds,
        })
    }
}

/// Anything that knows how to turn itself into a date.
pub trait ToDate: fmt::Debug + Send + Sync {
    /// `None` when the value has no representable date.
    fn to_date(&self) -> Option<DateTime<Utc>>;
}

/// Milliseconds since the Unix epoch, as written by some clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochMillis(pub i64);

impl ToDate for EpochMillis {
    fn to_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

/// Every shape a timestamp field can arrive in.
#[derive(Debug)]
pub enum TimestampInput {
    /// The store-native pair.
    Store(StoreTimestamp),
    /// An already-converted date.
    Date(DateTime<Utc>),
    /// A value exposing its own date conversion.
    Convertible(Box<dyn ToDate>),
    /// Absent or unrecognised.
    Unknown,
}

impl TimestampInput {
    /// Classify a raw JSON field value.
    ///
    /// - object with integer `seconds` (and optional `nanoseconds`) → [`Store`](Self::Store)
    /// - RFC 3339 string → [`Date`](Self::Date)
    /// - integer → [`Convertible`](Self::Convertible) as epoch milliseconds
    /// - anything else → [`Unknown`](Self::Unknown)
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(_) => {
                StoreTimestamp::from_value(value).map_or(Self::Unknown, Self::Store)
            }
            Value::String(raw) => DateTime::parse_from_rfc3339(raw)
                .map_or(Self::Unknown, |date| Self::Date(date.with_timezone(&Utc))),
            Value::Number(number) => number
                .as_i64()
                .map_or(Self::Unknown, |millis| {
                    Self::Convertible(Box::new(EpochMillis(millis)))
                }),
            _ => Self::Unknown,
        }
    }
}

impl From<StoreTimestamp> for TimestampInput {
    fn from(value: StoreTimestamp) -> Self {
        Self::Store(value)
    }
}

impl From<DateTime<Utc>> for TimestampInput {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<Option<StoreTimestamp>> for TimestampInput {
    fn from(value: Option<StoreTimestamp>) -> Self {
        value.map_or(Self::Unknown, Self::Store)
    }
}

impl From<Option<DateTime<Utc>>> for TimestampInput {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Unknown, Self::Date)
    }
}

/// Convert any timestamp input to a date, falling back to now.
#[must_use]
pub fn normalize(input: impl Into<TimestampInput>) -> DateTime<Utc> {
    normalize_or(input, Utc::now)
}

/// Like [`normalize`], with the fallback supplied by the caller.
pub fn normalize_or(
    input: impl Into<TimestampInput>,
    fallback: impl FnOnce() -> DateTime<Utc>,
) -> DateTime<Utc> {
    let converted = match input.into() {
        TimestampInput::Store(stamp) => stamp.to_date(),
        TimestampInput::Date(date) => Some(date),
        TimestampInput::Convertible(value) => value.to_date(),
        TimestampInput::Unknown => None,
    };
    converted.unwrap_or_else(fallback)
}

/// Serde adapter: dates are written in the store-native shape and read back
/// through [`normalize`], so any accepted shape decodes.
pub mod wire {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use super::{StoreTimestamp, TimestampInput, normalize};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        StoreTimestamp::from_date(*date).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(normalize(TimestampInput::from_json(&raw)))
    }
}
