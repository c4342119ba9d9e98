use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

use crate::error::CodecError;

const MIN_SECONDS: i64 = -62_135_596_800; // 0001-01-01T00:00:00Z
const MAX_SECONDS: i64 = 253_402_300_800; // 10000-01-01T00:00:00Z, exclusive
const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// An instant in UTC with nanosecond precision, counted from the Unix epoch.
///
/// This is the codec's temporal type. Its zero value ([`Timestamp::ZERO`],
/// the first instant of year 1) is never used as an "unset" marker: the
/// canonical default is [`Timestamp::REFERENCE`], the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    /// The zero instant, 0001-01-01T00:00:00Z.
    pub const ZERO: Timestamp = Timestamp {
        seconds: MIN_SECONDS,
        nanos: 0,
    };

    /// The fixed reference instant, 1970-01-01T00:00:00Z.
    pub const REFERENCE: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    /// Creates a timestamp, rejecting instants outside years 1 through 9999.
    pub fn new(seconds: i64, nanos: u32) -> Result<Self, CodecError> {
        if !(MIN_SECONDS..MAX_SECONDS).contains(&seconds) {
            return Err(CodecError::data(format!(
                "timestamp seconds {seconds} outside [{MIN_SECONDS}, {MAX_SECONDS})"
            )));
        }
        if nanos >= NANOS_PER_SECOND {
            return Err(CodecError::data(format!("timestamp nanos {nanos} >= 1e9")));
        }
        Ok(Timestamp { seconds, nanos })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        // The constructor keeps every timestamp inside chrono's range.
        DateTime::from_timestamp(self.seconds, self.nanos).unwrap_or_default()
    }

    pub fn to_rfc3339(&self) -> String {
        self.to_datetime().to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn parse_rfc3339(text: &str) -> Result<Self, CodecError> {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| CodecError::data(format!("bad RFC 3339 time {text:?}: {e}")))?;
        Timestamp::try_from(parsed.with_timezone(&Utc))
    }
}

impl TryFrom<DateTime<Utc>> for Timestamp {
    type Error = CodecError;

    fn try_from(dt: DateTime<Utc>) -> Result<Self, Self::Error> {
        Timestamp::new(dt.timestamp(), dt.timestamp_subsec_nanos())
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.to_datetime()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_unix_epoch() {
        assert_eq!(Timestamp::REFERENCE.to_rfc3339(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn zero_is_year_one() {
        assert_eq!(Timestamp::ZERO.to_rfc3339(), "0001-01-01T00:00:00Z");
        assert_ne!(Timestamp::ZERO, Timestamp::REFERENCE);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Timestamp::new(MIN_SECONDS - 1, 0).is_err());
        assert!(Timestamp::new(MAX_SECONDS, 0).is_err());
        assert!(Timestamp::new(0, NANOS_PER_SECOND).is_err());
        assert!(Timestamp::new(MAX_SECONDS - 1, NANOS_PER_SECOND - 1).is_ok());
    }

    #[test]
    fn rfc3339_roundtrip_keeps_nanos() {
        let ts = Timestamp::new(1_700_000_000, 123_456_789).unwrap();
        let text = ts.to_rfc3339();
        assert_eq!(text, "2023-11-14T22:13:20.123456789Z");
        assert_eq!(Timestamp::parse_rfc3339(&text).unwrap(), ts);
    }

    #[test]
    fn parse_normalizes_offsets() {
        let ts = Timestamp::parse_rfc3339("1970-01-01T01:00:00+01:00").unwrap();
        assert_eq!(ts, Timestamp::REFERENCE);
    }
}
