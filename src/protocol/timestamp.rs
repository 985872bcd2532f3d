//! ISO-8601 timestamp parsing.
//!
//! A trailing `Z` or numeric offset is honoured; zone-less timestamps are UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp and normalize it to UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapters for registry timestamps using [`parse_timestamp`].
pub mod serde_iso {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::super::parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn zulu_suffix_is_utc() {
        assert_eq!(parse_timestamp("2025-01-01T00:00:00Z"), Some(utc(2025, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn offsets_are_normalized() {
        assert_eq!(
            parse_timestamp("2025-01-01T09:00:00+09:00"),
            Some(utc(2025, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn zoneless_is_treated_as_utc() {
        assert_eq!(parse_timestamp("2025-03-04T05:06:07"), Some(utc(2025, 3, 4, 5, 6, 7)));
        assert_eq!(parse_timestamp("2025-03-04 05:06:07.250").map(|t| t.timestamp()), Some(utc(2025, 3, 4, 5, 6, 7).timestamp()));
        assert_eq!(parse_timestamp("2025-03-04"), Some(utc(2025, 3, 4, 0, 0, 0)));
    }

    #[test]
    fn fractional_seconds_survive() {
        let ts = parse_timestamp("2025-01-01T00:00:00.123456Z").unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2025-13-01T00:00:00Z").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
