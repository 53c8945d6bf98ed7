use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tl_core::error::StoreError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("json encode failed: {message}")]
    JsonEncode { message: String },
    #[error("json decode failed: {message}")]
    JsonDecode { message: String },
    #[error("invalid enum value: {value}")]
    InvalidEnum { value: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("invalid id: {message}")]
    InvalidId { message: String },
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::JsonEncode { message } => StoreError::Query { message },
            other => StoreError::Decode {
                message: other.to_string(),
            },
        }
    }
}

pub fn query_error(err: rusqlite::Error) -> StoreError {
    StoreError::Query {
        message: err.to_string(),
    }
}

/// Fixed-width UTC form so that string order equals time order in SQL.
pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_rfc3339(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::InvalidTimestamp {
            value: value.to_string(),
        })
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|err| DbError::JsonEncode {
        message: err.to_string(),
    })
}

pub fn decode_json<T: DeserializeOwned>(value: &str) -> Result<T, DbError> {
    serde_json::from_str(value).map_err(|err| DbError::JsonDecode {
        message: err.to_string(),
    })
}

pub fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexicographically() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let later = whole + chrono::TimeDelta::milliseconds(250);
        assert!(to_rfc3339(&whole) < to_rfc3339(&later));
        assert_eq!(to_rfc3339(&whole), "2026-03-01T12:00:00.000000Z");
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let parsed = from_rfc3339(&to_rfc3339(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(matches!(
            from_rfc3339("yesterday"),
            Err(DbError::InvalidTimestamp { .. })
        ));
    }
}
