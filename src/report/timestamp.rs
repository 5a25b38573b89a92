//! Serde helpers for report timestamps.
//!
//! Timestamps are written as RFC 3339 strings. On input both RFC 3339 strings
//! and millisecond Unix epoch numbers are accepted, since page-context senders
//! stamp messages with `Date.now()`.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    fn into_datetime<E: de::Error>(self) -> Result<DateTime<Utc>, E> {
        match self {
            RawTimestamp::Millis(ms) => from_millis(ms),
            RawTimestamp::Float(ms) => from_millis(ms.trunc() as i64),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp {:?}: {}", text, e))),
        }
    }
}

fn from_millis<E: de::Error>(ms: i64) -> Result<DateTime<Utc>, E> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| E::custom(format!("timestamp out of range: {}", ms)))
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    RawTimestamp::deserialize(deserializer)?.into_datetime()
}

/// Same format for optional timestamps.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => super::serialize(dt, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<RawTimestamp>::deserialize(deserializer)?
            .map(RawTimestamp::into_datetime)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super")]
        at: DateTime<Utc>,
        #[serde(default, with = "super::option")]
        maybe: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_accepts_millis_and_rfc3339() {
        let from_ms: Stamped = serde_json::from_str(r#"{"at": 1761145424059}"#).unwrap();
        let from_text: Stamped =
            serde_json::from_str(r#"{"at": "2025-10-22T15:03:44.059Z"}"#).unwrap();
        assert_eq!(from_ms.at, from_text.at);
        assert!(from_ms.maybe.is_none());
    }

    #[test]
    fn test_serializes_rfc3339_millis() {
        let value = Stamped {
            at: Utc.timestamp_millis_opt(1761145424059).unwrap(),
            maybe: None,
        };
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"at\":\"2025-10-22T15:03:44.059Z\""));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at": "yesterday"}"#).is_err());
    }
}
