/// Origin timestamps, stored as RFC3339 strings in UTC.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|err| serde::de::Error::custom(format!("bad timestamp {:?}: {}", raw, err)))
    }
}

/// Serializing `std::time::Duration`s with Serde as whole milliseconds.
pub mod millis {
    use serde::de::Visitor;
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    struct MillisVisitor;
    impl<'de> Visitor<'de> for MillisVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a non-negative number of milliseconds")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u64::try_from(v)
                .map(Duration::from_millis)
                .map_err(|_| E::custom(format!("negative duration: {}ms", v)))
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_u64(MillisVisitor)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_derive::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamp {
        #[serde(with = "super::iso8601")]
        at: DateTime<Utc>,
        #[serde(with = "super::millis")]
        took: Duration,
    }

    #[test]
    fn stamps_are_written_as_rfc3339_and_millis() {
        let stamp = Stamp {
            at: Utc.with_ymd_and_hms(2023, 3, 1, 21, 9, 32).unwrap(),
            took: Duration::from_millis(1500),
        };
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"at":"2023-03-01T21:09:32+00:00","took":1500}"#);
        assert_eq!(serde_json::from_str::<Stamp>(&json).unwrap(), stamp);
    }

    #[test]
    fn negative_durations_are_rejected() {
        let json = r#"{"at":"2023-03-01T21:09:32+00:00","took":-1}"#;
        assert!(serde_json::from_str::<Stamp>(json).is_err());
    }
}
