use crate::core::{DataType, Result, TtmError, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

const TIMESTAMP_INPUTS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses a wire string into a timestamp or date value.
///
/// Timestamps accept RFC 3339 (the offset is normalised to UTC), the plain
/// `date time` forms, or a bare date meaning midnight.
pub fn parse_temporal(text: &str, data_type: &DataType) -> Result<Value> {
    let text = text.trim();
    match data_type {
        DataType::Timestamp => parse_timestamp(text).map(Value::Timestamp),
        DataType::Date => parse_date(text).map(Value::Date),
        other => Err(TtmError::argument(format!(
            "{other} is not a date/time type"
        ))),
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Ok(with_offset.naive_utc());
    }
    for format in TIMESTAMP_INPUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| TtmError::argument(format!("'{text}' is not a valid timestamp")))
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(text).map(|ts| ts.date()))
        .map_err(|_| TtmError::argument(format!("'{text}' is not a valid date")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_dates_become_midnight_timestamps() {
        let value = parse_temporal("2023-05-06", &DataType::Timestamp).unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 5, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(value, Value::Timestamp(expected));
    }

    #[test]
    fn accepts_rfc3339_and_fractional_seconds() {
        assert!(parse_temporal("2023-05-06T10:00:00+02:00", &DataType::Timestamp).is_ok());
        assert!(parse_temporal("2023-05-06 10:00:00.123456", &DataType::Timestamp).is_ok());
        assert_eq!(
            parse_temporal("2023-05-06 10:00:00", &DataType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2023, 5, 6).unwrap())
        );
    }

    #[test]
    fn garbage_is_an_argument_fault() {
        let err = parse_temporal("yesterday", &DataType::Date).unwrap_err();
        assert!(matches!(err, TtmError::Argument(_)));
        assert!(parse_temporal("2023-01-01", &DataType::Text).is_err());
    }
}
