use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{self, Result};
use crate::registry::{Dispatch, TypeTester, ValueHandler};
use crate::value::Value;

pub struct DateHandler;

impl TypeTester for DateHandler {
    fn key(&self) -> &str {
        "Date"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Predicate
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }
}

impl ValueHandler for DateHandler {
    fn serialize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Date(date) => Ok(Value::String(
                date.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            other => Err(error::unhandled_type(&format!("expected a date, got {other:?}"))),
        }
    }

    fn deserialize(&self, payload: Value) -> Result<Value> {
        let text = payload
            .as_str()
            .ok_or_else(|| error::protocol(&format!("invalid date payload {payload:?}")))?;
        DateTime::parse_from_rfc3339(text)
            .map(|date| Value::Date(date.with_timezone(&Utc)))
            .map_err(|e| error::protocol(&format!("invalid date {text:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_payload_is_rfc3339_millis() {
        let date = Utc.with_ymd_and_hms(2023, 10, 1, 12, 30, 0).unwrap();
        let payload = DateHandler.serialize(&Value::Date(date)).unwrap();
        assert_eq!(payload, Value::from("2023-10-01T12:30:00.000Z"));
        assert_eq!(DateHandler.deserialize(payload).unwrap(), Value::Date(date));
    }
}
