use crate::error::{self, Result};
use crate::registry::{Dispatch, TypeTester, ValueHandler};
use crate::value::{PrimitiveTag, Value};

/// Encodes big integers as decimal strings.
pub struct BigIntHandler;

impl TypeTester for BigIntHandler {
    fn key(&self) -> &str {
        "bigint"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Primitive(PrimitiveTag::BigInt)
    }
}

impl ValueHandler for BigIntHandler {
    fn serialize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::BigInt(n) => Ok(Value::String(n.to_string())),
            other => Err(error::unhandled_type(&format!("expected a bigint, got {other:?}"))),
        }
    }

    fn deserialize(&self, payload: Value) -> Result<Value> {
        payload
            .as_str()
            .and_then(|digits| digits.parse::<i128>().ok())
            .map(Value::BigInt)
            .ok_or_else(|| error::protocol(&format!("invalid bigint payload {payload:?}")))
    }
}
