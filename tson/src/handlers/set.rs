use crate::error::{self, Result};
use crate::registry::{Dispatch, TypeTester, ValueHandler};
use crate::value::Value;

pub struct SetHandler;

impl TypeTester for SetHandler {
    fn key(&self) -> &str {
        "Set"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Predicate
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::Set(_))
    }
}

impl ValueHandler for SetHandler {
    fn serialize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Set(members) => Ok(Value::array(members.snapshot())),
            other => Err(error::unhandled_type(&format!("expected a set, got {other:?}"))),
        }
    }

    fn deserialize(&self, payload: Value) -> Result<Value> {
        payload
            .to_items()
            .map(Value::set)
            .ok_or_else(|| error::protocol("set payload must be an array"))
    }
}
