use crate::error::Result;
use crate::registry::{Dispatch, TypeTester, ValueHandler};
use crate::value::{PrimitiveTag, Value};

/// Keeps `undefined` distinct from `null`, including inside arrays.
pub struct UndefinedHandler;

impl TypeTester for UndefinedHandler {
    fn key(&self) -> &str {
        "undefined"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Primitive(PrimitiveTag::Undefined)
    }
}

impl ValueHandler for UndefinedHandler {
    fn serialize(&self, _value: &Value) -> Result<Value> {
        Ok(Value::from(0))
    }

    fn deserialize(&self, _payload: Value) -> Result<Value> {
        Ok(Value::Undefined)
    }
}
