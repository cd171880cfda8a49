use crate::error::{self, Result};
use crate::registry::{Dispatch, TypeTester, ValueHandler};
use crate::value::Value;

/// Encodes maps as an array of `[key, value]` pairs, preserving entry order.
pub struct MapHandler;

impl TypeTester for MapHandler {
    fn key(&self) -> &str {
        "Map"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Predicate
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::Map(_))
    }
}

impl ValueHandler for MapHandler {
    fn serialize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Map(entries) => Ok(Value::array(
                entries
                    .snapshot()
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![k, v]))
                    .collect(),
            )),
            other => Err(error::unhandled_type(&format!("expected a map, got {other:?}"))),
        }
    }

    fn deserialize(&self, payload: Value) -> Result<Value> {
        let pairs = payload
            .to_items()
            .ok_or_else(|| error::protocol("map payload must be an array"))?;

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match pair.to_items().as_deref() {
                Some([key, value]) => entries.push((key.clone(), value.clone())),
                _ => return Err(error::protocol("map entries must be [key, value] pairs")),
            }
        }
        Ok(Value::map(entries))
    }
}
