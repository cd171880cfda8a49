use futures::stream::{self, StreamExt};

use super::{reason_of, status};
use crate::error::{self, Result};
use crate::registry::{Dispatch, IteratorHandler, TypeTester};
use crate::value::{Promise, Value, ValueStream};

/// Streams a promise as a single `[status, value]` record once it settles.
pub struct PromiseHandler;

impl TypeTester for PromiseHandler {
    fn key(&self) -> &str {
        "Promise"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Predicate
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::Promise(_))
    }
}

impl IteratorHandler for PromiseHandler {
    fn serialize_iterator(&self, value: &Value) -> Result<ValueStream> {
        let Value::Promise(promise) = value else {
            return Err(error::unhandled_type(&format!(
                "expected a promise, got {value:?}"
            )));
        };
        let promise = promise.clone();

        Ok(stream::once(async move {
            let record = match promise.settled().await {
                Ok(value) => Value::array(vec![status::VALUE.into(), value]),
                Err(err) => Value::array(vec![status::ERROR.into(), reason_of(err)]),
            };
            Ok(record)
        })
        .boxed())
    }

    fn deserialize_iterator(&self, mut source: ValueStream) -> Result<Value> {
        let promise = Promise::new(async move {
            match source.next().await {
                Some(Ok(record)) => settle(record),
                Some(Err(err)) => Err(err),
                None => Err(error::stream_interrupted("promise never settled")),
            }
        });
        Ok(Value::Promise(promise))
    }
}

fn settle(record: Value) -> Result<Value> {
    let items = record.to_items().unwrap_or_default();
    match items.as_slice() {
        [tag, value] if tag.as_f64() == Some(status::VALUE.into()) => Ok(value.clone()),
        [tag, reason] if tag.as_f64() == Some(status::ERROR.into()) => {
            Err(error::rejected(reason.clone()))
        }
        _ => Err(error::protocol(&format!(
            "invalid promise record {record:?}"
        ))),
    }
}
