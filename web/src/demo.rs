use std::time::Duration;

use futures::stream::{self, StreamExt};
use rand::Rng;
use tson::{AsyncIterable, Promise, Value};

const ITEMS: i32 = 10;

/// Random pause between 1 and 400 ms.
fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1..=400))
}

fn ticking(items: Vec<Value>) -> AsyncIterable {
    AsyncIterable::new(stream::iter(items).then(|item| async move {
        let delay = jitter();
        tokio::time::sleep(delay).await;
        Ok(item)
    }))
}

fn after_jitter(settle: tson::Result<Value>) -> Promise {
    let delay = jitter();
    Promise::new(async move {
        tokio::time::sleep(delay).await;
        settle
    })
}

/// A fresh value mixing plain data with async sources, one per request.
pub(crate) fn demo_value() -> Value {
    Value::object([
        (
            "bigints",
            Value::from(ticking(
                (0..ITEMS).map(|n| Value::BigInt(n.into())).collect(),
            )),
        ),
        ("foo", Value::from("bar")),
        (
            "numbers",
            Value::from(ticking((0..ITEMS).map(Value::from).collect())),
        ),
        ("promise", Value::from(after_jitter(Ok(42.into())))),
        (
            "rejectedPromise",
            Value::from(after_jitter(Err(tson::error::rejected(Value::object([(
                "message",
                Value::from("Rejected promise"),
            )]))))),
        ),
    ])
}
