use async_stream::stream;
use futures::stream::StreamExt;

use super::{reason_of, status};
use crate::error::{self, Result};
use crate::registry::{Dispatch, IteratorHandler, TypeTester};
use crate::value::{AsyncIterable, Value, ValueStream};

/// Streams each item as `[0, value]`, then `[2]` on completion, or `[1, reason]` on failure.
pub struct AsyncIterableHandler;

enum Step {
    Item(Value),
    Done,
}

impl TypeTester for AsyncIterableHandler {
    fn key(&self) -> &str {
        "AsyncIterable"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Predicate
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::AsyncIterable(_))
    }
}

impl IteratorHandler for AsyncIterableHandler {
    fn serialize_iterator(&self, value: &Value) -> Result<ValueStream> {
        let Value::AsyncIterable(iterable) = value else {
            return Err(error::unhandled_type(&format!(
                "expected an async iterable, got {value:?}"
            )));
        };
        let mut source = iterable.take();

        let records = stream! {
            loop {
                match source.next().await {
                    Some(Ok(item)) => yield Ok(Value::array(vec![status::VALUE.into(), item])),
                    Some(Err(err)) => {
                        yield Ok(Value::array(vec![status::ERROR.into(), reason_of(err)]));
                        break;
                    }
                    None => {
                        yield Ok(Value::array(vec![status::DONE.into()]));
                        break;
                    }
                }
            }
        };
        Ok(records.boxed())
    }

    fn deserialize_iterator(&self, mut source: ValueStream) -> Result<Value> {
        let items = stream! {
            while let Some(record) = source.next().await {
                match record.and_then(step) {
                    Ok(Step::Item(item)) => yield Ok(item),
                    Ok(Step::Done) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(Value::AsyncIterable(AsyncIterable::new(items)))
    }
}

fn step(record: Value) -> Result<Step> {
    let items = record.to_items().unwrap_or_default();
    let is = |tag: &Value, expected: i32| tag.as_f64() == Some(expected.into());
    match items.as_slice() {
        [tag, item] if is(tag, status::VALUE) => Ok(Step::Item(item.clone())),
        [tag, reason] if is(tag, status::ERROR) => {
            Err(error::rejected(reason.clone()))
        }
        [tag] if is(tag, status::DONE) => Ok(Step::Done),
        _ => Err(error::protocol(&format!(
            "invalid async iterable record {record:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_items_are_followed_by_done_marker() {
        let value = Value::from(AsyncIterable::from_values(vec![1.into(), 2.into()]));
        let records: Vec<Value> = AsyncIterableHandler
            .serialize_iterator(&value)
            .unwrap()
            .map(|record| record.unwrap())
            .collect()
            .await;
        assert_eq!(
            records,
            vec![
                Value::array(vec![0.into(), 1.into()]),
                Value::array(vec![0.into(), 2.into()]),
                Value::array(vec![2.into()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_streamed_and_ends_the_source() {
        let failing = stream::iter(vec![
            Ok(Value::from(1)),
            Err(error::rejected("broken".into())),
            Ok(Value::from(2)),
        ]);
        let value = Value::from(AsyncIterable::new(failing));
        let records: Vec<Value> = AsyncIterableHandler
            .serialize_iterator(&value)
            .unwrap()
            .map(|record| record.unwrap())
            .collect()
            .await;
        assert_eq!(
            records,
            vec![
                Value::array(vec![0.into(), 1.into()]),
                Value::array(vec![1.into(), "broken".into()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_reconstruction_stops_at_done_marker() {
        let source = stream::iter(vec![
            Ok(Value::array(vec![0.into(), "a".into()])),
            Ok(Value::array(vec![2.into()])),
            Ok(Value::array(vec![0.into(), "ignored".into()])),
        ])
        .boxed();
        let Value::AsyncIterable(iterable) =
            AsyncIterableHandler.deserialize_iterator(source).unwrap()
        else {
            panic!("expected an async iterable");
        };
        let items: Vec<Value> = iterable.take().map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec![Value::from("a")]);
    }

    #[tokio::test]
    async fn test_reconstruction_surfaces_rejection() {
        let source = stream::iter(vec![Ok(Value::array(vec![1.into(), "why".into()]))]).boxed();
        let Value::AsyncIterable(iterable) =
            AsyncIterableHandler.deserialize_iterator(source).unwrap()
        else {
            panic!("expected an async iterable");
        };
        let items: Vec<_> = iterable.take().collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap_err().rejection(),
            Some(&Value::from("why"))
        );
    }
}
