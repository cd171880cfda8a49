//! Server-Sent-Events encoding of one serialization.
//!
//! The envelope goes out as the first event, each streamed record as one event, and a final
//! `close` event marks completion. A failure after the envelope ends the stream with the error
//! and without `close`, which the receiving side reads as an interruption.

use async_stream::try_stream;
use axum::response::sse::Event;
use futures::stream::{BoxStream, StreamExt};
use log::*;
use tson::{Envelope, Multiplexer, Result, Tson, Value};

pub const CLOSE_EVENT: &str = "close";

/// Events ready to be written by [`axum::response::sse::Sse`].
pub type OutgoingEvents = BoxStream<'static, Result<Event>>;

/// Every event starts with an empty comment line.
fn event() -> Event {
    Event::default().comment("")
}

/// Serializes `value` and encodes it as events.
pub fn encode(tson: &Tson, value: &Value) -> Result<OutgoingEvents> {
    let (envelope, records) = tson.serialize_async(value)?;
    encode_records(envelope, records)
}

pub fn encode_records(envelope: Envelope, mut records: Multiplexer) -> Result<OutgoingEvents> {
    let head = serde_json::to_string(&envelope)?;

    let events = try_stream! {
        yield event().data(head);

        while let Some(record) = records.next().await {
            yield event().data(serde_json::to_string(&record?)?);
        }

        debug!("All records sent; closing event stream");
        yield event().event(CLOSE_EVENT).data("null");
    };
    Ok(events.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{parse_events, ServerEvent};
    use crate::response::sse_response;
    use axum::body::to_bytes;
    use futures::stream;
    use serde_json::json;
    use std::time::Duration;
    use tson::stream::lines;
    use tson::{handlers, AsyncIterable, ErrorKind, Promise};

    fn tson() -> Tson {
        Tson::new(handlers::all())
            .unwrap()
            .with_nonce(|| "n".to_string())
    }

    async fn body_text(events: OutgoingEvents, keep_alive: Option<Duration>) -> String {
        let body = to_bytes(sse_response(events, keep_alive).into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn read_back(text: String) -> Vec<ServerEvent> {
        let transport = stream::iter(vec![Ok::<_, std::io::Error>(text)]);
        parse_events(lines(transport))
            .map(|event| event.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_head_records_then_close() {
        let value = Value::object([
            ("foo", Value::from("bar")),
            (
                "items",
                Value::from(AsyncIterable::from_values(vec![Value::from(1)])),
            ),
        ]);
        let text = body_text(encode(&tson(), &value).unwrap(), None).await;

        let blocks: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|block| block.starts_with(':')));
        assert!(text.ends_with("event: close\ndata: null\n\n"));

        let data = |json| ServerEvent {
            data: Some(json),
            ..Default::default()
        };
        assert_eq!(
            read_back(text).await,
            vec![
                data(json!({
                    "json": {"foo": "bar", "items": ["AsyncIterable", 0, "n"]},
                    "nonce": "n"
                })),
                data(json!([0, [0, 1]])),
                data(json!([0, [2]])),
                ServerEvent {
                    event: Some(CLOSE_EVENT.to_string()),
                    data: Some(json!(null)),
                    ..Default::default()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_ends_without_close() {
        let cyclic = Value::object(Vec::<(String, Value)>::new());
        cyclic.insert("self", cyclic.clone());
        let value = Value::from(Promise::resolved(cyclic));

        let events: Vec<Result<Event>> = encode(&tson(), &value).unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert_eq!(
            events[1].as_ref().unwrap_err().error_kind,
            ErrorKind::CircularReference
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_while_idle() {
        let slow = Promise::new(async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(Value::from(1))
        });
        let events = encode(&tson(), &Value::from(slow)).unwrap();
        let text = body_text(events, Some(Duration::from_millis(100))).await;

        assert_eq!(text.matches(":\n\n").count(), 2);
        let events = read_back(text).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, Some(json!({"json": ["Promise", 0, "n"], "nonce": "n"})));
        assert_eq!(events[1].data, Some(json!([0, [0, 1]])));
        assert_eq!(events[2].event.as_deref(), Some(CLOSE_EVENT));
    }

    #[tokio::test]
    async fn test_walk_failure_is_returned_before_any_event() {
        let cyclic = Value::array(vec![]);
        cyclic.push(cyclic.clone());
        assert!(encode(&tson(), &cyclic).is_err());
    }
}
