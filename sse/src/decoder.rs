//! Reading an event stream back into a value.

use std::error::Error as StdError;

use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use tson::error::Result;
use tson::stream::{lines, FrameStream};
use tson::{Envelope, Frame, StreamedRecord, Tson, Value};

use crate::encoder::CLOSE_EVENT;
use crate::event::{parse_events, EventStream};

/// Maps events to frames: the first data event is the envelope, later data events are records,
/// and the `close` event ends the stream.
pub fn frames(mut events: EventStream) -> FrameStream {
    let frames = try_stream! {
        let mut head_seen = false;

        while let Some(event) = events.next().await {
            let event = event?;
            if event.event.as_deref() == Some(CLOSE_EVENT) {
                yield Frame::Close;
                break;
            }
            let Some(data) = event.data else {
                continue;
            };

            if head_seen {
                let record: StreamedRecord = serde_json::from_value(data)?;
                yield Frame::Record(record);
            } else {
                let envelope: Envelope = serde_json::from_value(data)?;
                head_seen = true;
                yield Frame::Head(envelope);
            }
        }
    };
    frames.boxed()
}

/// Rebuilds a value from an event-stream byte transport.
///
/// A transport that ends without a `close` event fails the values still pending with
/// `StreamInterrupted`.
pub async fn parse<S, B, E>(tson: &Tson, transport: S) -> Result<Value>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    let frames = frames(parse_events(lines(transport)));
    tson.parse_frames(frames).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode, OutgoingEvents};
    use crate::response::sse_response;
    use axum::body::to_bytes;
    use futures::stream;
    use std::time::Duration;
    use tson::{handlers, AsyncIterable, ErrorKind, Promise};

    fn transport(text: String) -> impl Stream<Item = std::result::Result<String, std::io::Error>> {
        let chunks: Vec<std::result::Result<String, std::io::Error>> = text
            .as_bytes()
            .chunks(5)
            .map(|chunk| Ok(String::from_utf8_lossy(chunk).into_owned()))
            .collect();
        stream::iter(chunks)
    }

    async fn body_text(events: OutgoingEvents) -> String {
        let body = to_bytes(sse_response(events, None).into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_over_events() {
        let tson = Tson::new(handlers::all()).unwrap();
        let value = Value::object([
            ("foo", Value::from("bar")),
            ("big", Value::BigInt(-3)),
            ("answer", Value::from(Promise::resolved(42.into()))),
            (
                "letters",
                Value::from(AsyncIterable::from_values(vec!["a".into(), "b".into()])),
            ),
            (
                "refused",
                Value::from(Promise::rejected(Value::object([(
                    "message",
                    Value::from("denied"),
                )]))),
            ),
        ]);

        let text = body_text(encode(&tson, &value).unwrap()).await;
        let parsed = parse(&tson, transport(text)).await.unwrap();

        assert_eq!(parsed.get("foo"), Value::from("bar"));
        assert_eq!(parsed.get("big"), Value::BigInt(-3));

        let Value::Promise(answer) = parsed.get("answer") else {
            panic!("expected a promise");
        };
        assert_eq!(answer.settled().await.unwrap(), Value::from(42));

        let Value::AsyncIterable(letters) = parsed.get("letters") else {
            panic!("expected an async iterable");
        };
        let letters: Vec<Value> = letters.take().map(|l| l.unwrap()).collect().await;
        assert_eq!(letters, vec![Value::from("a"), Value::from("b")]);

        let Value::Promise(refused) = parsed.get("refused") else {
            panic!("expected a promise");
        };
        let reason = refused.settled().await.unwrap_err();
        assert_eq!(reason.rejection().unwrap().get("message"), Value::from("denied"));
    }

    #[tokio::test]
    async fn test_missing_close_event_interrupts_pending_values() {
        let tson = Tson::new(handlers::all()).unwrap();
        let never = Promise::new(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        });
        let value = Value::object([("never", Value::from(never))]);

        // Only the envelope event is sent before the transport closes.
        let head = encode(&tson, &value).unwrap().next().await.unwrap();
        let head = body_text(stream::iter(vec![head]).boxed()).await;
        let parsed = parse(&tson, transport(head)).await.unwrap();

        let Value::Promise(never) = parsed.get("never") else {
            panic!("expected a promise");
        };
        assert!(never.settled().await.unwrap_err().is_interrupted());
    }

    #[tokio::test]
    async fn test_empty_transport() {
        let tson = Tson::new(handlers::all()).unwrap();
        let err = parse(&tson, transport(String::new())).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::StreamInterrupted);
    }
}
