//! Reconstruction of values from an envelope and the records streamed after it.
//!
//! Decoding the envelope leaves a placeholder for every async tuple: the iterator handler is
//! handed a source backed by a channel, and the value it builds is returned immediately. A
//! routing task then reads the remaining frames and pushes each record into the channel of its
//! iterator index. Closing the stream ends every channel; an interruption fails every
//! placeholder that is still open. A placeholder that failed or whose consumer went away is
//! retired, and later records for it are dropped.

use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::sync::Arc;

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use log::*;
use serde_json::Value as Json;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::error::{self, ErrorKind, Result};
use crate::frame::Frame;
use crate::multiplexer::StreamedRecord;
use crate::registry::{Handler, Registry};
use crate::stream::{lines, read_frames};
use crate::value::Value;
use crate::walker::IteratorIndex;
use crate::Tson;

pub(crate) struct Decoder {
    registry: Arc<Registry>,
    nonce: String,
    streaming: bool,
    placeholders: HashMap<IteratorIndex, UnboundedSender<Result<Value>>>,
    retired: HashSet<IteratorIndex>,
    // Repeated tuples for one index reconstruct to the same value.
    reconstructed: HashMap<IteratorIndex, Value>,
    // Set while a streamed record is decoded; a foreign tuple there is never user data.
    in_record: bool,
}

impl Decoder {
    /// A decoder that rejects async tuples.
    pub(crate) fn synchronous(registry: Arc<Registry>, nonce: &str) -> Self {
        Self::new(registry, nonce, false)
    }

    pub(crate) fn streaming(registry: Arc<Registry>, nonce: &str) -> Self {
        Self::new(registry, nonce, true)
    }

    fn new(registry: Arc<Registry>, nonce: &str, streaming: bool) -> Self {
        Self {
            registry,
            nonce: nonce.to_string(),
            streaming,
            placeholders: HashMap::new(),
            retired: HashSet::new(),
            reconstructed: HashMap::new(),
            in_record: false,
        }
    }

    pub(crate) fn decode(&mut self, json: &Json) -> Result<Value> {
        let value = match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(
                n.as_f64()
                    .ok_or_else(|| error::protocol(&format!("number {n} out of range")))?,
            ),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => match self.tuple(items)? {
                Some((handler, payload)) => self.decode_tuple(handler, payload)?,
                None => {
                    let mut decoded = Vec::with_capacity(items.len());
                    for item in items {
                        decoded.push(self.decode(item)?);
                    }
                    Value::array(decoded)
                }
            },
            Json::Object(entries) => {
                let mut decoded = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    decoded.push((key.clone(), self.decode(item)?));
                }
                Value::object(decoded)
            }
        };
        Ok(value)
    }

    /// Recognizes `[key, payload, nonce]`. A three-element array ending in a different nonce is
    /// plain data, except inside a streamed record where a registered key makes it a mismatch.
    fn tuple<'j>(&self, items: &'j [Json]) -> Result<Option<(Handler, &'j Json)>> {
        let [Json::String(key), payload, Json::String(nonce)] = items else {
            return Ok(None);
        };

        if *nonce == self.nonce {
            return match self.registry.get(key) {
                Some(handler) => Ok(Some((handler.clone(), payload))),
                None => Err(error::unknown_type(key)),
            };
        }

        if self.in_record && self.registry.get(key).is_some() {
            return Err(error::nonce_mismatch(&self.nonce, nonce));
        }
        Ok(None)
    }

    fn decode_tuple(&mut self, handler: Handler, payload: &Json) -> Result<Value> {
        match handler {
            Handler::Value(handler) => {
                let payload = self.decode(payload)?;
                handler.deserialize(payload)
            }
            Handler::Iterator(handler) => {
                if !self.streaming {
                    return Err(error::unhandled_type(&format!(
                        "{} values require a streamed transport",
                        handler.key()
                    )));
                }
                let index = payload
                    .as_u64()
                    .and_then(|index| IteratorIndex::try_from(index).ok())
                    .ok_or_else(|| {
                        error::protocol(&format!("invalid iterator index {payload}"))
                    })?;

                if let Some(value) = self.reconstructed.get(&index) {
                    return Ok(value.clone());
                }

                let (tx, mut rx) = mpsc::unbounded_channel();
                let source = stream! {
                    while let Some(payload) = rx.recv().await {
                        yield payload;
                    }
                };
                let value = handler.deserialize_iterator(source.boxed())?;
                trace!("Placeholder {index} created for {}", handler.key());
                self.placeholders.insert(index, tx);
                self.reconstructed.insert(index, value.clone());
                Ok(value)
            }
        }
    }

    /// Delivers one record to its placeholder.
    ///
    /// An unknown handler key inside the record fails and retires only that placeholder; any
    /// other failure is returned and ends routing.
    fn deliver(&mut self, StreamedRecord(index, json): StreamedRecord) -> Result<()> {
        if self.retired.contains(&index) {
            trace!("Dropping record for retired placeholder {index}");
            return Ok(());
        }
        if !self.placeholders.contains_key(&index) {
            return Err(error::protocol(&format!(
                "record for iterator index {index} without a placeholder"
            )));
        }

        self.in_record = true;
        let decoded = self.decode(&json);
        self.in_record = false;

        let payload = match decoded {
            Ok(value) => Ok(value),
            Err(err) if matches!(err.error_kind, ErrorKind::UnknownType(_)) => {
                warn!("Failing placeholder {index}: {err}");
                Err(err)
            }
            Err(err) => return Err(err),
        };
        let failed = payload.is_err();

        let delivered = self
            .placeholders
            .get(&index)
            .is_some_and(|tx| tx.send(payload).is_ok());
        if failed || !delivered {
            trace!("Retiring placeholder {index}");
            self.placeholders.remove(&index);
            self.retired.insert(index);
        }
        Ok(())
    }

    /// Ends every open placeholder normally.
    fn close(&mut self) {
        debug!("Stream closed; ending {} placeholder(s)", self.placeholders.len());
        self.placeholders.clear();
    }

    fn fail_all(&mut self, err: error::Error) {
        warn!(
            "Failing {} open placeholder(s): {err}",
            self.placeholders.len()
        );
        for (_, tx) in self.placeholders.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }

    fn has_placeholders(&self) -> bool {
        !self.placeholders.is_empty()
    }
}

/// Reads the frames following the envelope and feeds the placeholders until the stream closes.
async fn route<S>(mut decoder: Decoder, mut frames: S)
where
    S: Stream<Item = Result<Frame>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        let outcome = match frame {
            Ok(Frame::Record(record)) => decoder.deliver(record),
            Ok(Frame::Close) => {
                decoder.close();
                return;
            }
            Ok(Frame::Head(_)) => Err(error::protocol("unexpected second envelope")),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            decoder.fail_all(err);
            return;
        }
    }
    decoder.fail_all(error::stream_interrupted(
        "transport ended before the stream was closed",
    ));
}

impl Tson {
    /// Rebuilds a value from a stream of frames.
    ///
    /// Returns once the envelope was decoded; async values inside it are placeholders fed by a
    /// task spawned onto the current tokio runtime, which keeps reading `frames` until the
    /// stream closes.
    pub async fn parse_frames<S>(&self, frames: S) -> Result<Value>
    where
        S: Stream<Item = Result<Frame>> + Send + 'static,
    {
        let mut frames = Box::pin(frames);
        let envelope = match frames.next().await {
            Some(Ok(Frame::Head(envelope))) => envelope,
            Some(Ok(frame)) => {
                return Err(error::protocol(&format!(
                    "expected the envelope, got {frame:?}"
                )))
            }
            Some(Err(err)) => return Err(err),
            None => {
                return Err(error::stream_interrupted(
                    "transport ended before the envelope",
                ))
            }
        };

        let mut decoder = Decoder::streaming(Arc::clone(&self.registry), &envelope.nonce);
        let value = decoder.decode(&envelope.json)?;

        if decoder.has_placeholders() {
            tokio::spawn(route(decoder, frames));
        } else {
            trace!("No async values in envelope; not routing");
        }
        Ok(value)
    }

    /// Rebuilds a value from a framed-text byte transport.
    pub async fn parse_stream<S, B, E>(&self, transport: S) -> Result<Value>
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
    {
        self.parse_frames(read_frames(lines(transport))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers;
    use crate::value::Promise;
    use futures::stream;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new(handlers::all()).unwrap())
    }

    #[test]
    fn test_tuple_with_matching_nonce_is_decoded() {
        let mut decoder = Decoder::synchronous(registry(), "n");
        let value = decoder
            .decode(&json!({"a": ["bigint", "12", "n"], "b": ["undefined", 0, "n"]}))
            .unwrap();
        assert_eq!(value.get("a"), Value::BigInt(12));
        assert_eq!(value.get("b"), Value::Undefined);
    }

    #[test]
    fn test_unregistered_key_with_foreign_nonce_is_plain_array() {
        let mut decoder = Decoder::synchronous(registry(), "n");
        let value = decoder.decode(&json!(["a", 1, "b"])).unwrap();
        assert_eq!(value, Value::array(vec!["a".into(), 1.into(), "b".into()]));
    }

    #[test]
    fn test_registered_key_with_foreign_nonce_in_envelope_is_plain_array() {
        let mut decoder = Decoder::synchronous(registry(), "n");
        let value = decoder.decode(&json!(["Set", 1, "x"])).unwrap();
        assert_eq!(value, Value::array(vec!["Set".into(), 1.into(), "x".into()]));
    }

    #[test]
    fn test_registered_key_with_foreign_nonce_in_record_is_mismatch() {
        let mut decoder = Decoder::streaming(registry(), "n");
        decoder.decode(&json!(["Promise", 0, "n"])).unwrap();
        let err = decoder
            .deliver(StreamedRecord(0, json!([0, ["bigint", "1", "other"]])))
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::NonceMismatch);
    }

    #[test]
    fn test_unknown_key_with_own_nonce_is_unknown_type() {
        let mut decoder = Decoder::synchronous(registry(), "n");
        let err = decoder.decode(&json!(["Widget", 1, "n"])).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::UnknownType("Widget".to_string()));
    }

    #[test]
    fn test_synchronous_decoder_rejects_async_tuples() {
        let mut decoder = Decoder::synchronous(registry(), "n");
        let err = decoder.decode(&json!(["Promise", 0, "n"])).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::UnhandledType);
    }

    #[test]
    fn test_repeated_index_shares_placeholder() {
        let mut decoder = Decoder::streaming(registry(), "n");
        let value = decoder
            .decode(&json!([["Promise", 0, "n"], ["Promise", 0, "n"]]))
            .unwrap();
        let items = value.to_items().unwrap();
        let (Value::Promise(a), Value::Promise(b)) = (&items[0], &items[1]) else {
            panic!("expected promises");
        };
        assert!(a.ptr_eq(b));
    }

    fn head(json: Json) -> Result<Frame> {
        Ok(Frame::Head(crate::frame::Envelope {
            json,
            nonce: "n".to_string(),
        }))
    }

    fn settled_promise(value: &Value, key: &str) -> Promise {
        match value.get(key) {
            Value::Promise(promise) => promise,
            other => panic!("expected a promise, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_records_are_routed_to_placeholders() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![
            head(json!({"p": ["Promise", 0, "n"], "q": ["Promise", 1, "n"]})),
            Ok(Frame::Record(StreamedRecord(1, json!([0, "second"])))),
            Ok(Frame::Record(StreamedRecord(0, json!([1, "why"])))),
            Ok(Frame::Close),
        ]);
        let value = tson.parse_frames(frames).await.unwrap();

        let err = settled_promise(&value, "p").settled().await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Value::from("why")));
        assert_eq!(
            settled_promise(&value, "q").settled().await.unwrap(),
            Value::from("second")
        );
    }

    #[tokio::test]
    async fn test_interruption_fails_open_placeholders() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![head(json!({"p": ["Promise", 0, "n"]}))]);
        let value = tson.parse_frames(frames).await.unwrap();

        let err = settled_promise(&value, "p").settled().await.unwrap_err();
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn test_unknown_key_in_record_fails_only_its_placeholder() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![
            head(json!({"p": ["Promise", 0, "n"], "q": ["Promise", 1, "n"]})),
            Ok(Frame::Record(StreamedRecord(0, json!([0, ["Widget", 0, "n"]])))),
            Ok(Frame::Record(StreamedRecord(1, json!([0, "fine"])))),
            Ok(Frame::Close),
        ]);
        let value = tson.parse_frames(frames).await.unwrap();

        let err = settled_promise(&value, "p").settled().await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::UnknownType("Widget".to_string()));
        assert_eq!(
            settled_promise(&value, "q").settled().await.unwrap(),
            Value::from("fine")
        );
    }

    #[tokio::test]
    async fn test_records_for_dropped_iterable_are_discarded() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![
            head(json!({"ticks": ["AsyncIterable", 0, "n"], "p": ["Promise", 1, "n"]})),
            Ok(Frame::Record(StreamedRecord(0, json!([0, 1])))),
            Ok(Frame::Record(StreamedRecord(0, json!([0, 2])))),
            Ok(Frame::Record(StreamedRecord(0, json!([0, 3])))),
            Ok(Frame::Record(StreamedRecord(1, json!([0, "ok"])))),
            Ok(Frame::Close),
        ]);
        let value = tson.parse_frames(frames).await.unwrap();
        let Value::AsyncIterable(ticks) = value.get("ticks") else {
            panic!("expected an async iterable");
        };
        drop(ticks.take());

        assert_eq!(
            settled_promise(&value, "p").settled().await.unwrap(),
            Value::from("ok")
        );
    }

    #[tokio::test]
    async fn test_unknown_key_retires_iterable_and_later_records_are_dropped() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![
            head(json!({"ticks": ["AsyncIterable", 0, "n"], "p": ["Promise", 1, "n"]})),
            Ok(Frame::Record(StreamedRecord(0, json!([0, ["Widget", 0, "n"]])))),
            Ok(Frame::Record(StreamedRecord(0, json!([0, 2])))),
            Ok(Frame::Record(StreamedRecord(1, json!([0, "ok"])))),
            Ok(Frame::Close),
        ]);
        let value = tson.parse_frames(frames).await.unwrap();

        assert_eq!(
            settled_promise(&value, "p").settled().await.unwrap(),
            Value::from("ok")
        );
        let Value::AsyncIterable(ticks) = value.get("ticks") else {
            panic!("expected an async iterable");
        };
        let items: Vec<_> = ticks.take().collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap_err().error_kind,
            ErrorKind::UnknownType("Widget".to_string())
        );
    }

    #[tokio::test]
    async fn test_record_without_placeholder_fails_everything() {
        let tson = Tson::new(handlers::all()).unwrap();
        let frames = stream::iter(vec![
            head(json!({"p": ["Promise", 0, "n"]})),
            Ok(Frame::Record(StreamedRecord(7, json!([0, 1])))),
            Ok(Frame::Record(StreamedRecord(0, json!([0, 1])))),
            Ok(Frame::Close),
        ]);
        let value = tson.parse_frames(frames).await.unwrap();

        let err = settled_promise(&value, "p").settled().await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_missing_envelope() {
        let tson = Tson::new(handlers::all()).unwrap();
        let err = tson
            .parse_frames(stream::iter(vec![Ok(Frame::Close)]))
            .await
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Protocol);

        let err = tson
            .parse_frames(stream::iter(Vec::<Result<Frame>>::new()))
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
    }
}
