use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use log::*;
use serde_json::Value as Json;
use tson::error::{self, Result};
use tson::stream::TextStream;

pub type EventStream = BoxStream<'static, Result<ServerEvent>>;

/// One event read from a `text/event-stream` body. `data` is carried as JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
    pub data: Option<Json>,
}

impl ServerEvent {
    /// An event without fields, as sent for a keep-alive comment.
    pub fn is_keep_alive(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Default)]
struct Pending {
    event: ServerEvent,
    data: Vec<String>,
}

impl Pending {
    fn finish(&mut self) -> Result<Option<ServerEvent>> {
        let Pending { mut event, data } = std::mem::take(self);
        if !data.is_empty() {
            event.data = Some(serde_json::from_str(&data.join("\n"))?);
        }
        if event.is_keep_alive() {
            trace!("Keep-alive received");
            return Ok(None);
        }
        Ok(Some(event))
    }
}

/// Parses event-stream lines into events. Comments and keep-alives are skipped, unknown
/// fields are ignored.
pub fn parse_events(mut lines: TextStream) -> EventStream {
    let events = try_stream! {
        let mut pending = Pending::default();

        while let Some(line) = lines.next().await {
            let line = line?;
            if line.is_empty() {
                if let Some(event) = pending.finish()? {
                    yield event;
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "event" => pending.event.event = Some(value.to_string()),
                "id" => pending.event.id = Some(value.to_string()),
                "retry" => {
                    let retry = value
                        .parse()
                        .map_err(|_| error::protocol(&format!("invalid retry {value:?}")))?;
                    pending.event.retry = Some(retry);
                }
                "data" => pending.data.push(value.to_string()),
                other => debug!("Ignoring unknown event field {other:?}"),
            }
        }

        // An event is only dispatched by its blank line; a partial one is dropped.
        if !pending.data.is_empty() {
            warn!("Transport ended inside an event");
        }
    };
    events.boxed()
}
