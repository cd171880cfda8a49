//! The line-framed text protocol.
//!
//! A serialization is written as one JSON array spread over lines: the envelope first, then an
//! inner array holding one `[index, value]` record per line, in the order the multiplexer emitted
//! them. The text only parses as a whole once the final `]]` line was written, so a truncated
//! transport is always detectable.
//!
//! ```text
//! [
//!   {"json":{"foo":["Promise",0,"1f3e…"]},"nonce":"1f3e…"}
//!   ,
//!   [
//!     [0,[0,"bar"]]
//! ]]
//! ```

use std::error::Error as StdError;

use async_stream::try_stream;
use futures::stream::{BoxStream, Stream, StreamExt};
use log::*;

use crate::error::{self, Result};
use crate::frame::{Envelope, Frame};
use crate::multiplexer::{Multiplexer, StreamedRecord};
use crate::value::Value;
use crate::Tson;

/// Chunks of framed text, or lines of it when read back.
pub type TextStream = BoxStream<'static, Result<String>>;

pub type FrameStream = BoxStream<'static, Result<Frame>>;

impl Tson {
    /// Serializes `value` into framed text, indenting nested lines by `space` spaces.
    ///
    /// Walk failures of the root value are returned immediately. A failure after the envelope
    /// was written ends the text stream with that error and without the closing line.
    pub fn stringify_stream(&self, value: &Value, space: usize) -> Result<TextStream> {
        let (envelope, records) = self.serialize_async(value)?;
        frame_text(envelope, records, space)
    }
}

/// Writes an envelope followed by the records of `records`.
pub fn frame_text(envelope: Envelope, mut records: Multiplexer, space: usize) -> Result<TextStream> {
    let head = serde_json::to_string(&envelope)?;
    let indent = " ".repeat(space);

    let text = try_stream! {
        yield "[\n".to_string();
        yield format!("{indent}{head}\n");
        yield format!("{indent},\n");
        yield format!("{indent}[\n");

        let mut first = true;
        while let Some(record) = records.next().await {
            let record = serde_json::to_string(&record?)?;
            let separator = if first { "" } else { "," };
            first = false;
            yield format!("{indent}{indent}{separator}{record}\n");
        }

        yield "]]\n".to_string();
    };
    Ok(text.boxed())
}

/// Splits a byte transport into lines, without the `\n` or `\r\n` terminator.
///
/// Transport errors become `StreamInterrupted`. A trailing line without terminator is still
/// yielded when the transport ends.
pub fn lines<S, B, E>(transport: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    let lines = try_stream! {
        let mut transport = Box::pin(transport);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = transport.next().await {
            let chunk = chunk.map_err(|err| error::stream_interrupted_by(err.into()))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(end) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                yield decode_line(&line[..end])?;
            }
        }

        if !buffer.is_empty() {
            yield decode_line(&buffer)?;
        }
    };
    lines.boxed()
}

fn decode_line(line: &[u8]) -> Result<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8(line.to_vec()).map_err(|err| error::protocol(&err.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Head,
    Separator,
    Records,
    Closed,
}

/// Reads framed text back into frames. Blank lines and indentation are ignored.
///
/// Ending before the closing line is a `StreamInterrupted` error; anything that does not fit the
/// framing is a `Protocol` error.
pub fn read_frames(mut lines: TextStream) -> FrameStream {
    let frames = try_stream! {
        let mut phase = Phase::Opening;

        while let Some(line) = lines.next().await {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match phase {
                Phase::Opening if line == "[" => phase = Phase::Head,
                Phase::Head => {
                    let envelope: Envelope = serde_json::from_str(line)?;
                    phase = Phase::Separator;
                    yield Frame::Head(envelope);
                }
                Phase::Separator if line == "," => {}
                Phase::Separator if line == "[" => phase = Phase::Records,
                Phase::Records if line == "]]" => {
                    phase = Phase::Closed;
                    yield Frame::Close;
                }
                Phase::Records => {
                    let record = line.strip_prefix(',').unwrap_or(line);
                    let record: StreamedRecord = serde_json::from_str(record)?;
                    yield Frame::Record(record);
                }
                Phase::Closed => {
                    warn!("Ignoring content after the closing line");
                }
                _ => {
                    Err(error::protocol(&format!("unexpected line {line:?} in {phase:?} phase")))?;
                }
            }
        }

        if phase != Phase::Closed {
            Err(error::stream_interrupted("transport ended before the stream was closed"))?;
        }
    };
    frames.boxed()
}
