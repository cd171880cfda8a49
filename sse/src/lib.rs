//! Server-Sent-Events transport for `tson` serializations.
//!
//! # Event sequence
//!
//! 1. A data event carrying the envelope (`{"json": ..., "nonce": ...}`)
//! 2. One data event per streamed `[index, value]` record, in emission order
//! 3. A `close` event with `null` data
//!
//! Events are built and written by axum's `Sse` response, each with a leading `:` comment
//! line. Keep-alives are lone comments. A transport that ends without the `close` event was
//! interrupted.
//!
//! # Modules
//!
//! - `event`: the parsed event type and the event-stream parser
//! - `encoder`: value to outgoing events
//! - `decoder`: events back to a value through `Tson::parse_frames`
//! - `response`: axum response carrying the event stream

pub mod decoder;
pub mod encoder;
pub mod event;
pub mod response;

pub use encoder::{encode, encode_records, OutgoingEvents, CLOSE_EVENT};
pub use event::{EventStream, ServerEvent};
pub use response::sse_response;
