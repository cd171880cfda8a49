use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::multiplexer::StreamedRecord;

/// The synchronous skeleton of a value, sent before any streamed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub json: Json,
    pub nonce: String,
}

/// One logical unit of either wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Head(Envelope),
    Record(StreamedRecord),
    /// The producer finished; every source completed.
    Close,
}
