//! # tson
//!
//! JSON serialization for richly-typed values, including values that resolve asynchronously.
//!
//! ## Architecture
//!
//! - **Registry**: immutable, two-tier handler dispatch (primitive tag table, then ordered
//!   predicates).
//! - **Walker**: value to JSON transform with cycle detection and shared-reference collapse.
//!   Handled values become `[key, payload, nonce]` tuples.
//! - **Multiplexer**: fans in the async sources the walker discovers into one ordered stream of
//!   `[index, value]` records.
//! - **Framer**: writes the envelope, then records one per line, as a JSON array that is only
//!   complete once every source finished.
//! - **Deserializer**: rebuilds the envelope, then routes streamed records to the placeholders
//!   it left for async values.
//!
//! A [`Tson`] is built once from a handler list and reused across calls; every call gets its
//! own nonce and its own walker and multiplexer state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tson::{handlers, Tson, Value};
//!
//! let tson = Tson::new(handlers::all())?;
//! let value = Value::object([("foo", Value::array(vec![1.into(), Value::Undefined]))]);
//! let text = tson.stringify(&value)?;
//! assert_eq!(tson.parse(&text)?, value);
//! ```

use std::sync::Arc;

mod deserialize;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod multiplexer;
pub mod nonce;
pub mod registry;
pub mod stream;
pub mod value;
mod walker;

pub use error::{Error, ErrorKind, Result};
pub use frame::{Envelope, Frame};
pub use multiplexer::{CancelHandle, Multiplexer, StreamedRecord};
pub use nonce::{Nonce, NonceSource};
pub use registry::{Dispatch, Handler, IteratorHandler, Registry, TypeTester, ValueHandler};
pub use value::{AsyncIterable, PrimitiveTag, Promise, Value, ValueStream};
pub use walker::IteratorIndex;

use deserialize::Decoder;
use walker::{Mode, Walker};

/// Immutable serialization configuration: the handler registry and the nonce source.
#[derive(Debug, Clone)]
pub struct Tson {
    registry: Arc<Registry>,
    nonce_source: NonceSource,
}

impl Tson {
    /// Builds the registry from `handlers`; see [`Registry::new`] for the failure cases.
    pub fn new(handlers: Vec<Handler>) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(Registry::new(handlers)?),
            nonce_source: NonceSource::default(),
        })
    }

    /// Replaces the random per-call nonce with a custom generator.
    pub fn with_nonce<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.nonce_source = NonceSource::Custom(Arc::new(generate));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Walks `value` into an envelope. Async values are rejected.
    pub fn serialize(&self, value: &Value) -> Result<Envelope> {
        let mut walker = self.walker(Mode::Synchronous);
        let json = walker.walk(value)?;
        Ok(Envelope {
            json,
            nonce: walker.nonce().to_string(),
        })
    }

    pub fn stringify(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize(value)?)?)
    }

    /// Walks `value` into an envelope and a multiplexer over the async sources it contains.
    ///
    /// Walk failures are returned before anything could be emitted. Nothing is awaited: the
    /// envelope is ready immediately and the multiplexer yields records as sources progress.
    pub fn serialize_async(&self, value: &Value) -> Result<(Envelope, Multiplexer)> {
        let mut walker = self.walker(Mode::Streaming);
        let json = walker.walk(value)?;
        let envelope = Envelope {
            json,
            nonce: walker.nonce().to_string(),
        };
        Ok((envelope, Multiplexer::new(walker)))
    }

    /// Rebuilds a value from an envelope without streamed records.
    pub fn deserialize(&self, envelope: &Envelope) -> Result<Value> {
        Decoder::synchronous(Arc::clone(&self.registry), &envelope.nonce).decode(&envelope.json)
    }

    pub fn parse(&self, text: &str) -> Result<Value> {
        self.deserialize(&serde_json::from_str(text)?)
    }

    fn walker(&self, mode: Mode) -> Walker {
        Walker::new(
            Arc::clone(&self.registry),
            self.nonce_source.generate(),
            mode,
        )
    }
}
