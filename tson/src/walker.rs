//! Recursive value to JSON transform with cycle detection and shared-reference collapse.
//!
//! A `Walker` holds the call-scoped state of one serialization: the nonce, the identity-keyed
//! Seen and Cache tables, the next iterator index, and the async sources discovered but not yet
//! handed to the multiplexer. It is created at call start and dropped with the call.

use std::collections::HashMap;
use std::sync::Arc;

use log::*;
use serde_json::{json, Number, Value as Json};

use crate::error::{self, Result};
use crate::nonce::Nonce;
use crate::registry::{Handler, Registry};
use crate::value::{Identity, Value, ValueStream};

/// Correlates a streamed record with the placeholder in the envelope.
pub type IteratorIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Iterator handlers register their sources for multiplexing.
    Streaming,
    /// Iterator handlers are rejected; there is nothing to stream them over.
    Synchronous,
}

pub struct Walker {
    registry: Arc<Registry>,
    nonce: Nonce,
    mode: Mode,
    next_index: IteratorIndex,
    // Seen retains every walked value so an address cannot be reused within the call.
    seen: HashMap<Identity, Value>,
    cache: HashMap<Identity, Json>,
    discovered: Vec<(IteratorIndex, ValueStream)>,
}

impl Walker {
    pub(crate) fn new(registry: Arc<Registry>, nonce: Nonce, mode: Mode) -> Self {
        Self {
            registry,
            nonce,
            mode,
            next_index: 0,
            seen: HashMap::new(),
            cache: HashMap::new(),
            discovered: Vec::new(),
        }
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Transforms `value` into its JSON-safe form.
    pub fn walk(&mut self, value: &Value) -> Result<Json> {
        let identity = value.identity();

        if let Some(identity) = identity {
            if self.seen.contains_key(&identity) {
                return match self.cache.get(&identity) {
                    Some(cached) => Ok(cached.clone()),
                    None => Err(error::circular_reference("value is reachable from itself")),
                };
            }
            self.seen.insert(identity, value.clone());
        }

        let result = match self.registry.lookup(value).cloned() {
            Some(Handler::Value(handler)) => {
                let payload = handler.serialize(value)?;
                json!([handler.key(), self.walk(&payload)?, self.nonce.as_str()])
            }
            Some(Handler::Iterator(handler)) => {
                if self.mode == Mode::Synchronous {
                    return Err(error::unhandled_type(&format!(
                        "{} values require streaming serialization",
                        handler.key()
                    )));
                }
                let index = self.next_index;
                self.next_index += 1;
                let source = handler.serialize_iterator(value)?;
                debug!("Discovered {} source at index {index}", handler.key());
                self.discovered.push((index, source));
                json!([handler.key(), index, self.nonce.as_str()])
            }
            None => self.walk_structure(value)?,
        };

        if let Some(identity) = identity {
            self.cache.insert(identity, result.clone());
        }

        Ok(result)
    }

    /// The default transform for values no handler claims.
    fn walk_structure(&mut self, value: &Value) -> Result<Json> {
        let json = match value {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(date) => Json::String(
                date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
            Value::Array(items) => {
                let items = items.snapshot();
                let mut walked = Vec::with_capacity(items.len());
                for item in &items {
                    walked.push(self.walk(item)?);
                }
                Json::Array(walked)
            }
            Value::Object(entries) => {
                let entries = entries.snapshot();
                let mut walked = serde_json::Map::new();
                for (key, item) in &entries {
                    if matches!(item, Value::Undefined) && self.registry.lookup(item).is_none() {
                        continue;
                    }
                    walked.insert(key.clone(), self.walk(item)?);
                }
                Json::Object(walked)
            }
            Value::BigInt(_)
            | Value::Set(_)
            | Value::Map(_)
            | Value::Promise(_)
            | Value::AsyncIterable(_) => {
                return Err(error::unhandled_type(&format!(
                    "no handler registered for {value:?}"
                )))
            }
        };
        Ok(json)
    }

    /// Hands over the sources discovered since the last call.
    pub(crate) fn take_discovered(&mut self) -> Vec<(IteratorIndex, ValueStream)> {
        std::mem::take(&mut self.discovered)
    }
}

/// Integral values are written without a fraction; non-finite values become `null`.
pub(crate) fn number(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Json::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}
