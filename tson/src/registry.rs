//! Type handler plug-ins and the immutable registry that dispatches values to them.
//!
//! Dispatch is two-tier. Handlers registered for a [`PrimitiveTag`] live in a tag-keyed table
//! (one handler per tag); everything else is a predicate handler tested in registration order,
//! first match wins. Registration order is therefore part of the contract whenever predicates
//! overlap.

use std::collections::HashMap;
use std::sync::Arc;

use log::*;

use crate::error::{self, Result};
use crate::value::{PrimitiveTag, Value, ValueStream};

/// How a handler is selected for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Primitive(PrimitiveTag),
    Predicate,
}

/// Common identity and dispatch information of every handler.
pub trait TypeTester: Send + Sync {
    /// Unique key embedded in tuples.
    fn key(&self) -> &str;

    fn dispatch(&self) -> Dispatch;

    /// Whether this handler claims `value`. Primitive handlers default to accepting
    /// every value carrying their tag.
    fn test(&self, _value: &Value) -> bool {
        true
    }
}

/// A handler translating a value to a payload that is walked further.
pub trait ValueHandler: TypeTester {
    fn serialize(&self, value: &Value) -> Result<Value>;

    fn deserialize(&self, payload: Value) -> Result<Value>;
}

/// A handler translating a value into an asynchronous source of payloads.
pub trait IteratorHandler: TypeTester {
    fn serialize_iterator(&self, value: &Value) -> Result<ValueStream>;

    /// Rebuilds the value from the payloads streamed for its iterator index. The source ends
    /// when the transport closes and fails when the transport is interrupted.
    fn deserialize_iterator(&self, source: ValueStream) -> Result<Value>;
}

/// A registered handler: exactly one of the two serialization forms.
#[derive(Clone)]
pub enum Handler {
    Value(Arc<dyn ValueHandler>),
    Iterator(Arc<dyn IteratorHandler>),
}

impl Handler {
    pub fn value<H: ValueHandler + 'static>(handler: H) -> Self {
        Handler::Value(Arc::new(handler))
    }

    pub fn iterator<H: IteratorHandler + 'static>(handler: H) -> Self {
        Handler::Iterator(Arc::new(handler))
    }

    pub fn key(&self) -> &str {
        match self {
            Handler::Value(handler) => handler.key(),
            Handler::Iterator(handler) => handler.key(),
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        match self {
            Handler::Value(handler) => handler.dispatch(),
            Handler::Iterator(handler) => handler.dispatch(),
        }
    }

    pub fn test(&self, value: &Value) -> bool {
        match self {
            Handler::Value(handler) => handler.test(value),
            Handler::Iterator(handler) => handler.test(value),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let form = match self {
            Handler::Value(_) => "Value",
            Handler::Iterator(_) => "Iterator",
        };
        f.debug_struct("Handler")
            .field("key", &self.key())
            .field("form", &form)
            .field("dispatch", &self.dispatch())
            .finish()
    }
}

/// Immutable handler lookup tables, built once and shared across calls.
#[derive(Debug, Default)]
pub struct Registry {
    by_primitive: HashMap<PrimitiveTag, Handler>,
    predicates: Vec<Handler>,
    by_key: HashMap<String, Handler>,
}

impl Registry {
    /// Builds the registry. Two handlers for the same primitive tag, or two handlers sharing
    /// a key, are a configuration error.
    pub fn new(handlers: Vec<Handler>) -> Result<Self> {
        let mut registry = Registry::default();

        for handler in handlers {
            if registry.by_key.contains_key(handler.key()) {
                return Err(error::registration(&format!(
                    "Multiple handlers with key {} found",
                    handler.key()
                )));
            }

            match handler.dispatch() {
                Dispatch::Primitive(tag) => {
                    if registry.by_primitive.contains_key(&tag) {
                        return Err(error::registration(&format!(
                            "Multiple handlers for primitive {tag:?} found"
                        )));
                    }
                    registry.by_primitive.insert(tag, handler.clone());
                }
                Dispatch::Predicate => registry.predicates.push(handler.clone()),
            }

            trace!("Registered handler {}", handler.key());
            registry.by_key.insert(handler.key().to_string(), handler);
        }

        Ok(registry)
    }

    /// Finds the handler for `value`: the primitive table first, then predicates in order.
    pub fn lookup(&self, value: &Value) -> Option<&Handler> {
        if let Some(handler) = self.by_primitive.get(&value.tag()) {
            if handler.test(value) {
                return Some(handler);
            }
        }

        self.predicates.iter().find(|handler| handler.test(value))
    }

    pub fn get(&self, key: &str) -> Option<&Handler> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Tagged(&'static str, PrimitiveTag);

    impl TypeTester for Tagged {
        fn key(&self) -> &str {
            self.0
        }

        fn dispatch(&self) -> Dispatch {
            Dispatch::Primitive(self.1)
        }
    }

    impl ValueHandler for Tagged {
        fn serialize(&self, _value: &Value) -> Result<Value> {
            Ok(Value::Null)
        }

        fn deserialize(&self, _payload: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    /// Claims any array whose length is at least the threshold.
    struct LongArray(&'static str, usize);

    impl TypeTester for LongArray {
        fn key(&self) -> &str {
            self.0
        }

        fn dispatch(&self) -> Dispatch {
            Dispatch::Predicate
        }

        fn test(&self, value: &Value) -> bool {
            value.to_items().is_some_and(|items| items.len() >= self.1)
        }
    }

    impl ValueHandler for LongArray {
        fn serialize(&self, _value: &Value) -> Result<Value> {
            Ok(Value::Null)
        }

        fn deserialize(&self, _payload: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_duplicate_primitive_is_registration_error() {
        let result = Registry::new(vec![
            Handler::value(Tagged("a", PrimitiveTag::BigInt)),
            Handler::value(Tagged("b", PrimitiveTag::BigInt)),
        ]);
        assert_eq!(result.unwrap_err().error_kind, ErrorKind::Registration);
    }

    #[test]
    fn test_duplicate_key_is_registration_error() {
        let result = Registry::new(vec![
            Handler::value(LongArray("same", 1)),
            Handler::value(LongArray("same", 2)),
        ]);
        assert_eq!(result.unwrap_err().error_kind, ErrorKind::Registration);
    }

    #[test]
    fn test_primitive_lookup() {
        let registry = Registry::new(vec![Handler::value(Tagged("big", PrimitiveTag::BigInt))])
            .unwrap();
        assert_eq!(registry.lookup(&Value::BigInt(1)).unwrap().key(), "big");
        assert!(registry.lookup(&Value::from(1)).is_none());
    }

    #[test]
    fn test_predicates_first_match_wins() {
        let registry = Registry::new(vec![
            Handler::value(LongArray("three", 3)),
            Handler::value(LongArray("one", 1)),
        ])
        .unwrap();

        let long = Value::array(vec![1.into(), 2.into(), 3.into()]);
        let short = Value::array(vec![1.into()]);
        assert_eq!(registry.lookup(&long).unwrap().key(), "three");
        assert_eq!(registry.lookup(&short).unwrap().key(), "one");
        assert!(registry.lookup(&Value::array(vec![])).is_none());
    }

    #[test]
    fn test_primitive_table_is_consulted_before_predicates() {
        let registry = Registry::new(vec![
            Handler::value(LongArray("pred", 0)),
            Handler::value(Tagged("object", PrimitiveTag::Object)),
        ])
        .unwrap();
        assert_eq!(
            registry.lookup(&Value::array(vec![])).unwrap().key(),
            "object"
        );
    }

    #[test]
    fn test_get_by_key() {
        let registry = Registry::new(vec![Handler::value(LongArray("pred", 0))]).unwrap();
        assert!(registry.get("pred").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }
}
