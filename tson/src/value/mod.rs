//! The dynamic value model that handlers translate to and from JSON.
//!
//! Containers (`Array`, `Object`, `Set`, `Map`) are shared, mutable and identity-bearing, so a
//! graph of values can hold shared references and cycles. `Promise` and `AsyncIterable` are the
//! asynchronous values the multiplexer streams.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Error;

mod iterable;
mod promise;
mod shared;

pub use iterable::AsyncIterable;
pub use promise::Promise;
pub use shared::{Identity, Shared};

/// A boxed asynchronous source of values.
pub type ValueStream = BoxStream<'static, Result<Value, Error>>;

pub type Array = Shared<Vec<Value>>;
pub type Object = Shared<BTreeMap<String, Value>>;
pub type Set = Shared<Vec<Value>>;
pub type Map = Shared<Vec<(Value, Value)>>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    Array(Array),
    Object(Object),
    Set(Set),
    Map(Map),
    Promise(Promise),
    AsyncIterable(AsyncIterable),
}

/// Runtime type classification used for primitive handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTag {
    Undefined,
    Boolean,
    Number,
    BigInt,
    String,
    /// `null`, containers, dates and asynchronous values.
    Object,
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(items))
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Shared::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn set(members: Vec<Value>) -> Self {
        Value::Set(Shared::new(members))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Shared::new(entries))
    }

    pub fn tag(&self) -> PrimitiveTag {
        match self {
            Value::Undefined => PrimitiveTag::Undefined,
            Value::Bool(_) => PrimitiveTag::Boolean,
            Value::Number(_) => PrimitiveTag::Number,
            Value::BigInt(_) => PrimitiveTag::BigInt,
            Value::String(_) => PrimitiveTag::String,
            _ => PrimitiveTag::Object,
        }
    }

    /// The identity of identity-bearing values; `None` for plain data.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::Array(inner) | Value::Set(inner) => Some(inner.identity()),
            Value::Object(inner) => Some(inner.identity()),
            Value::Map(inner) => Some(inner.identity()),
            Value::Promise(promise) => Some(promise.identity()),
            Value::AsyncIterable(iterable) => Some(iterable.identity()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Clones the items of an array out of the value.
    pub fn to_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.snapshot()),
            _ => None,
        }
    }

    /// Reads a property of an object, `Undefined` when absent or not an object.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(entries) => entries.lock().get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Sets a property of an object; ignored for other values.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Value::Object(entries) = self {
            entries.lock().insert(key.into(), value);
        }
    }

    /// Appends to an array or set; ignored for other values.
    pub fn push(&self, value: Value) {
        match self {
            Value::Array(items) | Value::Set(items) => items.lock().push(value),
            _ => {}
        }
    }
}

/// Deep structural equality. Containers compare by contents (identical containers short
/// circuit), asynchronous values compare by identity. Comparing two distinct cyclic graphs
/// does not terminate.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Set(a), Value::Set(b)) => {
                a.ptr_eq(b) || a.snapshot() == b.snapshot()
            }
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::AsyncIterable(a), Value::AsyncIterable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}

impl From<AsyncIterable> for Value {
    fn from(iterable: AsyncIterable) -> Self {
        Value::AsyncIterable(iterable)
    }
}
