use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, Stream, StreamExt};
use log::*;

use super::{Identity, Value, ValueStream};
use crate::error::Error;

/// A single-consumer asynchronous sequence of values.
///
/// Clones share identity. The underlying stream can only be taken once; any later taker
/// sees an iterable that is already exhausted.
#[derive(Clone)]
pub struct AsyncIterable(Arc<Mutex<Option<ValueStream>>>);

impl AsyncIterable {
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Value, Error>> + Send + 'static,
    {
        Self(Arc::new(Mutex::new(Some(source.boxed()))))
    }

    /// An iterable yielding `values` in order.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(stream::iter(values.into_iter().map(Ok)))
    }

    /// Takes the underlying stream out of the iterable.
    pub fn take(&self) -> ValueStream {
        let taken = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(source) => source,
            None => {
                warn!("Async iterable consumed more than once; yielding nothing");
                stream::empty().boxed()
            }
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AsyncIterable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_consumed() {
            f.write_str("AsyncIterable(<consumed>)")
        } else {
            f.write_str("AsyncIterable(<pending>)")
        }
    }
}
