//! Built-in handlers for values plain JSON cannot express.
//!
//! [`all`] returns them in registration order. Only `undefined` and `bigint` claim a primitive
//! tag; the rest are predicates and do not overlap.

use crate::registry::Handler;

mod async_iterable;
mod bigint;
mod date;
mod map;
mod promise;
mod set;
mod undefined;

pub use async_iterable::AsyncIterableHandler;
pub use bigint::BigIntHandler;
pub use date::DateHandler;
pub use map::MapHandler;
pub use promise::PromiseHandler;
pub use set::SetHandler;
pub use undefined::UndefinedHandler;

/// Every built-in handler.
pub fn all() -> Vec<Handler> {
    let mut handlers = sync_handlers();
    handlers.extend(async_handlers());
    handlers
}

/// Handlers that serialize to a payload.
pub fn sync_handlers() -> Vec<Handler> {
    vec![
        Handler::value(UndefinedHandler),
        Handler::value(BigIntHandler),
        Handler::value(DateHandler),
        Handler::value(SetHandler),
        Handler::value(MapHandler),
    ]
}

/// Handlers that serialize to a streamed source.
pub fn async_handlers() -> Vec<Handler> {
    vec![
        Handler::iterator(PromiseHandler),
        Handler::iterator(AsyncIterableHandler),
    ]
}

/// Status markers leading each streamed payload of the asynchronous handlers.
pub(crate) mod status {
    pub const VALUE: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const DONE: i32 = 2;
}

/// The value carried when an error is streamed in place of a rejection reason.
pub(crate) fn reason_of(err: crate::error::Error) -> crate::value::Value {
    match err.rejection() {
        Some(reason) => reason.clone(),
        None => crate::value::Value::object([("message", err.to_string().into())]),
    }
}
