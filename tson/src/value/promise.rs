use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared as SharedFuture};

use super::{Identity, Value};
use crate::error::{self, Error};

type Settlement = BoxFuture<'static, Result<Value, Error>>;

/// A value that settles asynchronously. Clones share the same settlement and identity;
/// the underlying future is polled lazily by whoever awaits first.
#[derive(Clone)]
pub struct Promise(Arc<SharedFuture<Settlement>>);

impl Promise {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        Self(Arc::new(future.boxed().shared()))
    }

    pub fn resolved(value: Value) -> Self {
        Self::new(async move { Ok(value) })
    }

    /// A promise that rejects with `reason`.
    pub fn rejected(reason: Value) -> Self {
        Self::new(async move { Err(error::rejected(reason)) })
    }

    /// Waits for the promise to settle.
    pub async fn settled(&self) -> Result<Value, Error> {
        self.0.as_ref().clone().await
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.peek() {
            Some(Ok(value)) => f.debug_tuple("Promise").field(value).finish(),
            Some(Err(err)) => write!(f, "Promise(<{err}>)"),
            None => f.write_str("Promise(<pending>)"),
        }
    }
}
