//! Fan-in of a dynamically growing set of asynchronous sources into one ordered stream.
//!
//! Every live source has exactly one outstanding advance, held as a [`StreamFuture`] inside a
//! [`FuturesUnordered`]. Whichever advance resolves first is emitted first; a source's own
//! records keep their order because its next advance is only scheduled after the previous one
//! resolved. The stream ends once the live set is empty, including sources registered while
//! consumption was already under way.
//!
//! Dropping the multiplexer drops every live source, cancelling any in-flight advance. The
//! [`CancelHandle`] does the same from elsewhere, right away and without waiting for the
//! consumer to poll again; the stream then ends with a `StreamInterrupted` error.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::future::{self, AbortHandle, Abortable, Pending};
use futures::stream::{FusedStream, FuturesUnordered, Stream, StreamExt, StreamFuture};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{self, Error, Result};
use crate::value::{Value, ValueStream};
use crate::walker::{IteratorIndex, Walker};

/// One emitted value of a source, serialized as `[index, value]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedRecord(pub IteratorIndex, pub Json);

/// A live source tagged with its iterator index.
struct Source {
    index: IteratorIndex,
    stream: ValueStream,
}

impl Stream for Source {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

type LiveSet = Mutex<FuturesUnordered<StreamFuture<Source>>>;

fn lock(live: &LiveSet) -> MutexGuard<'_, FuturesUnordered<StreamFuture<Source>>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancels every live source of a [`Multiplexer`].
///
/// Holds the live set weakly, so a handle never keeps sources alive past their multiplexer.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    abort: AbortHandle,
    live: Weak<LiveSet>,
}

impl CancelHandle {
    /// Drops every live source now and wakes the consumer, which then sees `StreamInterrupted`.
    pub fn cancel(&self) {
        self.abort.abort();
        if let Some(live) = self.live.upgrade() {
            let dropped = std::mem::take(&mut *lock(&live));
            debug!("Cancelled; dropping {} live source(s)", dropped.len());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

pub struct Multiplexer {
    walker: Walker,
    live: Arc<LiveSet>,
    live_indices: HashSet<IteratorIndex>,
    cancel_handle: AbortHandle,
    cancelled: Abortable<Pending<()>>,
    terminated: bool,
}

impl Multiplexer {
    /// Creates the multiplexer for one call, adopting the sources the walker discovered while
    /// building the envelope.
    pub(crate) fn new(walker: Walker) -> Self {
        let (cancel_handle, registration) = AbortHandle::new_pair();
        let mut multiplexer = Self {
            walker,
            live: Arc::new(Mutex::new(FuturesUnordered::new())),
            live_indices: HashSet::new(),
            cancel_handle,
            cancelled: Abortable::new(future::pending(), registration),
            terminated: false,
        };
        let adopted = multiplexer.adopt_discovered();
        debug_assert!(adopted.is_ok(), "a fresh walker handed out a duplicate index");
        multiplexer
    }

    /// Adds a source. It takes part in the next race cycle. An index may only be live once;
    /// registering after the stream has terminated has no effect.
    pub fn register(&mut self, index: IteratorIndex, stream: ValueStream) -> Result<()> {
        if self.terminated || self.cancel_handle.is_aborted() {
            warn!("Source {index} registered after the stream terminated; ignoring");
            return Ok(());
        }
        if !self.live_indices.insert(index) {
            return Err(error::registration(&format!(
                "iterator index {index} is already live"
            )));
        }
        trace!("Registering source {index}");
        self.enqueue(Source { index, stream });
        Ok(())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            abort: self.cancel_handle.clone(),
            live: Arc::downgrade(&self.live),
        }
    }

    /// Number of sources that have not yet completed.
    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Schedules the next advance of `source`, unless a cancel already emptied the live set.
    fn enqueue(&self, source: Source) {
        let mut live = lock(&self.live);
        if self.cancel_handle.is_aborted() {
            trace!("Dropping source {} after cancel", source.index);
            return;
        }
        live.push(source.into_future());
    }

    fn adopt_discovered(&mut self) -> Result<()> {
        for (index, stream) in self.walker.take_discovered() {
            self.register(index, stream)?;
        }
        Ok(())
    }

    /// Drops every live source and ends the stream with `err`.
    fn fail(&mut self, err: Error) -> Poll<Option<Result<StreamedRecord>>> {
        let dropped = std::mem::take(&mut *lock(&self.live));
        debug!("Multiplexer failing with {} live source(s): {err}", dropped.len());
        drop(dropped);
        self.live_indices.clear();
        self.terminated = true;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for Multiplexer {
    type Item = Result<StreamedRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }

        if Pin::new(&mut this.cancelled).poll(cx).is_ready() {
            return this.fail(error::stream_interrupted("multiplexer cancelled"));
        }

        loop {
            let polled = lock(&this.live).poll_next_unpin(cx);
            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) if this.cancel_handle.is_aborted() => {
                    return this.fail(error::stream_interrupted("multiplexer cancelled"));
                }
                Poll::Ready(None) => {
                    debug!("All sources completed");
                    this.terminated = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some((None, source))) => {
                    debug!("Source {} completed", source.index);
                    this.live_indices.remove(&source.index);
                }
                Poll::Ready(Some((Some(Ok(value)), source))) => {
                    let index = source.index;
                    this.enqueue(source);
                    let walked = this
                        .walker
                        .walk(&value)
                        .and_then(|json| this.adopt_discovered().map(|()| json));
                    return match walked {
                        Ok(json) => Poll::Ready(Some(Ok(StreamedRecord(index, json)))),
                        Err(err) => this.fail(err),
                    };
                }
                Poll::Ready(Some((Some(Err(err)), source))) => {
                    warn!("Source {} failed: {err}", source.index);
                    return this.fail(err);
                }
            }
        }
    }
}

impl FusedStream for Multiplexer {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
