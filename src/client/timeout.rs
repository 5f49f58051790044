//! Externally-timed query decorator.
//!
//! The engine's own tick already re-sends and expires queries; this
//! wrapper is the second discipline: one externally owned timer per
//! query. The timer arms when the wrapper is created, every received
//! result resets it, and a terminal finish or failure cancels it. If it
//! fires first, the query fails with a Timeout error.
//!
//! Dropping the wrapper cancels only this query's registration; the timer
//! subsystem itself (the runtime's shared timer wheel) keeps running.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::time::{Instant, Sleep, sleep};

use super::QueryStream;
use crate::error::{Error, Result};
use crate::varbind::VarBind;

/// A query stream with a reset-on-receive deadline.
pub struct TimedQuery {
    inner: QueryStream,
    duration: Duration,
    deadline: Pin<Box<Sleep>>,
    done: bool,
}

impl TimedQuery {
    /// Wrap a query, arming the deadline now.
    pub fn wrap(duration: Duration, inner: QueryStream) -> Self {
        Self {
            inner,
            duration,
            deadline: Box::pin(sleep(duration)),
            done: false,
        }
    }

    /// Next result, or `None` when the query finished.
    pub async fn next(&mut self) -> Option<Result<VarBind>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Collect all results.
    pub async fn collect(mut self) -> Result<Vec<VarBind>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await {
            results.push(item?);
        }
        Ok(results)
    }
}

impl Stream for TimedQuery {
    type Item = Result<VarBind>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        // The inner stream wins a race against the deadline
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(result))) => {
                let next = Instant::now() + self.duration;
                self.deadline.as_mut().reset(next);
                Poll::Ready(Some(Ok(result)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => match self.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    self.done = true;
                    let error = Error::Timeout {
                        target: self.inner.target,
                        elapsed: self.duration,
                        oid: self.inner.oid.clone(),
                    };
                    Poll::Ready(Some(Err(error)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
