//! Memoized lazy value with shared in-flight computation.
//!
//! `AsyncLazy<T>` wraps either an already-computed value or a producer
//! capable of computing one. The producer runs at most once per
//! successful resolution: concurrent first observers share a single
//! in-flight future instead of re-entering the producer. Failures are
//! NOT cached — the cell resets to idle and the next resolve retries.
//!
//! The in-flight future is a `futures::future::Shared`, so one waiter
//! dropping its await does not abort the computation for the others;
//! the shared future simply keeps making progress as long as anybody
//! polls it, and resumes on the next resolve if everybody went away.

use crate::error::LoadError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;

type Producer<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, LoadError>> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Result<T, LoadError>>>;

enum LazyState<T> {
    Idle,
    InFlight(InFlight<T>),
    Ready(T),
}

pub struct AsyncLazy<T: Clone> {
    producer: Option<Producer<T>>,
    state: Mutex<LazyState<T>>,
}

impl<T: Clone + Send + Sync + 'static> AsyncLazy<T> {
    /// Cell holding an already-computed value. No producer will ever run.
    pub fn resolved(value: T) -> Self {
        Self {
            producer: None,
            state: Mutex::new(LazyState::Ready(value)),
        }
    }

    /// Cell that computes its value on first demand.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, LoadError>> + Send + Sync + 'static,
    {
        Self {
            producer: Some(Box::new(producer)),
            state: Mutex::new(LazyState::Idle),
        }
    }

    /// The cached value, if already resolved. Never forces computation.
    pub fn try_peek(&self) -> Option<T> {
        match &*self.state.lock() {
            LazyState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.lock(), LazyState::Ready(_))
    }

    /// Resolve the value, computing it if necessary.
    ///
    /// A resolve that starts while another is in flight joins that
    /// computation; a resolve after a failure starts a fresh attempt.
    pub async fn resolve(&self) -> Result<T, LoadError> {
        let in_flight = {
            let mut state = self.state.lock();
            match &*state {
                LazyState::Ready(value) => return Ok(value.clone()),
                LazyState::InFlight(shared) => shared.clone(),
                LazyState::Idle => {
                    let producer = self
                        .producer
                        .as_ref()
                        .ok_or_else(|| LoadError::failed("lazy cell has no producer"))?;
                    let shared = producer().shared();
                    *state = LazyState::InFlight(shared.clone());
                    shared
                }
            }
        };

        match in_flight.clone().await {
            Ok(value) => {
                let mut state = self.state.lock();
                if !matches!(&*state, LazyState::Ready(_)) {
                    *state = LazyState::Ready(value.clone());
                }
                Ok(value)
            }
            Err(err) => {
                // Reset only if no newer attempt replaced ours.
                let mut state = self.state.lock();
                if let LazyState::InFlight(current) = &*state {
                    if current.ptr_eq(&in_flight) {
                        *state = LazyState::Idle;
                    }
                }
                Err(err)
            }
        }
    }

    /// Synchronous convergence on the same cache, for non-async callers.
    pub fn resolve_blocking(&self) -> Result<T, LoadError> {
        futures::executor::block_on(self.resolve())
    }
}

impl<T: Clone> fmt::Debug for AsyncLazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            LazyState::Idle => "idle",
            LazyState::InFlight(_) => "in-flight",
            LazyState::Ready(_) => "ready",
        };
        f.debug_struct("AsyncLazy").field("state", &state).finish()
    }
}
