//! Per-trip occupancy store: ordered action processing + effect execution.
//!
//! Each registered trip gets one store. `send` holds the trip's state mutex
//! across both the reduction and the inline execution of `Future` effects,
//! so occupancy inputs for one trip are applied strictly in the order they
//! were accepted; a stale `StopReached` can never interleave behind a
//! later one. `Delay` effects are spawned and re-enter through `send` when
//! they fire.
//!
//! Booking never goes through this store, so holding the trip-level mutex
//! here cannot block unrelated `reserve` calls; the only shared exclusion
//! between the two paths is the per-seat mutex inside the ledger.

use crate::effect::Effect;
use crate::occupancy::{OccupancyAction, OccupancyEnvironment, OccupancyReducer, OccupancyState};
use crate::reducer::Reducer;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Runtime for one trip's occupancy machine.
#[derive(Clone)]
pub struct OccupancyStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<OccupancyState>,
    reducer: OccupancyReducer,
    env: OccupancyEnvironment,
}

impl OccupancyStore {
    /// Creates a store with empty state.
    #[must_use]
    pub fn new(env: OccupancyEnvironment) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(OccupancyState::new()),
                reducer: OccupancyReducer::new(),
                env,
            }),
        }
    }

    /// Processes one action and everything it feeds back, in order.
    pub async fn send(&self, action: OccupancyAction) {
        self.clone().send_owned(action).await;
    }

    /// Owned, explicitly-boxed recursion target. Returning a named
    /// `Send` future breaks the Send-inference cycle created by the
    /// `Delay` arm spawning a task that re-enters `send`.
    fn send_owned(self, action: OccupancyAction) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
        let mut state = self.inner.state.lock().await;
        let mut queue = VecDeque::new();
        queue.push_back(action);

        while let Some(action) = queue.pop_front() {
            let effects = self.inner.reducer.reduce(&mut state, action, &self.inner.env);
            for effect in effects {
                match effect {
                    Effect::None => {}
                    Effect::Future(future) => {
                        // Executed inline, still under the trip mutex, to
                        // preserve per-trip ordering of ledger transitions.
                        if let Some(next) = future.await {
                            queue.push_back(next);
                        }
                    }
                    Effect::Delay { duration, action } => {
                        let store = self.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(duration).await;
                            store.send_owned(*action).await;
                        });
                    }
                }
            }
        }
        })
    }

    /// Runs a read-only closure against the current occupancy state.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&OccupancyState) -> T,
    {
        let state = self.inner.state.lock().await;
        f(&state)
    }
}
