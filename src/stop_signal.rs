//! Cooperative shutdown signal shared between a tree/router and its
//! background worker threads.

use std::sync::{atomic::AtomicBool, Arc};

/// A cheaply cloneable flag a background thread polls to know when to
/// stop.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Requests that any thread watching this signal stop.
    pub fn send(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Whether [`StopSignal::send`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}
