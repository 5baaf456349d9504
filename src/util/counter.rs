use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared, cloneable byte counter.
///
/// Every clone adjusts the same underlying value, so pools, tables and the
/// flush scope that owns them all see one total.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` (may be negative) and return the new value
    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.0.fetch_add(delta, Ordering::AcqRel) + delta
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}
