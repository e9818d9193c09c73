use std::sync::atomic::{AtomicU64, Ordering};

/// Error counters for the observation path and the sweep loops. Failures are
/// counted here and logged; they never abort the surrounding batch.
#[derive(Debug, Default)]
pub struct HandlerStats {
    transform_errors: AtomicU64,
    db_errors: AtomicU64,
}

impl HandlerStats {
    pub fn incr_transform_errors(&self) {
        self.transform_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_db_errors(&self) {
        self.db_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transform_errors(&self) -> u64 {
        self.transform_errors.load(Ordering::Relaxed)
    }

    pub fn db_errors(&self) -> u64 {
        self.db_errors.load(Ordering::Relaxed)
    }
}
