use std::sync::Arc;

use tokio::sync::watch;

use ghost_store::Clock;

/// Local clock corrected by the store's live server-minus-local offset.
///
/// Every TTL, deadline and freshness comparison in the core goes through
/// this, so server-assigned timestamps are never compared to raw local time.
#[derive(Clone)]
pub struct SkewClock {
    local: Arc<dyn Clock>,
    offset: watch::Receiver<i64>,
}

impl SkewClock {
    pub fn new(local: Arc<dyn Clock>, offset: watch::Receiver<i64>) -> Self {
        Self { local, offset }
    }

    pub fn now_ms(&self) -> i64 {
        self.local.now_ms() + self.offset_ms()
    }

    pub fn offset_ms(&self) -> i64 {
        *self.offset.borrow()
    }
}

impl Clock for SkewClock {
    fn now_ms(&self) -> i64 {
        SkewClock::now_ms(self)
    }
}
