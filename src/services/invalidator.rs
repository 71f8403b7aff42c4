//! Background task that empties the result cache once per local calendar day.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::cache::ResultCache;

const FALLBACK_SLEEP: Duration = Duration::from_secs(60 * 60);

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Time left until the next local midnight after `now`.
///
/// Returns `None` when the next day cannot be represented.
#[must_use]
pub fn until_next_midnight(now: NaiveDateTime) -> Option<Duration> {
    let next_midnight = now.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
    (next_midnight - now).to_std().ok()
}

pub struct CacheInvalidator<C: Clock = LocalClock> {
    cache: Arc<ResultCache>,
    clock: C,
    last_cleared: NaiveDate,
}

impl CacheInvalidator<LocalClock> {
    #[must_use]
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self::with_clock(cache, LocalClock)
    }
}

impl<C: Clock> CacheInvalidator<C> {
    /// Creates an invalidator that treats the clock's current date as already clean.
    pub fn with_clock(cache: Arc<ResultCache>, clock: C) -> Self {
        let last_cleared = clock.now().date();
        Self {
            cache,
            clock,
            last_cleared,
        }
    }

    #[must_use]
    pub const fn last_cleared(&self) -> NaiveDate {
        self.last_cleared
    }

    /// Clears the cache if the date moved on since the last clear.
    ///
    /// Returns whether a clear happened.
    pub async fn check(&mut self) -> bool {
        let now = self.clock.now();
        let today = now.date();

        if today == self.last_cleared {
            return false;
        }

        let dropped = self.cache.clear().await;
        self.last_cleared = today;
        metrics::counter!("cache_clears_total").increment(1);
        info!(
            event = "cache_cleared",
            dropped_entries = dropped,
            date = %today,
            "Daily cache invalidation at {}",
            now
        );
        true
    }

    fn next_sleep(&self) -> Duration {
        let now = self.clock.now();
        until_next_midnight(now).unwrap_or_else(|| {
            warn!(now = %now, "Could not compute next midnight, retrying in an hour");
            FALLBACK_SLEEP
        })
    }

    pub async fn run(mut self) {
        info!(date = %self.last_cleared, "Cache invalidator started");

        loop {
            self.check().await;

            let sleep_for = self.next_sleep();
            debug!(
                sleep_secs = sleep_for.as_secs(),
                "Cache invalidator sleeping until next midnight"
            );

            // Never spin if the clock reports exactly midnight.
            tokio::time::sleep(sleep_for.max(Duration::from_millis(1))).await;
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime; abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl<C: Clock> std::fmt::Debug for CacheInvalidator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("last_cleared", &self.last_cleared)
            .finish_non_exhaustive()
    }
}
