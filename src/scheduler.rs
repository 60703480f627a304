//! Periodic refresh of the cached rate snapshot.

use crate::core::cache::SnapshotCache;
use crate::core::clock::Clock;
use crate::core::config::ScheduleConfig;
use crate::core::rates::{FetchError, RateSnapshot};
use crate::core::value_date;
use crate::providers::util::next_slot;
use crate::service::RateService;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Local refresh times and the civil offset they are expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub slots: Vec<NaiveTime>,
    pub offset: FixedOffset,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Ok(Schedule {
            slots: config.slots()?,
            offset: config.offset()?,
        })
    }

    /// Next refresh instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = value_date::local_time(now, self.offset);
        let next_local = next_slot(local, &self.slots)?;
        Some(next_local.and_local_timezone(self.offset).single()?.to_utc())
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated(Arc<RateSnapshot>),
    Failed(FetchError),
    /// Another refresh was already in flight.
    Skipped,
    /// Re-activation check found the cache current.
    NotDue,
}

#[derive(Debug, Clone, Default)]
pub struct PollerStatus {
    pub refreshing: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct History {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps [`SnapshotCache`] fed from the rate service.
///
/// At most one fetch is outstanding; triggers arriving meanwhile are dropped.
pub struct RatePoller {
    service: Arc<RateService>,
    cache: SnapshotCache,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    in_flight: AtomicBool,
    history: Mutex<History>,
}

impl RatePoller {
    pub fn new(
        service: Arc<RateService>,
        cache: SnapshotCache,
        clock: Arc<dyn Clock>,
        schedule: Schedule,
    ) -> Self {
        RatePoller {
            service,
            cache,
            clock,
            schedule,
            in_flight: AtomicBool::new(false),
            history: Mutex::new(History::default()),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Refresh already in flight, dropping trigger");
            return RefreshOutcome::Skipped;
        };

        match self.service.fetch_snapshot().await {
            Ok(snapshot) => {
                let snapshot = self.cache.publish(snapshot);
                let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
                history.last_success = Some(self.clock.now());
                history.last_error = None;
                info!(value_date = %snapshot.value_date, "Rates refreshed");
                RefreshOutcome::Updated(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Rate refresh failed");
                let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
                history.last_error = Some(e.to_string());
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Called when the UI becomes active again.
    ///
    /// Refreshes when the first slot of the day has passed and nothing was
    /// fetched successfully today.
    pub async fn on_reactivate(&self) -> RefreshOutcome {
        if !self.is_due() {
            return RefreshOutcome::NotDue;
        }
        self.refresh().await
    }

    fn is_due(&self) -> bool {
        let local_now = value_date::local_time(self.clock.now(), self.schedule.offset);
        let Some(first_slot) = self.schedule.slots.first() else {
            return false;
        };
        if local_now.time() < *first_slot {
            return false;
        }
        let last_success = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_success;
        last_success.is_none_or(|at| {
            value_date::local_time(at, self.schedule.offset).date() != local_now.date()
        })
    }

    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_after(self.clock.now())
    }

    pub fn status(&self) -> PollerStatus {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        PollerStatus {
            refreshing: self.in_flight.load(Ordering::Acquire),
            last_success: history.last_success,
            last_error: history.last_error.clone(),
        }
    }

    /// Fetches once immediately, then at every scheduled slot until `shutdown`
    /// resolves.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        self.refresh().await;

        loop {
            let Some(next) = self.next_refresh_at() else {
                warn!("No refresh times configured, scheduler idle");
                shutdown.as_mut().await;
                return;
            };
            let wait = (next - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            info!(
                next = %next.with_timezone(&self.schedule.offset),
                minutes = wait.as_secs() / 60,
                "Next refresh scheduled"
            );

            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    self.refresh().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::rates::RateSource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn snapshot_at(now: DateTime<Utc>) -> RateSnapshot {
        RateSnapshot::new(
            value_date::local_time(now, value_date::caracas_offset()),
            Some(dec!(41.23)),
            Some(dec!(47.81)),
        )
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch_rates(&self) -> Result<RateSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FetchError::http_status(500))
            } else {
                Ok(snapshot_at(Utc::now()))
            }
        }
    }

    /// Blocks inside the fetch until released.
    struct GatedSource {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RateSource for GatedSource {
        async fn fetch_rates(&self) -> Result<RateSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(snapshot_at(Utc::now()))
        }
    }

    fn schedule() -> Schedule {
        Schedule::from_config(&ScheduleConfig::default()).unwrap()
    }

    fn poller(source: Arc<dyn RateSource>, clock: Arc<FixedClock>) -> RatePoller {
        RatePoller::new(
            Arc::new(RateService::new(source)),
            SnapshotCache::new(),
            clock,
            schedule(),
        )
    }

    fn caracas(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        // Caracas is UTC-4
        Utc.with_ymd_and_hms(y, m, d, h + 4, min, 0).unwrap()
    }

    #[test]
    fn test_next_refresh_times() {
        let schedule = schedule();
        assert_eq!(
            schedule.next_after(caracas(2025, 11, 20, 8, 0)),
            Some(caracas(2025, 11, 20, 12, 0))
        );
        assert_eq!(
            schedule.next_after(caracas(2025, 11, 20, 12, 0)),
            Some(caracas(2025, 11, 20, 16, 5))
        );
        assert_eq!(
            schedule.next_after(caracas(2025, 11, 20, 17, 0)),
            Some(caracas(2025, 11, 21, 12, 0))
        );
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let clock = Arc::new(FixedClock::new(caracas(2025, 11, 20, 12, 1)));
        let poller = poller(source.clone(), clock);
        let reader = poller.cache().reader();

        let outcome = poller.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Updated(_)));
        assert_eq!(reader.latest().unwrap().usd.as_ref().unwrap().value(), dec!(41.23));
        assert_eq!(poller.status().last_success, Some(caracas(2025, 11, 20, 12, 1)));
        assert!(!poller.status().refreshing);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let clock = Arc::new(FixedClock::new(caracas(2025, 11, 20, 12, 1)));
        let good = poller(
            Arc::new(CountingSource {
                calls: AtomicUsize::new(0),
                fail: false,
            }),
            clock.clone(),
        );
        good.refresh().await;
        let cache = good.cache().clone();

        let failing = RatePoller::new(
            Arc::new(RateService::new(Arc::new(CountingSource {
                calls: AtomicUsize::new(0),
                fail: true,
            }))),
            cache.clone(),
            clock,
            schedule(),
        );
        let outcome = failing.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(FetchError::Network(_))));
        assert!(cache.latest().is_some());
        assert_eq!(
            failing.status().last_error.as_deref(),
            Some("Error: No se pudo conectar al BCV (HTTP 500)")
        );
    }

    #[tokio::test]
    async fn test_duplicate_trigger_is_dropped() {
        let source = Arc::new(GatedSource {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let clock = Arc::new(FixedClock::new(caracas(2025, 11, 20, 12, 1)));
        let poller = poller(source.clone(), clock);

        let (first, second) = tokio::join!(poller.refresh(), async {
            source.started.notified().await;
            assert!(poller.status().refreshing);
            let outcome = poller.refresh().await;
            source.release.notify_one();
            outcome
        });

        assert!(matches!(first, RefreshOutcome::Updated(_)));
        assert!(matches!(second, RefreshOutcome::Skipped));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!poller.status().refreshing);
    }

    #[tokio::test]
    async fn test_reactivation_check() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let clock = Arc::new(FixedClock::new(caracas(2025, 11, 20, 9, 0)));
        let poller = poller(source.clone(), clock.clone());

        // Before the first slot nothing is due
        assert!(matches!(poller.on_reactivate().await, RefreshOutcome::NotDue));

        clock.set(caracas(2025, 11, 20, 13, 0));
        assert!(matches!(poller.on_reactivate().await, RefreshOutcome::Updated(_)));

        // Already refreshed today
        clock.set(caracas(2025, 11, 20, 17, 0));
        assert!(matches!(poller.on_reactivate().await, RefreshOutcome::NotDue));

        clock.set(caracas(2025, 11, 21, 12, 30));
        assert!(matches!(poller.on_reactivate().await, RefreshOutcome::Updated(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fetches_immediately_and_stops() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let clock = Arc::new(FixedClock::new(caracas(2025, 11, 20, 8, 0)));
        let poller = Arc::new(poller(source.clone(), clock));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(Arc::clone(&poller).run(async {
            let _ = rx.await;
        }));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(poller.cache().latest().is_some());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
