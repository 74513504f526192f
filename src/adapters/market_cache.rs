//! In-memory TTL cache with single-flight refresh for any candle source.
//!
//! Concurrent requests for the same `(provider, symbol, quote)` share one
//! upstream fetch. When a refresh fails, an entry no older than the stale
//! horizon is served instead and flagged in the series diagnostics.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::error::SignalDeskError;
use crate::ports::data_port::{CandleSource, MarketSeries};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(12 * 60);

type CacheKey = (String, String, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    series: MarketSeries,
    fetched_at: Instant,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

/// One upstream fetch that later callers for the same key wait on.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Result<MarketSeries, String>>>,
    done: Condvar,
}

impl Flight {
    fn complete(&self, outcome: &Result<MarketSeries, SignalDeskError>) {
        let shared = match outcome {
            Ok(series) => Ok(series.clone()),
            Err(err) => Err(err.to_string()),
        };
        self.settle(shared);
    }

    /// First outcome wins; later calls are ignored.
    fn settle(&self, shared: Result<MarketSeries, String>) {
        let mut slot = lock(&self.outcome);
        if slot.is_none() {
            *slot = Some(shared);
            self.done.notify_all();
        }
    }

    fn wait(&self) -> Result<MarketSeries, SignalDeskError> {
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome
                    .clone()
                    .map_err(|reason| SignalDeskError::DataSource { reason });
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Held by the fetching caller. Dropping it settles the flight and frees the
/// key, so waiters are released even when the upstream fetch unwinds.
struct Leader<'a> {
    flights: &'a Mutex<HashMap<CacheKey, Arc<Flight>>>,
    key: CacheKey,
    flight: Arc<Flight>,
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        self.flight
            .settle(Err("upstream fetch aborted before completing".to_string()));
        lock(self.flights).remove(&self.key);
    }
}

/// Cached data is plain values, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MarketCache<S: CandleSource> {
    source: S,
    ttl: Duration,
    max_stale: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}

impl<S: CandleSource> MarketCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            ttl: DEFAULT_TTL,
            max_stale: DEFAULT_MAX_STALE,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of cached series.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, symbol: &str, quote: &str) -> CacheKey {
        (
            self.source.provider().to_string(),
            symbol.to_uppercase(),
            quote.to_uppercase(),
        )
    }

    /// Fetch as if the current instant were `now`.
    pub fn fetch_at(
        &self,
        symbol: &str,
        quote: &str,
        now: Instant,
    ) -> Result<MarketSeries, SignalDeskError> {
        let key = self.key(symbol, quote);

        if let Some(series) = self.fresh(&key, now) {
            debug!(symbol, quote, "market cache hit");
            return Ok(series);
        }

        let (flight, is_leader) = {
            let mut flights = lock(&self.in_flight);
            match flights.get(&key) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::default());
                    flights.insert(key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !is_leader {
            debug!(symbol, quote, "joining in-flight fetch");
            return flight.wait();
        }

        let leader = Leader {
            flights: &self.in_flight,
            key,
            flight,
        };
        // A previous leader may have filled the entry after our first check.
        let outcome = match self.fresh(&leader.key, now) {
            Some(series) => Ok(series),
            None => self.refresh(&leader.key, symbol, quote, now),
        };
        leader.flight.complete(&outcome);
        outcome
    }

    fn fresh(&self, key: &CacheKey, now: Instant) -> Option<MarketSeries> {
        lock(&self.entries)
            .get(key)
            .filter(|entry| entry.age(now) <= self.ttl)
            .map(|entry| entry.series.clone())
    }

    fn refresh(
        &self,
        key: &CacheKey,
        symbol: &str,
        quote: &str,
        now: Instant,
    ) -> Result<MarketSeries, SignalDeskError> {
        match self.source.fetch_candles(symbol, quote) {
            Ok(series) => {
                let mut entries = lock(&self.entries);
                self.prune(&mut entries, now);
                entries.insert(
                    key.clone(),
                    CacheEntry {
                        series: series.clone(),
                        fetched_at: now,
                    },
                );
                Ok(series)
            }
            Err(err) => {
                let entries = lock(&self.entries);
                match entries.get(key).filter(|e| e.age(now) <= self.max_stale) {
                    Some(entry) => {
                        let age_secs = entry.age(now).as_secs();
                        warn!(symbol, quote, age_secs, error = %err, "serving stale cached market data");
                        let mut series = entry.series.clone();
                        series.diagnostics.stale_cache_used = true;
                        series.diagnostics.cache_age_secs = Some(age_secs);
                        Ok(series)
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn prune(&self, entries: &mut HashMap<CacheKey, CacheEntry>, now: Instant) {
        let horizon = self.ttl.max(self.max_stale);
        entries.retain(|_, entry| entry.age(now) <= horizon);
    }
}

impl<S: CandleSource> CandleSource for MarketCache<S> {
    fn provider(&self) -> &str {
        self.source.provider()
    }

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
        self.fetch_at(symbol, quote, Instant::now())
    }
}
