// Sale-event deduplication: turns the raw polled sales feed into a stream of
// genuinely-new events, exactly once per session.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tracing::{debug, info};

use crate::board::model::{normalize_name, SaleRecord};

/// Maximum number of sale identities retained in the log.
pub const LOG_CAP: usize = 1000;

/// Identity of a sale for dedup purposes: normalized agent name, the exact
/// entry date string, and the value fixed-pointed to cents. Arrival time is
/// deliberately excluded so the same logical sale is never re-flagged across
/// polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SaleKey {
    agent: String,
    entry_date: String,
    cents: i64,
}

impl SaleKey {
    pub fn of(sale: &SaleRecord) -> Self {
        SaleKey {
            agent: normalize_name(&sale.agent_name),
            entry_date: sale.entry_date.clone(),
            cents: (sale.value * 100.0).round() as i64,
        }
    }
}

/// Bounded, insertion-ordered log of previously seen sale identities.
///
/// Insertion order equals first-seen order (the clock is monotonic within a
/// session), so eviction pops from the front. When an insert would push the
/// log past its cap, the oldest 10% are evicted in one pass; bulk eviction
/// amortizes cleanup instead of paying it on every insert.
#[derive(Debug)]
pub struct ProcessedSaleLog {
    seen: HashMap<SaleKey, Instant>,
    order: VecDeque<SaleKey>,
    cap: usize,
}

impl ProcessedSaleLog {
    pub fn new() -> Self {
        Self::with_cap(LOG_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        ProcessedSaleLog {
            seen: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    pub fn contains(&self, key: &SaleKey) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Record a sale identity with its first-seen time. Re-inserting a known
    /// identity is a no-op. Returns `true` if the identity was new.
    pub fn insert(&mut self, key: SaleKey, first_seen: Instant) -> bool {
        if self.seen.contains_key(&key) {
            return false;
        }
        if self.seen.len() >= self.cap {
            self.evict_oldest();
        }
        self.seen.insert(key.clone(), first_seen);
        self.order.push_back(key);
        true
    }

    fn evict_oldest(&mut self) {
        let batch = (self.cap / 10).max(1);
        debug!(evicting = batch, len = self.seen.len(), "sale log over cap, evicting oldest entries");
        for _ in 0..batch {
            match self.order.pop_front() {
                Some(key) => {
                    self.seen.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for ProcessedSaleLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters a polled sales batch down to the records not yet seen this
/// session, seeding the log as a side effect.
///
/// The very first batch only establishes the baseline: every identity is
/// recorded but none is actionable, so opening the page never replays
/// celebrations for sales that already happened.
#[derive(Debug)]
pub struct Deduplicator {
    log: ProcessedSaleLog,
    first_load: bool,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Deduplicator {
            log: ProcessedSaleLog::new(),
            first_load: true,
        }
    }

    pub fn with_cap(cap: usize) -> Self {
        Deduplicator {
            log: ProcessedSaleLog::with_cap(cap),
            first_load: true,
        }
    }

    /// Whether the next batch will be treated as the session baseline.
    pub fn is_first_load(&self) -> bool {
        self.first_load
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Return the subset of `batch` whose identities are new this session,
    /// recording every identity with `now` as its first-seen time. Duplicate
    /// identities within the batch are actionable once. An empty batch
    /// leaves the log untouched.
    pub fn filter_new(&mut self, batch: &[SaleRecord], now: Instant) -> Vec<SaleRecord> {
        if batch.is_empty() {
            // Still consume the first-load baseline: an empty first snapshot
            // means every later sale is genuinely new.
            if self.first_load {
                self.first_load = false;
                info!("initial sales snapshot empty, baseline established");
            }
            return Vec::new();
        }

        let mut fresh = Vec::new();
        for sale in batch {
            let key = SaleKey::of(sale);
            if self.log.insert(key, now) {
                fresh.push(sale.clone());
            }
        }

        if self.first_load {
            self.first_load = false;
            info!(
                seeded = fresh.len(),
                "initial sales snapshot processed, celebrations suppressed"
            );
            return Vec::new();
        }

        fresh
    }
}
