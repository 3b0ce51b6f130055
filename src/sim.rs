// Test-injection surface: records synthetic sales that the next poll tick
// merges and celebrates exactly like real ones. Used from the operator
// console to rehearse the celebration flow before a live day.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::info;

use crate::store::{Store, TestSaleRecord};

pub struct Simulator {
    store: Arc<Store>,
    poll_now: Arc<Notify>,
    /// Last issued timestamp. Injection identity is the timestamp, so two
    /// injections in the same millisecond must still get distinct values.
    last_timestamp: AtomicI64,
}

impl Simulator {
    pub fn new(store: Arc<Store>, poll_now: Arc<Notify>) -> Self {
        Simulator {
            store,
            poll_now,
            last_timestamp: AtomicI64::new(0),
        }
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(0);
        now.max(prev + 1)
    }

    /// Inject a synthetic sale and nudge the poller so it lands immediately
    /// instead of waiting out the interval.
    pub fn simulate_sale(&self, agent_name: &str, amount: f64) -> Result<()> {
        let sale = TestSaleRecord {
            agent_name: agent_name.to_string(),
            amount,
            timestamp: self.next_timestamp(),
        };
        self.store.add_test_sale(&sale)?;
        info!(agent = %agent_name, amount, "test sale injected");
        self.poll_now.notify_one();
        Ok(())
    }

    /// Force an out-of-band poll tick (the manual retry affordance).
    pub fn poll_now(&self) {
        self.poll_now.notify_one();
    }

    /// Pending injections not yet consumed by a poll tick.
    pub fn pending(&self) -> Result<Vec<TestSaleRecord>> {
        self.store.list_test_sales()
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear_test_sales()?;
        info!("pending test sales cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> Simulator {
        let store = Arc::new(Store::open(":memory:").unwrap());
        Simulator::new(store, Arc::new(Notify::new()))
    }

    #[test]
    fn injected_sale_is_pending_until_cleared() {
        let sim = simulator();
        sim.simulate_sale("Ana", 300.0).unwrap();
        sim.simulate_sale("Luis", 150.0).unwrap();

        let pending = sim.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].agent_name, "Ana");

        sim.clear().unwrap();
        assert!(sim.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn injection_wakes_the_poller() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let poll_now = Arc::new(Notify::new());
        let sim = Simulator::new(store, poll_now.clone());

        sim.simulate_sale("Ana", 300.0).unwrap();
        // The nudge was recorded even though nobody was waiting yet.
        tokio::time::timeout(std::time::Duration::from_millis(10), poll_now.notified())
            .await
            .expect("poller was not woken");
    }
}
