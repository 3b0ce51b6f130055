// The poll loop: periodically fetch the roster/sales feed, detect fresh
// sales, merge locally injected test sales, reconcile overrides, and hand
// the results to the display and the celebration engine.
//
// A tick is all-or-nothing per concern: a failed fetch surfaces through the
// display's error affordance and the loop keeps running with the previous
// roster on screen.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use crate::board::model::{find_agent, QueuedCelebration, Team};
use crate::board::reconcile::reconcile;
use crate::config::FeedConfig;
use crate::dedup::Deduplicator;
use crate::display::DisplaySurface;
use crate::feed::SalesFeed;
use crate::store::{Store, TestSaleRecord};

pub struct Poller {
    feed: Arc<dyn SalesFeed>,
    store: Arc<Store>,
    display: Arc<dyn DisplaySurface>,
    celebrations: mpsc::Sender<QueuedCelebration>,
    dedup: Deduplicator,
    /// Timestamps of test sales already merged this session. Guards against
    /// double-merging a row whose delete failed on a previous tick.
    merged_test_sales: HashSet<i64>,
    config: FeedConfig,
}

impl Poller {
    pub fn new(
        feed: Arc<dyn SalesFeed>,
        store: Arc<Store>,
        display: Arc<dyn DisplaySurface>,
        celebrations: mpsc::Sender<QueuedCelebration>,
        config: FeedConfig,
    ) -> Self {
        Poller {
            feed,
            store,
            display,
            celebrations,
            dedup: Deduplicator::new(),
            merged_test_sales: HashSet::new(),
            config,
        }
    }

    /// Run until the shutdown flag flips. Ticks immediately on entry, then
    /// on every interval; `poll_now` forces an out-of-band tick (the manual
    /// retry affordance).
    pub async fn run(mut self, poll_now: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
                _ = poll_now.notified() => {
                    debug!("manual poll requested");
                    interval.reset();
                }
            }

            if let Err(e) = self.tick().await {
                warn!("poll tick failed: {e:#}");
                self.display.feed_error(&format!("{e:#}"));
            }
        }

        info!("poller stopped");
    }

    /// One poll cycle. Returns Err only for failures worth surfacing on the
    /// display; per-record problems (unknown agents) are logged and skipped.
    pub async fn tick(&mut self) -> Result<()> {
        let response = self.feed.fetch().await?;
        let (mut teams, new_sales) = response.normalize();

        // Detect which externally reported sales are actually fresh. The
        // first successful tick only establishes the baseline.
        let fresh = self.dedup.filter_new(&new_sales, Instant::now());

        // Overrides are read before the test-sale merge: once a test sale
        // has been folded into the roster, no fallible step stands between
        // it and its celebration.
        let overrides = self.store.team_overrides()?;

        // Locally injected test sales merge additively into the roster and
        // always celebrate, independent of the first-load baseline.
        let test_celebrations = self.merge_test_sales(&mut teams)?;

        for team in &mut teams {
            for agent in &mut team.agents {
                agent.avatar = self.store.resolve_photo(&agent.name, &agent.avatar);
            }
        }

        let teams = reconcile(&teams, &overrides);
        self.display.roster_updated(&teams);

        for sale in fresh {
            // Non-positive values are corrections or reversals in the sheet;
            // they adjust totals through the roster but never fire a jackpot.
            if sale.value <= 0.0 {
                warn!(
                    agent = %sale.agent_name,
                    value = sale.value,
                    "non-positive sale value, not celebrating"
                );
                continue;
            }
            match find_agent(&teams, &sale.agent_name) {
                Some(agent) => {
                    info!(agent = %agent.name, value = sale.value, "new sale detected");
                    self.emit(QueuedCelebration {
                        agent: agent.clone(),
                        amount: sale.value,
                    })
                    .await;
                }
                None => {
                    warn!(agent = %sale.agent_name, "sale for unknown agent, skipping");
                }
            }
        }

        for sale in test_celebrations {
            match find_agent(&teams, &sale.agent_name) {
                Some(agent) => {
                    self.emit(QueuedCelebration {
                        agent: agent.clone(),
                        amount: sale.amount,
                    })
                    .await;
                }
                None => {
                    warn!(agent = %sale.agent_name, "test sale agent vanished before celebration");
                }
            }
            // Consume the row only now that its celebration has been
            // emitted (or knowingly skipped).
            self.merged_test_sales.insert(sale.timestamp);
            self.store.remove_test_sale(sale.timestamp)?;
        }

        Ok(())
    }

    /// Fold pending test sales into the roster totals. Merged rows are
    /// returned for celebration and consumed by the caller after emission,
    /// so a failure later in the tick leaves them pending for the next one.
    /// Rows naming an agent not on the roster are dropped with a warning so
    /// they do not pile up.
    fn merge_test_sales(&mut self, teams: &mut [Team]) -> Result<Vec<TestSaleRecord>> {
        let pending = self.store.list_test_sales()?;
        let mut celebrations = Vec::new();

        for sale in pending {
            if self.merged_test_sales.contains(&sale.timestamp) {
                // Celebrated on an earlier tick whose delete failed; just
                // retry the delete.
                self.store.remove_test_sale(sale.timestamp)?;
                continue;
            }

            let wanted = crate::board::model::normalize_name(&sale.agent_name);
            let agent = teams
                .iter_mut()
                .flat_map(|t| t.agents.iter_mut())
                .find(|a| crate::board::model::normalize_name(&a.name) == wanted);

            match agent {
                Some(agent) => {
                    agent.sales += sale.amount;
                    info!(
                        agent = %agent.name,
                        amount = sale.amount,
                        "test sale merged"
                    );
                    celebrations.push(sale);
                }
                None => {
                    warn!(agent = %sale.agent_name, "test sale for unknown agent, discarding");
                    self.store.remove_test_sale(sale.timestamp)?;
                }
            }
        }

        Ok(celebrations)
    }

    async fn emit(&self, celebration: QueuedCelebration) {
        if self.celebrations.send(celebration).await.is_err() {
            warn!("celebration engine gone, dropping event");
        }
    }
}
