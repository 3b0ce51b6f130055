// The rendering surface seam. The actual screen (an unattended office TV)
// is an external collaborator; the core only tells it what state to show.

use crate::board::model::{Agent, Team};

/// Receiver of display-state transitions. Implementations must be cheap and
/// non-blocking; they are called from the poller and celebration engine
/// tasks.
pub trait DisplaySurface: Send + Sync {
    /// The authoritative roster changed (every successful poll tick).
    fn roster_updated(&self, teams: &[Team]);
    /// A celebration overlay took over the screen.
    fn celebration_started(&self, agent: &Agent, amount: f64);
    /// The celebration overlay was cleared; back to the dashboard.
    fn celebration_cleared(&self);
    /// A poll tick failed; show the error affordance with manual retry.
    fn feed_error(&self, message: &str);
}

/// Renders display transitions into the log. Stands in for the real screen
/// when running headless.
pub struct LogDisplay;

impl DisplaySurface for LogDisplay {
    fn roster_updated(&self, teams: &[Team]) {
        for team in teams {
            tracing::info!(
                team = %team.name,
                total = team.total_real.unwrap_or(0.0),
                agents = team.agents.len(),
                "roster updated"
            );
        }
    }

    fn celebration_started(&self, agent: &Agent, amount: f64) {
        tracing::info!(agent = %agent.name, amount, "celebration overlay up");
    }

    fn celebration_cleared(&self) {
        tracing::info!("celebration overlay cleared");
    }

    fn feed_error(&self, message: &str) {
        tracing::warn!("feed error shown on screen: {message}");
    }
}
