// Core data shapes: agents, teams, sale records, and the feed response.
//
// Field names mirror the JSON the roster/sales collaborator returns
// (`teamId`, `agentName`, ...), so these deserialize straight off the wire.

use serde::{Deserialize, Serialize};

/// A single sales agent as reported by the roster collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    /// Running cumulative sales total for this agent.
    #[serde(default)]
    pub sales: f64,
    #[serde(rename = "teamId", default)]
    pub team_id: String,
}

/// A team of agents with a sales goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub goal: f64,
    /// Authoritative displayed team total. Recomputed as the sum of the
    /// team's agents' `sales` after reconciliation.
    #[serde(default)]
    pub total_real: Option<f64>,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

impl Team {
    /// Sum of the team's agents' cumulative sales.
    pub fn agents_total(&self) -> f64 {
        self.agents.iter().map(|a| a.sales).sum()
    }
}

/// A reported sale as it appears in the feed's `newSales` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    #[serde(rename = "agentName")]
    pub agent_name: String,
    #[serde(rename = "entryDate")]
    pub entry_date: String,
    pub value: f64,
}

/// A detected sale waiting for (or undergoing) celebration.
///
/// Created by the poller, consumed exactly once by the sequencer, then
/// discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCelebration {
    pub agent: Agent,
    pub amount: f64,
}

/// The raw feed payload. The collaborator historically returned a bare team
/// array; newer deployments wrap it as `{teams, newSales}`. Both shapes are
/// accepted and normalized.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedResponse {
    Full {
        teams: Vec<Team>,
        #[serde(rename = "newSales", default)]
        new_sales: Vec<SaleRecord>,
    },
    Bare(Vec<Team>),
}

impl FeedResponse {
    /// Normalize into `(teams, new_sales)`; the legacy bare-array shape
    /// implies an empty sales batch.
    pub fn normalize(self) -> (Vec<Team>, Vec<SaleRecord>) {
        match self {
            FeedResponse::Full { teams, new_sales } => (teams, new_sales),
            FeedResponse::Bare(teams) => (teams, Vec::new()),
        }
    }
}

/// Case- and whitespace-insensitive agent name form used for matching sales
/// to roster agents and as the dedup identity component.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Find an agent across all teams by normalized name.
pub fn find_agent<'a>(teams: &'a [Team], agent_name: &str) -> Option<&'a Agent> {
    let wanted = normalize_name(agent_name);
    teams
        .iter()
        .flat_map(|t| t.agents.iter())
        .find(|a| normalize_name(&a.name) == wanted)
}
