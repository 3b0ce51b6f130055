// Roster reconciliation: merge the external roster with locally stored
// per-agent team overrides.

use std::collections::HashMap;

use super::model::{normalize_name, Team};

/// Produce the authoritative team list from the external roster and a
/// persisted agent-name -> team-id override map.
///
/// For each team in the roster, selects the agents whose effective team
/// (override if present, else original) equals that team, then recomputes
/// `total_real` as the sum of the selected agents' sales. Overrides only
/// reassign agents between roster teams; an override naming an agent absent
/// from the roster has no effect.
///
/// Pure function of its inputs: identical arguments produce identical output.
pub fn reconcile(teams: &[Team], overrides: &HashMap<String, String>) -> Vec<Team> {
    // Normalize override keys once so lookups match feed names regardless of
    // case or stray whitespace.
    let overrides: HashMap<String, &String> = overrides
        .iter()
        .map(|(name, team_id)| (normalize_name(name), team_id))
        .collect();

    teams
        .iter()
        .map(|team| {
            let agents: Vec<_> = teams
                .iter()
                .flat_map(|t| t.agents.iter())
                .filter(|agent| {
                    let effective = overrides
                        .get(&normalize_name(&agent.name))
                        .map(|t| t.as_str())
                        .unwrap_or(&agent.team_id);
                    effective == team.id
                })
                .map(|agent| {
                    let mut agent = agent.clone();
                    agent.team_id = team.id.clone();
                    agent
                })
                .collect();

            let total: f64 = agents.iter().map(|a| a.sales).sum();
            Team {
                id: team.id.clone(),
                name: team.name.clone(),
                goal: team.goal,
                total_real: Some(total),
                agents,
            }
        })
        .collect()
}
