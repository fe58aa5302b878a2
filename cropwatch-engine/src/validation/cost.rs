//! Per-agent token and cost accounting
//!
//! Every completion call is recorded against the agent that made it; the
//! resulting report travels with the validation outcome, including degraded
//! ones, so partial passes still account for what they spent.

use crate::sources::CompletionResponse;
use serde::Serialize;
use std::collections::BTreeMap;

/// Spend accumulated by one agent
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentCost {
    pub calls: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CostReport {
    /// Keyed by agent name ("curator", "judge")
    pub agents: BTreeMap<String, AgentCost>,
    pub total_usd: f64,
}

/// Mutable accumulator the orchestrator threads through a validation pass.
pub struct CostLedger {
    prompt_price_per_1k: f64,
    completion_price_per_1k: f64,
    agents: BTreeMap<String, AgentCost>,
}

impl CostLedger {
    pub fn new(prompt_price_per_1k: f64, completion_price_per_1k: f64) -> Self {
        Self {
            prompt_price_per_1k,
            completion_price_per_1k,
            agents: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, agent: &str, response: &CompletionResponse) {
        let cost = self.agents.entry(agent.to_string()).or_default();
        cost.calls += 1;
        cost.prompt_tokens += response.prompt_tokens;
        cost.completion_tokens += response.completion_tokens;
        cost.cost_usd += response.prompt_tokens as f64 / 1_000.0 * self.prompt_price_per_1k
            + response.completion_tokens as f64 / 1_000.0 * self.completion_price_per_1k;
    }

    pub fn report(&self) -> CostReport {
        CostReport {
            agents: self.agents.clone(),
            total_usd: self.agents.values().map(|a| a.cost_usd).sum(),
        }
    }
}
