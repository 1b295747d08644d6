//! Dataset statistics: per-scenario counts, parse rates and trace sizes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::batch::ParseCounts;
use crate::compiler::format::trace_list;
use crate::models::Scenario;

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `count / total` as a percentage with two decimals; zero when `total` is.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn average(total: usize, count: usize) -> f64 {
    round2(total as f64 / count.max(1) as f64)
}

/// Reasoning steps in a payload: `steps`, else `analysis_steps`.
pub fn reasoning_step_count(payload: &Map<String, Value>) -> usize {
    trace_list(payload, "steps", "analysis_steps").len()
}

/// Decision points in a payload: `decision_points`, else `analysis_steps`.
pub fn decision_point_count(payload: &Map<String, Value>) -> usize {
    trace_list(payload, "decision_points", "analysis_steps").len()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScenarioStatistics {
    /// Training items produced.
    pub total_count: usize,
    pub records_seen: usize,
    pub records_parsed: usize,
    pub parse_success_rate: f64,
    pub avg_reasoning_steps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_decision_points: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CombinedStatistics {
    pub total_items: usize,
    pub scenario1_percentage: f64,
    pub scenario2_percentage: f64,
    pub overall_parse_success_rate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryCounts {
    pub scenario1: usize,
    pub scenario2: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DatasetStatistics {
    pub generated_at: String,
    pub by_repository: BTreeMap<String, RepositoryCounts>,
    pub scenario1: ScenarioStatistics,
    pub scenario2: ScenarioStatistics,
    pub combined: CombinedStatistics,
}

#[derive(Clone, Debug, Default)]
struct ScenarioTally {
    counts: ParseCounts,
    items: usize,
    steps: usize,
    decision_points: usize,
}

/// Running totals fed while compiling, turned into [`DatasetStatistics`].
#[derive(Clone, Debug, Default)]
pub struct StatisticsBuilder {
    scenarios: BTreeMap<Scenario, ScenarioTally>,
    repositories: BTreeMap<String, RepositoryCounts>,
}

impl StatisticsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the parse outcome of one batch of records.
    pub fn record_counts(&mut self, scenario: Scenario, counts: ParseCounts) {
        self.scenarios.entry(scenario).or_default().counts.merge(counts);
    }

    /// Record a parsed payload that became a training item of `repo`.
    pub fn record_item(&mut self, scenario: Scenario, repo: &str, payload: &Map<String, Value>) {
        let tally = self.scenarios.entry(scenario).or_default();
        tally.items += 1;
        tally.steps += reasoning_step_count(payload);
        tally.decision_points += decision_point_count(payload);

        let counts = self.repositories.entry(repo.to_string()).or_default();
        match scenario {
            Scenario::Scenario1 => counts.scenario1 += 1,
            Scenario::Scenario2 => counts.scenario2 += 1,
            Scenario::Unknown => {}
        }
        counts.total = counts.scenario1 + counts.scenario2;
    }

    fn scenario(&self, scenario: Scenario) -> ScenarioStatistics {
        let tally = self.scenarios.get(&scenario).cloned().unwrap_or_default();
        ScenarioStatistics {
            total_count: tally.items,
            records_seen: tally.counts.seen,
            records_parsed: tally.counts.parsed,
            parse_success_rate: percentage(tally.counts.parsed, tally.counts.seen),
            avg_reasoning_steps: average(tally.steps, tally.items),
            avg_decision_points: (scenario == Scenario::Scenario2)
                .then(|| average(tally.decision_points, tally.items)),
        }
    }

    pub fn build(&self, generated_at: String) -> DatasetStatistics {
        let scenario1 = self.scenario(Scenario::Scenario1);
        let scenario2 = self.scenario(Scenario::Scenario2);
        let mut overall = ParseCounts::default();
        for tally in self.scenarios.values() {
            overall.merge(tally.counts);
        }
        let total_items = scenario1.total_count + scenario2.total_count;
        DatasetStatistics {
            generated_at,
            by_repository: self.repositories.clone(),
            combined: CombinedStatistics {
                total_items,
                scenario1_percentage: percentage(scenario1.total_count, total_items),
                scenario2_percentage: percentage(scenario2.total_count, total_items),
                overall_parse_success_rate: percentage(overall.parsed, overall.seen),
            },
            scenario1,
            scenario2,
        }
    }
}
