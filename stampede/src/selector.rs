//! Weighted scenario selection
use rand::Rng;
use stampede_core::{ConfigurationError, ScenarioDefinition};

/// Picks scenarios in proportion to their weights.
///
/// The cumulative weight table is built once; every lookup is a single uniform draw followed by
/// a binary search. The selector is immutable after construction, so one instance can be shared
/// across all virtual users.
#[derive(Debug, Clone)]
pub struct ScenarioSelector {
    scenarios: Vec<ScenarioDefinition>,
    cumulative: Vec<f64>,
    total_weight: f64,
}

impl ScenarioSelector {
    pub fn new(scenarios: Vec<ScenarioDefinition>) -> Result<Self, ConfigurationError> {
        if scenarios.is_empty() {
            return Err(ConfigurationError::NoScenarios);
        }

        let mut cumulative = Vec::with_capacity(scenarios.len());
        let mut total_weight = 0.;
        for scenario in &scenarios {
            if !(scenario.weight.is_finite() && scenario.weight > 0.) {
                return Err(ConfigurationError::NonPositiveWeight {
                    name: scenario.name.clone(),
                    weight: scenario.weight,
                });
            }
            total_weight += scenario.weight;
            if !total_weight.is_finite() {
                return Err(ConfigurationError::WeightOverflow(scenario.name.clone()));
            }
            cumulative.push(total_weight);
        }

        Ok(Self {
            scenarios,
            cumulative,
            total_weight,
        })
    }

    pub fn select(&self) -> &ScenarioDefinition {
        let draw = rand::thread_rng().gen_range(0.0..self.total_weight);
        self.select_at(draw)
    }

    /// The first scenario whose cumulative weight exceeds `draw`. A draw at (or beyond) the
    /// total weight resolves to the last scenario.
    pub fn select_at(&self, draw: f64) -> &ScenarioDefinition {
        let idx = self.cumulative.partition_point(|&c| c <= draw);
        &self.scenarios[idx.min(self.scenarios.len() - 1)]
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }
}
