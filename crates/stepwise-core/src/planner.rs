//! Scenario selection by intent classification

use crate::error::PlannerError;
use crate::scenario::Scenario;
use std::sync::Arc;
use stepwise_tools::Environment;

/// Best score below which no scenario is selected
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Score gap under which two candidates count as ambiguous
pub const AMBIGUITY_MARGIN: f64 = 0.1;

/// Picks the scenario that best matches a command
pub struct ScenarioPlanner<E: Environment> {
    scenarios: Vec<Arc<dyn Scenario<E>>>,
}

impl<E: Environment> Default for ScenarioPlanner<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Environment> ScenarioPlanner<E> {
    /// Create empty planner
    #[must_use]
    pub fn new() -> Self {
        Self {
            scenarios: Vec::new(),
        }
    }

    /// Register a candidate scenario
    pub fn register(&mut self, scenario: Arc<dyn Scenario<E>>) {
        tracing::debug!(scenario = scenario.name(), "registered scenario");
        self.scenarios.push(scenario);
    }

    /// Builder form of [`ScenarioPlanner::register`]
    #[must_use]
    pub fn with_scenario(mut self, scenario: Arc<dyn Scenario<E>>) -> Self {
        self.register(scenario);
        self
    }

    /// Number of registered scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether no scenario is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Score every scenario and return the best with its score
    ///
    /// Ties keep the scenario registered first. A non-finite score counts
    /// as 0. A runner-up within
    /// [`AMBIGUITY_MARGIN`] of the winner is logged as a warning.
    ///
    /// # Errors
    /// - `NoScenarios` when nothing is registered
    /// - `LowConfidence` when the best score is under [`MIN_CONFIDENCE`]
    pub fn classify_and_select(
        &self,
        command: &str,
    ) -> Result<(Arc<dyn Scenario<E>>, f64), PlannerError> {
        let mut scored: Vec<(usize, f64)> = self
            .scenarios
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let mut score = scenario.classify_intent(command);
                if !score.is_finite() {
                    tracing::warn!(scenario = scenario.name(), score, "non-finite intent score, treating as 0");
                    score = 0.0;
                }
                tracing::debug!(scenario = scenario.name(), score, "classified intent");
                (i, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let Some(&(best_index, best)) = scored.first() else {
            return Err(PlannerError::NoScenarios);
        };
        if best < MIN_CONFIDENCE {
            tracing::warn!(best, "no scenario matched the command");
            return Err(PlannerError::LowConfidence { best });
        }

        let selected = &self.scenarios[best_index];
        if let Some(&(runner_up, score)) = scored.get(1) {
            if best - score < AMBIGUITY_MARGIN {
                tracing::warn!(
                    selected = selected.name(),
                    runner_up = self.scenarios[runner_up].name(),
                    best,
                    score,
                    "ambiguous command, scenarios scored closely"
                );
            }
        }

        tracing::info!(scenario = selected.name(), score = best, "selected scenario");
        Ok((Arc::clone(selected), best))
    }
}

impl<E: Environment> std::fmt::Debug for ScenarioPlanner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.scenarios.iter().map(|s| s.name()).collect();
        f.debug_struct("ScenarioPlanner").field("scenarios", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParsedParams;
    use crate::error::ScenarioError;
    use crate::scenario::Plan;
    use async_trait::async_trait;

    struct Blank;

    #[async_trait]
    impl Environment for Blank {
        fn current_address(&self) -> String {
            String::new()
        }

        async fn describe_state(&self) -> String {
            String::new()
        }
    }

    struct Keyword {
        name: &'static str,
        keyword: &'static str,
        score: f64,
    }

    #[async_trait]
    impl Scenario<Blank> for Keyword {
        fn name(&self) -> &str {
            self.name
        }

        fn classify_intent(&self, command: &str) -> f64 {
            if command.contains(self.keyword) {
                self.score
            } else {
                0.0
            }
        }

        async fn parse_command(&self, _command: &str) -> Result<ParsedParams, ScenarioError> {
            Ok(ParsedParams::new())
        }

        fn build_steps(&self, _params: &ParsedParams) -> Result<Plan<Blank>, ScenarioError> {
            Ok(Vec::new())
        }
    }

    fn planner() -> ScenarioPlanner<Blank> {
        ScenarioPlanner::new()
            .with_scenario(Arc::new(Keyword {
                name: "booking",
                keyword: "book",
                score: 0.9,
            }))
            .with_scenario(Arc::new(Keyword {
                name: "cancel",
                keyword: "cancel",
                score: 0.8,
            }))
    }

    #[test]
    fn selects_highest_score() {
        let (scenario, score) = planner().classify_and_select("cancel my booking").unwrap();
        assert_eq!(scenario.name(), "booking");
        assert!((score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn low_confidence_is_rejected() {
        let err = planner().classify_and_select("order pizza").err().unwrap();
        assert!(matches!(err, PlannerError::LowConfidence { best } if best == 0.0));
    }

    #[test]
    fn empty_planner_has_nothing_to_pick() {
        let err = ScenarioPlanner::<Blank>::new()
            .classify_and_select("book a room")
            .err()
            .unwrap();
        assert!(matches!(err, PlannerError::NoScenarios));
    }

    #[test]
    fn ties_keep_registration_order() {
        let planner = ScenarioPlanner::new()
            .with_scenario(Arc::new(Keyword {
                name: "first",
                keyword: "room",
                score: 0.5,
            }))
            .with_scenario(Arc::new(Keyword {
                name: "second",
                keyword: "room",
                score: 0.5,
            }));
        let (scenario, _) = planner.classify_and_select("room").unwrap();
        assert_eq!(scenario.name(), "first");
    }

    #[test]
    fn non_finite_score_is_never_selected() {
        let planner = ScenarioPlanner::new()
            .with_scenario(Arc::new(Keyword {
                name: "broken",
                keyword: "room",
                score: f64::NAN,
            }))
            .with_scenario(Arc::new(Keyword {
                name: "booking",
                keyword: "room",
                score: 0.6,
            }));
        let (scenario, score) = planner.classify_and_select("room").unwrap();
        assert_eq!(scenario.name(), "booking");
        assert!((score - 0.6).abs() < f64::EPSILON);

        let alone = ScenarioPlanner::new().with_scenario(Arc::new(Keyword {
            name: "broken",
            keyword: "room",
            score: f64::INFINITY,
        }));
        let err = alone.classify_and_select("room").err().unwrap();
        assert!(matches!(err, PlannerError::LowConfidence { best } if best == 0.0));
    }
}
