//! Node-budget sweep.
//!
//! Runs every scenario once without limits to learn its optimum, then again
//! under a series of node budgets, recording how close each budget gets.

use log::{debug, info};
use serde::Serialize;

use crate::algorithms::models::OptimizationRequest;
use crate::algorithms::optimizer::CancelToken;
use crate::config::{OptimizerConfig, SearchBudget};
use crate::error::OptimizeError;
use crate::optimize_with;

pub struct BudgetRange {
    /// Smallest and largest node budget tried.
    pub max_nodes: (u64, u64),
    /// Each budget is the previous one times this factor.
    pub factor: u64,
}

impl Default for BudgetRange {
    fn default() -> Self {
        Self {
            max_nodes: (100, 1_000_000),
            factor: 10,
        }
    }
}

impl BudgetRange {
    pub fn steps(&self) -> Vec<u64> {
        let (start, end) = self.max_nodes;
        let factor = self.factor.max(2);
        let mut steps = Vec::new();
        let mut current = start.max(1);
        while current <= end {
            steps.push(current);
            current = match current.checked_mul(factor) {
                Some(next) => next,
                None => break,
            };
        }
        steps
    }
}

/// One scenario solved under one budget.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetTrial {
    pub scenario: String,
    pub max_nodes: u64,
    /// `None` when the budget ran out before any timetable was found.
    pub cost: Option<u64>,
    /// `None` when the scenario has no conflict-free timetable at all.
    pub optimum: Option<u64>,
    pub nodes: u64,
    pub elapsed_ms: f64,
    /// The search space was fully explored within the budget.
    pub complete: bool,
}

impl BudgetTrial {
    pub fn reached_optimum(&self) -> bool {
        self.cost == self.optimum
    }

    /// Extra cost over the optimum, if both are known.
    pub fn gap(&self) -> Option<u64> {
        Some(self.cost?.saturating_sub(self.optimum?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub trials: Vec<BudgetTrial>,
    /// Smallest budget under which every scenario reached its optimum.
    pub recommended_max_nodes: Option<u64>,
}

pub async fn sweep_budgets<F>(
    scenarios: &[(String, OptimizationRequest)],
    range: &BudgetRange,
    config: &OptimizerConfig,
    mut on_trial: F,
) -> Result<SweepReport, OptimizeError>
where
    F: FnMut(&BudgetTrial),
{
    let steps = range.steps();
    info!(
        "Sweeping {} node budgets {:?} over {} scenarios",
        steps.len(),
        steps,
        scenarios.len()
    );

    let mut trials = Vec::with_capacity(steps.len() * scenarios.len());

    for (name, request) in scenarios {
        // Step 1: exhaustive reference run
        let mut exact = config.clone();
        exact.budget = SearchBudget::unlimited();
        let optimum = match optimize_with(request, &exact, None, CancelToken::new()).await {
            Ok(report) => Some(report.cost.total),
            Err(OptimizeError::Infeasible { .. }) => None,
            Err(err) => return Err(err),
        };
        debug!("Scenario {}: optimum {:?}", name, optimum);

        // Step 2: the same scenario under each budget
        for &max_nodes in &steps {
            let mut limited = config.clone();
            limited.budget = SearchBudget {
                max_nodes: Some(max_nodes),
                time_limit_ms: None,
            };

            let trial = match optimize_with(request, &limited, None, CancelToken::new()).await {
                Ok(report) => BudgetTrial {
                    scenario: name.clone(),
                    max_nodes,
                    cost: Some(report.cost.total),
                    optimum,
                    nodes: report.stats.nodes,
                    elapsed_ms: report.stats.elapsed.as_secs_f64() * 1000.0,
                    complete: report.stats.exhausted,
                },
                Err(OptimizeError::Infeasible {
                    nodes,
                    budget_exhausted,
                }) => BudgetTrial {
                    scenario: name.clone(),
                    max_nodes,
                    cost: None,
                    optimum,
                    nodes,
                    elapsed_ms: 0.0,
                    complete: !budget_exhausted,
                },
                Err(err) => return Err(err),
            };

            debug!(
                "Scenario {} @ {} nodes: cost {:?} (gap {:?})",
                name,
                max_nodes,
                trial.cost,
                trial.gap()
            );
            on_trial(&trial);
            trials.push(trial);
        }
    }

    let recommended_max_nodes = steps.iter().copied().find(|&budget| {
        trials
            .iter()
            .filter(|t| t.max_nodes == budget)
            .all(BudgetTrial::reached_optimum)
    });

    match recommended_max_nodes {
        Some(budget) => info!("Every scenario reaches its optimum from {} nodes", budget),
        None => info!("No budget in range reached the optimum on every scenario"),
    }

    Ok(SweepReport {
        trials,
        recommended_max_nodes,
    })
}
