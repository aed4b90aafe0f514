use std::sync::Arc;

pub mod algorithms;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod session;
pub mod venues;

use algorithms::assembler::assemble;
use algorithms::checker::{blocked_intervals, ConflictDetector};
use algorithms::fitness::FitnessCalculator;
use algorithms::space::SearchSpace;

pub use algorithms::models::{
    CandidateSlot, Constraints, CostBreakdown, CustomBlock, Day, LessonGroup, Module, OptimizationRequest,
    OptimizeReport, SearchStats, Selection, TimetableBlock,
};
pub use algorithms::optimizer::{CancelToken, Optimizer, ProgressSink, Solution};
pub use config::{OptimizerConfig, Strategy};
pub use error::{AppError, OptimizeError};
pub use session::{OptimizeSession, OptimizeState};
pub use venues::VenueMap;

/// Validates `request` and sets up the search. Fails fast with `InvalidInput`.
pub fn prepare(
    request: &OptimizationRequest,
    config: &OptimizerConfig,
    venues: Option<Arc<VenueMap>>,
) -> Result<Optimizer, OptimizeError> {
    config.validate()?;
    let space = SearchSpace::build(&request.modules)?;
    let blocked = blocked_intervals(&request.constraints)?;
    let fitness = FitnessCalculator::new(&request.constraints, config.weights.clone())?;
    let detector = ConflictDetector::new(venues, config.walking.clone(), blocked);

    Ok(Optimizer::new(space, detector, fitness)
        .with_budget(config.budget.clone())
        .with_strategy(config.strategy))
}

/// Optimizes with the default policy and returns the blocks to display.
pub async fn optimize(request: &OptimizationRequest) -> Result<Vec<TimetableBlock>, OptimizeError> {
    optimize_with(request, &OptimizerConfig::default(), None, CancelToken::new())
        .await
        .map(|report| report.blocks)
}

pub async fn optimize_with(
    request: &OptimizationRequest,
    config: &OptimizerConfig,
    venues: Option<Arc<VenueMap>>,
    cancel: CancelToken,
) -> Result<OptimizeReport, OptimizeError> {
    optimize_with_progress(request, config, venues, cancel, None).await
}

/// Runs the search on the blocking pool so the caller's task only awaits it.
pub async fn optimize_with_progress(
    request: &OptimizationRequest,
    config: &OptimizerConfig,
    venues: Option<Arc<VenueMap>>,
    cancel: CancelToken,
    progress: Option<ProgressSink>,
) -> Result<OptimizeReport, OptimizeError> {
    let mut optimizer = prepare(request, config, venues)?.with_cancel(cancel);
    if let Some(progress) = progress {
        optimizer = optimizer.with_progress(progress);
    }

    let solution = tokio::task::spawn_blocking(move || optimizer.run())
        .await
        .unwrap_or_else(|err| {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
            Err(OptimizeError::Cancelled)
        })?;

    Ok(OptimizeReport {
        blocks: assemble(&solution.selection),
        cost: solution.cost,
        stats: solution.stats,
    })
}
