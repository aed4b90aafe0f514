use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use rayon::prelude::*;

use super::checker::ConflictDetector;
use super::fitness::FitnessCalculator;
use super::models::{CandidateSlot, CostBreakdown, SearchProgress, SearchStats, Selection};
use super::space::{SearchGroup, SearchSpace};
use crate::config::{SearchBudget, Strategy};
use crate::error::OptimizeError;

const PROGRESS_EVERY: u64 = 8192;
const CLOCK_EVERY: u64 = 256;
const NO_BEST: u64 = u64::MAX;

/// Cooperative cancellation flag shared with a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub type ProgressSink = Arc<dyn Fn(&SearchProgress) + Send + Sync>;

/// Best selection found, with its cost and search statistics.
#[derive(Debug, Clone)]
pub struct Solution {
    pub selection: Selection,
    pub cost: CostBreakdown,
    pub stats: SearchStats,
}

// ============================================================================
// OPTIMIZER
// ============================================================================

/// Branch-and-bound search for the cheapest conflict-free selection.
pub struct Optimizer {
    space: SearchSpace,
    detector: ConflictDetector,
    fitness: FitnessCalculator,
    budget: SearchBudget,
    strategy: Strategy,
    cancel: CancelToken,
    progress: Option<ProgressSink>,
}

impl Optimizer {
    pub fn new(space: SearchSpace, detector: ConflictDetector, fitness: FitnessCalculator) -> Self {
        Self {
            space,
            detector,
            fitness,
            budget: SearchBudget::unlimited(),
            strategy: Strategy::Sequential,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the search. Walking-distance constraints are dropped and the
    /// search repeated when a complete search finds nothing with them.
    pub fn run(&self) -> Result<Solution, OptimizeError> {
        let start = Instant::now();
        let deadline = self
            .budget
            .time_limit_ms
            .map(|ms| start + Duration::from_millis(ms));

        if self.cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }

        // Options clashing with blocked times, dropped once for both passes
        let mut space = self.space.clone();
        if let Some(group) = space.retain_options(|option| self.detector.admissible(option)) {
            info!("{} has no class compatible with blocked times", group);
            return Err(OptimizeError::Infeasible {
                nodes: 0,
                budget_exhausted: false,
            });
        }

        match self.attempt(&space, &self.detector, start, deadline) {
            Err(OptimizeError::Infeasible {
                nodes,
                budget_exhausted: false,
            }) if self.detector.relaxable() => {
                warn!(
                    "No timetable satisfies the walking-distance rule after {} nodes; retrying with overlap checks only",
                    nodes
                );
                let relaxed = self.detector.without_walking();
                let mut solution = self.attempt(&space, &relaxed, start, deadline).map_err(|err| match err {
                    OptimizeError::Infeasible {
                        nodes: retry_nodes,
                        budget_exhausted,
                    } => OptimizeError::Infeasible {
                        nodes: nodes + retry_nodes,
                        budget_exhausted,
                    },
                    other => other,
                })?;
                solution.stats.nodes += nodes;
                solution.stats.relaxed_walking = true;
                Ok(solution)
            }
            other => other,
        }
    }

    fn attempt(
        &self,
        space: &SearchSpace,
        detector: &ConflictDetector,
        start: Instant,
        deadline: Option<Instant>,
    ) -> Result<Solution, OptimizeError> {
        if self.cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }

        info!(
            "Searching {} lesson groups ({} combinations)",
            space.len(),
            space
                .size()
                .map_or_else(|| "too many".to_string(), |n| n.to_string())
        );

        // Step 1: explore
        let ctx = SearchContext::new(
            space,
            detector,
            &self.fitness,
            &self.budget,
            deadline,
            &self.cancel,
            self.progress.as_ref(),
            start,
        );
        let outcome = match self.strategy {
            Strategy::Parallel if space.len() > 1 => ctx.run_parallel(),
            _ => ctx.run_sequential(),
        };

        let nodes = ctx.nodes.load(Ordering::Relaxed);
        debug!(
            "Search stopped ({:?}) after {} nodes, {} leaves, {} pruned",
            outcome.stop, nodes, outcome.leaves, outcome.pruned
        );

        // Step 2: interpret
        if outcome.stop == Stop::Cancelled {
            return Err(OptimizeError::Cancelled);
        }
        let Some((_, path)) = outcome.best else {
            return Err(OptimizeError::Infeasible {
                nodes,
                budget_exhausted: outcome.stop == Stop::Budget,
            });
        };

        let selection = space.selection(&path);
        let cost = self.fitness.evaluate(&selection);
        info!("Best timetable cost {} ({} classes)", cost.total, selection.len());

        Ok(Solution {
            selection,
            cost,
            stats: SearchStats {
                nodes,
                leaves: outcome.leaves,
                pruned: outcome.pruned,
                elapsed: start.elapsed(),
                exhausted: outcome.stop == Stop::Completed,
                relaxed_walking: false,
            },
        })
    }
}

// ============================================================================
// SEARCH INTERNALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Completed,
    Budget,
    Cancelled,
}

impl Stop {
    fn code(self) -> u8 {
        match self {
            Stop::Completed => 0,
            Stop::Budget => 1,
            Stop::Cancelled => 2,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Stop::Budget,
            2 => Stop::Cancelled,
            _ => Stop::Completed,
        }
    }
}

struct Outcome {
    best: Option<(u64, Vec<usize>)>,
    leaves: u64,
    pruned: u64,
    stop: Stop,
}

/// Read-only problem data plus the few counters all workers share.
struct SearchContext<'a> {
    groups: &'a [SearchGroup],
    detector: &'a ConflictDetector,
    fitness: &'a FitnessCalculator,
    /// `option_costs[depth][option]`
    option_costs: Vec<Vec<u64>>,
    /// Cheapest possible slot cost of groups `depth..`
    remaining_min: Vec<u64>,
    max_nodes: Option<u64>,
    deadline: Option<Instant>,
    cancel: &'a CancelToken,
    progress: Option<&'a ProgressSink>,
    start: Instant,
    nodes: AtomicU64,
    best: AtomicU64,
    stop: AtomicU8,
}

impl<'a> SearchContext<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        space: &'a SearchSpace,
        detector: &'a ConflictDetector,
        fitness: &'a FitnessCalculator,
        budget: &SearchBudget,
        deadline: Option<Instant>,
        cancel: &'a CancelToken,
        progress: Option<&'a ProgressSink>,
        start: Instant,
    ) -> Self {
        let groups = space.groups();
        let option_costs: Vec<Vec<u64>> = groups
            .iter()
            .map(|g| g.options.iter().map(|o| fitness.option_cost(o)).collect())
            .collect();

        let mut remaining_min = vec![0u64; groups.len() + 1];
        for depth in (0..groups.len()).rev() {
            let cheapest = option_costs[depth].iter().copied().min().unwrap_or(0);
            remaining_min[depth] = remaining_min[depth + 1].saturating_add(cheapest);
        }

        Self {
            groups,
            detector,
            fitness,
            option_costs,
            remaining_min,
            max_nodes: budget.max_nodes,
            deadline,
            cancel,
            progress,
            start,
            nodes: AtomicU64::new(0),
            best: AtomicU64::new(NO_BEST),
            stop: AtomicU8::new(Stop::Completed.code()),
        }
    }

    fn run_sequential(&self) -> Outcome {
        let mut worker = Worker::new(self);
        let stop = worker.explore(None);
        worker.into_outcome(stop)
    }

    /// Fans the first group's options out over rayon; every worker owns its partial state.
    fn run_parallel(&self) -> Outcome {
        let outcomes: Vec<Outcome> = (0..self.groups[0].options.len())
            .into_par_iter()
            .map(|option| {
                let mut worker = Worker::new(self);
                let stop = worker.explore(Some(option));
                worker.into_outcome(stop)
            })
            .collect();

        // lowest (cost, branch index) wins, same as the sequential first-found order
        let mut merged = Outcome {
            best: None,
            leaves: 0,
            pruned: 0,
            stop: Stop::from_code(self.stop.load(Ordering::Relaxed)),
        };
        for outcome in outcomes {
            merged.leaves += outcome.leaves;
            merged.pruned += outcome.pruned;
            if let Some((cost, path)) = outcome.best {
                if merged.best.as_ref().map_or(true, |(best, _)| cost < *best) {
                    merged.best = Some((cost, path));
                }
            }
        }
        merged
    }

    fn best_cost(&self) -> Option<u64> {
        match self.best.load(Ordering::Relaxed) {
            NO_BEST => None,
            cost => Some(cost),
        }
    }

    fn halt(&self, stop: Stop) -> Stop {
        let _ = self
            .stop
            .compare_exchange(Stop::Completed.code(), stop.code(), Ordering::Relaxed, Ordering::Relaxed);
        stop
    }

    fn emit_progress(&self, nodes: u64) {
        if let Some(progress) = self.progress {
            progress(&SearchProgress {
                nodes,
                elapsed: self.start.elapsed(),
                best_cost: self.best_cost(),
            });
        }
    }
}

/// Depth-first explorer over an explicit stack of option cursors.
struct Worker<'c, 'a> {
    ctx: &'c SearchContext<'a>,
    path: Vec<usize>,
    placed: Vec<&'a CandidateSlot>,
    marks: Vec<usize>,
    /// `slot_cost` before each push
    costs: Vec<u64>,
    slot_cost: u64,
    day_counts: [u32; 5],
    days_used: usize,
    best: Option<(u64, Vec<usize>)>,
    leaves: u64,
    pruned: u64,
}

impl<'c, 'a> Worker<'c, 'a> {
    fn new(ctx: &'c SearchContext<'a>) -> Self {
        Self {
            ctx,
            path: Vec::with_capacity(ctx.groups.len()),
            placed: Vec::new(),
            marks: Vec::with_capacity(ctx.groups.len()),
            costs: Vec::with_capacity(ctx.groups.len()),
            slot_cost: 0,
            day_counts: [0; 5],
            days_used: 0,
            best: None,
            leaves: 0,
            pruned: 0,
        }
    }

    fn into_outcome(self, stop: Stop) -> Outcome {
        Outcome {
            best: self.best,
            leaves: self.leaves,
            pruned: self.pruned,
            stop,
        }
    }

    /// Explores the whole space, or only the subtree under `root` (an option of group 0).
    fn explore(&mut self, root: Option<usize>) -> Stop {
        let groups: &'a [SearchGroup] = self.ctx.groups;
        let n = groups.len();

        if let Some(option) = root {
            if let Some(stop) = self.tick() {
                return stop;
            }
            self.push(0, option);
        }
        let base = self.path.len();
        if base == n {
            self.leaf();
            return Stop::Completed;
        }

        let mut cursors: Vec<usize> = Vec::with_capacity(n - base + 1);
        cursors.push(0);

        while let Some(cursor) = cursors.last_mut() {
            let depth = self.path.len();
            let group = &groups[depth];

            if *cursor >= group.options.len() {
                cursors.pop();
                if self.path.len() > base {
                    self.pop();
                }
                continue;
            }
            let option = *cursor;
            *cursor += 1;

            if let Some(stop) = self.tick() {
                return stop;
            }
            if !self.ctx.detector.fits(&self.placed, &group.options[option]) {
                continue;
            }
            if self.should_prune(self.bound_with(depth, option)) {
                self.pruned += 1;
                continue;
            }

            self.push(depth, option);
            if depth + 1 == n {
                self.leaf();
                self.pop();
            } else {
                cursors.push(0);
            }
        }

        Stop::Completed
    }

    /// Counts one node and checks the cooperative stop conditions.
    fn tick(&mut self) -> Option<Stop> {
        let ctx = self.ctx;
        let nodes = ctx.nodes.fetch_add(1, Ordering::Relaxed) + 1;

        if ctx.cancel.is_cancelled() {
            return Some(ctx.halt(Stop::Cancelled));
        }
        match Stop::from_code(ctx.stop.load(Ordering::Relaxed)) {
            Stop::Completed => {}
            other => return Some(other),
        }
        if ctx.max_nodes.is_some_and(|max| nodes > max) {
            return Some(ctx.halt(Stop::Budget));
        }
        if nodes % CLOCK_EVERY == 0 && ctx.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(ctx.halt(Stop::Budget));
        }
        if nodes % PROGRESS_EVERY == 0 {
            ctx.emit_progress(nodes);
        }
        None
    }

    fn push(&mut self, depth: usize, option: usize) {
        let groups: &'a [SearchGroup] = self.ctx.groups;
        self.marks.push(self.placed.len());
        for slot in &groups[depth].options[option].slots {
            let day = slot.day.index();
            if self.day_counts[day] == 0 {
                self.days_used += 1;
            }
            self.day_counts[day] += 1;
            self.placed.push(slot);
        }
        self.costs.push(self.slot_cost);
        self.slot_cost = self.slot_cost.saturating_add(self.ctx.option_costs[depth][option]);
        self.path.push(option);
    }

    fn pop(&mut self) {
        if self.path.pop().is_none() {
            return;
        }
        let mark = self.marks.pop().unwrap_or(0);
        for slot in self.placed.drain(mark..) {
            let day = slot.day.index();
            self.day_counts[day] -= 1;
            if self.day_counts[day] == 0 {
                self.days_used -= 1;
            }
        }
        self.slot_cost = self.costs.pop().unwrap_or(0);
    }

    /// Admissible lower bound on any completion after adding `option` at `depth`.
    fn bound_with(&self, depth: usize, option: usize) -> u64 {
        let mut new_day = [false; 5];
        for slot in &self.ctx.groups[depth].options[option].slots {
            let day = slot.day.index();
            if self.day_counts[day] == 0 {
                new_day[day] = true;
            }
        }
        let days = self.days_used + new_day.iter().filter(|&&d| d).count();

        self.slot_cost
            .saturating_add(self.ctx.option_costs[depth][option])
            .saturating_add(self.ctx.fitness.days_cost(days))
            .saturating_add(self.ctx.remaining_min[depth + 1])
    }

    /// Own incumbent prunes ties (first found wins); the shared one only strictly
    /// worse bounds, so an equal-cost leaf in an earlier branch is never lost.
    fn should_prune(&self, bound: u64) -> bool {
        let own = self.best.as_ref().map_or(NO_BEST, |(cost, _)| *cost);
        (own != NO_BEST && bound >= own) || bound > self.ctx.best.load(Ordering::Relaxed)
    }

    fn leaf(&mut self) {
        self.leaves += 1;
        let cost = self
            .slot_cost
            .saturating_add(self.ctx.fitness.days_cost(self.days_used))
            .saturating_add(self.ctx.fitness.gap_cost(&self.placed));

        if self.best.as_ref().map_or(true, |(best, _)| cost < *best) {
            self.best = Some((cost, self.path.clone()));
            let previous = self.ctx.best.fetch_min(cost, Ordering::Relaxed);
            if cost < previous {
                debug!("New best cost {} after {} nodes", cost, self.ctx.nodes.load(Ordering::Relaxed));
            }
        }
    }
}
