//! Lifecycle of optimize calls made on behalf of one user.
//!
//! `Idle -> Running -> Succeeded | Failed -> Idle`. Only one call runs at a
//! time; a second one is refused with [`OptimizeError::Busy`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::algorithms::models::{OptimizationRequest, TimetableBlock};
use crate::algorithms::optimizer::CancelToken;
use crate::config::OptimizerConfig;
use crate::error::OptimizeError;
use crate::venues::VenueMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum OptimizeState {
    #[default]
    Idle,
    Running,
    Succeeded(Vec<TimetableBlock>),
    Failed(OptimizeError),
}

impl OptimizeState {
    pub fn is_running(&self) -> bool {
        matches!(self, OptimizeState::Running)
    }

    /// Succeeded or Failed: a result waiting to be acknowledged.
    pub fn is_finished(&self) -> bool {
        matches!(self, OptimizeState::Succeeded(_) | OptimizeState::Failed(_))
    }
}

#[derive(Default)]
struct Inner {
    state: OptimizeState,
    cancel: Option<CancelToken>,
}

pub struct OptimizeSession {
    config: OptimizerConfig,
    venues: Option<Arc<VenueMap>>,
    inner: Mutex<Inner>,
}

impl OptimizeSession {
    pub fn new(config: OptimizerConfig, venues: Option<Arc<VenueMap>>) -> Self {
        Self {
            config,
            venues,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn state(&self) -> OptimizeState {
        self.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.is_running()
    }

    /// Optimizes `request`; the outcome is also kept as the session state.
    pub async fn run(&self, request: &OptimizationRequest) -> Result<Vec<TimetableBlock>, OptimizeError> {
        let mut guard = self.begin()?;
        let result = crate::optimize_with(request, &self.config, self.venues.clone(), guard.cancel.clone())
            .await
            .map(|report| {
                info!(
                    "Optimized {} modules into {} blocks (cost {}, {} nodes)",
                    request.modules.len(),
                    report.blocks.len(),
                    report.cost.total,
                    report.stats.nodes
                );
                report.blocks
            });
        guard.finish(&result);
        result
    }

    /// Asks the running call to stop. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        match (&inner.state, &inner.cancel) {
            (OptimizeState::Running, Some(cancel)) => {
                debug!("Cancelling running optimization");
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Clears a finished result and returns it; the session is Idle again.
    /// A running call is left alone.
    pub fn acknowledge(&self) -> OptimizeState {
        let mut inner = self.lock();
        if inner.state.is_running() {
            return OptimizeState::Running;
        }
        std::mem::take(&mut inner.state)
    }

    fn begin(&self) -> Result<RunGuard<'_>, OptimizeError> {
        let mut inner = self.lock();
        if inner.state.is_running() {
            return Err(OptimizeError::Busy);
        }
        let cancel = CancelToken::new();
        inner.state = OptimizeState::Running;
        inner.cancel = Some(cancel.clone());
        Ok(RunGuard {
            session: self,
            cancel,
            finished: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leaves the session Failed(Cancelled) if the `run` future is dropped mid-search.
struct RunGuard<'a> {
    session: &'a OptimizeSession,
    cancel: CancelToken,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(&mut self, result: &Result<Vec<TimetableBlock>, OptimizeError>) {
        let mut inner = self.session.lock();
        inner.state = match result {
            Ok(blocks) => OptimizeState::Succeeded(blocks.clone()),
            Err(err) => OptimizeState::Failed(err.clone()),
        };
        inner.cancel = None;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cancel.cancel();
        let mut inner = self.session.lock();
        inner.state = OptimizeState::Failed(OptimizeError::Cancelled);
        inner.cancel = None;
    }
}
