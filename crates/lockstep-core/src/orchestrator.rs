//! Orchestrator: drives a run through the registry and decides commit vs rollback
//!
//! State machine:
//!
//! ```text
//! Idle ─► Running(0) ─► … ─► Running(N-1) ─► Committed
//!              │
//!              └─ failure at i ─► RollingBack(i) ─► RollingBack(i-1) ─► … ─► RolledBack
//!                                        │
//!                                        └─ rollback error ─► RollbackFailed (fatal)
//! ```

use crate::audit::{ActionResult, Direction, TransitionLog, TransitionRecord};
use crate::checkpoint::{CheckpointHandle, CheckpointManager};
use crate::config::{CheckpointRetention, OrchestratorConfig};
use crate::error::{RunError, SetupError, StageFailure};
use crate::executor::StageExecutor;
use crate::guard::TransitionGuard;
use crate::registry::{RegisteredStage, StageRegistry};
use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Phases visited by a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running(usize),
    RollingBack(usize),
    Committed,
    RolledBack,
    RollbackFailed,
}

/// Terminal value of a run that did not hit a fatal error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunResult {
    /// Every stage committed
    Committed { state: SessionState },
    /// Stage `stage_index` failed; committed stages were compensated and
    /// `state` is the state supplied at the start of the run
    RolledBack {
        stage_index: usize,
        cause: StageFailure,
        state: SessionState,
    },
}

impl RunResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, RunResult::Committed { .. })
    }

    pub fn state(&self) -> &SessionState {
        match self {
            RunResult::Committed { state } | RunResult::RolledBack { state, .. } => state,
        }
    }

    pub fn into_state(self) -> SessionState {
        match self {
            RunResult::Committed { state } | RunResult::RolledBack { state, .. } => state,
        }
    }

    /// Index of the failing stage, if the run rolled back
    pub fn failed_stage(&self) -> Option<usize> {
        match self {
            RunResult::Committed { .. } => None,
            RunResult::RolledBack { stage_index, .. } => Some(*stage_index),
        }
    }
}

/// Result plus the audit trail of the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub engine: String,
    pub result: RunResult,
    pub transitions: TransitionLog,
    pub phases: Vec<RunPhase>,
}

/// Executes the registered stages strictly in index order.
///
/// The stage list is validated once at construction and shared read-only,
/// so one orchestrator can serve many concurrent runs; each run owns its
/// state, checkpoints and log.
#[derive(Clone)]
pub struct Orchestrator {
    stages: Arc<[RegisteredStage]>,
    config: OrchestratorConfig,
    guard: TransitionGuard,
    executor: StageExecutor,
}

/// Per-run bookkeeping
struct RunContext {
    run_id: Uuid,
    checkpoints: CheckpointManager,
    /// `handles[i]` is the checkpoint taken before stage `i`
    handles: Vec<CheckpointHandle>,
    log: TransitionLog,
    phases: Vec<RunPhase>,
}

impl RunContext {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            checkpoints: CheckpointManager::new(),
            handles: Vec::new(),
            log: TransitionLog::new(),
            phases: vec![RunPhase::Idle],
        }
    }

    fn report(self, result: RunResult) -> RunReport {
        RunReport {
            run_id: self.run_id,
            engine: format!("lockstep@{}", crate::LOCKSTEP_VERSION),
            result,
            transitions: self.log,
            phases: self.phases,
        }
    }
}

impl Orchestrator {
    pub fn new(registry: &StageRegistry) -> Result<Self, SetupError> {
        Self::with_config(registry, OrchestratorConfig::default())
    }

    /// Validate `config` and freeze the registry's stage order
    pub fn with_config(
        registry: &StageRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let stages: Arc<[RegisteredStage]> = registry.ordered_stages()?.into();
        let executor = StageExecutor::new(config.stage_timeout(), config.rollback_timeout());

        Ok(Self {
            stages,
            config,
            guard: TransitionGuard::new(),
            executor,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage against `initial`
    pub async fn run(&self, initial: SessionState) -> Result<RunResult, RunError> {
        self.run_with_report(initial).await.map(|report| report.result)
    }

    pub async fn run_with_report(&self, initial: SessionState) -> Result<RunReport, RunError> {
        self.run_cancellable(initial, CancellationToken::new()).await
    }

    /// Run with a cancellation token, checked before each stage starts
    pub async fn run_cancellable(
        &self,
        initial: SessionState,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let ctx = RunContext::new();
        let span = tracing::info_span!("run", run_id = %ctx.run_id, stages = self.stages.len());
        self.drive(ctx, initial, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        mut ctx: RunContext,
        initial: SessionState,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunError> {
        tracing::info!("run started");
        let mut state = initial;

        for stage in self.stages.iter() {
            let index = stage.index();

            if cancel.is_cancelled() {
                tracing::warn!(stage = index, "run cancelled");
                ctx.log.append(TransitionRecord::begin(
                    index,
                    stage.name(),
                    Direction::Forward,
                    1,
                    state.digest(),
                ));
                let failure = StageFailure::Cancelled { stage_index: index };
                return self.unwind(ctx, failure, state).await;
            }

            ctx.phases.push(RunPhase::Running(index));
            let handle = ctx.checkpoints.snapshot(index, &state);
            ctx.handles.push(handle);

            match self.advance(&mut ctx, stage, state, handle).await? {
                Ok(next) => {
                    state = next;
                    if self.config.checkpoint_retention == CheckpointRetention::SingleStep
                        && index > 0
                    {
                        ctx.checkpoints.release(ctx.handles[index - 1])?;
                    }
                }
                Err(failure) => {
                    tracing::warn!(stage = index, name = stage.name(), error = %failure, "stage failed");
                    let before = ctx.checkpoints.restore(handle)?;
                    ctx.checkpoints.release(handle)?;
                    return self.unwind(ctx, failure, before).await;
                }
            }
        }

        ctx.phases.push(RunPhase::Committed);
        let released = ctx.checkpoints.release_all();
        tracing::info!(released, digest = %state.digest(), "run committed");
        Ok(ctx.report(RunResult::Committed { state }))
    }

    /// Precondition, action (with retries), postcondition for one stage.
    /// The inner `Err` is a recoverable stage failure.
    async fn advance(
        &self,
        ctx: &mut RunContext,
        stage: &RegisteredStage,
        state: SessionState,
        handle: CheckpointHandle,
    ) -> Result<Result<SessionState, StageFailure>, RunError> {
        let index = stage.index();
        let max_attempts = self.config.max_attempts.max(1);
        let mut input = state;
        let mut attempt = 1;

        loop {
            let mut record = TransitionRecord::begin(
                index,
                stage.name(),
                Direction::Forward,
                attempt,
                input.digest(),
            );

            let pre = self.guard.check_precondition(stage, &input);
            record.precondition_result = Some(pre.passed);
            if !pre.passed {
                ctx.log.append(record);
                return Ok(Err(StageFailure::PreconditionFailed {
                    stage_index: index,
                    diagnostic: pre.diagnostic,
                }));
            }

            let execution = self.executor.execute(stage, input).await;
            record.latency_ms = execution.latency_ms;

            let next = match execution.result {
                Ok(next) => next,
                Err(err) => {
                    let reason = err.to_string();
                    record.action_result = ActionResult::Failed {
                        reason: reason.clone(),
                    };
                    ctx.log.append(record);

                    if attempt < max_attempts {
                        tracing::warn!(stage = index, attempt, %reason, "action failed, retrying");
                        input = ctx.checkpoints.restore(handle)?;
                        attempt += 1;
                        continue;
                    }
                    return Ok(Err(StageFailure::ActionFailed {
                        stage_index: index,
                        reason,
                    }));
                }
            };

            record.action_result = ActionResult::Succeeded;
            record.state_after = Some(next.digest());

            let post = self.guard.check_postcondition(stage, &next);
            record.postcondition_result = Some(post.passed);
            ctx.log.append(record);

            if !post.passed {
                return Ok(Err(StageFailure::PostconditionFailed {
                    stage_index: index,
                    diagnostic: post.diagnostic,
                }));
            }

            tracing::debug!(stage = index, name = stage.name(), "stage committed");
            return Ok(Ok(next));
        }
    }

    /// Compensate stages `cause.stage_index()-1` down to 0. `state` is the
    /// state as of the last committed stage.
    async fn unwind(
        &self,
        mut ctx: RunContext,
        cause: StageFailure,
        mut state: SessionState,
    ) -> Result<RunReport, RunError> {
        let failed = cause.stage_index();
        ctx.phases.push(RunPhase::RollingBack(failed));
        tracing::info!(stage = failed, "rolling back");

        for stage in self.stages[..failed].iter().rev() {
            let index = stage.index();
            ctx.phases.push(RunPhase::RollingBack(index));

            let mut record = TransitionRecord::begin(
                index,
                stage.name(),
                Direction::Rollback,
                1,
                state.digest(),
            );
            let execution = self.executor.compensate(stage, state).await;
            record.latency_ms = execution.latency_ms;

            let compensated = match execution.result {
                Ok(compensated) => compensated,
                Err(err) => {
                    let reason = err.to_string();
                    record.action_result = ActionResult::Failed {
                        reason: reason.clone(),
                    };
                    ctx.log.append(record);
                    ctx.phases.push(RunPhase::RollbackFailed);
                    tracing::error!(
                        stage = index,
                        name = stage.name(),
                        %reason,
                        %cause,
                        "rollback failed, session state is inconsistent"
                    );
                    return Err(RunError::RollbackFailed {
                        stage_index: index,
                        reason,
                        cause,
                        transitions: ctx.log.into_entries(),
                    });
                }
            };

            let handle = ctx.handles[index];
            state = if ctx.checkpoints.is_live(handle) {
                let restored = ctx.checkpoints.restore(handle)?;
                ctx.checkpoints.release(handle)?;
                restored
            } else {
                compensated
            };

            record.action_result = ActionResult::Succeeded;
            record.state_after = Some(state.digest());
            ctx.log.append(record);
        }

        ctx.phases.push(RunPhase::RolledBack);
        ctx.checkpoints.release_all();
        tracing::info!(stage = failed, digest = %state.digest(), "run rolled back");

        Ok(ctx.report(RunResult::RolledBack {
            stage_index: failed,
            cause,
            state,
        }))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish()
    }
}
