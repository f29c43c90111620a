//! Transition Guard: evaluates stage pre- and postconditions
use crate::registry::RegisteredStage;
use crate::stage::Check;
use crate::state::SessionState;

/// Stateless evaluator for a stage's guard predicates. Predicates only ever
/// see a shared borrow of the state.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionGuard;

impl TransitionGuard {
    pub fn new() -> Self {
        Self
    }

    /// Whether the stage's action may run against `state`
    pub fn check_precondition(&self, stage: &RegisteredStage, state: &SessionState) -> Check {
        let check = stage.stage().precondition(state);
        log_check("precondition", stage, &check);
        check
    }

    /// Whether the stage's action achieved its declared effect
    pub fn check_postcondition(&self, stage: &RegisteredStage, state: &SessionState) -> Check {
        let check = stage.stage().postcondition(state);
        log_check("postcondition", stage, &check);
        check
    }
}

fn log_check(kind: &'static str, stage: &RegisteredStage, check: &Check) {
    if check.passed {
        tracing::debug!(stage = stage.index(), name = stage.name(), kind, "guard passed");
    } else {
        tracing::debug!(
            stage = stage.index(),
            name = stage.name(),
            kind,
            diagnostic = check.diagnostic.as_deref().unwrap_or(""),
            "guard failed"
        );
    }
}
