use crate::condition::{evaluate_all, Condition};
use crate::op::{apply_all, StepOp};
use async_trait::async_trait;
use lockstep_core::{Check, SessionState, Stage, StageError};
use serde::{Deserialize, Serialize};

/// Declarative description of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,

    /// Precondition: every entry must hold
    #[serde(default)]
    pub require: Vec<Condition>,

    /// Action
    #[serde(default)]
    pub ops: Vec<StepOp>,

    /// Postcondition: every entry must hold
    #[serde(default)]
    pub ensure: Vec<Condition>,

    /// Rollback, applied to the state handed to the compensation
    #[serde(default)]
    pub undo: Vec<StepOp>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            require: Vec::new(),
            ops: Vec::new(),
            ensure: Vec::new(),
            undo: Vec::new(),
        }
    }

    pub fn require(mut self, condition: Condition) -> Self {
        self.require.push(condition);
        self
    }

    pub fn op(mut self, op: StepOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ensure(mut self, condition: Condition) -> Self {
        self.ensure.push(condition);
        self
    }

    pub fn undo(mut self, op: StepOp) -> Self {
        self.undo.push(op);
        self
    }
}

/// A `StageSpec` executed as a `Stage`
#[derive(Debug, Clone)]
pub struct DeclaredStage {
    spec: StageSpec,
}

impl DeclaredStage {
    pub fn new(spec: StageSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &StageSpec {
        &self.spec
    }
}

#[async_trait]
impl Stage for DeclaredStage {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn precondition(&self, state: &SessionState) -> Check {
        evaluate_all(&self.spec.require, state)
    }

    async fn action(&self, state: SessionState) -> Result<SessionState, StageError> {
        apply_all(&self.spec.ops, state).await
    }

    fn postcondition(&self, state: &SessionState) -> Check {
        evaluate_all(&self.spec.ensure, state)
    }

    async fn rollback(&self, state: SessionState) -> Result<SessionState, StageError> {
        apply_all(&self.spec.undo, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn escalate() -> DeclaredStage {
        DeclaredStage::new(
            StageSpec::new("escalate")
                .require(Condition::Equals {
                    key: "authenticated".into(),
                    value: json!(true),
                })
                .op(StepOp::Set {
                    key: "uid".into(),
                    value: json!(0),
                })
                .ensure(Condition::Equals {
                    key: "uid".into(),
                    value: json!(0),
                })
                .undo(StepOp::Set {
                    key: "uid".into(),
                    value: json!(1000),
                }),
        )
    }

    #[tokio::test]
    async fn test_declared_stage_hooks() {
        let stage = escalate();
        let state = SessionState::new().with("authenticated", true).with("uid", 1000);

        assert!(stage.precondition(&state).passed);
        let next = stage.action(state).await.unwrap();
        assert!(stage.postcondition(&next).passed);

        let undone = stage.rollback(next).await.unwrap();
        assert_eq!(undone.get_i64("uid"), Some(1000));
    }

    #[test]
    fn test_precondition_diagnostic() {
        let check = escalate().precondition(&SessionState::new());
        assert!(!check.passed);
        assert_eq!(
            check.diagnostic.as_deref(),
            Some("authenticated == true (observed <missing>)")
        );
    }

    #[tokio::test]
    async fn test_empty_spec_is_identity() {
        let stage = DeclaredStage::new(StageSpec::new("noop"));
        let state = SessionState::new().with("k", "v");

        assert_eq!(stage.action(state.clone()).await.unwrap(), state);
        assert_eq!(stage.rollback(state.clone()).await.unwrap(), state);
    }
}
