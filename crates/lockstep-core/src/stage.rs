//! Stage Trait: the contract every unit of work in a run fulfils
use crate::error::StageError;
use crate::state::SessionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Result of evaluating a guard predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Check {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostic: None,
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Lift a bare predicate result, attaching `diagnostic` when it is false
    pub fn from_bool(passed: bool, diagnostic: impl Into<String>) -> Self {
        if passed {
            Self::pass()
        } else {
            Self::fail(diagnostic)
        }
    }
}

/// One ordered unit of work.
///
/// The orchestrator calls `precondition`, then `action`, then
/// `postcondition`. `rollback` is only called on stages that already
/// committed, when a later stage fails.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Human-readable stage name (ex: "authenticate")
    fn name(&self) -> &str;

    fn precondition(&self, _state: &SessionState) -> Check {
        Check::pass()
    }

    /// Consume the prior state and produce the next one
    async fn action(&self, state: SessionState) -> Result<SessionState, StageError>;

    fn postcondition(&self, _state: &SessionState) -> Check {
        Check::pass()
    }

    /// Undo whatever external effect `action` had. The default is a no-op;
    /// the session value itself is restored from the checkpoint.
    async fn rollback(&self, state: SessionState) -> Result<SessionState, StageError> {
        Ok(state)
    }
}

type Predicate = Arc<dyn Fn(&SessionState) -> bool + Send + Sync>;
type Transform = Arc<dyn Fn(SessionState) -> Result<SessionState, StageError> + Send + Sync>;

/// Stage assembled from closures.
///
/// ```
/// use lockstep_core::{FnStage, SessionState};
///
/// let stage = FnStage::new("escalate", |mut s: SessionState| {
///     s.set("uid", 0);
///     Ok(s)
/// })
/// .requires(|s| s.get_bool("authenticated") == Some(true))
/// .ensures(|s| s.get_i64("uid") == Some(0));
/// # let _ = stage;
/// ```
#[derive(Clone)]
pub struct FnStage {
    name: String,
    precondition: Option<Predicate>,
    action: Transform,
    postcondition: Option<Predicate>,
    rollback: Option<Transform>,
}

impl FnStage {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(SessionState) -> Result<SessionState, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            precondition: None,
            action: Arc::new(action),
            postcondition: None,
            rollback: None,
        }
    }

    pub fn requires<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionState) -> bool + Send + Sync + 'static,
    {
        self.precondition = Some(Arc::new(predicate));
        self
    }

    pub fn ensures<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionState) -> bool + Send + Sync + 'static,
    {
        self.postcondition = Some(Arc::new(predicate));
        self
    }

    pub fn on_rollback<F>(mut self, undo: F) -> Self
    where
        F: Fn(SessionState) -> Result<SessionState, StageError> + Send + Sync + 'static,
    {
        self.rollback = Some(Arc::new(undo));
        self
    }
}

impl fmt::Debug for FnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("has_precondition", &self.precondition.is_some())
            .field("has_postcondition", &self.postcondition.is_some())
            .field("has_rollback", &self.rollback.is_some())
            .finish()
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn precondition(&self, state: &SessionState) -> Check {
        match &self.precondition {
            Some(predicate) => Check::from_bool(
                predicate(state),
                format!("precondition of '{}' not satisfied", self.name),
            ),
            None => Check::pass(),
        }
    }

    async fn action(&self, state: SessionState) -> Result<SessionState, StageError> {
        (self.action)(state)
    }

    fn postcondition(&self, state: &SessionState) -> Check {
        match &self.postcondition {
            Some(predicate) => Check::from_bool(
                predicate(state),
                format!("postcondition of '{}' not satisfied", self.name),
            ),
            None => Check::pass(),
        }
    }

    async fn rollback(&self, state: SessionState) -> Result<SessionState, StageError> {
        match &self.rollback {
            Some(undo) => undo(state),
            None => Ok(state),
        }
    }
}
