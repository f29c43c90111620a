//! Stage Executor: invokes stage actions and compensations
use crate::error::StageError;
use crate::registry::RegisteredStage;
use crate::state::SessionState;
use std::future::Future;
use std::time::{Duration, Instant};

/// Outcome of one invocation, with how long it took
#[derive(Debug)]
pub struct Execution {
    pub result: Result<SessionState, StageError>,
    pub latency_ms: u64,
}

/// Runs a stage's action or rollback exactly once per call, bounded by an
/// optional timeout. Retrying is the orchestrator's decision.
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    action_timeout: Option<Duration>,
    rollback_timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new(action_timeout: Option<Duration>, rollback_timeout: Option<Duration>) -> Self {
        Self {
            action_timeout,
            rollback_timeout,
        }
    }

    /// Invoke the stage's action on `state`
    pub async fn execute(&self, stage: &RegisteredStage, state: SessionState) -> Execution {
        tracing::debug!(stage = stage.index(), name = stage.name(), "action started");
        timed(self.action_timeout, stage.stage().action(state)).await
    }

    /// Invoke the stage's rollback on `state`
    pub async fn compensate(&self, stage: &RegisteredStage, state: SessionState) -> Execution {
        tracing::debug!(stage = stage.index(), name = stage.name(), "rollback started");
        timed(self.rollback_timeout, stage.stage().rollback(state)).await
    }
}

async fn timed<F>(limit: Option<Duration>, fut: F) -> Execution
where
    F: Future<Output = Result<SessionState, StageError>>,
{
    let start = Instant::now();
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::TimedOut {
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => fut.await,
    };

    Execution {
        result,
        latency_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageRegistry;
    use crate::stage::{FnStage, Stage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Sleepy(Duration);

    #[async_trait]
    impl Stage for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn action(&self, state: SessionState) -> Result<SessionState, StageError> {
            tokio::time::sleep(self.0).await;
            Ok(state)
        }
    }

    fn registered(stage: impl Stage + 'static) -> RegisteredStage {
        let mut registry = StageRegistry::new();
        registry.register(0, stage).unwrap();
        registry.ordered_stages().unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_action_invoked_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stage = registered(FnStage::new("count", move |mut s: SessionState| {
            counter.fetch_add(1, Ordering::SeqCst);
            s.set("counted", true);
            Ok(s)
        }));

        let execution = StageExecutor::default()
            .execute(&stage, SessionState::new())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(execution.result.unwrap().get_bool("counted"), Some(true));
    }

    #[tokio::test]
    async fn test_timeout_reported() {
        let stage = registered(Sleepy(Duration::from_secs(5)));
        let executor = StageExecutor::new(Some(Duration::from_millis(20)), None);

        let execution = executor.execute(&stage, SessionState::new()).await;
        assert_eq!(
            execution.result.unwrap_err(),
            StageError::TimedOut { timeout_ms: 20 }
        );
    }

    #[tokio::test]
    async fn test_compensate_uses_rollback() {
        let stage = registered(FnStage::new("grant", Ok).on_rollback(|mut s: SessionState| {
            s.remove("token");
            Ok(s)
        }));

        let execution = StageExecutor::default()
            .compensate(&stage, SessionState::new().with("token", "abc"))
            .await;
        assert!(!execution.result.unwrap().contains_key("token"));
    }
}
