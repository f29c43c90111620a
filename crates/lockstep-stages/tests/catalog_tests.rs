//! Integration tests for declarative catalogs.
//!
//! These tests load the shipped catalogs, run them through the
//! orchestrator and check both commit and rollback outcomes.

use lockstep_core::{
    CheckpointRetention, Orchestrator, OrchestratorConfig, RunResult, SessionState, StageFailure,
};
use lockstep_stages::{orchestrator_from_yaml, Catalog, CatalogError, StepOp};
use std::time::Duration;

fn guest() -> SessionState {
    SessionState::new()
        .with("authenticated", false)
        .with("uid", 1000)
}

/// The shipped three-stage catalog with the `link` action replaced by a failure
fn failing_link_catalog() -> Catalog {
    let mut catalog = Catalog::builtin("three-stage").unwrap();
    let link = catalog
        .stages
        .iter_mut()
        .find(|s| s.name == "link")
        .unwrap();
    link.ops = vec![StepOp::Fail {
        reason: "link refused".to_string(),
    }];
    catalog
}

// =============================================================================
// Three-stage catalog
// =============================================================================

#[tokio::test]
async fn test_three_stage_commits() {
    let registry = Catalog::builtin("three-stage")
        .unwrap()
        .into_registry()
        .unwrap();

    let result = Orchestrator::new(&registry)
        .unwrap()
        .run(guest())
        .await
        .unwrap();

    assert!(result.is_committed());
    let state = result.state();
    assert_eq!(state.get_bool("authenticated"), Some(true));
    assert_eq!(state.get_i64("uid"), Some(0));
    assert_eq!(state.get_bool("linked"), Some(true));
}

#[tokio::test]
async fn test_three_stage_link_failure_restores_initial_state() {
    let registry = failing_link_catalog().into_registry().unwrap();

    let report = Orchestrator::new(&registry)
        .unwrap()
        .run_with_report(guest())
        .await
        .unwrap();

    assert_eq!(report.result.failed_stage(), Some(2));
    assert_eq!(report.result.state(), &guest());

    let rolled_back: Vec<_> = report
        .transitions
        .rollbacks()
        .iter()
        .map(|r| r.stage_name.clone())
        .collect();
    assert_eq!(rolled_back, vec!["escalate", "authenticate"]);
}

#[tokio::test]
async fn test_single_step_retention_relies_on_undo_ops() {
    let registry = failing_link_catalog().into_registry().unwrap();
    let config = OrchestratorConfig::default().with_retention(CheckpointRetention::SingleStep);

    let result = Orchestrator::with_config(&registry, config)
        .unwrap()
        .run(guest())
        .await
        .unwrap();

    // escalate's checkpoint is still live, authenticate's was released and
    // its `undo` resets the flag.
    assert_eq!(result.failed_stage(), Some(2));
    assert_eq!(result.state(), &guest());
}

#[tokio::test]
async fn test_unauthenticated_escalation_blocked() {
    let mut catalog = Catalog::builtin("three-stage").unwrap();
    catalog.stages.remove(0);
    let registry = catalog.into_registry().unwrap();

    let result = Orchestrator::new(&registry)
        .unwrap()
        .run(guest())
        .await
        .unwrap();

    match result {
        RunResult::RolledBack {
            stage_index,
            cause: StageFailure::PreconditionFailed { diagnostic, .. },
            state,
        } => {
            assert_eq!(stage_index, 0);
            assert_eq!(
                diagnostic.as_deref(),
                Some("authenticated == true (observed false)")
            );
            assert_eq!(state, guest());
        }
        other => panic!("expected precondition failure, got {:?}", other),
    }
}

// =============================================================================
// Counter catalog and config
// =============================================================================

#[tokio::test]
async fn test_counter_catalog() {
    let registry = Catalog::builtin("counter").unwrap().into_registry().unwrap();

    let result = Orchestrator::new(&registry)
        .unwrap()
        .run(SessionState::new())
        .await
        .unwrap();

    assert_eq!(result.state().get_i64("count"), Some(2));
    assert_eq!(result.state().get_bool("sealed"), Some(true));
}

#[tokio::test]
async fn test_counter_rejects_existing_count() {
    let registry = Catalog::builtin("counter").unwrap().into_registry().unwrap();
    let initial = SessionState::new().with("count", 7);

    let result = Orchestrator::new(&registry)
        .unwrap()
        .run(initial.clone())
        .await
        .unwrap();

    assert_eq!(result.failed_stage(), Some(0));
    assert_eq!(result.state(), &initial);
}

#[tokio::test]
async fn test_sleep_op_honours_stage_timeout() {
    let yaml = r#"
stages:
  - name: mark
    ops:
      - op: set
        key: marked
        value: true
  - name: wait
    ops:
      - op: sleep
        ms: 5000
"#;
    let config = OrchestratorConfig::from_yaml("stage_timeout_ms: 20").unwrap();
    let orchestrator = orchestrator_from_yaml(yaml, config).unwrap();

    let result = orchestrator.run(SessionState::new()).await.unwrap();

    match result {
        RunResult::RolledBack {
            stage_index,
            cause: StageFailure::ActionFailed { reason, .. },
            state,
        } => {
            assert_eq!(stage_index, 1);
            assert_eq!(reason, "timed out after 20ms");
            assert!(state.is_empty());
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_invalid_config_rejected_before_run() {
    let config = OrchestratorConfig::default().with_stage_timeout(Duration::ZERO);

    let err = orchestrator_from_yaml("stages: []", config).unwrap_err();
    assert!(matches!(err, CatalogError::Config(_)));
}
