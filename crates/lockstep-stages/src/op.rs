use lockstep_core::{SessionState, StageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

fn one() -> i64 {
    1
}

/// State transformation performed by a declared stage.
///
/// The set is closed on purpose: every effect a catalog can have is listed
/// here and can be audited without running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOp {
    Set {
        key: String,
        value: Value,
    },
    Remove {
        key: String,
    },
    /// Add `by` to an integer value; a missing key counts as 0
    Increment {
        key: String,
        #[serde(default = "one")]
        by: i64,
    },
    Fail {
        reason: String,
    },
    Sleep {
        ms: u64,
    },
}

impl StepOp {
    pub async fn apply(&self, mut state: SessionState) -> Result<SessionState, StageError> {
        match self {
            StepOp::Set { key, value } => {
                state.set(key.clone(), value.clone());
            }
            StepOp::Remove { key } => {
                state.remove(key);
            }
            StepOp::Increment { key, by } => {
                let current = match state.get(key) {
                    None => 0,
                    Some(v) => v.as_i64().ok_or_else(|| {
                        StageError::failed(format!("cannot increment non-integer '{}': {}", key, v))
                    })?,
                };
                let next = current.checked_add(*by).ok_or_else(|| {
                    StageError::failed(format!("increment of '{}' overflows", key))
                })?;
                state.set(key.clone(), next);
            }
            StepOp::Fail { reason } => return Err(StageError::failed(reason.clone())),
            StepOp::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        Ok(state)
    }
}

/// Apply ops in order, stopping at the first error
pub(crate) async fn apply_all(
    ops: &[StepOp],
    mut state: SessionState,
) -> Result<SessionState, StageError> {
    for op in ops {
        state = op.apply(state).await?;
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_remove() {
        let state = StepOp::Set {
            key: "uid".into(),
            value: json!(0),
        }
        .apply(SessionState::new())
        .await
        .unwrap();
        assert_eq!(state.get_i64("uid"), Some(0));

        let state = StepOp::Remove { key: "uid".into() }.apply(state).await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_increment() {
        let op = StepOp::Increment {
            key: "count".into(),
            by: 3,
        };
        let state = op.apply(SessionState::new()).await.unwrap();
        let state = op.apply(state).await.unwrap();
        assert_eq!(state.get_i64("count"), Some(6));

        let err = op
            .apply(SessionState::new().with("count", "three"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-integer"));

        let err = op
            .apply(SessionState::new().with("count", i64::MAX))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[tokio::test]
    async fn test_apply_all_stops_at_fail() {
        let ops = vec![
            StepOp::Set {
                key: "a".into(),
                value: json!(1),
            },
            StepOp::Fail {
                reason: "refused".into(),
            },
            StepOp::Set {
                key: "b".into(),
                value: json!(2),
            },
        ];

        let err = apply_all(&ops, SessionState::new()).await.unwrap_err();
        assert_eq!(err, StageError::failed("refused"));
    }

    #[test]
    fn test_increment_defaults_to_one() {
        let op: StepOp = serde_yaml::from_str("op: increment\nkey: n\n").unwrap();
        assert_eq!(
            op,
            StepOp::Increment {
                key: "n".into(),
                by: 1
            }
        );
    }
}
