use lockstep_core::{Check, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Guard predicate over session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Exists { key: String },
    Absent { key: String },
    Equals { key: String, value: Value },
    /// Also satisfied when the key is missing
    NotEquals { key: String, value: Value },
}

impl Condition {
    pub fn holds(&self, state: &SessionState) -> bool {
        match self {
            Condition::Always => true,
            Condition::Exists { key } => state.contains_key(key),
            Condition::Absent { key } => !state.contains_key(key),
            Condition::Equals { key, value } => state.get(key) == Some(value),
            Condition::NotEquals { key, value } => state.get(key) != Some(value),
        }
    }

    pub fn evaluate(&self, state: &SessionState) -> Check {
        if self.holds(state) {
            return Check::pass();
        }

        let observed = match self {
            Condition::Always => None,
            Condition::Exists { key }
            | Condition::Absent { key }
            | Condition::Equals { key, .. }
            | Condition::NotEquals { key, .. } => Some(
                state
                    .get(key)
                    .map(Value::to_string)
                    .unwrap_or_else(|| "<missing>".to_string()),
            ),
        };
        match observed {
            Some(observed) => Check::fail(format!("{} (observed {})", self, observed)),
            None => Check::fail(self.to_string()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Condition::Always => write!(f, "always"),
            Condition::Exists { key } => write!(f, "{} exists", key),
            Condition::Absent { key } => write!(f, "{} absent", key),
            Condition::Equals { key, value } => write!(f, "{} == {}", key, value),
            Condition::NotEquals { key, value } => write!(f, "{} != {}", key, value),
        }
    }
}

/// Evaluate all conditions, reporting the first that does not hold
pub(crate) fn evaluate_all(conditions: &[Condition], state: &SessionState) -> Check {
    conditions
        .iter()
        .map(|c| c.evaluate(state))
        .find(|check| !check.passed)
        .unwrap_or_else(Check::pass)
}
