//! Transition audit trail
//!
//! Every guard evaluation, action and compensation performed during a run is
//! appended here. Entries are never mutated after they are appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the record belongs to the forward path or to a compensation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Rollback,
}

/// What happened when the orchestrator reached the action slot of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Succeeded,
    Failed { reason: String },
    /// Precondition failed, or the run was cancelled first
    NotRun,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Succeeded)
    }
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub stage_index: usize,

    pub stage_name: String,

    pub direction: Direction,

    /// 1-based attempt number (retries only happen on the forward path)
    pub attempt: u32,

    /// `None` when the guard was not evaluated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precondition_result: Option<bool>,

    pub action_result: ActionResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcondition_result: Option<bool>,

    /// Digest of the state handed to the stage
    pub state_before: String,

    /// Digest of the state the stage produced, if it produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_after: Option<String>,

    pub latency_ms: u64,

    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    /// Start a record for a stage; fields are filled in as the stage progresses
    pub fn begin(
        stage_index: usize,
        stage_name: impl Into<String>,
        direction: Direction,
        attempt: u32,
        state_before: String,
    ) -> Self {
        Self {
            stage_index,
            stage_name: stage_name.into(),
            direction,
            attempt,
            precondition_result: None,
            action_result: ActionResult::NotRun,
            postcondition_result: None,
            state_before,
            state_after: None,
            latency_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// True when every evaluated slot of the record succeeded
    pub fn succeeded(&self) -> bool {
        self.precondition_result != Some(false)
            && self.action_result.is_success()
            && self.postcondition_result != Some(false)
    }
}

/// Append-only transition log for a single run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionLog {
    entries: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TransitionRecord) {
        self.entries.push(record);
    }

    pub fn entries(&self) -> &[TransitionRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<TransitionRecord> {
        self.entries
    }

    /// Get entries for a specific stage, in append order
    pub fn for_stage(&self, stage_index: usize) -> Vec<&TransitionRecord> {
        self.entries
            .iter()
            .filter(|e| e.stage_index == stage_index)
            .collect()
    }

    /// Compensation entries, in the order they were performed
    pub fn rollbacks(&self) -> Vec<&TransitionRecord> {
        self.entries
            .iter()
            .filter(|e| e.direction == Direction::Rollback)
            .collect()
    }

    pub fn failures(&self) -> Vec<&TransitionRecord> {
        self.entries.iter().filter(|e| !e.succeeded()).collect()
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }

    /// Export to JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> TransitionStats {
        let forward = self
            .entries
            .iter()
            .filter(|e| e.direction == Direction::Forward)
            .count();
        let retries = self
            .entries
            .iter()
            .filter(|e| e.direction == Direction::Forward && e.attempt > 1)
            .count();

        TransitionStats {
            total: self.entries.len(),
            forward,
            rollbacks: self.entries.len() - forward,
            failures: self.failures().len(),
            retries,
            total_latency_ms: self.entries.iter().map(|e| e.latency_ms).sum(),
        }
    }
}

impl From<Vec<TransitionRecord>> for TransitionLog {
    fn from(entries: Vec<TransitionRecord>) -> Self {
        Self { entries }
    }
}

/// Statistics about a transition log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStats {
    pub total: usize,
    pub forward: usize,
    pub rollbacks: usize,
    pub failures: usize,
    pub retries: usize,
    pub total_latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward(index: usize, attempt: u32, action_result: ActionResult) -> TransitionRecord {
        let mut record = TransitionRecord::begin(
            index,
            format!("stage-{}", index),
            Direction::Forward,
            attempt,
            "blake3:00".to_string(),
        );
        record.precondition_result = Some(true);
        record.action_result = action_result;
        record
    }

    #[test]
    fn test_begin_defaults_to_not_run() {
        let record =
            TransitionRecord::begin(0, "authenticate", Direction::Forward, 1, "blake3:00".into());
        assert_eq!(record.action_result, ActionResult::NotRun);
        assert!(!record.succeeded());
    }

    #[test]
    fn test_log_queries() {
        let mut log = TransitionLog::new();
        log.append(forward(0, 1, ActionResult::Succeeded));
        log.append(forward(1, 1, ActionResult::Failed { reason: "busy".into() }));
        log.append(forward(1, 2, ActionResult::Succeeded));
        log.append(TransitionRecord {
            action_result: ActionResult::Succeeded,
            ..TransitionRecord::begin(0, "stage-0", Direction::Rollback, 1, "blake3:01".into())
        });

        assert_eq!(log.len(), 4);
        assert_eq!(log.for_stage(1).len(), 2);
        assert_eq!(log.rollbacks().len(), 1);
        assert_eq!(log.failures().len(), 1);

        let stats = log.stats();
        assert_eq!(stats.forward, 3);
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.retries, 1);
    }

    #[test]
    fn test_jsonl_one_line_per_entry() {
        let mut log = TransitionLog::new();
        log.append(forward(0, 1, ActionResult::Succeeded));
        log.append(forward(1, 1, ActionResult::NotRun));

        let jsonl = log.to_jsonl();
        assert_eq!(jsonl.lines().count(), 2);
        assert!(jsonl.contains("\"status\":\"not_run\""));
    }
}
