//! Lockstep Core: staged transitions with all-or-nothing commit
//!
//! A run threads one `SessionState` through an ordered catalog of stages.
//! Every stage is guarded by a precondition and a postcondition and is
//! checkpointed before it runs. Either every stage commits, or each
//! already-committed stage is compensated in reverse order and the caller
//! gets back the state it started with.
//!
//! ```text
//! Orchestrator ─► StageRegistry (ordered stages)
//!      │
//!      └─ per stage: Checkpoint ─► precondition ─► action ─► postcondition
//!                         ▲                                        │
//!                         └────────── restore on failure ◄─────────┘
//! ```

pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod orchestrator;
pub mod registry;
pub mod stage;
pub mod state;

pub use audit::{ActionResult, Direction, TransitionLog, TransitionRecord, TransitionStats};
pub use checkpoint::{Checkpoint, CheckpointHandle, CheckpointManager};
pub use config::{CheckpointRetention, OrchestratorConfig, DEFAULT_TIMEOUT_MS};
pub use error::{
    CheckpointError, ConfigError, RegistryError, RunError, SetupError, StageError, StageFailure,
};
pub use executor::{Execution, StageExecutor};
pub use guard::TransitionGuard;
pub use orchestrator::{Orchestrator, RunPhase, RunReport, RunResult};
pub use registry::{RegisteredStage, StageRegistry};
pub use stage::{Check, FnStage, Stage};
pub use state::SessionState;

/// Engine version reported by the API and embedded in run reports
pub const LOCKSTEP_VERSION: &str = "1.0.0";
