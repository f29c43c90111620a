//! Lockstep Stages: declarative stage catalogs for the orchestrator.
//!
//! A catalog is an ordered list of stage specs. Each spec names its
//! precondition (`require`), action (`ops`), postcondition (`ensure`) and
//! rollback (`undo`) from a closed vocabulary, so the full set of effects a
//! run can have is visible in the catalog file.
//!
//! # Catalog Flow
//!
//! ```text
//! YAML ─► Catalog ─► StageRegistry ─► Orchestrator::run
//!           ↓             ↓
//!       StageSpec    DeclaredStage
//! ```

mod catalog;
mod condition;
mod declared;
mod op;

pub use catalog::{Catalog, CatalogError};
pub use condition::Condition;
pub use declared::{DeclaredStage, StageSpec};
pub use op::StepOp;

use lockstep_core::{Orchestrator, OrchestratorConfig};

/// Build an orchestrator straight from catalog YAML
pub fn orchestrator_from_yaml(
    yaml: &str,
    config: OrchestratorConfig,
) -> Result<Orchestrator, CatalogError> {
    let registry = Catalog::from_yaml(yaml)?.into_registry()?;
    Ok(Orchestrator::with_config(&registry, config)?)
}
