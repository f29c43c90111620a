use crate::declared::{DeclaredStage, StageSpec};
use lockstep_core::{ConfigError, RegistryError, SetupError, StageRegistry};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

static BUILTIN: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("counter", include_str!("../catalogs/counter.yaml")),
        ("three-stage", include_str!("../catalogs/three-stage.yaml")),
    ])
});

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("CATALOG/PARSE: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("CATALOG/INVALID: stage {index} has an empty name")]
    EmptyName { index: usize },

    #[error("CATALOG/UNKNOWN: no builtin catalog named '{0}'")]
    UnknownBuiltin(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<SetupError> for CatalogError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::Registry(e) => Self::Registry(e),
            SetupError::Config(e) => Self::Config(e),
        }
    }
}

/// Ordered list of declared stages, loaded once and turned into a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stages: Vec<StageSpec>,
}

impl Catalog {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { name: None, stages }
    }

    /// Load catalog from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// One of the catalogs shipped with the crate
    pub fn builtin(name: &str) -> Result<Self, CatalogError> {
        let source = BUILTIN
            .get(name)
            .ok_or_else(|| CatalogError::UnknownBuiltin(name.to_string()))?;
        Self::from_yaml(source)
    }

    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.keys().copied().collect()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        match self.stages.iter().position(|s| s.name.trim().is_empty()) {
            Some(index) => Err(CatalogError::EmptyName { index }),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Register the stages under indices 0..N-1, in catalog order
    pub fn into_registry(self) -> Result<StageRegistry, CatalogError> {
        self.validate()?;

        let mut registry = StageRegistry::new();
        for (index, spec) in self.stages.into_iter().enumerate() {
            tracing::debug!(index, name = %spec.name, "registering declared stage");
            registry.register(index, DeclaredStage::new(spec))?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_parse() {
        for name in Catalog::builtin_names() {
            let catalog = Catalog::builtin(name).unwrap();
            assert_eq!(catalog.name.as_deref(), Some(name));
            assert!(!catalog.is_empty());
        }
    }

    #[test]
    fn test_three_stage_order() {
        let registry = Catalog::builtin("three-stage")
            .unwrap()
            .into_registry()
            .unwrap();
        assert_eq!(registry.names(), vec!["authenticate", "escalate", "link"]);
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(matches!(
            Catalog::builtin("missing"),
            Err(CatalogError::UnknownBuiltin(_))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = Catalog::from_yaml("stages:\n  - name: ok\n  - name: \"  \"\n").unwrap_err();
        assert!(matches!(err, CatalogError::EmptyName { index: 1 }));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let err = Catalog::from_yaml("stages:\n  - name: x\n    ops:\n      - op: format_disk\n")
            .unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
