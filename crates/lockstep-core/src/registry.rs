//! Stage Registry: the ordered, immutable catalog of stages
use crate::error::RegistryError;
use crate::stage::Stage;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A stage paired with the index it was registered under
#[derive(Clone)]
pub struct RegisteredStage {
    index: usize,
    stage: Arc<dyn Stage>,
}

impl RegisteredStage {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }
}

impl fmt::Debug for RegisteredStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredStage")
            .field("index", &self.index)
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Default, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<usize, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register stages in iteration order, indices 0..N-1
    pub fn sequential<I>(stages: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Stage>>,
    {
        Self {
            stages: stages.into_iter().enumerate().collect(),
        }
    }

    pub fn register<S: Stage + 'static>(
        &mut self,
        index: usize,
        stage: S,
    ) -> Result<(), RegistryError> {
        self.register_arc(index, Arc::new(stage))
    }

    pub fn register_arc(
        &mut self,
        index: usize,
        stage: Arc<dyn Stage>,
    ) -> Result<(), RegistryError> {
        if self.stages.contains_key(&index) {
            return Err(RegistryError::DuplicateIndex { index });
        }
        self.stages.insert(index, stage);
        Ok(())
    }

    /// Stages sorted by index. Fails if the indices are not exactly 0..N-1.
    pub fn ordered_stages(&self) -> Result<Vec<RegisteredStage>, RegistryError> {
        self.stages
            .iter()
            .enumerate()
            .map(|(expected, (&index, stage))| {
                if index != expected {
                    return Err(RegistryError::GapInSequence {
                        expected,
                        found: index,
                    });
                }
                Ok(RegisteredStage {
                    index,
                    stage: Arc::clone(stage),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.values().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.stages.iter().map(|(i, s)| (i, s.name())))
            .finish()
    }
}
