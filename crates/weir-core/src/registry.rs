//! Deployed workflow registry.
//!
//! Compiled workflows are immutable and shared read-only by every instance
//! of a process version; only the registry map itself is guarded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use weir_model::ExecutableWorkflow;

use crate::error::EngineError;

type VersionMap = BTreeMap<u32, Arc<ExecutableWorkflow>>;

/// All deployed workflow versions of one partition.
#[derive(Default)]
pub struct WorkflowRegistry {
    inner: RwLock<HashMap<String, VersionMap>>,
}

impl WorkflowRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a compiled workflow under its process id and version.
    pub fn insert(&self, workflow: Arc<ExecutableWorkflow>) -> Result<(), EngineError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire write lock: {}", e)))?;
        inner
            .entry(workflow.process_id.clone())
            .or_default()
            .insert(workflow.version, workflow);
        Ok(())
    }

    /// Look up one version of a process.
    pub fn get(
        &self,
        process_id: &str,
        version: u32,
    ) -> Result<Option<Arc<ExecutableWorkflow>>, EngineError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire read lock: {}", e)))?;
        Ok(inner
            .get(process_id)
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    /// The newest deployed version of a process.
    pub fn latest(&self, process_id: &str) -> Result<Option<Arc<ExecutableWorkflow>>, EngineError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EngineError::StateStore(format!("failed to acquire read lock: {}", e)))?;
        Ok(inner
            .get(process_id)
            .and_then(|versions| versions.values().next_back())
            .cloned())
    }

    /// The newest deployed version number of a process, if any.
    pub fn latest_version(&self, process_id: &str) -> Result<Option<u32>, EngineError> {
        Ok(self.latest(process_id)?.map(|w| w.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_model::{transform_definition, FlowNodeKind, Process, ProcessDefinition};

    fn deploy(registry: &WorkflowRegistry, version: u32) {
        let definition = ProcessDefinition {
            processes: vec![Process {
                id: "p".to_string(),
                elements: vec![weir_model::FlowNode {
                    id: "start".to_string(),
                    parent: None,
                    kind: FlowNodeKind::StartEvent { event: None },
                    input_mappings: Vec::new(),
                    output_mappings: Vec::new(),
                }],
                sequence_flows: Vec::new(),
            }],
            messages: Vec::new(),
        };
        let workflow = transform_definition(&definition, version).unwrap().remove(0);
        registry.insert(Arc::new(workflow)).unwrap();
    }

    #[test]
    fn test_latest_tracks_highest_version() {
        let registry = WorkflowRegistry::new();
        assert!(registry.latest("p").unwrap().is_none());

        deploy(&registry, 1);
        deploy(&registry, 2);

        assert_eq!(registry.latest_version("p").unwrap(), Some(2));
        assert_eq!(registry.get("p", 1).unwrap().unwrap().version, 1);
        assert!(registry.get("p", 3).unwrap().is_none());
    }
}
