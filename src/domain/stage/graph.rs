use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::function_registry::FunctionRegistry;
use crate::domain::stage::stage::{Predecessors, Stage};
use crate::domain::utils::id::StageName;
use crate::error::{GraphValidationError, Result};

new_key_type! {
    pub struct StageKey;
}

#[derive(Debug, Clone)]
pub struct GraphEntry {
    pub stage: Stage,
    pub predecessors: Predecessors,
}

/// Directed graph of named stages.
///
/// A stage can only be added after all of its predecessors, so insertion order is always a valid
/// topological order and cycles cannot be expressed. Building a graph is single threaded; share a
/// graph between threads only behind external synchronization.
#[derive(Debug)]
pub struct StageGraph {
    registry: Arc<FunctionRegistry>,

    /// Stage storage.
    slots: SlotMap<StageKey, GraphEntry>,

    /// Index lookup StageKey using the stage name.
    name_index: HashMap<StageName, StageKey>,

    /// Insertion order.
    order: Vec<StageKey>,
}

impl StageGraph {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        StageGraph { registry, slots: SlotMap::with_key(), name_index: HashMap::new(), order: Vec::new() }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Validates and records `stage`.
    ///
    /// Fails, leaving the graph untouched, if the stage function is not registered, if a stage
    /// with the same name exists, or if a predecessor has not been added yet.
    pub fn add_stage(&mut self, predecessors: Predecessors, stage: Stage) -> Result<StageKey> {
        if !self.registry.contains(stage.function()) {
            return Err(GraphValidationError::NotAFunction(stage.function().to_string()).into());
        }

        if self.name_index.contains_key(stage.name()) {
            return Err(GraphValidationError::DuplicateStage(stage.name().to_string()).into());
        }

        if let Some(missing) = predecessors.names().into_iter().find(|name| !self.name_index.contains_key(*name)) {
            return Err(GraphValidationError::MissingPredecessor(missing.to_string()).into());
        }

        let name = stage.name().clone();
        log::debug!("Adding stage '{}' after {:?}", name, predecessors.names());

        let key = self.slots.insert(GraphEntry { stage, predecessors });
        self.name_index.insert(name, key);
        self.order.push(key);

        Ok(key)
    }

    pub fn get(&self, name: &str) -> Option<&GraphEntry> {
        let key = self.name_index.get(name)?;
        self.slots.get(*key)
    }

    pub fn get_by_key(&self, key: StageKey) -> Option<&GraphEntry> {
        self.slots.get(key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GraphEntry> {
        self.order.iter().filter_map(|key| self.slots.get(*key))
    }
}
