use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::flatten::FileMap;
use crate::domain::function_registry::FunctionId;
use crate::domain::resources::ResourceRequest;
use crate::domain::utils::id::StageName;
use crate::domain::value::{Kwargs, Value};

/// One named unit of work: a registered function, its argument tree and its resource request.
///
/// Stages are immutable once built; they are inserted into a
/// [`StageGraph`](crate::domain::stage::graph::StageGraph) which validates names and predecessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    name: StageName,
    function: FunctionId,
    arguments: Kwargs,
    output_files: FileMap,
    resources: ResourceRequest,
    log_target: Option<PathBuf>,
}

impl Stage {
    pub fn new(name: impl Into<String>, function: FunctionId, arguments: Kwargs) -> Self {
        Stage {
            name: StageName::new(name),
            function,
            arguments,
            output_files: FileMap::new(),
            resources: ResourceRequest::default(),
            log_target: None,
        }
    }

    /// Files the stage writes that are not visible in its argument tree.
    pub fn with_output_files(mut self, output_files: FileMap) -> Self {
        self.output_files = output_files;
        self
    }

    pub fn with_output_file(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.output_files.insert(name.into(), Value::output_file(path));
        self
    }

    pub fn with_resources(mut self, resources: ResourceRequest) -> Self {
        self.resources = resources;
        self
    }

    /// File receiving stdout and stderr of the stage process.
    pub fn with_log_target(mut self, log_target: impl Into<PathBuf>) -> Self {
        self.log_target = Some(log_target.into());
        self
    }

    pub fn name(&self) -> &StageName {
        &self.name
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    pub fn arguments(&self) -> &Kwargs {
        &self.arguments
    }

    pub fn output_files(&self) -> &FileMap {
        &self.output_files
    }

    pub fn resources(&self) -> ResourceRequest {
        self.resources
    }

    pub fn log_target(&self) -> Option<&Path> {
        self.log_target.as_deref()
    }
}

/// Stages a new stage depends on. Mirrors the shapes a caller may hold its stages in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Predecessors {
    #[default]
    None,
    One(StageName),
    Many(Vec<StageName>),
    Keyed(BTreeMap<String, StageName>),
}

impl Predecessors {
    pub fn names(&self) -> Vec<&StageName> {
        match self {
            Predecessors::None => Vec::new(),
            Predecessors::One(name) => vec![name],
            Predecessors::Many(names) => names.iter().collect(),
            Predecessors::Keyed(names) => names.values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

impl From<&str> for Predecessors {
    fn from(name: &str) -> Self {
        Predecessors::One(StageName::new(name))
    }
}

impl From<&StageName> for Predecessors {
    fn from(name: &StageName) -> Self {
        Predecessors::One(name.clone())
    }
}

impl From<Vec<StageName>> for Predecessors {
    fn from(names: Vec<StageName>) -> Self {
        if names.is_empty() { Predecessors::None } else { Predecessors::Many(names) }
    }
}

impl From<Vec<&str>> for Predecessors {
    fn from(names: Vec<&str>) -> Self {
        names.into_iter().map(StageName::new).collect::<Vec<_>>().into()
    }
}
