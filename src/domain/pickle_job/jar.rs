use slotmap::SlotMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::config_dto::PipelineConfigDto;
use crate::domain::function_registry::{FunctionId, FunctionRegistry};
use crate::domain::makeflow::from_stages::MakeflowFromStages;
use crate::domain::makeflow::jx_makeflow::{EnvironmentBinding, JxMakeflow};
use crate::domain::pickle_job::JobId;
use crate::domain::pickle_job::organizer::JobOrganizer;
use crate::domain::pickle_job::pickle_job::{JobOptions, PickleJob};
use crate::domain::resources::{ResourceCategory, ResourceRequest};
use crate::domain::stage::graph::{StageGraph, StageKey};
use crate::domain::stage::stage::Predecessors;
use crate::domain::transcended_file::TransferOptions;
use crate::domain::utils::id::StageName;
use crate::domain::value::{Kwargs, Value};
use crate::error::{Error, Result};

/// A jar full of packaged jobs, compiled together into one task list.
///
/// Owns the organizer handing out artifact names, the stage graph and every job. Jobs are
/// addressed by [`JobId`]; a [`DeferredValue`](crate::domain::pickle_job::deferred_value::DeferredValue)
/// is only valid in the jar that produced it.
#[derive(Debug)]
pub struct JobJar {
    organizer: JobOrganizer,
    graph: StageGraph,
    jobs: SlotMap<JobId, PickleJob>,

    transfer: TransferOptions,
    category: Option<ResourceCategory>,
    environment: Vec<EnvironmentBinding>,
    executor_binary: Option<PathBuf>,
}

impl JobJar {
    pub fn new(organizer: JobOrganizer, registry: Arc<FunctionRegistry>) -> Self {
        JobJar {
            organizer,
            graph: StageGraph::new(registry),
            jobs: SlotMap::with_key(),
            transfer: TransferOptions::default(),
            category: None,
            environment: Vec::new(),
            executor_binary: None,
        }
    }

    pub fn from_config(config: &PipelineConfigDto, registry: Arc<FunctionRegistry>) -> Self {
        let mut jar = JobJar::new(JobOrganizer::new(&config.jar_name, &config.jar_dir), registry).with_transfer(config.transfer_options());

        jar.category = config
            .default_category
            .as_ref()
            .map(|category| ResourceCategory::new(&category.name, category.cores, category.memory_mb));
        jar.environment = config.environment.iter().map(|(name, value)| EnvironmentBinding::new(name, value)).collect();
        jar.executor_binary = config.executor_binary.clone();

        jar
    }

    /// Options used for every artifact the jar writes or reads.
    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_executor_binary(mut self, executor_binary: impl Into<PathBuf>) -> Self {
        self.executor_binary = Some(executor_binary.into());
        self
    }

    pub fn name(&self) -> &str {
        self.organizer.jar_name()
    }

    pub fn dir(&self) -> &Path {
        self.organizer.jar_dir()
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        self.graph.registry()
    }

    /// Packages `function` called with `kwargs` into a new job.
    pub fn create_job(&mut self, name: &str, function: FunctionId, kwargs: Kwargs, resources: ResourceRequest) -> Result<JobId> {
        let options = JobOptions { resources, transfer: self.transfer.clone(), ..Default::default() };
        self.create_job_with(name, function, kwargs, options)
    }

    /// Like [`JobJar::create_job`], with the artifacts placed below the `group` sub-path.
    pub fn create_job_in_group(
        &mut self,
        name: &str,
        function: FunctionId,
        kwargs: Kwargs,
        resources: ResourceRequest,
        group: &[&str],
    ) -> Result<JobId> {
        let options = JobOptions {
            resources,
            group: group.iter().map(|part| part.to_string()).collect(),
            transfer: self.transfer.clone(),
            ..Default::default()
        };
        self.create_job_with(name, function, kwargs, options)
    }

    pub fn create_job_with(&mut self, name: &str, function: FunctionId, kwargs: Kwargs, options: JobOptions) -> Result<JobId> {
        for value in kwargs.values() {
            self.check_deferred_jobs(value)?;
        }

        let registry = Arc::clone(self.graph.registry());
        let organizer = &mut self.organizer;
        self.jobs.try_insert_with_key(|id| PickleJob::new(id, name, function, kwargs, organizer, &registry, options))
    }

    fn check_deferred_jobs(&self, value: &Value) -> Result<()> {
        match value {
            // Job ids of different jars collide, the output artifact does not.
            Value::Deferred(deferred) => match deferred.unbound_job().and_then(|job| self.jobs.get(job)) {
                Some(job) if job.out_file() == Path::new(deferred.unbound_output_path()) => Ok(()),
                _ => Err(Error::UnknownJob),
            },
            Value::Sequence(items) | Value::Tuple(items) => items.iter().try_for_each(|item| self.check_deferred_jobs(item)),
            Value::Keyed(map) => map.values().try_for_each(|item| self.check_deferred_jobs(item)),
            _ => Ok(()),
        }
    }

    pub fn job(&self, id: JobId) -> Result<&PickleJob> {
        self.jobs.get(id).ok_or(Error::UnknownJob)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &PickleJob> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Creates the stage of a job, logging to `{jar_dir}/logging/{job}.log`.
    ///
    /// Every job the given one depends on has to be added first.
    pub fn add(&mut self, id: JobId) -> Result<StageKey> {
        let job = self.jobs.get(id).ok_or(Error::UnknownJob)?;

        let mut predecessors: Vec<StageName> = Vec::with_capacity(job.dependencies().len());
        for dependency in job.dependencies() {
            let dependency = self.jobs.get(*dependency).ok_or(Error::UnknownJob)?;
            let stage = dependency.stage().ok_or_else(|| Error::JobNotStaged(dependency.name().to_string()))?;
            predecessors.push(stage.clone());
        }

        let log_dir = self.dir().join("logging");
        fs::create_dir_all(&log_dir)?;
        let log_target = log_dir.join(format!("{}.log", job.name()));

        let stage = job.create_stage(log_target);
        let stage_name = stage.name().clone();
        let key = self.graph.add_stage(Predecessors::from(predecessors), stage)?;

        if let Some(job) = self.jobs.get_mut(id) {
            job.set_stage(stage_name);
        }
        Ok(key)
    }

    pub fn makeflow_dir(&self) -> PathBuf {
        self.dir().join("makeflow")
    }

    pub fn makeflow_file(&self) -> PathBuf {
        self.makeflow_dir().join(format!("{}.makeflow", self.name()))
    }

    pub fn invoker_script(&self) -> PathBuf {
        self.makeflow_dir().join(format!("{}_caller.sh", self.name()))
    }

    /// Task-list builder for every stage of the jar, with parameters under `makeflow/parameters/`.
    pub fn create_makeflow(&self, wrapper_script: impl Into<PathBuf>) -> Result<MakeflowFromStages> {
        let param_dir = self.makeflow_dir().join("parameters");
        fs::create_dir_all(&param_dir)?;

        let mut makeflow = MakeflowFromStages::new(param_dir, wrapper_script).with_transfer(self.transfer.clone());
        makeflow.category = self.category.clone();
        makeflow.environment = self.environment.clone();
        makeflow.executor_binary = self.executor_binary.clone();

        Ok(makeflow)
    }

    /// Compiles every added job and writes `makeflow/{jar}.makeflow` and the invoker script.
    pub fn compile(&self, wrapper_script: impl Into<PathBuf>) -> Result<JxMakeflow> {
        self.create_makeflow(wrapper_script)?.create(&self.graph, &self.makeflow_file(), &self.invoker_script())
    }
}
