use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::api::parameter_dto::CallableRecordDto;
use crate::domain::function_registry::{FunctionId, FunctionRegistry, FunctionSignature};
use crate::domain::pickle_job::JobId;
use crate::domain::pickle_job::deferred_value::DeferredValue;
use crate::domain::pickle_job::execute;
use crate::domain::pickle_job::organizer::JobOrganizer;
use crate::domain::resources::ResourceRequest;
use crate::domain::stage::stage::Stage;
use crate::domain::transcended_file::{TranscendedFile, TransferOptions};
use crate::domain::utils::id::{JobName, StageName};
use crate::domain::value::{Kwargs, Value};
use crate::error::{Error, Result, SignatureError};
use crate::loader::parser::{read_artifact, write_artifact};

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub resources: ResourceRequest,
    /// Sub-path below the artifact directories.
    pub group: Vec<String>,
    /// Rewrite an existing keyword-argument artifact. The callable artifact is never rewritten.
    pub overwrite: bool,
    pub transfer: TransferOptions,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions { resources: ResourceRequest::default(), group: Vec::new(), overwrite: true, transfer: TransferOptions::default() }
    }
}

impl JobOptions {
    pub fn with_resources(resources: ResourceRequest) -> Self {
        JobOptions { resources, ..Default::default() }
    }
}

/// A function call packaged into durable artifacts, to be run as one stage.
///
/// Creating a job validates the keyword arguments against the function signature, persists the
/// callable and the keyword-argument tree and replaces every [`DeferredValue`] in that tree by a
/// token bound to the producing job's output artifact.
#[derive(Debug, Clone)]
pub struct PickleJob {
    id: JobId,
    name: JobName,
    function: FunctionId,
    signature: FunctionSignature,
    resources: ResourceRequest,
    transfer: TransferOptions,

    call_file: PathBuf,
    call_kwargs_file: PathBuf,
    out_file: PathBuf,

    /// Token to the durable output artifact of the producing job.
    input_files: BTreeMap<String, Value>,
    /// Token to the selected tuple position, `Null` for the whole output.
    index_tuple: BTreeMap<String, Value>,
    dependencies: Vec<JobId>,

    stage: Option<StageName>,
}

impl PickleJob {
    pub(crate) fn new(
        id: JobId,
        name: &str,
        function: FunctionId,
        mut kwargs: Kwargs,
        organizer: &mut JobOrganizer,
        registry: &FunctionRegistry,
        options: JobOptions,
    ) -> Result<Self> {
        let signature = registry.resolve(&function)?.signature.clone();
        check_signature(&function, &signature, &kwargs)?;

        let group = &options.group;
        let unique_name = organizer.create_unique_name(name, group);
        let call_file = organizer.call_file_path(&function, name, group)?;
        let call_kwargs_file = organizer.call_kwargs_file_path(name, group)?;
        let out_file = organizer.out_file_path(name, group)?;

        let record = CallableRecordDto {
            module_path: function.module.clone(),
            function: function.name.clone(),
            parameters: signature.parameters.clone(),
            return_annotation: signature.return_annotation.clone(),
        };
        persist(&call_file, &record, false, &options.transfer)?;

        let mut input_files = BTreeMap::new();
        let mut index_tuple = BTreeMap::new();
        let mut dependencies = Vec::new();
        for value in kwargs.values_mut() {
            expand(value, &mut input_files, &mut index_tuple, &mut dependencies)?;
        }
        persist(&call_kwargs_file, &kwargs, options.overwrite, &options.transfer)?;

        log::debug!("Packaged job '{}' calling '{}' with {} dependencies", unique_name, function, dependencies.len());

        Ok(PickleJob {
            id,
            name: JobName::new(unique_name),
            function,
            signature,
            resources: options.resources,
            transfer: options.transfer,
            call_file,
            call_kwargs_file,
            out_file,
            input_files,
            index_tuple,
            dependencies,
            stage: None,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Unique name, also the name of the job's stage.
    pub fn name(&self) -> &JobName {
        &self.name
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    pub fn resources(&self) -> ResourceRequest {
        self.resources
    }

    pub fn call_file(&self) -> &Path {
        &self.call_file
    }

    pub fn call_kwargs_file(&self) -> &Path {
        &self.call_kwargs_file
    }

    pub fn out_file(&self) -> &Path {
        &self.out_file
    }

    pub fn input_files(&self) -> &BTreeMap<String, Value> {
        &self.input_files
    }

    pub fn index_tuple(&self) -> &BTreeMap<String, Value> {
        &self.index_tuple
    }

    /// Jobs whose output this job consumes, without repetitions.
    pub fn dependencies(&self) -> &[JobId] {
        &self.dependencies
    }

    pub fn stage(&self) -> Option<&StageName> {
        self.stage.as_ref()
    }

    /// Output of this job, or element `index` of it, for use in the arguments of another job.
    ///
    /// The index is checked against the arity of a tuple return annotation right away. Functions
    /// without a tuple annotation only accept index `0`.
    pub fn deferred_value(&self, index: Option<usize>) -> Result<DeferredValue> {
        if let Some(index) = index {
            match self.signature.tuple_arity() {
                Some(arity) if index >= arity => return Err(Error::IndexRange { index, arity }),
                None if index > 0 => return Err(Error::IndexRange { index, arity: 1 }),
                _ => {}
            }
        }

        Ok(DeferredValue::new(self.id, self.out_file.to_string_lossy(), index))
    }

    /// Element `index` of the output.
    pub fn get(&self, index: usize) -> Result<DeferredValue> {
        self.deferred_value(Some(index))
    }

    /// The whole output.
    pub fn output(&self) -> Result<DeferredValue> {
        self.deferred_value(None)
    }

    /// Fails with `Error::Busy` while the output artifact does not exist.
    pub fn check_done(&self) -> Result<()> {
        if !self.out_file.exists() {
            return Err(Error::Busy { job: self.name.to_string(), path: self.out_file.clone() });
        }
        Ok(())
    }

    /// Decoded output of the job. Does not wait; poll on `Error::Busy`.
    pub fn result(&self) -> Result<Value> {
        self.check_done()?;

        let guard = TranscendedFile::from_remote(&self.out_file, self.transfer.clone())?.enter()?;
        let value = read_artifact(guard.local_path())?;
        guard.finish()?;

        Ok(value)
    }

    /// Keyword arguments of the generic packaged-job runner.
    pub fn stage_arguments(&self) -> Kwargs {
        let mut arguments = Kwargs::new();
        arguments.insert("pickle_call".to_string(), Value::input_file(self.call_file.to_string_lossy()));
        arguments.insert("pickle_call_kwargs".to_string(), Value::input_file(self.call_kwargs_file.to_string_lossy()));
        arguments.insert("pickle_out".to_string(), Value::output_file(self.out_file.to_string_lossy()));

        if !self.input_files.is_empty() {
            arguments.insert("stage_input_files".to_string(), Value::Keyed(self.input_files.clone()));
            arguments.insert("index_tuple".to_string(), Value::Keyed(self.index_tuple.clone()));
        }

        arguments
    }

    /// Stage running this job through the generic packaged-job runner.
    pub fn create_stage(&self, log_target: PathBuf) -> Stage {
        Stage::new(self.name.as_str(), execute::function_id(), self.stage_arguments())
            .with_output_file("output", self.out_file.to_string_lossy())
            .with_resources(self.resources)
            .with_log_target(log_target)
    }

    pub(crate) fn set_stage(&mut self, stage: StageName) {
        self.stage = Some(stage);
    }
}

fn check_signature(function: &FunctionId, signature: &FunctionSignature, kwargs: &Kwargs) -> Result<()> {
    let declared: BTreeSet<&str> = signature.parameters.iter().map(String::as_str).collect();
    let given: BTreeSet<&str> = kwargs.keys().map(String::as_str).collect();

    let missing: Vec<String> = declared.difference(&given).map(|name| name.to_string()).collect();
    let excess: Vec<String> = given.difference(&declared).map(|name| name.to_string()).collect();
    if !missing.is_empty() || !excess.is_empty() {
        return Err(SignatureError::KeywordMismatch { function: function.to_string(), missing, excess }.into());
    }

    if signature.return_annotation.is_none() {
        return Err(SignatureError::MissingReturnAnnotation(function.to_string()).into());
    }

    Ok(())
}

/// Binds a token to every deferred value of `value` and records what the token stands for.
fn expand(
    value: &mut Value,
    input_files: &mut BTreeMap<String, Value>,
    index_tuple: &mut BTreeMap<String, Value>,
    dependencies: &mut Vec<JobId>,
) -> Result<()> {
    match value {
        Value::Deferred(deferred) => {
            let job = deferred.unbound_job().ok_or(Error::UnknownJob)?;
            let token = deferred.bind_token();
            if input_files.contains_key(&token) {
                return Err(Error::CompileIntegrity(format!("token '{token}' is already in use")));
            }

            input_files.insert(token.clone(), Value::input_file(deferred.output_path()?));
            let index = match deferred.index()? {
                Some(index) => Value::Int(index as i64),
                None => Value::Null,
            };
            index_tuple.insert(token, index);

            if !dependencies.contains(&job) {
                dependencies.push(job);
            }
        }
        Value::Sequence(items) | Value::Tuple(items) => {
            for item in items {
                expand(item, input_files, index_tuple, dependencies)?;
            }
        }
        Value::Keyed(map) => {
            for item in map.values_mut() {
                expand(item, input_files, index_tuple, dependencies)?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Writes `value` through a transcended file unless the artifact exists and may not be rewritten.
fn persist<T: Serialize + ?Sized>(path: &Path, value: &T, overwrite: bool, transfer: &TransferOptions) -> Result<()> {
    if path.exists() && !overwrite {
        log::debug!("Keeping existing artifact '{}'", path.display());
        return Ok(());
    }

    let guard = TranscendedFile::to_remote(path, transfer.clone())?.enter()?;
    write_artifact(guard.local_path(), value)?;
    guard.finish()
}
