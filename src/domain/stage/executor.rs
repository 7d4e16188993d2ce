use std::collections::BTreeMap;
use std::path::Path;

use crate::api::parameter_dto::JobDescriptorDto;
use crate::domain::flatten::{self, FileMap};
use crate::domain::function_registry::{FunctionId, FunctionRegistry};
use crate::domain::transcended_file::{TranscendedFile, TransferOptions, TransferSet};
use crate::domain::value::Value;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

/// Settings of the stage process.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub transfer: TransferOptions,
}

/// Reads a descriptor through a transcended copy.
pub fn load_descriptor(param_file: &Path, transfer: &TransferOptions) -> Result<JobDescriptorDto> {
    let guard = TranscendedFile::from_remote(param_file, transfer.clone())?.enter()?;
    let descriptor = parse_json_file(guard.local_path())?;
    guard.finish()?;

    Ok(descriptor)
}

/// Runs one compiled stage inside the process started by the external scheduler.
///
/// Load the descriptor, resolve the function, stage in every input, prepare every output, invoke,
/// then stage out the outputs. Local copies are removed on every path; when the function fails
/// nothing is staged out and the error is returned so the process exits non-zero.
pub fn execute_stage(param_file: &Path, registry: &FunctionRegistry, options: &ExecutionOptions) -> Result<Value> {
    let descriptor = load_descriptor(param_file, &options.transfer)?;

    let function_id = FunctionId::new(descriptor.module_path.clone(), descriptor.function.clone());
    let function = registry.resolve(&function_id)?;
    log::info!("Executing '{}' from '{}'", function_id, param_file.display());

    let mut local_paths = BTreeMap::new();
    let input_files = transcended_files(&descriptor.input_files, true, &options.transfer, &mut local_paths)?;
    let output_files = transcended_files(&descriptor.output_files, false, &options.transfer, &mut local_paths)?;

    let inputs = TransferSet::enter(input_files)?;
    log::debug!("Staged in {} input files", inputs.len());
    let outputs = TransferSet::enter(output_files)?;

    let kwargs = flatten::substitute_paths(&descriptor.function_kwargs, &local_paths);
    let value = function.invoke(registry, kwargs)?;

    outputs.finish()?;
    inputs.finish()?;
    log::info!("Finished '{}'", function_id);

    Ok(value)
}

fn transcended_files(
    files: &FileMap,
    input: bool,
    transfer: &TransferOptions,
    local_paths: &mut BTreeMap<String, String>,
) -> Result<Vec<TranscendedFile>> {
    let mut transcended = Vec::with_capacity(files.len());

    for (name, value) in files {
        let Value::Str(remote) = value else {
            return Err(Error::CompileIntegrity(format!("descriptor file entry '{name}' is not a path")));
        };

        let file = if input {
            TranscendedFile::from_remote(remote, transfer.clone())?
        } else {
            TranscendedFile::to_remote(remote, transfer.clone())?
        };
        local_paths.insert(name.clone(), file.local_path().to_string_lossy().into_owned());
        transcended.push(file);
    }

    Ok(transcended)
}
