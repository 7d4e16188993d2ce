use std::collections::BTreeMap;

use anyhow::{Context, anyhow, bail};

use crate::api::parameter_dto::CallableRecordDto;
use crate::domain::function_registry::{CallContext, FunctionId, FunctionRegistry, FunctionSignature, str_arg};
use crate::domain::value::{Kwargs, Value};
use crate::loader::parser::{read_artifact, write_artifact};

pub const MODULE_PATH: &str = "clusterflow::pickle_job";
pub const FUNCTION_NAME: &str = "execute";

pub fn function_id() -> FunctionId {
    FunctionId::new(MODULE_PATH, FUNCTION_NAME)
}

pub fn register(registry: &mut FunctionRegistry) {
    let signature = FunctionSignature::new(
        ["pickle_call", "pickle_call_kwargs", "pickle_out", "stage_input_files", "index_tuple"],
        Some("None"),
    );
    registry.register(function_id(), signature, execute_packaged_job);
}

/// Runs a packaged job: loads the callable and its keyword arguments, replaces every token by the
/// output of the job it stands for, calls the function and writes its return value to `pickle_out`.
///
/// `stage_input_files` and `index_tuple` are absent for jobs without deferred arguments.
pub fn execute_packaged_job(ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let call_file = str_arg(&kwargs, "pickle_call")?;
    let call_kwargs_file = str_arg(&kwargs, "pickle_call_kwargs")?;
    let out_file = str_arg(&kwargs, "pickle_out")?;
    let input_files = optional_map(&kwargs, "stage_input_files")?;
    let index_tuple = optional_map(&kwargs, "index_tuple")?;

    let record: CallableRecordDto = read_artifact(call_file).with_context(|| format!("reading callable '{call_file}'"))?;
    let function_id = FunctionId::new(record.module_path, record.function);
    let function = ctx.registry.resolve(&function_id)?;

    let call_kwargs: Kwargs = read_artifact(call_kwargs_file).with_context(|| format!("reading arguments '{call_kwargs_file}'"))?;
    let mut contracted = Kwargs::new();
    for (name, value) in call_kwargs {
        contracted.insert(name, contract(value, input_files, index_tuple)?);
    }

    log::info!("Calling '{}'", function_id);
    let output = function.invoke(ctx.registry, contracted)?;
    write_artifact(out_file, &output).with_context(|| format!("writing output '{out_file}'"))?;

    Ok(output)
}

fn optional_map<'a>(kwargs: &'a Kwargs, name: &str) -> anyhow::Result<Option<&'a BTreeMap<String, Value>>> {
    match kwargs.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Keyed(map)) => Ok(Some(map)),
        Some(_) => bail!("keyword argument '{name}' is not a map"),
    }
}

/// Inverse of the expansion done when the job was created.
fn contract(
    value: Value,
    input_files: Option<&BTreeMap<String, Value>>,
    index_tuple: Option<&BTreeMap<String, Value>>,
) -> anyhow::Result<Value> {
    let contracted = match value {
        Value::Deferred(deferred) => {
            let token = deferred.token()?;
            let path = input_files
                .and_then(|files| files.get(token))
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("no input file staged for token '{token}'"))?;
            let output: Value = read_artifact(path).with_context(|| format!("reading dependency output '{path}'"))?;

            match (index_tuple.and_then(|indices| indices.get(token)), output) {
                (Some(Value::Int(index)), Value::Tuple(items)) => {
                    let position = usize::try_from(*index)?;
                    match items.into_iter().nth(position) {
                        Some(item) => item,
                        None => bail!("index {index} is out of range of the output '{path}'"),
                    }
                }
                (_, output) => output,
            }
        }
        Value::Sequence(items) => Value::Sequence(contract_items(items, input_files, index_tuple)?),
        Value::Tuple(items) => Value::Tuple(contract_items(items, input_files, index_tuple)?),
        Value::Keyed(map) => {
            let mut contracted = BTreeMap::new();
            for (key, item) in map {
                contracted.insert(key, contract(item, input_files, index_tuple)?);
            }
            Value::Keyed(contracted)
        }
        other => other,
    };

    Ok(contracted)
}

fn contract_items(
    items: Vec<Value>,
    input_files: Option<&BTreeMap<String, Value>>,
    index_tuple: Option<&BTreeMap<String, Value>>,
) -> anyhow::Result<Vec<Value>> {
    items.into_iter().map(|item| contract(item, input_files, index_tuple)).collect()
}
