//! Small stage functions every binary registers.

use anyhow::{Context, bail};
use std::fs;

use crate::domain::function_registry::{CallContext, FunctionId, FunctionRegistry, FunctionSignature, arg, str_arg};
use crate::domain::value::{Kwargs, Value};

pub const MODULE_PATH: &str = "clusterflow::builtins";

pub fn function_id(name: &str) -> FunctionId {
    FunctionId::new(MODULE_PATH, name)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry
        .register(function_id("copy_file"), FunctionSignature::new(["source", "destination"], Some("None")), copy_file)
        .register(function_id("concatenate_files"), FunctionSignature::new(["sources", "destination"], Some("None")), concatenate_files)
        .register(function_id("add"), FunctionSignature::new(["a", "b"], Some("float")), add);
}

/// Copies `source` to `destination`.
pub fn copy_file(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let source = str_arg(&kwargs, "source")?;
    let destination = str_arg(&kwargs, "destination")?;

    fs::copy(source, destination).with_context(|| format!("copying '{source}' to '{destination}'"))?;
    Ok(Value::Null)
}

/// Writes the contents of every path in `sources`, in order, to `destination`.
pub fn concatenate_files(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let Some(sources) = arg(&kwargs, "sources")?.as_slice() else {
        bail!("keyword argument 'sources' is not a sequence");
    };
    let destination = str_arg(&kwargs, "destination")?;

    let mut content = Vec::new();
    for source in sources {
        let Some(source) = source.as_str() else {
            bail!("source {source:?} is not a path");
        };
        content.extend(fs::read(source).with_context(|| format!("reading '{source}'"))?);
    }

    fs::write(destination, content).with_context(|| format!("writing '{destination}'"))?;
    Ok(Value::Null)
}

/// Sum of two numbers; integer if both are integers.
pub fn add(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let a = arg(&kwargs, "a")?;
    let b = arg(&kwargs, "b")?;

    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        _ => match (a.as_float(), b.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => bail!("cannot add {a:?} and {b:?}"),
        },
    }
}
