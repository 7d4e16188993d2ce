//! Parameter flattening.
//!
//! Every file leaf of an argument tree gets a generated key: `{parent}_{index}` below sequences and
//! tuples, `{parent}_{key}` below keyed maps, the argument name itself at the top level. The same
//! naming drives [`substitute_paths`] and [`unflatten`], so a tree can be flattened at compile time
//! and have local paths written back into it at execution time.

use std::collections::BTreeMap;

use crate::domain::value::{Kwargs, StageFile, Value};
use crate::error::{Error, Result};

/// Generated key to durable path. Values are `Value::Str` leaves, possibly nested for declared
/// output maps.
pub type FileMap = BTreeMap<String, Value>;

/// Result of flattening one top-level argument. Maps without entries are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub value: Value,
    pub input_files: Option<FileMap>,
    pub output_files: Option<FileMap>,
}

/// Result of flattening a whole keyword-argument map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlattenedKwargs {
    pub kwargs: Kwargs,
    pub input_files: FileMap,
    pub output_files: FileMap,
}

/// Replaces the file leaves of `value` by their path and collects them into input/output maps.
///
/// Fails when two leaves end up with the same generated key, which happens when a keyed map
/// contains keys like `a` and `a_0` next to each other.
pub fn flatten(name: &str, value: &Value) -> Result<Flattened> {
    let mut input_files = FileMap::new();
    let mut output_files = FileMap::new();
    let value = flatten_into(name, value, &mut input_files, &mut output_files)?;

    Ok(Flattened { value, input_files: non_empty(input_files), output_files: non_empty(output_files) })
}

/// Flattens every argument of `kwargs`, merging the generated maps.
pub fn flatten_kwargs(kwargs: &Kwargs) -> Result<FlattenedKwargs> {
    let mut flattened = FlattenedKwargs::default();

    for (name, value) in kwargs {
        let Flattened { value, input_files, output_files } = flatten(name, value)?;
        flattened.kwargs.insert(name.clone(), value);
        merge_unique(&mut flattened.input_files, input_files.unwrap_or_default())?;
        merge_unique(&mut flattened.output_files, output_files.unwrap_or_default())?;
    }

    Ok(flattened)
}

fn flatten_into(name: &str, value: &Value, input_files: &mut FileMap, output_files: &mut FileMap) -> Result<Value> {
    let flat = match value {
        Value::File(StageFile::Input(path)) => {
            insert_unique(input_files, name, path)?;
            Value::Str(path.clone())
        }
        Value::File(StageFile::Output(path)) => {
            insert_unique(output_files, name, path)?;
            Value::Str(path.clone())
        }
        Value::Sequence(items) => Value::Sequence(flatten_items(name, items, input_files, output_files)?),
        Value::Tuple(items) => Value::Tuple(flatten_items(name, items, input_files, output_files)?),
        Value::Keyed(map) => {
            let mut flat_map = BTreeMap::new();
            for (key, item) in map {
                let item_name = format!("{name}_{key}");
                flat_map.insert(key.clone(), flatten_into(&item_name, item, input_files, output_files)?);
            }
            Value::Keyed(flat_map)
        }
        other => other.clone(),
    };

    Ok(flat)
}

fn flatten_items(name: &str, items: &[Value], input_files: &mut FileMap, output_files: &mut FileMap) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| flatten_into(&format!("{name}_{idx}"), item, input_files, output_files))
        .collect()
}

fn insert_unique(files: &mut FileMap, name: &str, path: &str) -> Result<()> {
    if files.insert(name.to_string(), Value::Str(path.to_string())).is_some() {
        return Err(Error::CompileIntegrity(format!("generated file key '{name}' is not unique")));
    }
    Ok(())
}

fn merge_unique(target: &mut FileMap, source: FileMap) -> Result<()> {
    for (name, path) in source {
        if target.contains_key(&name) {
            return Err(Error::CompileIntegrity(format!("generated file key '{name}' is not unique")));
        }
        target.insert(name, path);
    }
    Ok(())
}

fn non_empty(files: FileMap) -> Option<FileMap> {
    if files.is_empty() { None } else { Some(files) }
}

/// Walks `value` with the flattening names and lets `rewrite` replace any non-container leaf.
fn rewrite_leaves<F>(name: &str, value: &Value, rewrite: &mut F) -> Value
where
    F: FnMut(&str, &Value) -> Option<Value>,
{
    match value {
        Value::Sequence(items) => Value::Sequence(rewrite_items(name, items, rewrite)),
        Value::Tuple(items) => Value::Tuple(rewrite_items(name, items, rewrite)),
        Value::Keyed(map) => Value::Keyed(
            map.iter().map(|(key, item)| (key.clone(), rewrite_leaves(&format!("{name}_{key}"), item, rewrite))).collect(),
        ),
        leaf => rewrite(name, leaf).unwrap_or_else(|| leaf.clone()),
    }
}

fn rewrite_items<F>(name: &str, items: &[Value], rewrite: &mut F) -> Vec<Value>
where
    F: FnMut(&str, &Value) -> Option<Value>,
{
    items.iter().enumerate().map(|(idx, item)| rewrite_leaves(&format!("{name}_{idx}"), item, rewrite)).collect()
}

/// Writes the paths of `paths` (generated key to path) into the matching leaves of `kwargs`.
pub fn substitute_paths(kwargs: &Kwargs, paths: &BTreeMap<String, String>) -> Kwargs {
    kwargs
        .iter()
        .map(|(name, value)| {
            let rewritten = rewrite_leaves(name, value, &mut |leaf_name: &str, _: &Value| paths.get(leaf_name).map(|path| Value::Str(path.clone())));
            (name.clone(), rewritten)
        })
        .collect()
}

/// Inverse of [`flatten`]: turns the path leaves listed in the maps back into file references.
pub fn unflatten(name: &str, value: &Value, input_files: Option<&FileMap>, output_files: Option<&FileMap>) -> Value {
    rewrite_leaves(name, value, &mut |leaf_name: &str, _: &Value| {
        if let Some(Value::Str(path)) = input_files.and_then(|files| files.get(leaf_name)) {
            return Some(Value::input_file(path.clone()));
        }
        if let Some(Value::Str(path)) = output_files.and_then(|files| files.get(leaf_name)) {
            return Some(Value::output_file(path.clone()));
        }
        None
    })
}

/// Collects every path leaf of a (possibly nested) file map, in key order.
///
/// Anything but a path leaf means the map was built incorrectly and must not reach the task list.
pub fn collect_paths(files: &FileMap) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for (name, value) in files {
        collect_value_paths(name, value, &mut paths)?;
    }
    Ok(paths)
}

fn collect_value_paths(name: &str, value: &Value, paths: &mut Vec<String>) -> Result<()> {
    match value {
        Value::Str(path) => paths.push(path.clone()),
        Value::File(file) => paths.push(file.path().to_string()),
        Value::Sequence(items) | Value::Tuple(items) => {
            for item in items {
                collect_value_paths(name, item, paths)?;
            }
        }
        Value::Keyed(map) => {
            for item in map.values() {
                collect_value_paths(name, item, paths)?;
            }
        }
        other => {
            return Err(Error::CompileIntegrity(format!("file entry '{name}' is not a path: {other:?}")));
        }
    }
    Ok(())
}
