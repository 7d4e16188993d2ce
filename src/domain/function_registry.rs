use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::value::{Kwargs, Value};
use crate::error::{Error, Result};

/// Stable identifier of a function, the `module::name` pair written into parameter descriptors.
///
/// Executable code is never serialized. The process that runs a stage resolves this identifier in
/// its own [`FunctionRegistry`], so every function referenced by a compiled graph has to be
/// registered in the executing binary as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    pub module: String,
    pub name: String,
}

impl FunctionId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        FunctionId { module: module.into(), name: name.into() }
    }

    /// Splits `a::b::name` at the last `::`.
    pub fn parse(path: &str) -> Option<Self> {
        let (module, name) = path.rsplit_once("::")?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        Some(FunctionId::new(module, name))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Declared keyword parameters and return annotation of a registered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub parameters: Vec<String>,
    pub return_annotation: Option<String>,
}

impl FunctionSignature {
    pub fn new<S: Into<String>>(parameters: impl IntoIterator<Item = S>, return_annotation: Option<&str>) -> Self {
        FunctionSignature {
            parameters: parameters.into_iter().map(Into::into).collect(),
            return_annotation: return_annotation.map(str::to_string),
        }
    }

    /// Number of elements of a fixed-size tuple return type.
    ///
    /// Understands `Tuple[a, b]`, `tuple[a, b]` and `(a, b)`. Returns `None` for every other
    /// annotation, including a missing one.
    pub fn tuple_arity(&self) -> Option<usize> {
        let annotation = self.return_annotation.as_deref()?.trim();

        let inner = if let Some(rest) = annotation.strip_prefix("Tuple[").or_else(|| annotation.strip_prefix("tuple[")) {
            rest.strip_suffix(']')?
        } else {
            annotation.strip_prefix('(')?.strip_suffix(')')?
        };

        if inner.trim().is_empty() {
            return Some(0);
        }

        let mut depth = 0_i32;
        let mut commas = 0;
        for ch in inner.chars() {
            match ch {
                '[' | '(' | '<' => depth += 1,
                ']' | ')' | '>' => depth -= 1,
                ',' if depth == 0 => commas += 1,
                _ => {}
            }
        }

        // `(a,)` is a one-element tuple
        if inner.trim_end().ends_with(',') { Some(commas) } else { Some(commas + 1) }
    }
}

/// Context handed to every stage function.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub registry: &'a FunctionRegistry,
}

/// Plain function pointer; closures with captured state cannot be resolved in another process.
pub type StageFn = fn(&CallContext<'_>, Kwargs) -> anyhow::Result<Value>;

#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    pub id: FunctionId,
    pub signature: FunctionSignature,
    pub call: StageFn,
}

impl RegisteredFunction {
    pub fn invoke(&self, registry: &FunctionRegistry, kwargs: Kwargs) -> Result<Value> {
        let context = CallContext { registry };
        (self.call)(&context, kwargs).map_err(Error::Invocation)
    }
}

/// Explicit lookup table from [`FunctionId`] to callable. Owned by the graph builder and by the
/// executing process; there is no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionId, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry { functions: HashMap::new() }
    }

    /// Registry with the packaged-job runner and the builtin file helpers.
    pub fn with_builtins() -> Self {
        let mut registry = FunctionRegistry::new();
        crate::domain::builtins::register(&mut registry);
        crate::domain::pickle_job::execute::register(&mut registry);
        registry
    }

    /// Registers `call`; a second registration under the same id replaces the first one.
    pub fn register(&mut self, id: FunctionId, signature: FunctionSignature, call: StageFn) -> &mut Self {
        if self.functions.contains_key(&id) {
            log::warn!("Function '{}' registered twice, keeping the last registration", id);
        }
        self.functions.insert(id.clone(), RegisteredFunction { id, signature, call });
        self
    }

    pub fn get(&self, id: &FunctionId) -> Option<&RegisteredFunction> {
        self.functions.get(id)
    }

    pub fn contains(&self, id: &FunctionId) -> bool {
        self.functions.contains_key(id)
    }

    pub fn resolve(&self, id: &FunctionId) -> Result<&RegisteredFunction> {
        self.functions.get(id).ok_or_else(|| Error::UnknownFunction(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Looks up a required keyword argument inside a stage function.
pub fn arg<'a>(kwargs: &'a Kwargs, name: &str) -> anyhow::Result<&'a Value> {
    kwargs.get(name).ok_or_else(|| anyhow::anyhow!("missing keyword argument '{name}'"))
}

/// Looks up a required string keyword argument inside a stage function.
pub fn str_arg<'a>(kwargs: &'a Kwargs, name: &str) -> anyhow::Result<&'a str> {
    arg(kwargs, name)?.as_str().ok_or_else(|| anyhow::anyhow!("keyword argument '{name}' is not a string"))
}
