use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::pickle_job::deferred_value::DeferredValue;

/// A durable-storage path together with its direction relative to the stage that references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFile {
    /// Read by the stage; has to exist before the stage runs.
    Input(String),
    /// Written by the stage.
    Output(String),
}

impl StageFile {
    pub fn input(path: impl Into<String>) -> Self {
        StageFile::Input(path.into())
    }

    pub fn output(path: impl Into<String>) -> Self {
        StageFile::Output(path.into())
    }

    pub fn path(&self) -> &str {
        match self {
            StageFile::Input(path) | StageFile::Output(path) => path,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, StageFile::Input(_))
    }
}

impl fmt::Display for StageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Argument and result tree passed between stages.
///
/// `File` leaves only appear in stage argument trees before compilation, `Deferred` leaves only in
/// packaged job arguments before execution. Both are replaced by plain values before a function
/// is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Str(String),
    Sequence(Vec<Value>),
    /// Fixed-size ordered group; the only shape a deferred index selects from.
    Tuple(Vec<Value>),
    Keyed(BTreeMap<String, Value>),
    File(StageFile),
    Deferred(DeferredValue),
}

/// Keyword arguments of a stage or job function.
pub type Kwargs = BTreeMap<String, Value>;

impl Value {
    pub fn input_file(path: impl Into<String>) -> Self {
        Value::File(StageFile::input(path))
    }

    pub fn output_file(path: impl Into<String>) -> Self {
        Value::File(StageFile::output(path))
    }

    pub fn keyed<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Keyed(entries.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Elements of a `Sequence` or a `Tuple`.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Keyed(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Sequence(_) | Value::Tuple(_) | Value::Keyed(_))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Keyed(map)
    }
}

impl From<StageFile> for Value {
    fn from(file: StageFile) -> Self {
        Value::File(file)
    }
}

impl From<DeferredValue> for Value {
    fn from(deferred: DeferredValue) -> Self {
        Value::Deferred(deferred)
    }
}

/// JSON has no NaN or infinity; text formats carry those as `"NaN"`, `"inf"` and `"-inf"`.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() || !serializer.is_human_readable() {
            return serializer.serialize_f64(*value);
        }
        let text = if value.is_nan() {
            "NaN"
        } else if value.is_sign_positive() {
            "inf"
        } else {
            "-inf"
        };
        serializer.serialize_str(text)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        if !deserializer.is_human_readable() {
            return f64::deserialize(deserializer);
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float '{other}'"))),
            },
        }
    }
}
