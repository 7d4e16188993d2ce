use serde::{Deserialize, Serialize};

use crate::domain::flatten::FileMap;
use crate::domain::value::Kwargs;

/// Job descriptor persisted once per stage at compile time and read back once by the stage process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobDescriptorDto {
    pub module_path: String,
    pub function: String,

    /// Keyword arguments with every file leaf replaced by its durable path.
    pub function_kwargs: Kwargs,

    /// Generated key to durable input path.
    #[serde(default, skip_serializing_if = "FileMap::is_empty")]
    pub input_files: FileMap,

    /// Generated key to durable output path.
    #[serde(default, skip_serializing_if = "FileMap::is_empty")]
    pub output_files: FileMap,
}

/// Callable artifact of a packaged job. The executing process resolves it in its own registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallableRecordDto {
    pub module_path: String,
    pub function: String,
    pub parameters: Vec<String>,
    pub return_annotation: Option<String>,
}
