use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::transcended_file::{StagingPolicy, TransferOptions};

/// Configuration of a job jar and of the stage processes it spawns.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigDto {
    pub jar_name: String,
    pub jar_dir: PathBuf,
    pub wrapper_script: PathBuf,
    #[serde(default)]
    pub executor_binary: Option<PathBuf>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub staging_policy: StagingPolicy,
    #[serde(default)]
    pub default_category: Option<CategoryConfigDto>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfigDto {
    pub name: String,
    pub cores: u32,
    pub memory_mb: u64,
}

impl PipelineConfigDto {
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions { scratch_root: self.scratch_dir.clone(), policy: self.staging_policy, ..Default::default() }
    }
}
