use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Task-list document consumed by the external DAG scheduler (Makeflow JX, plain JSON subset).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JxDocumentDto {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, CategoryDto>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    pub rules: Vec<RuleDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryDto {
    pub resources: ResourcesDto,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcesDto {
    pub cores: u32,
    pub memory: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleDto {
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}
