use serde::{Deserialize, Serialize};

use crate::domain::utils::id::CategoryName;

/// Compute resources requested by one stage process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cores: u32,
    pub memory_mb: u64,
}

impl ResourceRequest {
    pub fn new(cores: u32, memory_mb: u64) -> Self {
        ResourceRequest { cores, memory_mb }
    }
}

impl Default for ResourceRequest {
    /// One core and 1 GB of memory.
    fn default() -> Self {
        ResourceRequest { cores: 1, memory_mb: 1024 }
    }
}

/// Named bundle of resources shared by any number of rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceCategory {
    pub name: CategoryName,
    pub resources: ResourceRequest,
}

impl ResourceCategory {
    pub fn new(name: impl Into<String>, cores: u32, memory_mb: u64) -> Self {
        ResourceCategory { name: CategoryName::new(name), resources: ResourceRequest::new(cores, memory_mb) }
    }

    pub fn from_request(name: impl Into<String>, resources: ResourceRequest) -> Self {
        ResourceCategory { name: CategoryName::new(name), resources }
    }
}
