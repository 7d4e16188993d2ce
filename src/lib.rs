pub mod api;
pub mod cli;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

pub use crate::domain::function_registry::{CallContext, FunctionId, FunctionRegistry, FunctionSignature};
pub use crate::domain::pickle_job::jar::JobJar;
pub use crate::domain::stage::graph::StageGraph;
pub use crate::domain::stage::stage::{Predecessors, Stage};
pub use crate::domain::value::{Kwargs, StageFile, Value};
pub use crate::error::{Error, Result};
