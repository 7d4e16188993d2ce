use std::path::{Path, PathBuf};

use crate::domain::makeflow::jx_makeflow::{EnvironmentBinding, JxMakeflow};
use crate::domain::resources::ResourceCategory;
use crate::domain::stage::compiler::CompileOptions;
use crate::domain::stage::graph::StageGraph;
use crate::domain::transcended_file::TransferOptions;
use crate::error::Result;

/// Compiles every stage of a graph and writes the task list for the external scheduler.
#[derive(Debug, Clone)]
pub struct MakeflowFromStages {
    pub param_dir: PathBuf,
    pub wrapper_script: PathBuf,
    /// Shared by every rule. Without it each stage gets a category of its own.
    pub category: Option<ResourceCategory>,
    pub environment: Vec<EnvironmentBinding>,
    /// Binary re-entering the execution path; the running binary if unset.
    pub executor_binary: Option<PathBuf>,
    pub transfer: TransferOptions,
}

impl MakeflowFromStages {
    pub fn new(param_dir: impl Into<PathBuf>, wrapper_script: impl Into<PathBuf>) -> Self {
        MakeflowFromStages {
            param_dir: param_dir.into(),
            wrapper_script: wrapper_script.into(),
            category: None,
            environment: Vec::new(),
            executor_binary: None,
            transfer: TransferOptions::default(),
        }
    }

    pub fn with_category(mut self, category: ResourceCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_environment(mut self, binding: EnvironmentBinding) -> Self {
        self.environment.push(binding);
        self
    }

    pub fn with_executor_binary(mut self, executor_binary: impl Into<PathBuf>) -> Self {
        self.executor_binary = Some(executor_binary.into());
        self
    }

    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    fn compile_options(&self, invoker_script: &Path) -> CompileOptions {
        let options = CompileOptions::new(&self.param_dir, invoker_script, &self.wrapper_script).with_transfer(self.transfer.clone());
        match &self.executor_binary {
            Some(executor_binary) => options.with_executor_binary(executor_binary),
            None => options,
        }
    }

    /// Compiles the stages of `graph` in insertion order and writes the document to `makeflow_out`.
    pub fn create(&self, graph: &StageGraph, makeflow_out: &Path, invoker_script: &Path) -> Result<JxMakeflow> {
        let options = self.compile_options(invoker_script);

        let mut makeflow = JxMakeflow::new();
        for binding in &self.environment {
            makeflow.add_environment(binding.clone());
        }
        makeflow.add_category(self.category.as_ref())?;

        for entry in graph.iter() {
            let rule = entry.stage.compile(&options, self.category.as_ref())?;
            makeflow.add_rule(rule)?;
        }

        makeflow.write(makeflow_out)?;

        Ok(makeflow)
    }
}
