use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::parameter_dto::JobDescriptorDto;
use crate::domain::flatten;
use crate::domain::makeflow::jx_makeflow::Rule;
use crate::domain::resources::ResourceCategory;
use crate::domain::stage::stage::Stage;
use crate::domain::transcended_file::{TranscendedFile, TransferOptions};
use crate::error::Result;
use crate::loader::parser::write_json_file;

/// Locations a stage is compiled against.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory receiving `{stage}_parameters` descriptors.
    pub param_dir: PathBuf,
    /// Script that re-enters the execution path with a descriptor path as its only argument.
    pub invoker_script: PathBuf,
    /// Site wrapper that prepares the environment and runs its arguments.
    pub wrapper_script: PathBuf,
    /// Binary with the stage functions registered, called by the invoker script.
    pub executor_binary: PathBuf,
    pub transfer: TransferOptions,
}

impl CompileOptions {
    /// Uses the currently running binary as executor.
    pub fn new(param_dir: impl Into<PathBuf>, invoker_script: impl Into<PathBuf>, wrapper_script: impl Into<PathBuf>) -> Self {
        let executor_binary = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("clusterflow"));

        CompileOptions {
            param_dir: param_dir.into(),
            invoker_script: invoker_script.into(),
            wrapper_script: wrapper_script.into(),
            executor_binary,
            transfer: TransferOptions::default(),
        }
    }

    pub fn with_executor_binary(mut self, executor_binary: impl Into<PathBuf>) -> Self {
        self.executor_binary = executor_binary.into();
        self
    }

    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }
}

pub fn parameter_file(param_dir: &Path, stage_name: &str) -> PathBuf {
    param_dir.join(format!("{stage_name}_parameters"))
}

/// Quotes a path for `/bin/sh`; paths made of safe characters only are left alone.
pub fn shell_quote(path: &Path) -> Cow<'_, str> {
    let text = path.to_string_lossy();
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !text.is_empty() && text.chars().all(is_safe) {
        return text;
    }
    Cow::Owned(format!("'{}'", text.replace('\'', r"'\''")))
}

fn invoker_script_content(executor_binary: &Path) -> String {
    format!("#!/bin/bash\nexec {} execute \"$1\"\n", shell_quote(executor_binary))
}

/// Writes the invoker script unless an identical one is already in place.
pub fn write_invoker_script(invoker_script: &Path, executor_binary: &Path) -> Result<()> {
    let content = invoker_script_content(executor_binary);
    if fs::read_to_string(invoker_script).is_ok_and(|existing| existing == content) {
        return Ok(());
    }

    if let Some(parent) = invoker_script.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(invoker_script, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(invoker_script, fs::Permissions::from_mode(0o755))?;
    }

    log::debug!("Invoker script written to '{}'", invoker_script.display());
    Ok(())
}

impl Stage {
    /// Flattened, persistable form of this stage.
    pub fn job_descriptor(&self) -> Result<JobDescriptorDto> {
        let flattened = flatten::flatten_kwargs(self.arguments())?;

        Ok(JobDescriptorDto {
            module_path: self.function().module.clone(),
            function: self.function().name.clone(),
            function_kwargs: flattened.kwargs,
            input_files: flattened.input_files,
            output_files: flattened.output_files,
        })
    }

    /// Compiles the stage into a rule for the external scheduler.
    ///
    /// Persists the descriptor to `{param_dir}/{name}_parameters`, makes sure the invoker script
    /// exists and returns the rule. Without `category` a category named after the stage is
    /// created from the stage's own resource request.
    pub fn compile(&self, options: &CompileOptions, category: Option<&ResourceCategory>) -> Result<Rule> {
        let parameter_file = parameter_file(&options.param_dir, self.name().as_str());
        let descriptor = self.job_descriptor()?;

        let guard = TranscendedFile::to_remote(&parameter_file, options.transfer.clone())?.enter()?;
        write_json_file(guard.local_path(), &descriptor)?;
        guard.finish()?;

        // Declared outputs go to the scheduler only, the stage function writes them itself.
        let mut outputs = flatten::collect_paths(&descriptor.output_files)?;
        outputs.extend(flatten::collect_paths(self.output_files())?);

        write_invoker_script(&options.invoker_script, &options.executor_binary)?;

        let mut command = format!(
            "/bin/bash {} {} {}",
            shell_quote(&options.wrapper_script),
            shell_quote(&options.invoker_script),
            shell_quote(&parameter_file)
        );
        if let Some(log_target) = self.log_target() {
            command.push_str(&format!(" > {} 2>&1", shell_quote(log_target)));
        }

        let mut inputs = vec![parameter_file.to_string_lossy().into_owned()];
        inputs.extend(flatten::collect_paths(&descriptor.input_files)?);

        let category = match category {
            Some(category) => category.clone(),
            None => ResourceCategory::from_request(self.name().as_str(), self.resources()),
        };

        log::debug!("Compiled stage '{}' into '{}'", self.name(), command);

        Ok(Rule::new(command, dedup(inputs), dedup(outputs), Some(category)))
    }
}

fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}
