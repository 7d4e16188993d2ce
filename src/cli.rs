//! Command line of the stage process.
//!
//! The invoker script written at compile time calls `<binary> execute <PARAM_FILE>` for every
//! rule of the task list. A binary that registers its own stage functions builds its registry
//! and hands it to [`main_with_registry`].

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::api::config_dto::PipelineConfigDto;
use crate::domain::function_registry::FunctionRegistry;
use crate::domain::stage::executor::{self, ExecutionOptions};
use crate::domain::transcended_file::StagingPolicy;
use crate::error::Result;
use crate::loader::parser::parse_json_file;
use crate::logger;

#[derive(Parser, Debug)]
#[command(name = "clusterflow")]
#[command(version, about = "Runs compiled pipeline stages", long_about = None)]
pub struct Cli {
    /// Also append log records to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the stage described by a parameter file
    Execute {
        /// Parameter file written at compile time
        param_file: PathBuf,

        /// Fail when a transcended file is missing instead of logging it
        #[arg(long)]
        strict_staging: bool,

        /// Parent directory of the local scratch copies
        #[arg(long, value_name = "DIR")]
        scratch_dir: Option<PathBuf>,

        /// Pipeline configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print a parameter file
    Describe {
        /// Parameter file written at compile time
        param_file: PathBuf,
    },
}

/// Parses the process arguments, runs the command and maps the outcome to the exit status.
pub fn main_with_registry(registry: FunctionRegistry) -> ExitCode {
    let cli = Cli::parse();
    match &cli.log_file {
        Some(path) => logger::init_with_file(path),
        None => logger::init(),
    }

    match run(cli, &registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

pub fn run(cli: Cli, registry: &FunctionRegistry) -> Result<()> {
    match cli.command {
        Commands::Execute { param_file, strict_staging, scratch_dir, config } => {
            let options = execution_options(config.as_deref(), strict_staging, scratch_dir)?;
            executor::execute_stage(&param_file, registry, &options)?;
            Ok(())
        }
        Commands::Describe { param_file } => {
            let descriptor = executor::load_descriptor(&param_file, &Default::default())?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
    }
}

/// Command line flags take precedence over the configuration file.
fn execution_options(config: Option<&Path>, strict_staging: bool, scratch_dir: Option<PathBuf>) -> Result<ExecutionOptions> {
    let mut transfer = match config {
        Some(path) => parse_json_file::<PipelineConfigDto>(path)?.transfer_options(),
        None => Default::default(),
    };

    if strict_staging {
        transfer.policy = StagingPolicy::Strict;
    }
    if scratch_dir.is_some() {
        transfer.scratch_root = scratch_dir;
    }

    Ok(ExecutionOptions { transfer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        let cli = Cli::try_parse_from(["clusterflow", "execute", "/store/a_parameters", "--strict-staging", "--scratch-dir", "/local"]).unwrap();

        match cli.command {
            Commands::Execute { param_file, strict_staging, scratch_dir, config } => {
                assert_eq!(param_file, PathBuf::from("/store/a_parameters"));
                assert!(strict_staging);
                assert_eq!(scratch_dir, Some(PathBuf::from("/local")));
                assert_eq!(config, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_describe_with_log_file() {
        let cli = Cli::try_parse_from(["clusterflow", "describe", "/store/a_parameters", "--log-file", "/store/logging/a.log"]).unwrap();

        assert_eq!(cli.log_file, Some(PathBuf::from("/store/logging/a.log")));
        assert!(matches!(cli.command, Commands::Describe { .. }));
    }

    #[test]
    fn test_flags_override_defaults() {
        let options = execution_options(None, true, Some(PathBuf::from("/local"))).unwrap();

        assert_eq!(options.transfer.policy, StagingPolicy::Strict);
        assert_eq!(options.transfer.scratch_root, Some(PathBuf::from("/local")));

        let options = execution_options(None, false, None).unwrap();
        assert_eq!(options.transfer.policy, StagingPolicy::Lenient);
        assert_eq!(options.transfer.scratch_root, None);
    }
}
