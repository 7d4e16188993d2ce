use std::process::ExitCode;

use clusterflow::FunctionRegistry;
use clusterflow::cli;

fn main() -> ExitCode {
    cli::main_with_registry(FunctionRegistry::with_builtins())
}
