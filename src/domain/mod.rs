pub mod builtins;
pub mod flatten;
pub mod function_registry;
pub mod makeflow;
pub mod pickle_job;
pub mod resources;
pub mod stage;
pub mod transcended_file;
pub mod utils;
pub mod value;
