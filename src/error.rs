use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to read or write JSON document: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to read or write binary artifact: {0}")]
    BinaryArtifactError(#[from] bincode::Error),

    #[error("Invalid stage graph: {0}")]
    GraphValidation(#[from] GraphValidationError),

    #[error("Job arguments do not match the function signature: {0}")]
    SignatureMismatch(#[from] SignatureError),

    #[error("The index {index} is out of range of the number of output parameters {arity}")]
    IndexRange { index: usize, arity: usize },

    #[error("The token of the deferred value has to be set before the deferred value is used")]
    UnresolvedToken,

    #[error("Job '{job}' has not produced an output file '{}' yet", path.display())]
    Busy { job: String, path: PathBuf },

    #[error("Transcended file '{}' does not exist", .0.display())]
    Staging(PathBuf),

    #[error("Compiled rule is malformed: {0}")]
    CompileIntegrity(String),

    #[error("No function registered under '{0}'")]
    UnknownFunction(String),

    #[error("Deferred value references a job that does not belong to this jar")]
    UnknownJob,

    #[error("Job '{0}' has not been added to a jar yet")]
    JobNotStaged(String),

    #[error("Stage function failed: {0:#}")]
    Invocation(anyhow::Error),
}

/// Structural problems detected while a stage is inserted into a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("A stage with name '{0}' already exists in the graph")]
    DuplicateStage(String),

    #[error("The stage with name '{0}' does not exist in the graph")]
    MissingPredecessor(String),

    #[error("'{0}' is not a registered plain function")]
    NotAFunction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("function '{function}': missing keyword parameters {missing:?}, excess keyword parameters {excess:?}")]
    KeywordMismatch { function: String, missing: Vec<String>, excess: Vec<String> },

    #[error("the return of function '{0}' is not annotated")]
    MissingReturnAnnotation(String),
}

impl Error {
    /// `true` for the recoverable "output not there yet" signal of `PickleJob::result`.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
