use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pickle_job::JobId;
use crate::error::{Error, Result};

/// Placeholder for the (selected element of the) output of another job.
///
/// Obtained from [`PickleJob::get`](crate::domain::pickle_job::pickle_job::PickleJob::get) and
/// placed anywhere in the argument tree of a later job. The token is assigned when the later job is
/// created; every accessor fails with [`Error::UnresolvedToken`] before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredValue {
    /// Producing job. Only meaningful inside the jar that created the value.
    #[serde(skip)]
    job: Option<JobId>,
    output_path: String,
    index: Option<usize>,
    token: Option<String>,
}

impl DeferredValue {
    pub(crate) fn new(job: JobId, output_path: impl Into<String>, index: Option<usize>) -> Self {
        DeferredValue { job: Some(job), output_path: output_path.into(), index, token: None }
    }

    /// Assigns a fresh random token and returns it.
    pub(crate) fn bind_token(&mut self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.token = Some(token.clone());
        token
    }

    pub fn is_bound(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(Error::UnresolvedToken)
    }

    /// Durable output artifact of the producing job.
    pub fn output_path(&self) -> Result<&str> {
        self.token()?;
        Ok(&self.output_path)
    }

    /// Producing job; `Error::UnknownJob` once the value went through a file.
    pub fn job(&self) -> Result<JobId> {
        self.token()?;
        self.job.ok_or(Error::UnknownJob)
    }

    /// Selected tuple position, `None` for the whole output.
    pub fn index(&self) -> Result<Option<usize>> {
        self.token()?;
        Ok(self.index)
    }

    pub(crate) fn unbound_job(&self) -> Option<JobId> {
        self.job
    }

    pub(crate) fn unbound_output_path(&self) -> &str {
        &self.output_path
    }
}
