use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::function_registry::FunctionId;
use crate::error::Result;

/// Number of function ids whose callable artifact path is remembered.
const CALL_PATH_CACHE_LIMIT: usize = 1024;

/// Hands out collision-free job names and artifact paths of one jar.
///
/// Names are unique per `(group, name)`: the first request gets `{name}_0`, the next `{name}_1`
/// and so on. An organizer belongs to exactly one jar and is mutated during graph construction
/// only.
#[derive(Debug)]
pub struct JobOrganizer {
    jar_name: String,
    jar_dir: PathBuf,
    call_dir: PathBuf,
    call_kwargs_dir: PathBuf,
    out_dir: PathBuf,

    counters: HashMap<PathBuf, usize>,

    /// Callable artifact per function, oldest first.
    call_paths: HashMap<FunctionId, PathBuf>,
    call_path_order: VecDeque<FunctionId>,
}

impl JobOrganizer {
    /// Organizer with the `call/`, `call_kwargs/` and `out/` directories below `jar_dir`.
    pub fn new(jar_name: impl Into<String>, jar_dir: impl Into<PathBuf>) -> Self {
        let jar_dir = jar_dir.into();
        JobOrganizer::with_dirs(jar_name, jar_dir.clone(), jar_dir.join("call"), jar_dir.join("call_kwargs"), jar_dir.join("out"))
    }

    pub fn with_dirs(
        jar_name: impl Into<String>,
        jar_dir: PathBuf,
        call_dir: PathBuf,
        call_kwargs_dir: PathBuf,
        out_dir: PathBuf,
    ) -> Self {
        JobOrganizer {
            jar_name: jar_name.into(),
            jar_dir,
            call_dir,
            call_kwargs_dir,
            out_dir,
            counters: HashMap::new(),
            call_paths: HashMap::new(),
            call_path_order: VecDeque::new(),
        }
    }

    pub fn jar_name(&self) -> &str {
        &self.jar_name
    }

    pub fn jar_dir(&self) -> &Path {
        &self.jar_dir
    }

    /// `{name}_{n}` with `n` counting earlier requests for the same name in the same group.
    pub fn create_unique_name(&mut self, name: &str, group: &[String]) -> String {
        let key: PathBuf = group.iter().map(String::as_str).chain([name]).collect();
        let number = match self.counters.get_mut(&key) {
            Some(counter) => {
                *counter += 1;
                *counter
            }
            None => {
                self.counters.insert(key, 0);
                0
            }
        };

        format!("{name}_{number}")
    }

    fn create_file_path(&mut self, base_dir: &Path, name: &str, group: &[String], extension: &str) -> Result<PathBuf> {
        let unique_name = self.create_unique_name(name, group);
        let mut dir = base_dir.to_path_buf();
        dir.extend(group);
        fs::create_dir_all(&dir)?;

        Ok(dir.join(format!("{unique_name}.{extension}")))
    }

    /// Callable artifact of `function`. Jobs calling the same function share one artifact.
    pub fn call_file_path(&mut self, function: &FunctionId, name: &str, group: &[String]) -> Result<PathBuf> {
        if let Some(path) = self.call_paths.get(function) {
            return Ok(path.clone());
        }

        let call_dir = self.call_dir.clone();
        let path = self.create_file_path(&call_dir, &format!("call_{name}"), group, "bin")?;
        self.call_paths.insert(function.clone(), path.clone());
        self.call_path_order.push_back(function.clone());

        if self.call_path_order.len() > CALL_PATH_CACHE_LIMIT {
            if let Some(oldest) = self.call_path_order.pop_front() {
                self.call_paths.remove(&oldest);
            }
        }

        Ok(path)
    }

    pub fn call_kwargs_file_path(&mut self, name: &str, group: &[String]) -> Result<PathBuf> {
        let call_kwargs_dir = self.call_kwargs_dir.clone();
        self.create_file_path(&call_kwargs_dir, &format!("call_kwargs_{name}"), group, "json")
    }

    pub fn out_file_path(&mut self, name: &str, group: &[String]) -> Result<PathBuf> {
        let out_dir = self.out_dir.clone();
        self.create_file_path(&out_dir, &format!("out_{name}"), group, "bin")
    }
}
