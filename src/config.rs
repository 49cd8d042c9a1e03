// config lets us layer a settings file and environment variables over defaults
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;

/// Settings shared by every thread created with them.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps a single `run` may take before giving up; unlimited when absent.
    pub max_steps: Option<u64>,
    /// Largest number of pending choice points a thread may hold.
    pub max_choice_points: Option<usize>,
    /// Emit a trace event for every step.
    pub trace_steps: bool,
    /// Entries rendered by `Thread::stack_string`.
    pub stack_trace_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_choice_points: None,
            trace_steps: false,
            stack_trace_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by the optional file at `path` and then by
    /// `CLAUSAL_*` environment variables (e.g. `CLAUSAL_MAX_STEPS=10000`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("CLAUSAL").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml(document: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn with_max_steps(mut self, limit: u64) -> Self {
        self.max_steps = Some(limit);
        self
    }
    pub fn with_max_choice_points(mut self, limit: usize) -> Self {
        self.max_choice_points = Some(limit);
        self
    }
    pub fn with_trace_steps(mut self, trace: bool) -> Self {
        self.trace_steps = trace;
        self
    }
}
