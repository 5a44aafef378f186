use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const CONFIG_FILE: &str = "flare.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// User-function calls nested this deep fail with a recursion error.
    pub max_call_depth: usize,
    pub echo_diagnostics: bool,
    /// Base directory for relative paths given to `add`.
    pub library_dir: Option<PathBuf>,
    pub trace_lines: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            echo_diagnostics: true,
            library_dir: None,
            trace_lines: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl InterpreterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    /// `dir/flare.toml` when it exists, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(depth) = lookup("FLARE_MAX_CALL_DEPTH").and_then(|v| v.trim().parse().ok()) {
            self.max_call_depth = depth;
        }
        if let Some(dir) = lookup("FLARE_LIBRARY_DIR").filter(|v| !v.trim().is_empty()) {
            self.library_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup("FLARE_TRACE") {
            self.trace_lines = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
        self
    }
}
