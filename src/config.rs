use std::path::Path;

use serde::Deserialize;

use crate::diagnostics::CompileError;
use crate::typeck::platform::{RUNTIME_EXCEPTION, THROWABLE};

/// Knobs for one inference run, read from the `[inference]` table of `kestrel.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    /// Fail `resolve` with an aggregate error when any node failed.
    pub strict: bool,
    /// Ambient `self` type for top-level code.
    pub script_class: String,
    /// Class raised when `raise` is given something that is not a throwable.
    pub default_exception: String,
    /// Root of the throwable hierarchy.
    pub throwable: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            strict: false,
            script_class: "Script".to_string(),
            default_exception: RUNTIME_EXCEPTION.to_string(),
            throwable: THROWABLE.to_string(),
        }
    }
}

// ---- TOML deserialization types ----

#[derive(Deserialize)]
struct TomlManifest {
    #[serde(default)]
    inference: Option<InferenceConfig>,
}

impl InferenceConfig {
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompileError::config(format!("could not read config: {e}"), path.to_path_buf())
        })?;
        Self::parse(&content, path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CompileError> {
        Self::parse(content, Path::new("kestrel.toml"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, CompileError> {
        let manifest: TomlManifest = toml::from_str(content).map_err(|e| {
            CompileError::config(format!("invalid config: {e}"), path.to_path_buf())
        })?;
        let config = manifest.inference.unwrap_or_default();
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), CompileError> {
        for (key, value) in [
            ("script_class", &self.script_class),
            ("default_exception", &self.default_exception),
            ("throwable", &self.throwable),
        ] {
            if value.trim().is_empty() {
                return Err(CompileError::config(
                    format!("'{key}' must not be empty"),
                    path.to_path_buf(),
                ));
            }
        }
        Ok(())
    }
}
