use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Relative location of the project settings file, shared with the editor
/// extension this tool interoperates with.
pub const SETTINGS_RELATIVE_PATH: &str = ".vscode/settings.json";

/// Key inside the settings file holding the runner configuration object.
pub const CONFIG_NAMESPACE: &str = "test-runner-for-cucumber";

const DEFAULT_TOOL: &str = "cucumberjs";
const DEFAULT_SCRIPT: &str = "npx cucumber-js -c cucumber.js src/features/**/*.feature";

/// User-supplied runner configuration.
///
/// `script` is a space-delimited invocation template; for cucumber-js style
/// tools the synthesizer substitutes into fixed token positions of it, so its
/// token order is assumed stable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    pub tool: String,
    pub script: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl RunnerConfig {
    /// Built-in fallback used when the project has no settings file: run
    /// cucumber-js against the conventional feature glob.
    pub fn fallback() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
            language: None,
        }
    }

    /// Reads the runner configuration from `.vscode/settings.json` under
    /// `project_root`.
    ///
    /// The settings file is re-read on every call so edits take effect on the
    /// next invocation; nothing is cached. A missing file falls back to
    /// [`RunnerConfig::fallback`]; a file that cannot be parsed, or whose
    /// namespace entry has the wrong shape, is malformed; a parsable file
    /// without the namespace key is rejected separately so the user learns
    /// which half of the setup is missing.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(SETTINGS_RELATIVE_PATH);
        if !path.is_file() {
            tracing::debug!(
                "no settings file at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::fallback());
        }

        let text = fs::read_to_string(&path).map_err(|err| ConfigError::Malformed {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let settings: serde_json::Value =
            serde_json::from_str(&text).map_err(|err| ConfigError::Malformed {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        let Some(section) = settings.get(CONFIG_NAMESPACE) else {
            return Err(ConfigError::MissingNamespace {
                path,
                namespace: CONFIG_NAMESPACE,
            });
        };
        serde_json::from_value(section.clone()).map_err(|err| ConfigError::Malformed {
            path,
            reason: err.to_string(),
        })
    }
}

/// Nearest ancestor of `start` containing `.vscode/settings.json`, the CLI
/// analog of the editor's workspace-folder lookup. Falls back to the current
/// directory when no ancestor qualifies.
pub fn find_project_root(start: &Path) -> PathBuf {
    for dir in start.ancestors() {
        if dir.join(SETTINGS_RELATIVE_PATH).is_file() {
            return dir.to_path_buf();
        }
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
