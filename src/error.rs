use std::path::PathBuf;

/// Failure modes of the project-settings loader. A missing settings file is
/// not an error (the loader falls back to defaults); these cover a file that
/// exists but cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed runner configuration in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("no \"{namespace}\" entry in {}", path.display())]
    MissingNamespace { path: PathBuf, namespace: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "unsupported tool {0:?}: runner configuration accepts only \
         protractor, webdriverio, cypress or cucumberjs"
    )]
    UnsupportedTool(String),

    #[error("cypress scenarios are selected by tag, but {0:?} has no @-prefixed tag")]
    UnsupportedScenario(String),

    #[error("no feature file to run")]
    NoActiveFile,

    #[error("incorrect line selected: {0:?}: select a Scenario, Scenario Outline or tag line")]
    ScenarioSelection(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}
