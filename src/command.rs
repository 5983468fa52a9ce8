use crate::config::RunnerConfig;
use crate::error::RunnerError;
use std::path::{Path, PathBuf};

/// Supported test-runner CLIs. The configured tool name is matched lazily, at
/// synthesis time, so an unknown name in the settings file only fails the
/// operations that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Protractor,
    Webdriverio,
    Cypress,
    CucumberJs,
}

impl Tool {
    pub fn parse(name: &str) -> Result<Self, RunnerError> {
        match name {
            "protractor" => Ok(Self::Protractor),
            "webdriverio" => Ok(Self::Webdriverio),
            "cypress" => Ok(Self::Cypress),
            "cucumberjs" | "cucumber-js" => Ok(Self::CucumberJs),
            other => Err(RunnerError::UnsupportedTool(other.to_string())),
        }
    }

    /// cucumber-js runs in the shared interactive terminal; every other tool
    /// goes through the managed-process path.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::CucumberJs)
    }
}

/// What the user asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    Feature { file: PathBuf },
    Scenario { file: PathBuf, name: String },
}

// Token positions the cucumber-js script template is substituted at. The
// configured script is treated as a fixed-shape invocation whose 5th token is
// the feature glob; scenario runs shift the path one slot right to make room
// for the --name filter.
const FEATURE_PATH_SLOT: usize = 4;
const SCENARIO_NAME_SLOT: usize = 4;
const SCENARIO_PATH_SLOT: usize = 5;

/// Builds the per-tool shell invocation for a feature or scenario run.
///
/// For protractor/webdriverio/cypress the returned string is the tool-specific
/// argument fragment; [`executable_line`] composes it with the configured
/// script at dispatch time. For cucumber-js the returned string is already the
/// full invocation, derived from the script template.
pub struct CommandSynthesizer<'a> {
    config: &'a RunnerConfig,
    project_root: &'a Path,
}

impl<'a> CommandSynthesizer<'a> {
    pub fn new(config: &'a RunnerConfig, project_root: &'a Path) -> Self {
        Self {
            config,
            project_root,
        }
    }

    pub fn command_for(&self, target: &ExecutionTarget) -> Result<String, RunnerError> {
        match target {
            ExecutionTarget::Feature { file } => self.feature_command(Some(file.as_path())),
            ExecutionTarget::Scenario { file, name } => self.scenario_command(name, file),
        }
    }

    /// Command for running a whole feature file. `feature_file` is optional
    /// because there may be no active file; that case fails before any
    /// substitution happens, never yielding a partial command.
    pub fn feature_command(&self, feature_file: Option<&Path>) -> Result<String, RunnerError> {
        let tool = Tool::parse(&self.config.tool)?;
        let file = feature_file.ok_or(RunnerError::NoActiveFile)?;
        match tool {
            Tool::Protractor => Ok(format!("--specs=\"{}\"", file.display())),
            Tool::Webdriverio => Ok(format!("--spec=\"{}\"", file.display())),
            Tool::Cypress => Ok(format!("run -e GLOB=\"{}\"", self.project_relative(file))),
            Tool::CucumberJs => {
                Ok(self.substitute_script(&[(FEATURE_PATH_SLOT, quote_path(file))]))
            }
        }
    }

    /// Command for running a single named scenario of `feature_file`.
    pub fn scenario_command(
        &self,
        scenario_name: &str,
        feature_file: &Path,
    ) -> Result<String, RunnerError> {
        match Tool::parse(&self.config.tool)? {
            Tool::Protractor | Tool::Webdriverio => {
                Ok(format!("--cucumberOpts.name=\"{scenario_name}\""))
            }
            Tool::Cypress => {
                // Cypress can only filter by tag expression, not by name.
                let tag = scenario_name.split_whitespace().next().unwrap_or("");
                if !tag.starts_with('@') {
                    return Err(RunnerError::UnsupportedScenario(scenario_name.to_string()));
                }
                Ok(format!("run -e TAGS=\"{tag}\""))
            }
            Tool::CucumberJs => Ok(self.substitute_script(&[
                (SCENARIO_NAME_SLOT, format!("--name \"{scenario_name}\"")),
                (SCENARIO_PATH_SLOT, quote_path(feature_file)),
            ])),
        }
    }

    fn substitute_script(&self, replacements: &[(usize, String)]) -> String {
        // Single-space splitting, not split_whitespace: consecutive spaces
        // produce empty tokens that keep the slot positions stable.
        let mut tokens: Vec<String> = self
            .config
            .script
            .split(' ')
            .map(str::to_string)
            .collect();
        for (slot, value) in replacements {
            if tokens.len() <= *slot {
                tokens.resize(slot + 1, String::new());
            }
            tokens[*slot] = value.clone();
        }
        tokens.join(" ")
    }

    fn project_relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.project_root).unwrap_or(path);
        let text = relative.display().to_string();
        text.trim_start_matches(['/', '\\']).to_string()
    }
}

/// Dispatch-time composition: for cucumber-js the synthesized command is the
/// full invocation already; the other tools get their argument fragment
/// appended to the configured script.
pub fn executable_line(config: &RunnerConfig, command: &str) -> String {
    match Tool::parse(&config.tool) {
        Ok(Tool::CucumberJs) => command.to_string(),
        _ => format!("{} {}", config.script, command),
    }
}

fn quote_path(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tool: &str, script: &str) -> RunnerConfig {
        RunnerConfig {
            tool: tool.to_string(),
            script: script.to_string(),
            language: None,
        }
    }

    fn synthesize(config: &RunnerConfig) -> CommandSynthesizer<'_> {
        CommandSynthesizer::new(config, Path::new("/work/project"))
    }

    #[test]
    fn protractor_feature_command() {
        let config = config("protractor", "npx protractor conf.js");
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/a/b.feature")))
            .unwrap();
        assert_eq!(command, "--specs=\"/a/b.feature\"");
    }

    #[test]
    fn webdriverio_feature_command() {
        let config = config("webdriverio", "npx wdio wdio.conf.js");
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/a/b.feature")))
            .unwrap();
        assert_eq!(command, "--spec=\"/a/b.feature\"");
    }

    #[test]
    fn protractor_and_webdriverio_scenario_commands_filter_by_name() {
        for tool in ["protractor", "webdriverio"] {
            let config = config(tool, "npx whatever conf.js");
            let command = synthesize(&config)
                .scenario_command("pay with card", Path::new("/a/b.feature"))
                .unwrap();
            assert_eq!(command, "--cucumberOpts.name=\"pay with card\"");
        }
    }

    #[test]
    fn cypress_feature_path_is_project_relative_without_leading_separator() {
        let config = config("cypress", "npx cypress");
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/work/project/cypress/e2e/cart.feature")))
            .unwrap();
        assert_eq!(command, "run -e GLOB=\"cypress/e2e/cart.feature\"");
    }

    #[test]
    fn cypress_path_outside_project_root_loses_leading_separator() {
        let config = config("cypress", "npx cypress");
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/elsewhere/cart.feature")))
            .unwrap();
        assert_eq!(command, "run -e GLOB=\"elsewhere/cart.feature\"");
    }

    #[test]
    fn cypress_scenario_requires_a_tag() {
        let config = config("cypress", "npx cypress");
        let err = synthesize(&config)
            .scenario_command("smoke test", Path::new("/a/b.feature"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::UnsupportedScenario(_)));
    }

    #[test]
    fn cypress_scenario_uses_first_tag_token() {
        let config = config("cypress", "npx cypress");
        let command = synthesize(&config)
            .scenario_command("@smoke @fast", Path::new("/a/b.feature"))
            .unwrap();
        assert_eq!(command, "run -e TAGS=\"@smoke\"");
    }

    #[test]
    fn cucumberjs_feature_replaces_fifth_script_token() {
        let config = config(
            "cucumberjs",
            "npx cucumber-js -c cucumber.js src/feature/**/*.feature",
        );
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/x.feature")))
            .unwrap();
        assert_eq!(command, "npx cucumber-js -c cucumber.js \"/x.feature\"");
    }

    #[test]
    fn consecutive_script_spaces_keep_token_positions() {
        let config = config("cucumberjs", "npx  cucumber-js -c cucumber.js");
        let command = synthesize(&config)
            .feature_command(Some(Path::new("/x.feature")))
            .unwrap();
        assert_eq!(command, "npx  cucumber-js -c \"/x.feature\"");
    }

    #[test]
    fn cucumberjs_scenario_inserts_name_filter_and_path() {
        let config = config(
            "cucumber-js",
            "npx cucumber-js -c cucumber.js src/feature/**/*.feature",
        );
        let command = synthesize(&config)
            .scenario_command("pay with card", Path::new("/x.feature"))
            .unwrap();
        assert_eq!(
            command,
            "npx cucumber-js -c cucumber.js --name \"pay with card\" \"/x.feature\""
        );
    }

    #[test]
    fn missing_active_file_fails_before_substitution() {
        let config = config("cucumberjs", "npx cucumber-js -c cucumber.js glob");
        let err = synthesize(&config).feature_command(None).unwrap_err();
        assert!(matches!(err, RunnerError::NoActiveFile));
    }

    #[test]
    fn unknown_tool_is_rejected_for_both_operations() {
        let config = config("playwright", "npx playwright test");
        let synthesizer = synthesize(&config);
        assert!(matches!(
            synthesizer.feature_command(Some(Path::new("/a.feature"))),
            Err(RunnerError::UnsupportedTool(_))
        ));
        assert!(matches!(
            synthesizer.scenario_command("x", Path::new("/a.feature")),
            Err(RunnerError::UnsupportedTool(_))
        ));
    }

    #[test]
    fn command_for_dispatches_on_target_kind() {
        let config = config("protractor", "npx protractor conf.js");
        let synthesizer = synthesize(&config);
        let feature = ExecutionTarget::Feature {
            file: PathBuf::from("/a/b.feature"),
        };
        let scenario = ExecutionTarget::Scenario {
            file: PathBuf::from("/a/b.feature"),
            name: "pay with card".to_string(),
        };
        assert_eq!(
            synthesizer.command_for(&feature).unwrap(),
            "--specs=\"/a/b.feature\""
        );
        assert_eq!(
            synthesizer.command_for(&scenario).unwrap(),
            "--cucumberOpts.name=\"pay with card\""
        );
    }

    #[test]
    fn executable_line_composes_script_for_non_interactive_tools() {
        let protractor = config("protractor", "npx protractor conf.js");
        assert_eq!(
            executable_line(&protractor, "--specs=\"/a.feature\""),
            "npx protractor conf.js --specs=\"/a.feature\""
        );
        let cucumber = config("cucumber-js", "npx cucumber-js -c cucumber.js glob");
        assert_eq!(
            executable_line(&cucumber, "npx cucumber-js -c cucumber.js \"/a.feature\""),
            "npx cucumber-js -c cucumber.js \"/a.feature\""
        );
    }
}
