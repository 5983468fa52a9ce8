//! Discovery tree over feature files: each file node resolves, on demand,
//! into one runnable node per scenario heading. Nodes bind the configuration
//! and target captured at discovery time; picking up file edits means
//! re-resolving, not mutating an existing node.

use crate::command::{executable_line, CommandSynthesizer, ExecutionTarget};
use crate::config::RunnerConfig;
use crate::dispatch::Dispatcher;
use crate::error::RunnerError;
use crate::host::DocumentAccess;
use crate::parser::scenario_headings;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A runnable scenario discovered in a feature file. `config` and `target`
/// are immutable snapshots taken when the file node resolved.
#[derive(Debug, Clone)]
pub struct ScenarioNode {
    pub line_number: usize,
    pub label: String,
    pub config: RunnerConfig,
    pub target: ExecutionTarget,
}

/// A feature file in the tree. Starts unresolved; the first [`resolve`] call
/// (and every later one, after edits) parses the file and replaces the whole
/// child set.
///
/// [`resolve`]: FeatureNode::resolve
pub struct FeatureNode {
    path: PathBuf,
    resolved: bool,
    generation: u64,
    scenarios: Vec<ScenarioNode>,
}

impl FeatureNode {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            resolved: false,
            generation: 0,
            scenarios: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn scenarios(&self) -> &[ScenarioNode] {
        &self.scenarios
    }

    /// Reads the file and materializes one child per scenario heading. An
    /// unreadable file logs a warning and resolves to an empty child set, the
    /// same as a file with no scenarios.
    pub fn resolve(&mut self, docs: &dyn DocumentAccess, config: &RunnerConfig) {
        let text = match docs.read_file_text(&self.path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("error providing scenarios for {}: {err}", self.path.display());
                String::new()
            }
        };
        self.generation += 1;
        self.scenarios = scenario_headings(&text)
            .map(|heading| ScenarioNode {
                line_number: heading.line_number,
                target: ExecutionTarget::Scenario {
                    file: self.path.clone(),
                    name: heading.label.trim().to_string(),
                },
                label: heading.label,
                config: config.clone(),
            })
            .collect();
        self.resolved = true;
        tracing::debug!(
            "resolved {} scenario(s) from {} (generation {})",
            self.scenarios.len(),
            self.path.display(),
            self.generation
        );
    }
}

/// Recursively collects `.feature` files under `dir`, sorted for a stable
/// run order.
pub fn discover_feature_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_features(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_features(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_features(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "feature") {
            files.push(path);
        }
    }
    Ok(())
}

/// Cancellation token for a queued tree run. The host (or a signal handler)
/// may set it at any point; it is checked immediately before each queued item
/// starts, and already-started items run to completion.
#[derive(Debug, Default)]
pub struct RunRequest {
    cancelled: Arc<AtomicBool>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flag itself, for wiring into a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs every scenario of every resolved node in order, waiting for each
/// managed run to finish before starting the next. Returns how many runs were
/// started; items queued after cancellation are skipped, not failed.
pub fn run_queued(
    nodes: &[FeatureNode],
    request: &RunRequest,
    project_root: &Path,
    dispatcher: &mut Dispatcher<'_>,
) -> Result<usize, RunnerError> {
    let mut started = 0;
    for node in nodes.iter().filter(|node| node.is_resolved()) {
        for scenario in node.scenarios() {
            if request.is_cancelled() {
                tracing::info!("run cancelled, skipping remaining scenarios");
                return Ok(started);
            }
            let synthesizer = CommandSynthesizer::new(&scenario.config, project_root);
            let command = synthesizer.command_for(&scenario.target)?;
            tracing::info!(
                "running scenario {:?} ({}:{})",
                scenario.label.trim(),
                node.path().display(),
                scenario.line_number + 1
            );
            let line = executable_line(&scenario.config, &command);
            dispatcher.dispatch(&line, &scenario.config.tool)?;
            dispatcher.wait_until_idle();
            started += 1;
        }
    }
    Ok(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{FixedPrompt, MockLauncher, RecordingSink, RecordingTerminal};
    use crate::dispatch::{shared_run_state, Dispatcher, PromptChoice, SharedOutput};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct MapDocuments {
        files: RefCell<HashMap<PathBuf, String>>,
    }

    impl MapDocuments {
        fn new(entries: &[(&str, &str)]) -> Self {
            let files = entries
                .iter()
                .map(|(path, text)| (PathBuf::from(path), text.to_string()))
                .collect();
            Self {
                files: RefCell::new(files),
            }
        }

        fn set(&self, path: &str, text: &str) {
            self.files
                .borrow_mut()
                .insert(PathBuf::from(path), text.to_string());
        }
    }

    impl DocumentAccess for MapDocuments {
        fn current_file_path(&self) -> Option<PathBuf> {
            None
        }

        fn current_selection_line_text(&self) -> Option<String> {
            None
        }

        fn read_file_text(&self, path: &Path) -> io::Result<String> {
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn cucumber_config() -> RunnerConfig {
        RunnerConfig {
            tool: "cucumberjs".to_string(),
            script: "npx cucumber-js -c cucumber.js src/features/**/*.feature".to_string(),
            language: None,
        }
    }

    #[test]
    fn resolve_materializes_one_child_per_heading() {
        let docs = MapDocuments::new(&[(
            "/p/cart.feature",
            "Feature: cart\n  Scenario: add item\n  Scenario: remove item\n",
        )]);
        let mut node = FeatureNode::new(PathBuf::from("/p/cart.feature"));
        assert!(!node.is_resolved());

        node.resolve(&docs, &cucumber_config());
        assert!(node.is_resolved());
        assert_eq!(node.generation, 1);
        let labels: Vec<&str> = node.scenarios().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["add item", "remove item"]);
        assert!(matches!(
            &node.scenarios()[0].target,
            ExecutionTarget::Scenario { name, .. } if name == "add item"
        ));
    }

    #[test]
    fn re_resolution_replaces_the_whole_child_set() {
        let docs = MapDocuments::new(&[("/p/cart.feature", "Scenario: old\n")]);
        let mut node = FeatureNode::new(PathBuf::from("/p/cart.feature"));
        node.resolve(&docs, &cucumber_config());
        assert_eq!(node.scenarios().len(), 1);

        docs.set("/p/cart.feature", "Scenario: new one\nScenario: new two\n");
        node.resolve(&docs, &cucumber_config());
        assert_eq!(node.generation, 2);
        let labels: Vec<&str> = node.scenarios().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["new one", "new two"]);
    }

    #[test]
    fn unreadable_file_resolves_to_no_children() {
        let docs = MapDocuments::new(&[]);
        let mut node = FeatureNode::new(PathBuf::from("/p/missing.feature"));
        node.resolve(&docs, &cucumber_config());
        assert!(node.is_resolved());
        assert!(node.scenarios().is_empty());
    }

    #[test]
    fn discover_finds_nested_feature_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested/b.feature"), "").expect("write");
        fs::write(dir.path().join("a.feature"), "").expect("write");
        fs::write(dir.path().join("notes.txt"), "").expect("write");

        let files = discover_feature_files(dir.path()).expect("discover");
        assert_eq!(
            files,
            vec![
                dir.path().join("a.feature"),
                dir.path().join("nested/b.feature"),
            ]
        );
    }

    struct RunFixture {
        state: crate::dispatch::SharedRunState,
        sink: Arc<Mutex<RecordingSink>>,
        terminal: RecordingTerminal,
        prompt: FixedPrompt,
        launcher: MockLauncher,
    }

    impl RunFixture {
        fn new() -> Self {
            let sink = RecordingSink::shared();
            let terminal = RecordingTerminal::new(Arc::clone(&sink));
            Self {
                state: shared_run_state(),
                sink,
                terminal,
                prompt: FixedPrompt::new(PromptChoice::Cancel),
                launcher: MockLauncher::new(),
            }
        }

        fn dispatcher(&mut self) -> Dispatcher<'_> {
            // Unsized coercion to the trait object happens at the binding.
            let output: SharedOutput = self.sink.clone();
            Dispatcher::new(
                Arc::clone(&self.state),
                &mut self.terminal,
                output,
                &self.prompt,
                &self.launcher,
                Path::new("/p"),
            )
        }
    }

    fn resolved_node() -> FeatureNode {
        let docs = MapDocuments::new(&[(
            "/p/cart.feature",
            "Scenario: add item\nScenario: remove item\n",
        )]);
        let mut node = FeatureNode::new(PathBuf::from("/p/cart.feature"));
        node.resolve(&docs, &cucumber_config());
        node
    }

    #[test]
    fn run_queued_dispatches_each_scenario() {
        let nodes = vec![resolved_node()];
        let request = RunRequest::new();
        let mut fixture = RunFixture::new();
        let started = run_queued(
            &nodes,
            &request,
            Path::new("/p"),
            &mut fixture.dispatcher(),
        )
        .expect("run");
        assert_eq!(started, 2);
        // cucumberjs routes to the interactive terminal.
        assert_eq!(fixture.terminal.sent.len(), 2);
        assert!(fixture.terminal.sent[0].contains("--name \"add item\""));
        assert!(fixture.terminal.sent[1].contains("--name \"remove item\""));
    }

    #[test]
    fn cancelled_request_skips_queued_items() {
        let nodes = vec![resolved_node()];
        let request = RunRequest::new();
        request.cancel_flag().store(true, Ordering::SeqCst);
        let mut fixture = RunFixture::new();
        let started = run_queued(
            &nodes,
            &request,
            Path::new("/p"),
            &mut fixture.dispatcher(),
        )
        .expect("run");
        assert_eq!(started, 0);
        assert!(fixture.terminal.sent.is_empty());
        assert!(fixture.launcher.launched.borrow().is_empty());
    }
}
