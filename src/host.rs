//! CLI-side implementations of the narrow surfaces the core depends on:
//! document access, the interactive terminal, the log sink, the confirmation
//! prompt, and the managed process launcher.

use crate::dispatch::{
    lock_or_recover, shared_run_state, wait_until_idle, CommandLauncher, ConfirmPrompt, Dispatcher,
    ExitCallback, OutputSink, PromptChoice, RunHandle, SharedOutput, SharedRunState, TerminalSink,
};
use crate::error::RunnerError;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Access to the "active document": the file and cursor line the user is
/// operating on.
pub trait DocumentAccess {
    fn current_file_path(&self) -> Option<PathBuf>;
    fn current_selection_line_text(&self) -> Option<String>;
    fn read_file_text(&self, path: &Path) -> io::Result<String>;
}

/// The CLI stands in for the editor: the active file is the path argument and
/// the selection is the 1-based `--line` argument.
pub struct CliDocument {
    file: Option<PathBuf>,
    selection_line: Option<usize>,
}

impl CliDocument {
    pub fn new(file: Option<PathBuf>, selection_line: Option<usize>) -> Self {
        Self {
            file,
            selection_line,
        }
    }
}

impl DocumentAccess for CliDocument {
    fn current_file_path(&self) -> Option<PathBuf> {
        self.file.clone()
    }

    fn current_selection_line_text(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        let line = self.selection_line?.checked_sub(1)?;
        let text = fs::read_to_string(file).ok()?;
        text.split('\n')
            .nth(line)
            .map(|text| text.strip_suffix('\r').unwrap_or(text).to_string())
    }

    fn read_file_text(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// Interactive terminal analog: sent text runs as a foreground shell command
/// inheriting the user's stdio, so cucumber-js behaves as if typed into the
/// shared terminal.
pub struct ShellTerminal {
    cwd: PathBuf,
}

impl ShellTerminal {
    pub fn new(cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
        }
    }
}

impl TerminalSink for ShellTerminal {
    fn show(&mut self) {}

    fn send_text(&mut self, text: &str) {
        match Command::new("sh")
            .arg("-c")
            .arg(text)
            .current_dir(&self.cwd)
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!("command exited with {}", exit_status_text(status)),
            Err(err) => tracing::error!("failed to run command in shell: {err}"),
        }
    }

    fn dispose(&mut self) {}
}

/// The "Cucumber Runner" output channel analog: prefixed lines and raw
/// process output on stderr, keeping stdout for the commands themselves.
pub struct StderrOutput;

impl OutputSink for StderrOutput {
    fn append_line(&mut self, line: &str) {
        eprintln!("[cukerun] {line}");
    }

    fn append(&mut self, chunk: &str) {
        eprint!("{chunk}");
        let _ = io::stderr().flush();
    }

    fn dispose(&mut self) {
        let _ = io::stderr().flush();
    }
}

/// Reads one line from stdin; anything but an explicit ok/yes keeps the
/// running command alive.
pub struct StdinPrompt;

impl ConfirmPrompt for StdinPrompt {
    fn ask(&self, message: &str) -> PromptChoice {
        eprint!("{message} [ok/cancel] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return PromptChoice::Cancel;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "ok" | "o" | "y" | "yes" => PromptChoice::Ok,
            _ => PromptChoice::Cancel,
        }
    }
}

/// Non-interactive stand-in for `--yes`.
pub struct AlwaysOk;

impl ConfirmPrompt for AlwaysOk {
    fn ask(&self, _message: &str) -> PromptChoice {
        PromptChoice::Ok
    }
}

/// Spawns the managed command process with piped output, streaming stdout and
/// stderr into the sink from reader threads. The exit callback fires after
/// both streams reach EOF and the process is reaped.
pub struct ShellLauncher;

struct ShellRunHandle {
    pid: u32,
    child: Arc<Mutex<std::process::Child>>,
}

impl RunHandle for ShellRunHandle {
    fn label(&self) -> String {
        format!("PID {}", self.pid)
    }

    fn kill(&mut self) {
        if let Err(err) = lock_or_recover(&self.child).kill() {
            tracing::warn!("failed to kill PID {}: {err}", self.pid);
        }
    }
}

impl CommandLauncher for ShellLauncher {
    fn launch(
        &self,
        command: &str,
        cwd: &Path,
        output: SharedOutput,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn RunHandle>, RunnerError> {
        let argv = shell_words::split(command)
            .map_err(|err| RunnerError::Dispatch(format!("parse command line: {err}")))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RunnerError::Dispatch("empty command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| RunnerError::Dispatch(format!("spawn {program}: {err}")))?;

        let pid = child.id();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(stream_into(stdout, Arc::clone(&output)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(stream_into(stderr, Arc::clone(&output)));
        }

        let child = Arc::new(Mutex::new(child));
        let waited = Arc::clone(&child);
        thread::spawn(move || {
            for reader in readers {
                let _ = reader.join();
            }
            loop {
                let polled = lock_or_recover(&waited).try_wait();
                match polled {
                    Ok(Some(status)) => {
                        let result = if status.success() {
                            Ok(())
                        } else {
                            Err(format!("exit status {}", exit_status_text(status)))
                        };
                        on_exit(result);
                        return;
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(50)),
                    Err(err) => {
                        on_exit(Err(format!("wait for PID {pid}: {err}")));
                        return;
                    }
                }
            }
        });

        Ok(Box::new(ShellRunHandle { pid, child }))
    }
}

fn stream_into<R: Read + Send + 'static>(
    mut reader: R,
    output: SharedOutput,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 8192];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) | Err(_) => return,
                Ok(read) => {
                    let chunk = String::from_utf8_lossy(&buffer[..read]).to_string();
                    lock_or_recover(&output).append(&chunk);
                }
            }
        }
    })
}

fn exit_status_text(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

/// Process-wide execution resources, the explicit counterpart of the
/// extension's module-level terminal/output/process globals. Created at
/// startup, injected into each dispatcher, torn down via [`shutdown`].
///
/// [`shutdown`]: ExecutionContext::shutdown
pub struct ExecutionContext {
    state: SharedRunState,
    terminal: ShellTerminal,
    output: SharedOutput,
    prompt: Box<dyn ConfirmPrompt>,
    launcher: ShellLauncher,
    project_root: PathBuf,
}

impl ExecutionContext {
    pub fn new(project_root: &Path, assume_yes: bool) -> Self {
        let prompt: Box<dyn ConfirmPrompt> = if assume_yes {
            Box::new(AlwaysOk)
        } else {
            Box::new(StdinPrompt)
        };
        let output: SharedOutput = Arc::new(Mutex::new(StderrOutput));
        Self {
            state: shared_run_state(),
            terminal: ShellTerminal::new(project_root),
            output,
            prompt,
            launcher: ShellLauncher,
            project_root: project_root.to_path_buf(),
        }
    }

    pub fn dispatcher(&mut self) -> Dispatcher<'_> {
        Dispatcher::new(
            Arc::clone(&self.state),
            &mut self.terminal,
            Arc::clone(&self.output),
            self.prompt.as_ref(),
            &self.launcher,
            &self.project_root,
        )
    }

    /// Blocks until the managed run, if any, has completed. Keeps the CLI
    /// process alive for the background reader threads.
    pub fn wait_until_idle(&self) {
        wait_until_idle(&self.state);
    }

    pub fn shutdown(mut self) {
        self.terminal.dispose();
        lock_or_recover(&self.output).dispose();
    }
}
