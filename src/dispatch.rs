use crate::command::Tool;
use crate::error::RunnerError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

const TERMINATE_PROMPT: &str =
    "There is a command running right now. Terminate it before executing a new command?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Ok,
    Cancel,
}

/// Confirmation prompt shown before terminating an in-flight run.
pub trait ConfirmPrompt {
    fn ask(&self, message: &str) -> PromptChoice;
}

/// The shared interactive terminal surface. Sending text queues a command in
/// the terminal's input stream; there is no single-flight guard on this path
/// because the terminal is reused, not restarted.
pub trait TerminalSink {
    fn show(&mut self);
    fn send_text(&mut self, text: &str);
    fn dispose(&mut self);
}

/// Log sink for managed runs (the "Cucumber Runner" output channel).
pub trait OutputSink: Send {
    fn append_line(&mut self, line: &str);
    fn append(&mut self, chunk: &str);
    fn dispose(&mut self);
}

pub type SharedOutput = Arc<Mutex<dyn OutputSink>>;

/// Handle onto a managed background run, enough to signal it.
pub trait RunHandle: Send {
    /// Short description for log lines, e.g. `PID 4242`.
    fn label(&self) -> String;
    fn kill(&mut self);
}

/// Invoked once when a managed run completes; `Err` carries the reason.
pub type ExitCallback = Box<dyn FnOnce(Result<(), String>) + Send>;

/// Starts a managed command process, streaming its output into the sink.
pub trait CommandLauncher {
    fn launch(
        &self,
        command: &str,
        cwd: &Path,
        output: SharedOutput,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn RunHandle>, RunnerError>;
}

/// At most one managed run may be in flight per process. Mutated only by the
/// dispatcher; the check-prompt-set sequence runs under one lock so two rapid
/// dispatches cannot both observe `active = false`.
pub struct RunState {
    pub active: bool,
    handle: Option<Box<dyn RunHandle>>,
    generation: u64,
}

pub type SharedRunState = Arc<Mutex<RunState>>;

pub fn shared_run_state() -> SharedRunState {
    Arc::new(Mutex::new(RunState {
        active: false,
        handle: None,
        generation: 0,
    }))
}

pub(crate) fn lock_or_recover<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("recovering from poisoned lock");
        PoisonError::into_inner(poisoned)
    })
}

/// Routes a synthesized command to its execution surface.
///
/// cucumber-js commands go to the interactive terminal; everything else is
/// spawned as a managed, killable process whose output streams into the log
/// sink. A timestamped started line is appended before the command is sent on
/// either path, and the active flag is set before `dispatch` returns.
pub struct Dispatcher<'a> {
    state: SharedRunState,
    terminal: &'a mut dyn TerminalSink,
    output: SharedOutput,
    prompt: &'a dyn ConfirmPrompt,
    launcher: &'a dyn CommandLauncher,
    cwd: &'a Path,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        state: SharedRunState,
        terminal: &'a mut dyn TerminalSink,
        output: SharedOutput,
        prompt: &'a dyn ConfirmPrompt,
        launcher: &'a dyn CommandLauncher,
        cwd: &'a Path,
    ) -> Self {
        Self {
            state,
            terminal,
            output,
            prompt,
            launcher,
            cwd,
        }
    }

    pub fn dispatch(&mut self, command: &str, tool: &str) -> Result<(), RunnerError> {
        if Tool::parse(tool)?.is_interactive() {
            self.send_to_terminal(command);
            Ok(())
        } else {
            self.start_managed(command)
        }
    }

    /// Blocks until no managed run is active. Interactive commands finish
    /// synchronously, so this only ever waits on the managed path.
    pub fn wait_until_idle(&self) {
        wait_until_idle(&self.state);
    }

    fn send_to_terminal(&mut self, command: &str) {
        lock_or_recover(&self.output)
            .append_line(&format!("[{}] > Running command: {command}", timestamp()));
        self.terminal.show();
        self.terminal.send_text(command);
    }

    fn start_managed(&mut self, command: &str) -> Result<(), RunnerError> {
        let mut state = lock_or_recover(&self.state);
        if state.active {
            match self.prompt.ask(TERMINATE_PROMPT) {
                PromptChoice::Cancel => {
                    tracing::info!("dispatch aborted, keeping the active run");
                    return Ok(());
                }
                PromptChoice::Ok => {
                    if let Some(mut handle) = state.handle.take() {
                        lock_or_recover(&self.output)
                            .append_line(&format!("> Killing {}...", handle.label()));
                        handle.kill();
                    }
                    state.active = false;
                }
            }
        }

        lock_or_recover(&self.output)
            .append_line(&format!("[{}] > Running command: {command}", timestamp()));

        // Stamp the run: the exit of a killed run can arrive after its
        // replacement started and must not touch the replacement's state.
        let run_id = state.generation + 1;
        let state_for_exit = Arc::clone(&self.state);
        let output_for_exit = Arc::clone(&self.output);
        let on_exit: ExitCallback = Box::new(move |result| {
            let mut state = lock_or_recover(&state_for_exit);
            if state.generation != run_id {
                return;
            }
            let mut output = lock_or_recover(&output_for_exit);
            match result {
                Ok(()) => output.append_line(&format!(
                    "[{}] > Command finished successfully.",
                    timestamp()
                )),
                Err(reason) => {
                    output.append_line(&format!("[{}] > ERROR: {reason}", timestamp()));
                }
            }
            drop(output);
            state.active = false;
            state.handle = None;
        });

        match self
            .launcher
            .launch(command, self.cwd, Arc::clone(&self.output), on_exit)
        {
            Ok(handle) => {
                state.generation = run_id;
                state.active = true;
                state.handle = Some(handle);
            }
            Err(err) => {
                // Reported into the sink the user is watching, never rethrown.
                lock_or_recover(&self.output)
                    .append_line(&format!("[{}] > ERROR: {err}", timestamp()));
            }
        }
        Ok(())
    }
}

pub fn wait_until_idle(state: &SharedRunState) {
    loop {
        if !lock_or_recover(state).active {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
