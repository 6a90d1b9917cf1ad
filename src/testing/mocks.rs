//! Controllable test doubles for the runner, the confirmer and checks.
//!
//! All three are cheap `Clone` handles over shared state, so a test can
//! hand one copy to the pipeline (boxed) and keep another to inspect what
//! happened.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::checks::{Check, CheckContext, CheckResult, FixOutcome};
use crate::confirm::Confirm;
use crate::error::{GuardError, Result};
use crate::process::{CommandOutput, CommandRunner, CommandSpec, RunError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// MockRunner
// ============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
    LaunchError(String),
}

#[derive(Debug, Default)]
struct RunnerState {
    responses: Vec<(String, VecDeque<Scripted>)>,
    missing_tools: HashSet<String>,
    calls: Vec<String>,
}

/// Mock command runner.
///
/// Responses are keyed by command-line prefix; the longest matching prefix
/// wins. Queued responses are consumed in order and the last one repeats.
/// Unmatched commands succeed with empty output.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockRunner::new()
///     .on("flake8", CommandOutput::failed(1, "a.py:1:1: E302"))
///     .on("flake8", CommandOutput::ok(""))
///     .without_tool("bandit");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl MockRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, prefix: &str, response: Scripted) -> Self {
        {
            let mut state = lock(&self.state);
            match state.responses.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push_back(response),
                None => state
                    .responses
                    .push((prefix.to_string(), VecDeque::from([response]))),
            }
        }
        self
    }

    /// Queue an output for commands starting with `prefix`.
    #[must_use]
    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.script(prefix, Scripted::Output(output))
    }

    /// Commands starting with `prefix` time out.
    #[must_use]
    pub fn on_timeout(self, prefix: &str) -> Self {
        self.script(prefix, Scripted::Timeout)
    }

    /// Commands starting with `prefix` cannot be launched.
    #[must_use]
    pub fn on_launch_error(self, prefix: &str) -> Self {
        self.script(prefix, Scripted::LaunchError("No such file or directory".into()))
    }

    /// Report `tool` as absent from `PATH`.
    #[must_use]
    pub fn without_tool(self, tool: &str) -> Self {
        lock(&self.state).missing_tools.insert(tool.to_string());
        self
    }

    /// Every command line run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of command lines starting with `prefix`.
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_count(prefix) > 0
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, RunError> {
        let command = spec.command_line();
        let mut state = lock(&self.state);
        state.calls.push(command.clone());

        let scripted = state
            .responses
            .iter_mut()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });

        match scripted {
            None => Ok(CommandOutput::ok("")),
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Timeout) => Err(RunError::Timeout {
                command,
                timeout: spec.timeout,
            }),
            Some(Scripted::LaunchError(message)) => Err(RunError::Launch { command, message }),
        }
    }

    fn is_available(&self, tool: &str) -> bool {
        !lock(&self.state).missing_tools.contains(tool)
    }
}

// ============================================================================
// ScriptedConfirmer
// ============================================================================

#[derive(Debug, Default)]
struct ConfirmerState {
    answers: VecDeque<bool>,
    fallback: Option<bool>,
    prompts: Vec<String>,
}

/// Confirmer that replays scripted answers.
///
/// Once the script runs out it returns the fallback answer, or aborts like
/// an operator closing the prompt when there is none.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    state: Arc<Mutex<ConfirmerState>>,
}

impl ScriptedConfirmer {
    /// Answer every prompt with `answer`.
    #[must_use]
    pub fn always(answer: bool) -> Self {
        let confirmer = Self::default();
        lock(&confirmer.state).fallback = Some(answer);
        confirmer
    }

    /// Answer the given sequence, then abort.
    #[must_use]
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        let confirmer = Self::default();
        lock(&confirmer.state).answers = answers.into_iter().collect();
        confirmer
    }

    /// Abort at the first prompt.
    #[must_use]
    pub fn aborting() -> Self {
        Self::default()
    }

    /// Prompts seen so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.state).prompts.clone()
    }
}

impl Confirm for ScriptedConfirmer {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        state.prompts.push(prompt.to_string());
        match state.answers.pop_front().or(state.fallback) {
            Some(answer) => Ok(answer),
            None => Err(GuardError::abort("end of input")),
        }
    }
}

// ============================================================================
// StubCheck
// ============================================================================

/// Shared call counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A check with scripted results.
///
/// Before a fix it returns its initial result; after a fix that reported
/// progress it returns the post-fix result.
#[derive(Debug, Clone)]
pub struct StubCheck {
    name: String,
    initial: CheckResult,
    after_fix: Option<CheckResult>,
    fix_attempted: bool,
    warning: Option<String>,
    fixed: Arc<AtomicBool>,
    evaluations: Counter,
    fix_calls: Counter,
}

impl StubCheck {
    fn with_result(name: &str, initial: CheckResult) -> Self {
        Self {
            name: name.to_string(),
            initial,
            after_fix: None,
            fix_attempted: false,
            warning: None,
            fixed: Arc::new(AtomicBool::new(false)),
            evaluations: Counter::default(),
            fix_calls: Counter::default(),
        }
    }

    #[must_use]
    pub fn passing(name: &str) -> Self {
        Self::with_result(name, CheckResult::pass(name, "ok"))
    }

    #[must_use]
    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_result(name, CheckResult::fail(name, message))
    }

    /// Make the failure fixable; the fix reports progress and the recheck
    /// passes when `fix_works` is true.
    #[must_use]
    pub fn with_fixer(mut self, fix_works: bool) -> Self {
        self.initial = self.initial.fixable("stub-fix");
        self.fix_attempted = true;
        self.after_fix = Some(if fix_works {
            CheckResult::pass(&self.name, "fixed")
        } else {
            self.initial.clone()
        });
        self
    }

    /// Make the failure fixable, but the fixer achieves nothing.
    #[must_use]
    pub fn with_failing_fix(mut self) -> Self {
        self.initial = self.initial.fixable("stub-fix");
        self.fix_attempted = false;
        self
    }

    /// Push a warning into the run state on every evaluation.
    #[must_use]
    pub fn with_warning(mut self, warning: &str) -> Self {
        self.warning = Some(warning.to_string());
        self
    }

    #[must_use]
    pub fn evaluations(&self) -> Counter {
        self.evaluations.clone()
    }

    #[must_use]
    pub fn fix_calls(&self) -> Counter {
        self.fix_calls.clone()
    }
}

impl Check for StubCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        self.evaluations.bump();
        if let Some(ref warning) = self.warning {
            ctx.warn(warning.clone());
        }
        match self.after_fix {
            Some(ref after) if self.fixed.load(Ordering::SeqCst) => Ok(after.clone()),
            _ => Ok(self.initial.clone()),
        }
    }

    fn has_fixer(&self) -> bool {
        self.initial.can_fix()
    }

    fn fix(&self, _ctx: &mut CheckContext<'_>) -> Result<FixOutcome> {
        self.fix_calls.bump();
        let mut outcome = FixOutcome::default();
        outcome.step("stub", self.fix_attempted, None);
        if self.fix_attempted {
            self.fixed.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}
