//! Yes/no gates for fixes, migrations and tool installs.
//!
//! In interactive mode the operator is asked on the terminal. In
//! unattended mode (hook mode, `--yes`) every question resolves to the
//! configured auto-fix value without reading stdin, which is what lets the
//! pipeline run inside a commit hook.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::config::RunPolicy;
use crate::error::{GuardError, Result};

/// Tokens accepted as "yes" (case-insensitive). An empty line also counts.
pub const AFFIRMATIVE: &[&str] = &["y", "yes", "o", "oui"];

/// Resolves a yes/no question.
pub trait Confirm {
    /// Ask `prompt` and return the answer.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::OperatorAbort`] when input ends or is
    /// interrupted. Callers must abort the whole run, not just this
    /// question.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Interpret a typed answer.
#[must_use]
pub fn parse_answer(line: &str) -> bool {
    let answer = line.trim().to_lowercase();
    answer.is_empty() || AFFIRMATIVE.contains(&answer.as_str())
}

/// Where interactive prompts are written.
///
/// `Stderr` keeps stdout free for a machine-readable report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStream {
    #[default]
    Stdout,
    Stderr,
}

/// Build the confirmer matching the run policy.
pub fn confirmer_for(policy: &RunPolicy, stream: PromptStream) -> Box<dyn Confirm> {
    if !policy.interactive {
        return Box::new(UnattendedConfirmer::new(policy.auto_fix));
    }
    match stream {
        PromptStream::Stdout => Box::new(PromptConfirmer::stdio()),
        PromptStream::Stderr => Box::new(PromptConfirmer::stdin_stderr()),
    }
}

// ============================================================================
// Unattended
// ============================================================================

/// Answers every question with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct UnattendedConfirmer {
    answer: bool,
}

impl UnattendedConfirmer {
    pub fn new(answer: bool) -> Self {
        Self { answer }
    }
}

impl Confirm for UnattendedConfirmer {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        debug!(prompt, answer = self.answer, "unattended confirmation");
        Ok(self.answer)
    }
}

// ============================================================================
// Interactive
// ============================================================================

/// Prompts on a writer and reads one line per question.
pub struct PromptConfirmer<R, W> {
    input: R,
    output: W,
}

impl PromptConfirmer<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on stdout, read from stdin.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl PromptConfirmer<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stderr, read from stdin.
    pub fn stdin_stderr() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consume the confirmer and return its writer (for inspecting prompts in tests).
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirmer<R, W> {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        write!(self.output, "{} [Y/n] : ", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => {
                writeln!(self.output)?;
                Err(GuardError::abort("end of input at confirmation prompt"))
            }
            Ok(_) => Ok(parse_answer(&line)),
            Err(e) => Err(GuardError::abort(format!("prompt interrupted: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer(""));
        assert!(parse_answer("\n"));
        assert!(parse_answer("Y"));
        assert!(parse_answer("yes\n"));
        assert!(parse_answer("  Oui "));
        assert!(parse_answer("o"));
        assert!(!parse_answer("n"));
        assert!(!parse_answer("no"));
        assert!(!parse_answer("maybe"));
    }

    #[test]
    fn test_prompt_confirmer_reads_answers_in_order() {
        let input = Cursor::new("y\nn\n\n");
        let mut confirmer = PromptConfirmer::new(input, Vec::new());
        assert!(confirmer.confirm("Fix?").unwrap());
        assert!(!confirmer.confirm("Fix?").unwrap());
        assert!(confirmer.confirm("Fix?").unwrap());

        let written = String::from_utf8(confirmer.into_output()).unwrap();
        assert_eq!(written.matches("Fix? [Y/n] : ").count(), 3);
    }

    #[test]
    fn test_prompt_confirmer_aborts_on_eof() {
        let mut confirmer = PromptConfirmer::new(Cursor::new(""), Vec::new());
        let err = confirmer.confirm("Install flake8?").unwrap_err();
        assert!(err.is_interrupt());
        assert_eq!(err.exit_code(), 130);
    }

    #[test]
    fn test_confirmer_for_unattended_policy_ignores_stream() {
        let policy = RunPolicy {
            strict_mode: true,
            auto_fix: true,
            interactive: false,
        };
        let mut confirmer = confirmer_for(&policy, PromptStream::Stderr);
        assert!(confirmer.confirm("Apply the automatic fix?").unwrap());
    }

    #[test]
    fn test_unattended_ignores_stdin_and_returns_default() {
        let mut yes = UnattendedConfirmer::new(true);
        let mut no = UnattendedConfirmer::new(false);
        for _ in 0..3 {
            assert!(yes.confirm("Fix?").unwrap());
            assert!(!no.confirm("Fix?").unwrap());
        }
    }
}
