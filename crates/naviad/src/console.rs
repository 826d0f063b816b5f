//! Keyboard prompts for enrolling unknown faces.

use navia_core::{EnrollmentPrompt, PerceptionError, SaveDecision};
use std::io::{BufRead, Write};

/// Line-oriented prompt: `s` saves the face, anything else skips.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<Option<String>, PerceptionError> {
        write!(self.output, "{question}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> EnrollmentPrompt for ConsolePrompt<R, W> {
    fn save_decision(&mut self) -> Result<SaveDecision, PerceptionError> {
        let answer = self.ask("Unknown face. Press 's' then Enter to save it, or Enter to skip: ")?;
        Ok(match answer {
            Some(a) if a.trim().eq_ignore_ascii_case("s") => SaveDecision::Save,
            _ => SaveDecision::Skip,
        })
    }

    /// End of input reads as an empty name, which cancels the save.
    fn read_name(&mut self) -> Result<String, PerceptionError> {
        Ok(self.ask("Enter name: ")?.unwrap_or_default())
    }
}
