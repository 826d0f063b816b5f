//! Spoken output through an external TTS program (espeak-ng by default).

use std::process::{Command, ExitStatus};
use thiserror::Error;

pub const DEFAULT_SPEECH_COMMAND: &str = "espeak-ng";
/// Words per minute.
pub const DEFAULT_SPEECH_RATE: u32 = 150;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Text-to-speech voice. Invoked as `<command> -s <rate> <text>`.
#[derive(Debug, Clone)]
pub struct Voice {
    command: String,
    rate: u32,
}

impl Voice {
    pub fn new(command: impl Into<String>, rate: u32) -> Self {
        Self {
            command: command.into(),
            rate,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Speak `text` and wait until the utterance has finished.
    pub fn say(&self, text: &str) -> Result<(), SpeechError> {
        tracing::debug!(command = %self.command, rate = self.rate, text, "speaking");
        let status = Command::new(&self.command)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg(text)
            .status()
            .map_err(|source| SpeechError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(SpeechError::Failed {
                command: self.command.clone(),
                status,
            });
        }
        Ok(())
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_COMMAND, DEFAULT_SPEECH_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_voice() {
        let voice = Voice::default();
        assert_eq!(voice.command(), "espeak-ng");
        assert_eq!(voice.rate, 150);
    }

    #[test]
    fn test_successful_command() {
        // `true` ignores its arguments.
        Voice::new("true", 150).say("hello").unwrap();
    }

    #[test]
    fn test_failing_command() {
        let err = Voice::new("false", 150).say("hello").unwrap_err();
        assert!(matches!(err, SpeechError::Failed { .. }));
    }

    #[test]
    fn test_missing_command() {
        let err = Voice::new("/nonexistent/tts-binary", 150).say("hello").unwrap_err();
        assert!(matches!(err, SpeechError::Spawn { .. }));
    }
}
