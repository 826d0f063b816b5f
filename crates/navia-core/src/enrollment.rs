//! Enrollment workflow for faces the gallery does not know.
//!
//! An explicit state machine driven by discrete events:
//!
//! ```text
//! Idle --UnknownFace--> AwaitingSaveDecision --Skip--> Idle
//!                              |
//!                            Save
//!                              v
//!                           Saving --empty name--> Idle
//!                              |
//!                            Name --> (persist) --Finished--> Idle
//! ```
//!
//! Obstacle feedback is paused whenever the machine is not `Idle`.

use crate::gallery::is_valid_name;
use crate::perception::SaveDecision;
use crate::types::BoundingBox;
use thiserror::Error;

/// Spoken when an unmatched face starts the workflow.
pub const UNKNOWN_PERSON_NOTICE: &str = "Unknown person detected.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("event {event} is not valid in state {state}")]
    UnexpectedEvent {
        state: &'static str,
        event: &'static str,
    },
}

/// The face under consideration, as detected in the downscaled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFace {
    pub face_index: usize,
    pub bbox: BoundingBox,
}

/// Everything needed to persist an enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub name: String,
    pub face: PendingFace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentState {
    Idle,
    AwaitingSaveDecision {
        face: PendingFace,
    },
    Saving {
        face: PendingFace,
        /// Set once a usable name has been entered.
        name: Option<String>,
    },
}

impl EnrollmentState {
    fn label(&self) -> &'static str {
        match self {
            EnrollmentState::Idle => "Idle",
            EnrollmentState::AwaitingSaveDecision { .. } => "AwaitingSaveDecision",
            EnrollmentState::Saving { name: None, .. } => "Saving(awaiting name)",
            EnrollmentState::Saving { name: Some(_), .. } => "Saving(persisting)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentEvent {
    UnknownFace(PendingFace),
    Decision(SaveDecision),
    Name(String),
    /// Persistence and gallery reload are done (or failed).
    Finished,
    /// Bail out from any state back to `Idle`.
    Abort,
}

impl EnrollmentEvent {
    fn label(&self) -> &'static str {
        match self {
            EnrollmentEvent::UnknownFace(_) => "UnknownFace",
            EnrollmentEvent::Decision(_) => "Decision",
            EnrollmentEvent::Name(_) => "Name",
            EnrollmentEvent::Finished => "Finished",
            EnrollmentEvent::Abort => "Abort",
        }
    }
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentEffect {
    /// Speak [`UNKNOWN_PERSON_NOTICE`] and wait for a save/skip decision.
    AnnounceUnknown,
    /// Wait for the name to save under.
    PromptName,
    /// Write the crop, reload the gallery, then send `Finished`.
    Persist(SaveRequest),
    /// Back to `Idle`; obstacle feedback may resume next cycle.
    Resume,
}

/// The workflow. Only one enrollment can be in progress.
#[derive(Debug)]
pub struct Enrollment {
    state: EnrollmentState,
}

impl Default for Enrollment {
    fn default() -> Self {
        Self::new()
    }
}

impl Enrollment {
    pub fn new() -> Self {
        Self {
            state: EnrollmentState::Idle,
        }
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == EnrollmentState::Idle
    }

    /// True for as long as an enrollment is in progress.
    pub fn obstacle_feedback_paused(&self) -> bool {
        !self.is_idle()
    }

    /// Apply one event. Invalid events leave the state untouched.
    pub fn handle(&mut self, event: EnrollmentEvent) -> Result<EnrollmentEffect, EnrollmentError> {
        let state = std::mem::replace(&mut self.state, EnrollmentState::Idle);

        let (next, effect) = match (state, event) {
            (_, EnrollmentEvent::Abort) => (EnrollmentState::Idle, EnrollmentEffect::Resume),

            (EnrollmentState::Idle, EnrollmentEvent::UnknownFace(face)) => (
                EnrollmentState::AwaitingSaveDecision { face },
                EnrollmentEffect::AnnounceUnknown,
            ),

            (EnrollmentState::AwaitingSaveDecision { face }, EnrollmentEvent::Decision(decision)) => {
                match decision {
                    SaveDecision::Save => (
                        EnrollmentState::Saving { face, name: None },
                        EnrollmentEffect::PromptName,
                    ),
                    SaveDecision::Skip => (EnrollmentState::Idle, EnrollmentEffect::Resume),
                }
            }

            (EnrollmentState::Saving { face, name: None }, EnrollmentEvent::Name(raw)) => {
                let name = raw.trim();
                if is_valid_name(name) {
                    let request = SaveRequest {
                        name: name.to_string(),
                        face: face.clone(),
                    };
                    (
                        EnrollmentState::Saving {
                            face,
                            name: Some(name.to_string()),
                        },
                        EnrollmentEffect::Persist(request),
                    )
                } else {
                    if !name.is_empty() {
                        tracing::warn!(name, "name cannot be used as a file name; skipping enrollment");
                    }
                    (EnrollmentState::Idle, EnrollmentEffect::Resume)
                }
            }

            (EnrollmentState::Saving { name: Some(_), .. }, EnrollmentEvent::Finished) => {
                (EnrollmentState::Idle, EnrollmentEffect::Resume)
            }

            (state, event) => {
                let err = EnrollmentError::UnexpectedEvent {
                    state: state.label(),
                    event: event.label(),
                };
                self.state = state;
                return Err(err);
            }
        };

        tracing::debug!(?effect, to = next.label(), "enrollment transition");
        self.state = next;
        Ok(effect)
    }
}
