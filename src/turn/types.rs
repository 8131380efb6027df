//! Core data model for conversational turns
//!
//! A `Turn` is one full user-input-to-system-response exchange. Turns are
//! owned exclusively by the `TurnController`; adapters only ever see the
//! turn id and compare it against the active turn before acting.

use crate::avatar::Cue;
use chrono::{DateTime, Utc};

/// Monotonic turn identifier, assigned by the controller
pub type TurnId = u64;

/// How the user's input entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Spoken,
    Typed,
}

/// Lifecycle status of a turn
///
/// `Completed`, `Cancelled` and `Failed` are terminal; a turn in a terminal
/// status never transitions again and is dropped from the active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// A capture session is active, waiting for an utterance
    Listening,

    /// Exactly one inference round trip is outstanding
    Inferring,

    /// The response is displayed and speech playback is underway
    Presenting,

    /// The response was fully delivered
    Completed,

    /// A newer input preempted this turn (barge-in) or the capture session
    /// ended without producing an utterance
    Cancelled,

    /// Inference or recognition failed; the error was surfaced
    Failed,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnStatus::Completed | TurnStatus::Cancelled | TurnStatus::Failed
        )
    }
}

/// Raw text captured from input, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    text: String,
}

impl Utterance {
    /// Create an utterance from recognized text. Returns `None` for
    /// whitespace-only text; a capture session never produces an empty result.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(Self { text })
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Generated text plus the avatar cue derived from it
///
/// Produced only after a successful inference call for the still-active
/// turn, consumed by speech output and the cue emitter, then discarded.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub cue: Cue,
}

/// One user-initiated exchange
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: TurnId,
    pub modality: Modality,
    pub text: String,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled: bool,
    pub response: Option<Response>,
}

impl Turn {
    /// A spoken turn starts in `Listening`; its text arrives with the
    /// recognition result.
    pub fn spoken(id: TurnId) -> Self {
        Self {
            id,
            modality: Modality::Spoken,
            text: String::new(),
            status: TurnStatus::Listening,
            created_at: Utc::now(),
            cancelled: false,
            response: None,
        }
    }

    /// A typed turn skips `Listening` and starts in `Inferring`.
    pub fn typed(id: TurnId, text: impl Into<String>) -> Self {
        Self {
            id,
            modality: Modality::Typed,
            text: text.into(),
            status: TurnStatus::Inferring,
            created_at: Utc::now(),
            cancelled: false,
            response: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
