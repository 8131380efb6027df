//! Speech output adapter over the platform synthesis engine
//!
//! Last-writer-wins playback with no queueing: starting a new utterance
//! cancels the current one first. Completion and error signals come back
//! as `SynthesisEvent`s tagged with the turn id so the controller can
//! ignore signals from superseded turns.

use crate::turn::TurnId;
use crate::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Completion signals from playback, tagged with the owning turn
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Playback finished normally
    Finished { turn: TurnId },

    /// Playback failed with an engine reason code
    Error { turn: TurnId, reason: String },
}

/// A voice offered by the synthesis engine
#[derive(Debug, Clone)]
pub struct Voice {
    pub name: String,
    /// BCP 47 language tag, e.g. "en-US"
    pub language: String,
}

/// Platform speech-synthesis engine contract
///
/// `speak` is non-blocking; the engine posts exactly one `Finished` or
/// `Error` event per accepted utterance on the channel it was constructed
/// with. `cancel` stops playback immediately; a cancelled utterance posts
/// no further events.
pub trait SynthesisEngine: Send {
    /// Voices the engine offers, used for language-tag selection
    fn voices(&self) -> Vec<Voice>;

    /// Begin speaking. `voice` of `None` means the engine default.
    fn speak(&mut self, text: &str, voice: Option<&Voice>, turn: TurnId) -> Result<()>;

    fn cancel(&mut self);
}

/// Configuration for speech output
#[derive(Debug, Clone)]
pub struct SpeechOutputConfig {
    /// Preferred voice language tag; falls back to the engine default
    /// when no voice matches
    pub language: String,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
        }
    }
}

impl SpeechOutputConfig {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Adapter enforcing the speak/cancel contract over the engine
pub struct SpeechOutputAdapter {
    config: SpeechOutputConfig,
    engine: Option<Box<dyn SynthesisEngine>>,
    event_tx: UnboundedSender<SynthesisEvent>,
    speaking: Option<TurnId>,
}

impl SpeechOutputAdapter {
    /// `engine: None` means the platform has no synthesis capability;
    /// playback then completes immediately (audio is best-effort, the
    /// displayed text is the primary content).
    pub fn new(
        config: SpeechOutputConfig,
        engine: Option<Box<dyn SynthesisEngine>>,
        event_tx: UnboundedSender<SynthesisEvent>,
    ) -> Self {
        Self {
            config,
            engine,
            event_tx,
            speaking: None,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.is_some()
    }

    pub fn speaking_turn(&self) -> Option<TurnId> {
        self.speaking
    }

    /// Speak the given text for the given turn
    ///
    /// Empty text is a no-op success: the completion event is posted
    /// immediately and the engine is never invoked. If another utterance
    /// is playing it is cancelled first (last-writer-wins).
    pub fn speak(&mut self, text: &str, turn: TurnId) -> Result<()> {
        if text.trim().is_empty() {
            debug!(turn, "empty text, completing playback immediately");
            let _ = self.event_tx.send(SynthesisEvent::Finished { turn });
            return Ok(());
        }

        if self.speaking.is_some() {
            self.cancel();
        }

        let Some(engine) = self.engine.as_mut() else {
            debug!(turn, "no synthesis engine, completing playback immediately");
            let _ = self.event_tx.send(SynthesisEvent::Finished { turn });
            return Ok(());
        };

        let voices = engine.voices();
        let voice = select_voice(&voices, &self.config.language);
        match &voice {
            Some(v) => debug!(turn, voice = %v.name, "starting playback"),
            None => debug!(turn, "starting playback with engine default voice"),
        }

        engine.speak(text, voice.as_ref(), turn)?;
        self.speaking = Some(turn);
        Ok(())
    }

    /// Stop any active playback immediately. Idempotent.
    pub fn cancel(&mut self) {
        let Some(turn) = self.speaking.take() else {
            return;
        };
        debug!(turn, "cancelling playback");
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel();
        }
    }

    /// Record that playback for a turn has finished or failed
    pub fn playback_finished(&mut self, turn: TurnId) {
        match self.speaking {
            Some(current) if current == turn => self.speaking = None,
            // The immediate-completion paths never mark a turn as speaking
            None => {}
            Some(current) => {
                warn!(turn, current, "completion signal for a turn that is not speaking");
            }
        }
    }
}

/// Pick a voice matching the configured language tag
///
/// Exact tag match first, then primary-subtag match ("en" matches
/// "en-GB"). `None` means the engine default; the fallback never errors.
fn select_voice(voices: &[Voice], language: &str) -> Option<Voice> {
    if let Some(v) = voices
        .iter()
        .find(|v| v.language.eq_ignore_ascii_case(language))
    {
        return Some(v.clone());
    }

    let primary = language.split('-').next().unwrap_or(language);
    voices
        .iter()
        .find(|v| {
            v.language
                .split('-')
                .next()
                .map(|p| p.eq_ignore_ascii_case(primary))
                .unwrap_or(false)
        })
        .cloned()
}
