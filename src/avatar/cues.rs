//! Avatar cue derivation and emission
//!
//! Maps generated responses and controller state to named animation cues on
//! the external rendering collaborator. The sentiment-to-cue mapping is a
//! coarse substring heuristic over a configured marker list, not sentiment
//! analysis.

use crate::{KaiwaError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Named avatar animation/expression trigger
///
/// Fixed vocabulary; unknown tag strings are rejected with `InvalidCue`
/// and never crash a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Neutral,
    Positive,
    Listening,
    Speaking,
    Idle,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Neutral => "neutral",
            Cue::Positive => "positive",
            Cue::Listening => "listening",
            Cue::Speaking => "speaking",
            Cue::Idle => "idle",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cue {
    type Err = KaiwaError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "neutral" => Ok(Cue::Neutral),
            "positive" => Ok(Cue::Positive),
            "listening" => Ok(Cue::Listening),
            "speaking" => Ok(Cue::Speaking),
            "idle" => Ok(Cue::Idle),
            other => Err(KaiwaError::InvalidCue(other.to_string())),
        }
    }
}

/// External rendering collaborator. Loads the model, applies scale and
/// position, and plays named clips; kaiwa only hands it cues.
pub trait AvatarRenderer: Send {
    fn apply_cue(&mut self, cue: Cue) -> Result<()>;
}

/// Configuration for cue derivation
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// Positive-sentiment marker substrings, matched case-insensitively
    pub positive_markers: Vec<String>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            positive_markers: vec!["welcome".to_string(), "happy".to_string()],
        }
    }
}

impl AvatarConfig {
    /// Replace the positive marker list
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positive_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

/// Derives cues from responses and forwards them to the renderer
///
/// The renderer may not be initialized yet (model still loading); cues are
/// then skipped silently rather than failing the turn.
pub struct AvatarCueEmitter {
    config: AvatarConfig,
    renderer: Option<Box<dyn AvatarRenderer>>,
}

impl AvatarCueEmitter {
    pub fn new(config: AvatarConfig) -> Self {
        Self {
            config,
            renderer: None,
        }
    }

    /// Attach the rendering collaborator
    pub fn with_renderer(mut self, renderer: Box<dyn AvatarRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Derive a cue tag from generated response text
    ///
    /// Coarse heuristic: any configured marker appearing as a substring
    /// (case-insensitive) makes the response `positive`, else `neutral`.
    pub fn derive_cue(&self, response_text: &str) -> Cue {
        let lower = response_text.to_lowercase();
        let positive = self
            .config
            .positive_markers
            .iter()
            .any(|marker| !marker.is_empty() && lower.contains(&marker.to_lowercase()));

        if positive {
            Cue::Positive
        } else {
            Cue::Neutral
        }
    }

    /// Forward a cue to the renderer
    ///
    /// Renderer failures are logged and swallowed; a cue must never fail
    /// the turn that produced it.
    pub fn apply(&mut self, cue: Cue) {
        match self.renderer.as_mut() {
            Some(renderer) => {
                debug!(%cue, "applying avatar cue");
                if let Err(e) = renderer.apply_cue(cue) {
                    warn!(%cue, "avatar renderer rejected cue: {}", e);
                }
            }
            None => {
                debug!(%cue, "avatar renderer not initialized, skipping cue");
            }
        }
    }

    /// Parse and forward a cue by tag name. Unknown tags are rejected with
    /// `InvalidCue` before reaching the renderer.
    pub fn apply_named(&mut self, tag: &str) -> Result<()> {
        let cue = tag.parse::<Cue>()?;
        self.apply(cue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingRenderer {
        applied: Arc<parking_lot::Mutex<Vec<Cue>>>,
    }

    impl AvatarRenderer for RecordingRenderer {
        fn apply_cue(&mut self, cue: Cue) -> Result<()> {
            self.applied.lock().push(cue);
            Ok(())
        }
    }

    struct FailingRenderer {
        attempts: Arc<AtomicUsize>,
    }

    impl AvatarRenderer for FailingRenderer {
        fn apply_cue(&mut self, _cue: Cue) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(KaiwaError::OutputError("renderer offline".into()))
        }
    }

    #[test]
    fn test_cue_string_round_trip() {
        for cue in [
            Cue::Neutral,
            Cue::Positive,
            Cue::Listening,
            Cue::Speaking,
            Cue::Idle,
        ] {
            assert_eq!(cue.as_str().parse::<Cue>().unwrap(), cue);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = "ecstatic".parse::<Cue>().unwrap_err();
        assert!(matches!(err, KaiwaError::InvalidCue(tag) if tag == "ecstatic"));
    }

    #[test]
    fn test_derive_cue_positive_marker() {
        let emitter = AvatarCueEmitter::new(AvatarConfig::default());
        assert_eq!(emitter.derive_cue("You're welcome!"), Cue::Positive);
        assert_eq!(emitter.derive_cue("I am HAPPY to help."), Cue::Positive);
        assert_eq!(emitter.derive_cue("The capital is Paris."), Cue::Neutral);
    }

    #[test]
    fn test_derive_cue_custom_markers() {
        let config = AvatarConfig::default().with_markers(["great"]);
        let emitter = AvatarCueEmitter::new(config);
        assert_eq!(emitter.derive_cue("That is great news"), Cue::Positive);
        assert_eq!(emitter.derive_cue("You're welcome!"), Cue::Neutral);
    }

    #[test]
    fn test_apply_without_renderer_is_silent() {
        let mut emitter = AvatarCueEmitter::new(AvatarConfig::default());
        // Must not panic or error even though nothing is attached
        emitter.apply(Cue::Positive);
        assert!(emitter.apply_named("idle").is_ok());
    }

    #[test]
    fn test_apply_named_rejects_unknown_before_renderer() {
        let applied = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut emitter = AvatarCueEmitter::new(AvatarConfig::default()).with_renderer(Box::new(
            RecordingRenderer {
                applied: Arc::clone(&applied),
            },
        ));

        assert!(emitter.apply_named("bogus").is_err());
        assert!(applied.lock().is_empty());

        emitter.apply_named("speaking").unwrap();
        assert_eq!(*applied.lock(), vec![Cue::Speaking]);
    }

    #[test]
    fn test_renderer_failure_is_swallowed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut emitter = AvatarCueEmitter::new(AvatarConfig::default()).with_renderer(Box::new(
            FailingRenderer {
                attempts: Arc::clone(&attempts),
            },
        ));

        emitter.apply(Cue::Neutral);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
