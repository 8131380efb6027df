//! Speech input adapter over the platform recognition engine
//!
//! Wraps whatever recognition capability the platform provides behind a
//! uniform start/stop/result/error contract. The engine itself is an
//! external collaborator; when the platform has none, the adapter is
//! constructed without one and `start()` reports `InputUnavailable`.
//!
//! Every capture session gets its own id and every event carries it, so a
//! terminal event from a stopped session can never be mistaken for the
//! live one: the consumer gates events through `finish_session` and
//! discards mismatches.

use crate::turn::Utterance;
use crate::{KaiwaError, Result};
use tracing::debug;

/// Monotonic capture-session identifier, assigned by the adapter
pub type SessionId = u64;

/// Terminal outcome of a capture session
///
/// A session produces exactly one of these: a recognized utterance, an
/// error with a reason code, or an end with no result (the user produced
/// no speech before the engine timed out). Each is tagged with the session
/// that produced it; a stopped session still delivers its terminal event,
/// which arrives stale and must be discarded by id.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// A non-empty utterance was recognized
    Result {
        session: SessionId,
        utterance: Utterance,
    },

    /// The session failed with an engine reason code
    Error { session: SessionId, reason: String },

    /// The session ended without producing a result
    Ended { session: SessionId },
}

impl RecognitionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            RecognitionEvent::Result { session, .. } => *session,
            RecognitionEvent::Error { session, .. } => *session,
            RecognitionEvent::Ended { session } => *session,
        }
    }
}

/// Platform speech-recognition engine contract
///
/// `start_session` is non-blocking; the engine delivers exactly one
/// terminal `RecognitionEvent` tagged with the given session id on the
/// channel it was constructed with. `stop_session` requests early
/// termination and the engine still delivers its terminal event (`Ended`
/// if nothing was recognized).
pub trait RecognitionEngine: Send {
    fn start_session(&mut self, session: SessionId) -> Result<()>;

    fn stop_session(&mut self);
}

/// Adapter enforcing the single-session contract over the engine
pub struct SpeechInputAdapter {
    engine: Option<Box<dyn RecognitionEngine>>,
    current: Option<SessionId>,
    next_session: SessionId,
}

impl SpeechInputAdapter {
    /// Capability detection happens here, at construction: `None` means
    /// the platform has no recognition engine and the spoken entry point
    /// stays disabled for the session.
    pub fn new(engine: Option<Box<dyn RecognitionEngine>>) -> Self {
        Self {
            engine,
            current: None,
            next_session: 0,
        }
    }

    /// Whether the platform provides recognition at all
    pub fn available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    /// Begin a capture session
    ///
    /// Returns `Ok(Some(id))` when a session was started, `Ok(None)` when
    /// one was already active (a second start is a no-op), or
    /// `InputUnavailable` when the platform lacks the capability.
    pub fn start(&mut self) -> Result<Option<SessionId>> {
        let engine = self.engine.as_mut().ok_or(KaiwaError::InputUnavailable)?;

        if self.current.is_some() {
            debug!("recognition session already active, ignoring start");
            return Ok(None);
        }

        self.next_session += 1;
        let session = self.next_session;
        engine.start_session(session)?;
        self.current = Some(session);
        debug!(session, "recognition session started");
        Ok(Some(session))
    }

    /// Request early termination of the active session
    ///
    /// Safe to call when no session is active. A stopped session's late
    /// terminal event no longer matches and gets discarded.
    pub fn stop(&mut self) {
        let Some(session) = self.current.take() else {
            return;
        };
        if let Some(engine) = self.engine.as_mut() {
            engine.stop_session();
        }
        debug!(session, "recognition session stopped");
    }

    /// Close the session a terminal event belongs to
    ///
    /// Returns `true` when the event is the live session's, `false` when
    /// it is stale (a stopped or superseded session) and must be ignored.
    pub fn finish_session(&mut self, session: SessionId) -> bool {
        if self.current == Some(session) {
            self.current = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        sessions: Arc<Mutex<Vec<SessionId>>>,
        stops: Arc<AtomicUsize>,
    }

    impl RecognitionEngine for CountingEngine {
        fn start_session(&mut self, session: SessionId) -> Result<()> {
            self.sessions.lock().push(session);
            Ok(())
        }

        fn stop_session(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_adapter() -> (SpeechInputAdapter, Arc<Mutex<Vec<SessionId>>>, Arc<AtomicUsize>) {
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(AtomicUsize::new(0));
        let adapter = SpeechInputAdapter::new(Some(Box::new(CountingEngine {
            sessions: Arc::clone(&sessions),
            stops: Arc::clone(&stops),
        })));
        (adapter, sessions, stops)
    }

    #[test]
    fn test_start_without_engine_is_unavailable() {
        let mut adapter = SpeechInputAdapter::new(None);
        assert!(!adapter.available());
        assert!(matches!(
            adapter.start(),
            Err(KaiwaError::InputUnavailable)
        ));
    }

    #[test]
    fn test_second_start_is_noop() {
        let (mut adapter, sessions, _) = counting_adapter();

        assert!(adapter.start().unwrap().is_some());
        assert!(adapter.start().unwrap().is_none());
        assert_eq!(sessions.lock().len(), 1);
        assert!(adapter.is_active());
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let (mut adapter, _, stops) = counting_adapter();

        adapter.stop();
        adapter.stop();
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        adapter.start().unwrap();
        adapter.stop();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!adapter.is_active());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let (mut adapter, sessions, _) = counting_adapter();

        let first = adapter.start().unwrap().unwrap();
        adapter.stop();
        let second = adapter.start().unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(*sessions.lock(), vec![first, second]);
    }

    #[test]
    fn test_finish_session_rejects_stale_ids() {
        let (mut adapter, _, _) = counting_adapter();

        let first = adapter.start().unwrap().unwrap();
        adapter.stop();
        // The stopped session's terminal event arrives late
        assert!(!adapter.finish_session(first));

        let second = adapter.start().unwrap().unwrap();
        assert!(!adapter.finish_session(first));
        assert!(adapter.finish_session(second));
        assert!(!adapter.is_active());
    }

    #[test]
    fn test_finish_session_allows_restart() {
        let (mut adapter, sessions, _) = counting_adapter();

        let first = adapter.start().unwrap().unwrap();
        assert!(adapter.finish_session(first));
        assert!(!adapter.is_active());

        assert!(adapter.start().unwrap().is_some());
        assert_eq!(sessions.lock().len(), 2);
    }
}
