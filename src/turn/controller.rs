//! Turn controller: the conversational state machine
//!
//! Sequences speech capture, remote inference, response presentation,
//! speech playback and avatar cues for one turn at a time, and resolves
//! barge-in: a new input preempts whatever turn is in flight by forcing it
//! to a terminal `Cancelled` status before the new turn begins, atomically
//! within one handler call.
//!
//! All adapter completions arrive as typed events over channels consumed
//! by a single `select!` loop, so controller logic runs to completion
//! between suspension points and the at-most-one-active-turn invariant
//! holds without locks. Cancellation is cooperative: an in-flight
//! inference round trip is never aborted, its result is checked against
//! the active turn id on arrival and discarded when stale.

use crate::avatar::{AvatarCueEmitter, Cue};
use crate::inference::{InferenceCommand, InferenceEvent};
use crate::messages::{Message, Transcript};
use crate::speech::{RecognitionEvent, SpeechInputAdapter, SpeechOutputAdapter, SynthesisEvent};
use crate::turn::types::{Response, Turn, TurnId, TurnStatus};
use crate::KaiwaError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Commands accepted from the presentation layer
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Submit typed input; skips the listening stage
    SubmitText(String),

    /// Begin a speech capture session
    StartListening,

    /// End the capture session early, discarding any partial capture
    StopListening,

    /// Clear the in-session transcript
    ClearTranscript,

    /// Shut the controller down
    Shutdown,
}

/// Events emitted for the presentation layer
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A capture session began
    ListeningStarted,

    /// The capture session ended without producing a turn
    ListeningStopped,

    /// A user message entered the transcript
    UserMessage(Message),

    /// A response entered the transcript; always emitted before speech
    /// playback begins for it
    AssistantMessage(Message),

    /// Speech playback began for a turn
    SpeechStarted { turn: TurnId },

    /// A turn finished presenting (playback done or abandoned)
    SpeechFinished { turn: TurnId },

    /// A turn failed; `message` is the user-facing apology, `detail` the
    /// distinguishing status line
    TurnFailed { message: String, detail: String },

    /// The spoken entry point is disabled for the rest of the session
    InputDisabled(String),

    /// The controller has shut down
    Shutdown,
}

/// Controller state as seen from outside
///
/// Terminal turn statuses never appear here; a terminal turn leaves the
/// active slot immediately, which reads as `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Inferring,
    Presenting,
}

/// Receivers the controller loop selects over
pub struct ControllerChannels {
    pub command_rx: UnboundedReceiver<ControllerCommand>,
    pub recognition_rx: UnboundedReceiver<RecognitionEvent>,
    pub inference_rx: UnboundedReceiver<InferenceEvent>,
    pub synthesis_rx: UnboundedReceiver<SynthesisEvent>,
}

/// The turn state machine and its collaborators
pub struct TurnController {
    input: SpeechInputAdapter,
    output: SpeechOutputAdapter,
    avatar: AvatarCueEmitter,
    transcript: Transcript,
    inference_tx: UnboundedSender<InferenceCommand>,
    event_tx: UnboundedSender<ControllerEvent>,

    /// The single active-turn slot; written only here, compared by id by
    /// every completion handler before acting
    active: Option<Turn>,

    next_turn_id: TurnId,

    /// Set once the platform reports no recognition capability; the
    /// spoken entry point then stays disabled for the session
    input_disabled: bool,
}

impl TurnController {
    pub fn new(
        input: SpeechInputAdapter,
        output: SpeechOutputAdapter,
        avatar: AvatarCueEmitter,
        transcript: Transcript,
        inference_tx: UnboundedSender<InferenceCommand>,
        event_tx: UnboundedSender<ControllerEvent>,
    ) -> Self {
        Self {
            input,
            output,
            avatar,
            transcript,
            inference_tx,
            event_tx,
            active: None,
            next_turn_id: 0,
            input_disabled: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.active.as_ref().map(|t| t.status) {
            Some(TurnStatus::Listening) => Phase::Listening,
            Some(TurnStatus::Inferring) => Phase::Inferring,
            Some(TurnStatus::Presenting) => Phase::Presenting,
            _ => Phase::Idle,
        }
    }

    pub fn active_turn(&self) -> Option<&Turn> {
        self.active.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run the event loop until shutdown
    pub async fn run(mut self, mut channels: ControllerChannels) {
        info!("turn controller started");

        loop {
            tokio::select! {
                Some(command) = channels.command_rx.recv() => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(event) = channels.recognition_rx.recv() => {
                    self.handle_recognition(event);
                }
                Some(event) = channels.inference_rx.recv() => {
                    self.handle_inference(event);
                }
                Some(event) = channels.synthesis_rx.recv() => {
                    self.handle_synthesis(event);
                }
                else => break,
            }
        }

        info!("turn controller stopped");
        let _ = self.event_tx.send(ControllerEvent::Shutdown);
    }

    /// Process one command. Returns `false` on shutdown.
    pub fn handle_command(&mut self, command: ControllerCommand) -> bool {
        match command {
            ControllerCommand::SubmitText(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    debug!("ignoring empty text submission");
                    return true;
                }
                self.cancel_active("typed input");
                let turn = Turn::typed(self.next_id(), text);
                info!(turn = turn.id, "typed turn started");
                self.start_inference(turn, false);
            }
            ControllerCommand::StartListening => self.start_listening(),
            ControllerCommand::StopListening => self.stop_listening(),
            ControllerCommand::ClearTranscript => {
                info!("clearing transcript");
                self.transcript.clear();
            }
            ControllerCommand::Shutdown => {
                info!("controller shutdown requested");
                self.cancel_active("shutdown");
                let _ = self.inference_tx.send(InferenceCommand::Shutdown);
                return false;
            }
        }
        true
    }

    /// Process a terminal event from a capture session
    ///
    /// A stopped session still delivers its terminal event, so every
    /// event is checked against the live session id first; stale events
    /// are discarded without touching the active turn.
    pub fn handle_recognition(&mut self, event: RecognitionEvent) {
        let session = event.session();
        if !self.input.finish_session(session) {
            debug!(session, "discarding event from a superseded capture session");
            return;
        }

        match event {
            RecognitionEvent::Result { utterance, .. } => {
                // The live session's turn should be in the active slot;
                // the fallbacks keep a valid utterance from being lost.
                let mut turn = match self.active.take() {
                    Some(t) if t.status == TurnStatus::Listening => t,
                    Some(t) => {
                        self.cancel_turn(t, "spoken barge-in");
                        Turn::spoken(self.next_id())
                    }
                    None => Turn::spoken(self.next_id()),
                };

                turn.text = utterance.into_text();
                info!(turn = turn.id, "utterance recognized");
                self.start_inference(turn, true);
            }
            RecognitionEvent::Error { reason, .. } => {
                match self.active.take() {
                    Some(mut turn) if turn.status == TurnStatus::Listening => {
                        turn.status = TurnStatus::Failed;
                        let err = KaiwaError::InputError(reason);
                        warn!(turn = turn.id, "recognition failed: {}", err);
                        let _ = self.event_tx.send(ControllerEvent::TurnFailed {
                            message: err.user_message(),
                            detail: err.to_string(),
                        });
                        self.avatar.apply(Cue::Idle);
                    }
                    other => {
                        self.active = other;
                        debug!("recognition error outside a capture turn: {}", reason);
                    }
                }
            }
            RecognitionEvent::Ended { .. } => {
                match self.active.take() {
                    Some(mut turn) if turn.status == TurnStatus::Listening => {
                        turn.cancelled = true;
                        turn.status = TurnStatus::Cancelled;
                        info!(turn = turn.id, "capture session ended with no result");
                        self.avatar.apply(Cue::Idle);
                        let _ = self.event_tx.send(ControllerEvent::ListeningStopped);
                    }
                    other => {
                        self.active = other;
                        debug!("capture session end outside a capture turn");
                    }
                }
            }
        }
    }

    /// Process an inference completion
    ///
    /// A result whose turn id no longer matches the active turn belongs
    /// to a cancelled turn and is discarded: no response, no cue, no
    /// speech.
    pub fn handle_inference(&mut self, event: InferenceEvent) {
        let InferenceEvent::Completed { turn: turn_id, result } = event;

        let mut turn = match self.active.take() {
            Some(t) if t.id == turn_id && t.status == TurnStatus::Inferring => t,
            other => {
                self.active = other;
                debug!(turn = turn_id, "discarding inference result for inactive turn");
                return;
            }
        };

        match result {
            Ok(text) => {
                let cue = self.avatar.derive_cue(&text);
                turn.status = TurnStatus::Presenting;
                turn.response = Some(Response {
                    text: text.clone(),
                    cue,
                });
                info!(turn = turn.id, %cue, "presenting response");

                // Ordering: text display, then the cue, and both before
                // speech playback begins.
                let message = self
                    .transcript
                    .push(Message::assistant(&text).with_spoken(true));
                let _ = self
                    .event_tx
                    .send(ControllerEvent::AssistantMessage(message));
                self.avatar.apply(cue);

                match self.output.speak(&text, turn.id) {
                    Ok(()) => {
                        let _ = self
                            .event_tx
                            .send(ControllerEvent::SpeechStarted { turn: turn.id });
                        self.active = Some(turn);
                    }
                    Err(e) => {
                        // Audio is best-effort; the text is already shown
                        warn!(turn = turn.id, "speech playback failed: {}", e);
                        turn.status = TurnStatus::Completed;
                        self.avatar.apply(Cue::Idle);
                        let _ = self
                            .event_tx
                            .send(ControllerEvent::SpeechFinished { turn: turn.id });
                    }
                }
            }
            Err(e) => {
                turn.status = TurnStatus::Failed;
                warn!(turn = turn.id, "inference failed: {}", e);
                let _ = self.event_tx.send(ControllerEvent::TurnFailed {
                    message: e.user_message(),
                    detail: e.to_string(),
                });
                self.avatar.apply(Cue::Idle);
            }
        }
    }

    /// Process a playback completion signal
    pub fn handle_synthesis(&mut self, event: SynthesisEvent) {
        let (turn_id, error) = match event {
            SynthesisEvent::Finished { turn } => (turn, None),
            SynthesisEvent::Error { turn, reason } => (turn, Some(reason)),
        };

        let mut turn = match self.active.take() {
            Some(t) if t.id == turn_id && t.status == TurnStatus::Presenting => t,
            other => {
                self.active = other;
                debug!(turn = turn_id, "ignoring playback signal for inactive turn");
                return;
            }
        };

        self.output.playback_finished(turn_id);

        if let Some(reason) = error {
            // Success-adjacent: the text stays visible
            warn!(turn = turn.id, "speech playback error: {}", reason);
        }

        turn.status = TurnStatus::Completed;
        info!(turn = turn.id, "turn completed");
        self.avatar.apply(Cue::Idle);
        let _ = self
            .event_tx
            .send(ControllerEvent::SpeechFinished { turn: turn.id });
    }

    fn start_listening(&mut self) {
        if self.input_disabled {
            debug!("spoken entry point disabled for this session, ignoring start");
            return;
        }
        if self.phase() == Phase::Listening {
            debug!("already listening, ignoring start");
            return;
        }

        self.cancel_active("new capture session");

        match self.input.start() {
            Ok(_) => {
                let turn = Turn::spoken(self.next_id());
                info!(turn = turn.id, "capture session started");
                self.active = Some(turn);
                self.avatar.apply(Cue::Listening);
                let _ = self.event_tx.send(ControllerEvent::ListeningStarted);
            }
            Err(KaiwaError::InputUnavailable) => {
                self.input_disabled = true;
                warn!("speech input unavailable, disabling the spoken entry point");
                let _ = self.event_tx.send(ControllerEvent::InputDisabled(
                    KaiwaError::InputUnavailable.user_message(),
                ));
            }
            Err(e) => {
                warn!("failed to start capture session: {}", e);
                let _ = self.event_tx.send(ControllerEvent::TurnFailed {
                    message: e.user_message(),
                    detail: e.to_string(),
                });
            }
        }
    }

    fn stop_listening(&mut self) {
        if self.phase() != Phase::Listening {
            // Stop on an inactive session is a no-op
            self.input.stop();
            return;
        }

        self.input.stop();
        if let Some(mut turn) = self.active.take() {
            turn.cancelled = true;
            turn.status = TurnStatus::Cancelled;
            info!(turn = turn.id, "capture session stopped with no result");
        }
        self.avatar.apply(Cue::Idle);
        let _ = self.event_tx.send(ControllerEvent::ListeningStopped);
    }

    /// Move a turn with its input text into `Inferring` and dispatch the
    /// prompt to the inference worker
    fn start_inference(&mut self, mut turn: Turn, spoken: bool) {
        let prompt = turn.text.clone();
        turn.status = TurnStatus::Inferring;

        let message = self.transcript.push(Message::user(&prompt).with_spoken(spoken));
        let _ = self.event_tx.send(ControllerEvent::UserMessage(message));

        match self.inference_tx.send(InferenceCommand::Generate {
            turn: turn.id,
            prompt,
        }) {
            Ok(()) => {
                self.active = Some(turn);
            }
            Err(e) => {
                let err = KaiwaError::ChannelError(e.to_string());
                warn!(turn = turn.id, "inference worker unreachable: {}", err);
                turn.status = TurnStatus::Failed;
                let _ = self.event_tx.send(ControllerEvent::TurnFailed {
                    message: err.user_message(),
                    detail: err.to_string(),
                });
                self.avatar.apply(Cue::Idle);
            }
        }
    }

    /// Force the active turn, if any, to terminal `Cancelled`
    ///
    /// The caller begins the next turn in the same handler call, so
    /// cancellation and the new turn's entry are atomic from the outside.
    fn cancel_active(&mut self, reason: &str) {
        if let Some(turn) = self.active.take() {
            self.cancel_turn(turn, reason);
        }
    }

    fn cancel_turn(&mut self, mut turn: Turn, reason: &str) {
        debug!(turn = turn.id, reason, "cancelling turn");
        match turn.status {
            TurnStatus::Listening => self.input.stop(),
            // The round trip continues; its result is discarded on arrival
            TurnStatus::Inferring => {}
            TurnStatus::Presenting => self.output.cancel(),
            _ => {}
        }
        turn.cancelled = true;
        turn.status = TurnStatus::Cancelled;
    }

    fn next_id(&mut self) -> TurnId {
        self.next_turn_id += 1;
        self.next_turn_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::AvatarConfig;
    use crate::speech::SpeechOutputConfig;
    use tokio::sync::mpsc;

    struct Harness {
        controller: TurnController,
        inference_rx: UnboundedReceiver<InferenceCommand>,
        event_rx: UnboundedReceiver<ControllerEvent>,
    }

    /// Controller with no platform engines attached
    fn harness() -> Harness {
        let (synthesis_tx, _synthesis_rx) = mpsc::unbounded_channel();
        let (inference_tx, inference_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let controller = TurnController::new(
            SpeechInputAdapter::new(None),
            SpeechOutputAdapter::new(SpeechOutputConfig::default(), None, synthesis_tx),
            AvatarCueEmitter::new(AvatarConfig::default()),
            Transcript::new(),
            inference_tx,
            event_tx,
        );

        Harness {
            controller,
            inference_rx,
            event_rx,
        }
    }

    #[test]
    fn test_empty_text_submission_is_ignored() {
        let mut h = harness();

        assert!(h
            .controller
            .handle_command(ControllerCommand::SubmitText("   ".into())));
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert!(h.inference_rx.try_recv().is_err());
        assert!(h.controller.transcript().is_empty());
    }

    #[test]
    fn test_typed_submission_enters_inferring() {
        let mut h = harness();

        h.controller
            .handle_command(ControllerCommand::SubmitText("hello".into()));

        assert_eq!(h.controller.phase(), Phase::Inferring);
        let turn = h.controller.active_turn().unwrap();
        assert_eq!(turn.text, "hello");

        match h.inference_rx.try_recv().unwrap() {
            InferenceCommand::Generate { turn: id, prompt } => {
                assert_eq!(id, turn.id);
                assert_eq!(prompt, "hello");
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(matches!(
            h.event_rx.try_recv().unwrap(),
            ControllerEvent::UserMessage(_)
        ));
    }

    #[test]
    fn test_unavailable_input_disables_entry_point_once() {
        let mut h = harness();

        h.controller.handle_command(ControllerCommand::StartListening);
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert!(matches!(
            h.event_rx.try_recv().unwrap(),
            ControllerEvent::InputDisabled(_)
        ));

        // Second attempt is silently ignored for the rest of the session
        h.controller.handle_command(ControllerCommand::StartListening);
        assert!(h.event_rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_listening_when_idle_is_noop() {
        let mut h = harness();

        h.controller.handle_command(ControllerCommand::StopListening);
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert!(h.event_rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_inference_result_is_discarded() {
        let mut h = harness();

        h.controller
            .handle_command(ControllerCommand::SubmitText("first".into()));
        let first_id = h.controller.active_turn().unwrap().id;

        // Barge-in with a second typed turn cancels the first
        h.controller
            .handle_command(ControllerCommand::SubmitText("second".into()));
        let second_id = h.controller.active_turn().unwrap().id;
        assert_ne!(first_id, second_id);

        // Late result for the cancelled turn must not produce a response
        h.controller.handle_inference(InferenceEvent::Completed {
            turn: first_id,
            result: Ok("stale".into()),
        });
        assert_eq!(h.controller.phase(), Phase::Inferring);
        assert_eq!(h.controller.active_turn().unwrap().id, second_id);
        assert!(h.controller.active_turn().unwrap().response.is_none());
    }

    #[test]
    fn test_inference_failure_returns_to_idle() {
        let mut h = harness();

        h.controller
            .handle_command(ControllerCommand::SubmitText("hello".into()));
        let id = h.controller.active_turn().unwrap().id;

        h.controller.handle_inference(InferenceEvent::Completed {
            turn: id,
            result: Err(KaiwaError::InferenceServiceError {
                status: 500,
                message: "quota exceeded".into(),
            }),
        });

        assert_eq!(h.controller.phase(), Phase::Idle);

        // UserMessage first, then the failure
        let mut saw_failure = false;
        while let Ok(event) = h.event_rx.try_recv() {
            if let ControllerEvent::TurnFailed { detail, .. } = event {
                assert!(detail.contains("quota exceeded"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[test]
    fn test_clear_transcript() {
        let mut h = harness();

        h.controller
            .handle_command(ControllerCommand::SubmitText("hello".into()));
        assert_eq!(h.controller.transcript().len(), 1);

        h.controller
            .handle_command(ControllerCommand::ClearTranscript);
        assert!(h.controller.transcript().is_empty());
    }

    #[test]
    fn test_shutdown_stops_the_loop_and_worker() {
        let mut h = harness();

        assert!(!h.controller.handle_command(ControllerCommand::Shutdown));
        assert!(matches!(
            h.inference_rx.try_recv().unwrap(),
            InferenceCommand::Shutdown
        ));
    }

    #[test]
    fn test_turn_ids_are_monotonic() {
        let mut h = harness();

        let mut last = 0;
        for i in 0..5 {
            h.controller
                .handle_command(ControllerCommand::SubmitText(format!("msg {}", i)));
            let id = h.controller.active_turn().unwrap().id;
            assert!(id > last);
            last = id;
        }
    }
}
