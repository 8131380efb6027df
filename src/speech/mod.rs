pub mod input;
pub mod output;

pub use input::{RecognitionEngine, RecognitionEvent, SessionId, SpeechInputAdapter};
pub use output::{
    SpeechOutputAdapter, SpeechOutputConfig, SynthesisEngine, SynthesisEvent, Voice,
};
