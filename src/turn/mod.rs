pub mod controller;
pub mod types;

pub use controller::{
    ControllerChannels, ControllerCommand, ControllerEvent, Phase, TurnController,
};
pub use types::{Modality, Response, Turn, TurnId, TurnStatus, Utterance};
