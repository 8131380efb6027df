pub mod cues;

pub use cues::{AvatarConfig, AvatarCueEmitter, AvatarRenderer, Cue};
