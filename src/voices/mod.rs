//! The two sound sources of the engine.
//!
//! [`HarmPad`] carries the harmony: up to four detuned sine voices following
//! the current chord, shaped by a hot-swappable [`TextureMode`]. Two pad
//! instances exist side by side so the engine can crossfade between textures
//! without interrupting either.
//!
//! [`DroneOvertone`] sits underneath: one continuous overtone that glides
//! between chord roots and breathes on time constants measured in seconds.

mod drone;
mod pad;

pub use drone::DroneOvertone;
pub use pad::{HarmPad, TextureMode, MAX_PAD_VOICES};
