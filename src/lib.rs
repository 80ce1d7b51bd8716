pub mod dsp;
pub mod engine; // Musical grid, crossfades, focus-adaptive mixing
pub mod policy; // Texture selection under delayed reward
#[cfg(feature = "rtrb")]
pub mod session;
pub mod theory; // Notes, chords, progressions
pub mod voices;

pub use engine::{ConfigError, Engine, EngineConfig};
#[cfg(feature = "rtrb")]
pub use session::MusicSession;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Samples per output chunk (0.25 s at 48 kHz).
pub const CHUNK_SAMPLES: usize = 12_000;
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
