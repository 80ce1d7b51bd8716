//! Musical building blocks: note numbers, chords, and progressions.
//!
//! Everything here is plain data. Pitch only becomes frequency at the voice
//! layer, via [`midi_to_freq`].

/// Chords and rotating chord progressions.
pub mod chords;
/// Note-number constants and the 12-TET tuning reference.
pub mod notes;

pub use chords::{Chord, ChordProgression, MAX_CHORD_NOTES};
pub use notes::midi_to_freq;
