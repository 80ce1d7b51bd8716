//! Harmonic pad - sustained, atmospheric texture.
//!
//! Pads are the foundation of ambient music: a lush, evolving backdrop that
//! fills sonic space without demanding attention.
//!
//! # How It Works
//!
//! 1. Up to four sine voices, one per chord note, in fixed slots
//! 2. A single slow vibrato (~0.07 Hz) shared by every voice
//! 3. Fixed symmetric per-voice detune, scaled by the texture's spread
//! 4. A second-harmonic oscillator per voice, gated by brightness
//! 5. The sum is normalized by the number of sounding voices
//!
//! Texture parameters are plain numbers swapped at runtime; the oscillators
//! keep their phase through a swap, so a texture change on its own is
//! inaudible until the parameters drift the sound somewhere new.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::dsp::SineOsc;
use crate::theory::{midi_to_freq, Chord};

/// Voice slots in a pad. Matches the widest chord the engine produces.
pub const MAX_PAD_VOICES: usize = 4;

/// Shared vibrato rate in Hz. Slow enough to read as motion, not wobble.
const VIBRATO_RATE_HZ: f32 = 0.07;

/// Per-voice detune placement, symmetric around the chord tone. Multiplied
/// by the texture's `detune_cents`.
const DETUNE_PATTERN: [f32; MAX_PAD_VOICES] = [-1.0, 0.5, -0.5, 1.0];

/// Level of the second harmonic before the brightness gate.
const SECOND_HARMONIC_LEVEL: f32 = 0.35;

/// Named pad preset: how wide, how wobbly, how bright.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy)]
pub struct TextureMode {
    pub name: &'static str,
    /// Vibrato excursion as a fraction of the voice frequency.
    pub vibrato_depth: f32,
    /// Detune spread in cents applied through [`DETUNE_PATTERN`].
    pub detune_cents: f32,
    /// 0.0 = fundamentals only, 1.0 = full second harmonic.
    pub brightness: f32,
}

struct PadVoice {
    fundamental: SineOsc,
    overtone: SineOsc,
    /// Target frequency in Hz; 0.0 marks a silent slot.
    freq: f32,
}

impl PadVoice {
    fn new() -> Self {
        Self {
            fundamental: SineOsc::new(),
            overtone: SineOsc::new(),
            freq: 0.0,
        }
    }
}

/// Detuned multi-voice harmonic pad.
pub struct HarmPad {
    voices: [PadVoice; MAX_PAD_VOICES],
    vibrato: SineOsc,
    texture: TextureMode,
    sample_rate: f32,
    vib_buf: Vec<f32>,
    freq_buf: Vec<f32>,
    voice_buf: Vec<f32>,
}

impl HarmPad {
    /// `max_block` bounds the scratch buffers; render calls must not exceed
    /// it.
    pub fn new(texture: TextureMode, sample_rate: f32, max_block: usize) -> Self {
        Self {
            voices: [
                PadVoice::new(),
                PadVoice::new(),
                PadVoice::new(),
                PadVoice::new(),
            ],
            vibrato: SineOsc::new(),
            texture,
            sample_rate,
            vib_buf: vec![0.0; max_block],
            freq_buf: vec![0.0; max_block],
            voice_buf: vec![0.0; max_block],
        }
    }

    /// Swap texture parameters in place. Oscillator phase is untouched.
    pub fn set_texture(&mut self, texture: TextureMode) {
        self.texture = texture;
    }

    pub fn texture(&self) -> &TextureMode {
        &self.texture
    }

    /// Retune the voice slots to a chord. Slots beyond the chord length fall
    /// silent; an empty chord silences the whole pad.
    pub fn set_chord(&mut self, chord: &Chord) {
        for (i, voice) in self.voices.iter_mut().enumerate() {
            voice.freq = chord
                .notes()
                .get(i)
                .map(|&note| midi_to_freq(note))
                .unwrap_or(0.0);
        }
    }

    /// Render one block, overwriting `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let n = out.len();
        debug_assert!(n <= self.vib_buf.len());

        let sounding = self.voices.iter().filter(|v| v.freq > 0.0).count();
        if sounding == 0 {
            return;
        }
        let norm = 1.0 / sounding as f32;

        // one vibrato pass shared by every voice
        self.vibrato
            .render_fixed(&mut self.vib_buf[..n], VIBRATO_RATE_HZ, self.sample_rate);

        let depth = self.texture.vibrato_depth;
        let spread = self.texture.detune_cents;
        let brightness = self.texture.brightness;

        for (slot, voice) in self.voices.iter_mut().enumerate() {
            if voice.freq <= 0.0 {
                continue;
            }

            let detuned = voice.freq * 2.0_f32.powf(DETUNE_PATTERN[slot] * spread / 1200.0);
            for i in 0..n {
                self.freq_buf[i] = detuned * (1.0 + depth * self.vib_buf[i]);
            }

            voice
                .fundamental
                .render(&mut self.voice_buf[..n], &self.freq_buf[..n], self.sample_rate);
            for (o, &v) in out.iter_mut().zip(self.voice_buf.iter()) {
                *o += v * norm;
            }

            if brightness > 0.0 {
                for f in self.freq_buf[..n].iter_mut() {
                    *f *= 2.0;
                }
                voice
                    .overtone
                    .render(&mut self.voice_buf[..n], &self.freq_buf[..n], self.sample_rate);
                let level = SECOND_HARMONIC_LEVEL * brightness * norm;
                for (o, &v) in out.iter_mut().zip(self.voice_buf.iter()) {
                    *o += v * level;
                }
            }
        }
    }
}
