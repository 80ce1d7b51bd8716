//! Drone - one continuous overtone under the pad.
//!
//! The drone never retriggers. Pitch changes glide toward the new target,
//! the gain envelope is asymptotic with attack and release time constants
//! measured in seconds, and the one-pole low-pass keeps its state across
//! blocks. Nothing in here can click.

use crate::dsp::{OnePoleLpf, SineOsc};
use crate::theory::midi_to_freq;
use crate::MIN_TIME;

/// Gain envelope time constants.
const ATTACK_SECS: f32 = 1.0;
const RELEASE_SECS: f32 = 4.0;

/// Pitch glide time constant.
const GLIDE_SECS: f32 = 0.3;

/// Slow-attack, slow-release overtone voice with its own low-pass filter.
///
/// The gain trajectory is advanced once per render call in closed form
/// (`d^n` for a block of `n` samples) and applied as a linear ramp across
/// the block. The filter recurrence stays per-sample and order-dependent.
pub struct DroneOvertone {
    osc: SineOsc,
    lpf: OnePoleLpf,
    freq: f32,
    target_freq: f32,
    gain: f32,
    target_gain: f32,
    attack_decay: f32,
    release_decay: f32,
    glide_decay: f32,
    sample_rate: f32,
    freq_buf: Vec<f32>,
}

impl DroneOvertone {
    pub fn new(freq_hz: f32, cutoff_hz: f32, sample_rate: f32, max_block: usize) -> Self {
        let per_sample = |secs: f32| (-1.0 / (secs.max(MIN_TIME) * sample_rate)).exp();
        Self {
            osc: SineOsc::new(),
            lpf: OnePoleLpf::new(cutoff_hz, sample_rate),
            freq: freq_hz,
            target_freq: freq_hz,
            gain: 0.0,
            target_gain: 1.0,
            attack_decay: per_sample(ATTACK_SECS),
            release_decay: per_sample(RELEASE_SECS),
            glide_decay: per_sample(GLIDE_SECS),
            sample_rate,
            freq_buf: vec![0.0; max_block],
        }
    }

    /// Glide toward the pitch of a note. No phase or envelope reset.
    pub fn set_note(&mut self, note: u8) {
        self.target_freq = midi_to_freq(note);
    }

    /// Envelope target in [0, 1]. Raising it engages the attack constant,
    /// lowering it the release constant.
    pub fn set_level(&mut self, level: f32) {
        self.target_gain = level.clamp(0.0, 1.0);
    }

    /// Render one block, overwriting `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        let n = out.len();
        debug_assert!(n <= self.freq_buf.len());
        if n == 0 {
            return;
        }

        // per-sample pitch glide feeding the oscillator
        let mut f = self.freq;
        let glide = 1.0 - self.glide_decay;
        for slot in self.freq_buf[..n].iter_mut() {
            f += (self.target_freq - f) * glide;
            *slot = f;
        }
        self.freq = f;

        self.osc
            .render(out, &self.freq_buf[..n], self.sample_rate);

        // closed-form envelope endpoint for this block, applied as a ramp
        let decay = if self.target_gain > self.gain {
            self.attack_decay
        } else {
            self.release_decay
        };
        let end_gain = self.target_gain + (self.gain - self.target_gain) * decay.powi(n as i32);
        let step = (end_gain - self.gain) / n as f32;
        let mut g = self.gain;
        for sample in out.iter_mut() {
            g += step;
            *sample *= g;
        }
        self.gain = end_gain;

        self.lpf.process(out);
    }

    #[cfg(test)]
    pub fn current_freq(&self) -> f32 {
        self.freq
    }

    #[cfg(test)]
    pub fn target_freq(&self) -> f32 {
        self.target_freq
    }

    #[cfg(test)]
    pub fn level(&self) -> f32 {
        self.gain
    }
}
