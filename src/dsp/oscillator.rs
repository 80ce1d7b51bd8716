use std::f32::consts::TAU;

/// Phase-continuous sine oscillator.
///
/// Phase persists across render calls, so retuning a voice glides through
/// the waveform instead of clicking. [`render`](SineOsc::render) takes an
/// instantaneous-frequency series (Hz per output sample), which is how the
/// pad applies vibrato and the drone applies pitch glides: phase is the
/// cumulative sum of `2*pi*f[i]/sr` on top of the persisted offset.
///
/// Accumulated phase is wrapped back into `[0, 2*pi)` after every block so
/// long-running sessions do not lose precision to a growing phase value.
pub struct SineOsc {
    phase: f32,
}

impl SineOsc {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    /// Render one block. `freq` holds the instantaneous frequency in Hz for
    /// each output sample and must be at least as long as `out`.
    pub fn render(&mut self, out: &mut [f32], freq: &[f32], sample_rate: f32) {
        debug_assert!(freq.len() >= out.len());

        let mut phase = self.phase;
        for (o, &f) in out.iter_mut().zip(freq.iter()) {
            *o = phase.sin();
            phase += TAU * f / sample_rate;
        }
        self.phase = phase.rem_euclid(TAU);
    }

    /// Render one block at a fixed frequency.
    pub fn render_fixed(&mut self, out: &mut [f32], freq: f32, sample_rate: f32) {
        let increment = TAU * freq / sample_rate;
        let mut phase = self.phase;
        for o in out.iter_mut() {
            *o = phase.sin();
            phase += increment;
        }
        self.phase = phase.rem_euclid(TAU);
    }

    #[cfg(test)]
    pub fn phase(&self) -> f32 {
        self.phase
    }
}
