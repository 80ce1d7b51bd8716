use crate::MIN_TIME;

/// Exponential one-pole smoother for control-rate scalars.
///
/// Unlike an audio-rate smoother this never runs a per-sample loop: callers
/// advance it in batches with [`step`](SmoothParam::step), which applies the
/// closed form of `n` iterations of the recurrence
/// `value += (1 - d) * (target - value)` in one call:
///
/// ```text
/// value' = target + (value - target) * d^n
/// ```
///
/// where `d` is the per-sample decay derived from the time constant. The
/// trajectory is identical to stepping sample by sample, so the smoothed
/// value can be read at chunk boundaries without ever touching the audio
/// loop.
#[derive(Debug, Clone, Copy)]
pub struct SmoothParam {
    value: f32,
    decay: f32,
}

impl SmoothParam {
    /// `time_constant_secs` is the time to close ~63% of the distance to the
    /// target, as for an RC filter.
    pub fn new(initial: f32, time_constant_secs: f32, sample_rate: f32) -> Self {
        let tc = time_constant_secs.max(MIN_TIME);
        Self {
            value: initial,
            decay: (-1.0 / (tc * sample_rate)).exp(),
        }
    }

    /// Advance the trajectory toward `target` by `n` samples and return the
    /// new value.
    pub fn step(&mut self, target: f32, n: usize) -> f32 {
        let d = self.decay.powi(n as i32);
        self.value = target + (self.value - target) * d;
        self.value
    }

    /// Current smoothed value, without advancing.
    pub fn value(&self) -> f32 {
        self.value
    }
}
