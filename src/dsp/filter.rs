use std::f32::consts::TAU;

/*
One-pole low-pass
=================

The simplest useful filter: a single feedback coefficient.

    y[n] = y[n-1] + alpha * (x[n] - y[n-1])

alpha is derived from the cutoff like an analog RC stage:

    rc    = 1 / (2*pi*cutoff)
    alpha = dt / (rc + dt),  dt = 1 / sample_rate

6 dB/octave rolloff - gentle by synth-filter standards, which is exactly
what an ambient drone wants. The recurrence is order-dependent and the
last output is carried across calls; processing a signal in two blocks
must produce the same samples as processing it in one.
*/

pub struct OnePoleLpf {
    z1: f32, // last output, carried across blocks
    alpha: f32,
    cutoff_hz: f32,
    sample_rate: f32,
}

impl OnePoleLpf {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self {
            z1: 0.0,
            alpha: Self::alpha_for(cutoff_hz, sample_rate),
            cutoff_hz,
            sample_rate,
        }
    }

    fn alpha_for(cutoff_hz: f32, sample_rate: f32) -> f32 {
        let rc = 1.0 / (TAU * cutoff_hz.max(1.0));
        let dt = 1.0 / sample_rate;
        dt / (rc + dt)
    }

    /// Apply the filter across `buffer` in place. State persists into the
    /// next call; there is no implicit reset at block boundaries.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let mut y = self.z1;
        for sample in buffer.iter_mut() {
            y += self.alpha * (*sample - y);
            *sample = y;
        }
        self.z1 = y;
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz;
        self.alpha = Self::alpha_for(cutoff_hz, self.sample_rate);
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }

    #[test]
    fn dc_passes_through() {
        let mut filter = OnePoleLpf::new(500.0, SAMPLE_RATE);
        let mut buffer = vec![1.0; 2048];

        filter.process(&mut buffer);

        assert!(
            buffer[2047] > 0.99,
            "DC should converge to input, got {}",
            buffer[2047]
        );
    }

    #[test]
    fn attenuates_above_cutoff() {
        let mut filter = OnePoleLpf::new(300.0, SAMPLE_RATE);
        let freq = 6_000.0;
        let mut buffer: Vec<f32> = (0..2048)
            .map(|i| (TAU * freq * i as f32 / SAMPLE_RATE).sin())
            .collect();

        filter.process(&mut buffer);

        // 20x the cutoff: expect heavy attenuation after the transient
        let p = peak(&buffer[256..]);
        assert!(p < 0.2, "expected high-frequency attenuation, got peak {p}");
    }

    #[test]
    fn state_carries_across_blocks() {
        let signal: Vec<f32> = (0..512)
            .map(|i| (TAU * 440.0 * i as f32 / SAMPLE_RATE).sin())
            .collect();

        let mut whole = signal.clone();
        let mut filter = OnePoleLpf::new(800.0, SAMPLE_RATE);
        filter.process(&mut whole);

        let mut split = signal;
        let mut filter = OnePoleLpf::new(800.0, SAMPLE_RATE);
        let (a, b) = split.split_at_mut(200);
        filter.process(a);
        filter.process(b);

        for (i, (w, s)) in whole.iter().zip(split.iter()).enumerate() {
            assert!(
                (w - s).abs() < 1e-6,
                "block split changed output at sample {i}: {w} vs {s}"
            );
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut filter = OnePoleLpf::new(500.0, SAMPLE_RATE);
        let mut buffer = vec![1.0; 64];
        filter.process(&mut buffer);

        filter.reset();
        let mut silence = vec![0.0; 64];
        filter.process(&mut silence);
        assert!(peak(&silence) == 0.0, "reset filter should output silence");
    }
}
