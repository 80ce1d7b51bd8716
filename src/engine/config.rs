use std::fmt;

use crate::theory::notes;
use crate::voices::TextureMode;
use crate::{CHUNK_SAMPLES, SAMPLE_RATE};

/// Everything the engine needs to know, fixed at construction time.
///
/// Nothing in here is runtime-tunable; the only runtime inputs are focus,
/// volume, and skip. Sessions built from equal configs (including `seed`)
/// produce identical audio for identical focus input.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub bpm: f32,
    /// 16th-note grid positions per bar.
    pub steps_per_bar: u32,
    /// Bars each chord is held before the progression rotates.
    pub bars_per_chord: u32,
    /// Bars per key section; the root list cycles at this interval.
    pub section_len_bars: u64,
    /// Bars between drone pitch retargets.
    pub drone_change_every_bars: u64,
    /// Bars a texture must be held before a scheduled change.
    pub hold_bars: u32,
    pub crossfade_secs: f32,
    /// Emergency changes crossfade over a longer span so a forced switch
    /// stays gentle.
    pub emergency_crossfade_secs: f32,
    /// Bandit exploration rate.
    pub epsilon: f32,
    /// Bars between a texture change and the start of its reward window.
    pub eval_delay_bars: u64,
    /// Width of the reward window in bars.
    pub eval_window_bars: u64,
    /// Probability that a matured evaluation is actually applied.
    pub reward_probability: f32,
    /// Focus smoothing time constant.
    pub focus_smooth_secs: f32,
    /// Master-gain smoothing time constant; slower than focus on purpose.
    pub gain_smooth_secs: f32,
    /// Reward-baseline running-average time constant.
    pub baseline_secs: f32,
    /// Smoothed focus below this may trigger an emergency texture change.
    pub low_focus_threshold: f32,
    /// Master gain at focus 0. The map is linear and decreasing: the
    /// ambience fills in when focus drops and recedes when the listener is
    /// already engaged.
    pub gain_at_zero_focus: f32,
    /// Master gain at focus 100.
    pub gain_at_full_focus: f32,
    pub pad_level: f32,
    pub drone_level: f32,
    pub drone_cutoff_hz: f32,
    /// One-time linear fade-in at engine start.
    pub fade_in_secs: f32,
    /// Selectable pad textures; the bandit's arms index into this table.
    pub textures: Vec<TextureMode>,
    /// Key roots cycled every `section_len_bars`.
    pub roots: Vec<u8>,
    /// Seed for every random decision the engine makes.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_samples: CHUNK_SAMPLES,
            bpm: 84.0,
            steps_per_bar: 16,
            bars_per_chord: 2,
            section_len_bars: 16,
            drone_change_every_bars: 4,
            hold_bars: 8,
            crossfade_secs: 2.5,
            emergency_crossfade_secs: 5.0,
            epsilon: 0.15,
            eval_delay_bars: 2,
            eval_window_bars: 4,
            reward_probability: 0.25,
            focus_smooth_secs: 2.0,
            gain_smooth_secs: 6.0,
            baseline_secs: 60.0,
            low_focus_threshold: 25.0,
            gain_at_zero_focus: 0.9,
            gain_at_full_focus: 0.35,
            pad_level: 0.8,
            drone_level: 0.3,
            drone_cutoff_hz: 600.0,
            fade_in_secs: 2.0,
            textures: default_textures(),
            roots: vec![notes::A2, notes::F2, notes::C3, notes::G2],
            seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.chunk_samples == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        if self.steps_per_bar == 0 || self.bpm <= 0.0 {
            return Err(ConfigError::BadGrid);
        }
        if self.hold_bars == 0 || self.bars_per_chord == 0 {
            return Err(ConfigError::BadGrid);
        }
        if self.eval_window_bars == 0 {
            return Err(ConfigError::EmptyEvalWindow);
        }
        if self.textures.is_empty() {
            return Err(ConfigError::NoTextures);
        }
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        Ok(())
    }

    /// Samples per 16th-note grid step, rounded to the nearest sample.
    pub(crate) fn step_samples(&self) -> usize {
        let beats_per_bar = 4.0;
        let bar_secs = beats_per_bar * 60.0 / self.bpm;
        let step_secs = bar_secs / self.steps_per_bar as f32;
        ((step_secs * self.sample_rate as f32).round() as usize).max(1)
    }
}

/// The five stock textures, ordered dark to bright.
fn default_textures() -> Vec<TextureMode> {
    vec![
        TextureMode {
            name: "still",
            vibrato_depth: 0.002,
            detune_cents: 2.0,
            brightness: 0.10,
        },
        TextureMode {
            name: "dusk",
            vibrato_depth: 0.003,
            detune_cents: 4.0,
            brightness: 0.15,
        },
        TextureMode {
            name: "drift",
            vibrato_depth: 0.004,
            detune_cents: 5.0,
            brightness: 0.25,
        },
        TextureMode {
            name: "bloom",
            vibrato_depth: 0.006,
            detune_cents: 8.0,
            brightness: 0.45,
        },
        TextureMode {
            name: "shimmer",
            vibrato_depth: 0.008,
            detune_cents: 12.0,
            brightness: 0.70,
        },
    ]
}

/// Rejected engine configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroSampleRate,
    ZeroChunk,
    /// Tempo, step count, hold bars, or chord cadence is degenerate.
    BadGrid,
    EmptyEvalWindow,
    NoTextures,
    NoRoots,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroSampleRate => write!(f, "sample rate must be nonzero"),
            ConfigError::ZeroChunk => write!(f, "chunk size must be nonzero"),
            ConfigError::BadGrid => {
                write!(f, "musical grid is degenerate (bpm, steps, hold, or chord cadence)")
            }
            ConfigError::EmptyEvalWindow => write!(f, "evaluation window must span at least one bar"),
            ConfigError::NoTextures => write!(f, "texture table must not be empty"),
            ConfigError::NoRoots => write!(f, "key root list must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_texture_table_is_rejected() {
        let config = EngineConfig {
            textures: Vec::new(),
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoTextures));
    }

    #[test]
    fn zero_eval_window_is_rejected() {
        let config = EngineConfig {
            eval_window_bars: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyEvalWindow));
    }

    #[test]
    fn step_length_matches_tempo() {
        let config = EngineConfig::default();
        // 84 BPM, 4/4: one bar = 16 steps = 60/84*4 seconds
        let bar_samples = config.step_samples() * 16;
        let expected = (4.0 * 60.0 / 84.0 * 48_000.0) as usize;
        assert!(
            (bar_samples as i64 - expected as i64).abs() <= 16,
            "bar length {bar_samples} too far from {expected}"
        );
    }

    #[test]
    fn gain_map_is_decreasing() {
        let config = EngineConfig::default();
        assert!(config.gain_at_zero_focus > config.gain_at_full_focus);
    }
}
