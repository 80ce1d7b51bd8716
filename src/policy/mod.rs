//! Epsilon-greedy texture selection under delayed, sparse reward.
//!
//! The bandit does not know anything about audio: arms are texture indices,
//! rewards arrive bars later, and most evaluations are dropped before they
//! reach [`Bandit::update`]. All randomness comes from a seeded RNG injected
//! at construction, so two sessions with the same seed make the same picks
//! and tests are deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One selectable texture with its tracked estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BanditArm {
    /// Exact running mean of every reward applied to this arm.
    pub value: f64,
    /// Number of rewards applied.
    pub trials: u32,
}

/// Epsilon-greedy selector over a fixed arm set.
pub struct Bandit {
    arms: Vec<BanditArm>,
    epsilon: f32,
    rng: StdRng,
}

impl Bandit {
    pub fn new(num_arms: usize, epsilon: f32, seed: u64) -> Self {
        Self {
            arms: vec![BanditArm::default(); num_arms],
            epsilon: epsilon.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick the next arm.
    ///
    /// With probability epsilon - or while every arm is still untried - the
    /// pick is uniform. Otherwise the highest value estimate wins; equal
    /// estimates break toward the lowest index, so the order of the texture
    /// table is the tiebreak.
    pub fn select(&mut self) -> usize {
        if self.arms.is_empty() {
            return 0;
        }

        let untried = self.arms.iter().all(|arm| arm.trials == 0);
        if untried || self.rng.gen::<f32>() < self.epsilon {
            return self.rng.gen_range(0..self.arms.len());
        }

        let mut best = 0;
        for (index, arm) in self.arms.iter().enumerate().skip(1) {
            if arm.value > self.arms[best].value {
                best = index;
            }
        }
        best
    }

    /// Incremental-mean update: `value += (reward - value) / (trials + 1)`.
    ///
    /// Callers clamp `reward` to [-1, 1] before applying.
    pub fn update(&mut self, arm: usize, reward: f64) {
        let Some(arm) = self.arms.get_mut(arm) else {
            return;
        };
        arm.value += (reward - arm.value) / (arm.trials as f64 + 1.0);
        arm.trials += 1;
    }

    pub fn arm(&self, index: usize) -> Option<&BanditArm> {
        self.arms.get(index)
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}
