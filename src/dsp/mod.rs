//! Low-level DSP primitives used by the voices and the engine.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! embed directly inside voice structs. They intentionally stay focused on the
//! signal-processing math so the engine can layer on orchestration.
//!
//! All of them carry state across render calls: the filter keeps its last
//! output, the oscillator its phase, the smoother its current value. Nothing
//! here resets between chunks.

/// One-pole low-pass filter with block processing.
pub mod filter;
/// Phase-continuous sine oscillator with instantaneous-frequency rendering.
pub mod oscillator;
/// Batched exponential smoothing for control-rate parameters.
pub mod smooth;

pub use filter::OnePoleLpf;
pub use oscillator::SineOsc;
pub use smooth::SmoothParam;
