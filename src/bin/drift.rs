//! drift - render a focus-adaptive ambient session to a WAV file.
//!
//! Run with: cargo run --bin drift -- [seconds] [output.wav]
//!
//! There is no live focus source here; the render sweeps a scripted focus
//! trajectory (a slow sine between distracted and locked-in) so a full
//! texture/gain cycle is audible in the output.

use std::f32::consts::TAU;

use drift_dsp::{Engine, EngineConfig};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seconds: u32 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 60,
    };
    let path = args.next().unwrap_or_else(|| "drift.wav".to_string());

    let config = EngineConfig::default();
    let sample_rate = config.sample_rate;
    let chunk_samples = config.chunk_samples;
    let mut engine = Engine::new(config)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;

    let total_chunks = (seconds as usize * sample_rate as usize) / chunk_samples;
    let mut chunk = vec![0.0f32; chunk_samples];

    for i in 0..total_chunks {
        // one full focus cycle over the whole render
        let t = i as f32 / total_chunks.max(1) as f32;
        let focus = 50.0 + 40.0 * (TAU * t).sin();
        engine.set_focus(focus);

        engine.render_chunk(&mut chunk);
        for &sample in &chunk {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    println!("rendered {seconds}s to {path}");
    Ok(())
}
