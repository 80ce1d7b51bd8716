//! MusicSession: one engine, one worker, one bounded chunk queue.
//!
//! The worker renders continuously and stays a few chunks ahead; consumers
//! pull encoded chunks at playback cadence with
//! [`next_chunk`](MusicSession::next_chunk). The queue is a single-producer
//! single-consumer ring (`rtrb`), the control inputs are plain atomic
//! scalars with last-write-wins semantics, and every public entry point
//! checks the worker is alive before doing anything else - a dead worker is
//! restarted on the spot, not on a timer.
//!
//! Nothing here blocks without a bound. A consumer that outruns the worker
//! gets one chunk of silence after the timeout instead of an error; a
//! worker that outruns the consumer parks briefly and retries.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::engine::{ConfigError, Engine, EngineConfig};

/// Queue capacity in chunks; 16 x 0.25 s = 4 s of lookahead.
pub const QUEUE_CHUNKS: usize = 16;

/// Bound on how long `next_chunk` waits before emitting silence.
const NEXT_CHUNK_TIMEOUT: Duration = Duration::from_millis(500);
/// Consumer-side poll interval while waiting for a chunk.
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Worker idle time while the queue is comfortably full.
const BACKPRESSURE_IDLE: Duration = Duration::from_millis(25);
/// Worker retry interval on a transiently full queue.
const RETRY_SLEEP: Duration = Duration::from_millis(5);
/// Bound on the cooperative join at teardown.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Control scalars shared with the worker. Focus and volume are f32 bit
/// patterns; a one-chunk-stale read is acceptable, so Relaxed ordering is
/// all the synchronization they get.
struct Shared {
    focus_bits: AtomicU32,
    volume_bits: AtomicU32,
    skip_requested: AtomicBool,
    stop: AtomicBool,
}

/// A generative audio session: engine + background producer + pull API.
pub struct MusicSession {
    engine: Arc<Mutex<Engine>>,
    shared: Arc<Shared>,
    chunk_samples: usize,
    consumer: Consumer<Vec<f32>>,
    worker: Option<JoinHandle<()>>,
}

impl MusicSession {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let chunk_samples = config.chunk_samples;
        let engine = Arc::new(Mutex::new(Engine::new(config)?));
        let shared = Arc::new(Shared {
            focus_bits: AtomicU32::new(50.0f32.to_bits()),
            volume_bits: AtomicU32::new(0.8f32.to_bits()),
            skip_requested: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        let (producer, consumer) = RingBuffer::new(QUEUE_CHUNKS);
        let worker = spawn_worker(
            Arc::clone(&engine),
            Arc::clone(&shared),
            producer,
            chunk_samples,
        );

        Ok(Self {
            engine,
            shared,
            chunk_samples,
            consumer,
            worker: Some(worker),
        })
    }

    /// Latest focus reading in [0, 100]. Arbitrary cadence; last write wins.
    pub fn set_focus(&mut self, value: f32) {
        self.ensure_worker();
        self.shared
            .focus_bits
            .store(value.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    /// Output volume in [0, 1], applied to returned bytes only - engine
    /// gain staging is untouched.
    pub fn set_volume(&mut self, value: f32) {
        self.ensure_worker();
        self.shared
            .volume_bits
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Request an emergency texture change, applied by the worker before
    /// its next render.
    pub fn skip(&mut self) {
        self.ensure_worker();
        self.shared.skip_requested.store(true, Ordering::Relaxed);
    }

    /// Pull one chunk as mono f32 little-endian PCM bytes.
    ///
    /// Waits up to the internal timeout for the worker; past that it
    /// returns a full chunk of silence scaled by volume. "Not ready" is not
    /// a failure, and this never blocks past the bound.
    pub fn next_chunk(&mut self) -> Vec<u8> {
        self.ensure_worker();
        let volume = f32::from_bits(self.shared.volume_bits.load(Ordering::Relaxed));

        let deadline = Instant::now() + NEXT_CHUNK_TIMEOUT;
        loop {
            if let Ok(chunk) = self.consumer.pop() {
                return encode(&chunk, volume);
            }
            if Instant::now() >= deadline {
                log::debug!("chunk queue empty past timeout; emitting silence");
                return encode(&vec![0.0; self.chunk_samples], volume);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Samples per chunk produced by this session.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Restart the worker if it is gone. Called from every public entry
    /// point; chunks buffered by a dead worker are dropped, engine state
    /// and configuration survive.
    fn ensure_worker(&mut self) {
        let alive = self.worker.as_ref().is_some_and(|h| !h.is_finished());
        if alive || self.shared.stop.load(Ordering::Relaxed) {
            return;
        }

        log::warn!("session worker not running; restarting");
        let (producer, consumer) = RingBuffer::new(QUEUE_CHUNKS);
        self.consumer = consumer;
        self.worker = Some(spawn_worker(
            Arc::clone(&self.engine),
            Arc::clone(&self.shared),
            producer,
            self.chunk_samples,
        ));
    }

    #[cfg(test)]
    fn stop_worker_for_test(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.as_ref() {
            while !handle.is_finished() {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    #[cfg(test)]
    fn resume_after_test_stop(&mut self) {
        self.shared.stop.store(false, Ordering::Relaxed);
    }
}

impl Drop for MusicSession {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            // cooperative, bounded join; a wedged worker is detached, not
            // waited on forever
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn spawn_worker(
    engine: Arc<Mutex<Engine>>,
    shared: Arc<Shared>,
    producer: Producer<Vec<f32>>,
    chunk_samples: usize,
) -> JoinHandle<()> {
    thread::spawn(move || worker_loop(engine, shared, producer, chunk_samples))
}

fn worker_loop(
    engine: Arc<Mutex<Engine>>,
    shared: Arc<Shared>,
    mut producer: Producer<Vec<f32>>,
    chunk_samples: usize,
) {
    log::debug!("session worker started");

    while !shared.stop.load(Ordering::Relaxed) {
        // more than half full: plenty of lookahead, let the consumer drain
        if producer.slots() < QUEUE_CHUNKS / 2 {
            thread::sleep(BACKPRESSURE_IDLE);
            continue;
        }

        let mut chunk = vec![0.0f32; chunk_samples];
        {
            // a poisoned lock means a previous worker died mid-render; the
            // engine may be mid-bar but is structurally intact, so keep going
            let mut engine = match engine.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            engine.set_focus(f32::from_bits(shared.focus_bits.load(Ordering::Relaxed)));
            if shared.skip_requested.swap(false, Ordering::Relaxed) {
                engine.skip();
            }
            engine.render_chunk(&mut chunk);
        }

        // transient full queue: retry, never drop the rendered chunk
        let mut pending = chunk;
        loop {
            match producer.push(pending) {
                Ok(()) => break,
                Err(rtrb::PushError::Full(returned)) => {
                    if shared.stop.load(Ordering::Relaxed) {
                        log::debug!("session worker stopped");
                        return;
                    }
                    pending = returned;
                    thread::sleep(RETRY_SLEEP);
                }
            }
        }
    }

    log::debug!("session worker stopped");
}

fn encode(samples: &[f32], volume: f32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for &sample in samples {
        bytes.extend_from_slice(&(sample * volume).to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 8_000,
            chunk_samples: 1_000,
            bpm: 600.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn chunks_have_the_configured_byte_size() {
        let mut session = MusicSession::new(small_config()).unwrap();
        for _ in 0..4 {
            let bytes = session.next_chunk();
            assert_eq!(bytes.len(), 1_000 * 4);
        }
    }

    #[test]
    fn samples_stay_in_range() {
        let mut session = MusicSession::new(small_config()).unwrap();
        session.set_focus(30.0);
        for _ in 0..8 {
            let samples = decode(&session.next_chunk());
            for s in samples {
                assert!((-1.0..=1.0).contains(&s), "sample {s} out of range");
            }
        }
    }

    #[test]
    fn empty_queue_resolves_to_silence_within_the_bound() {
        let mut session = MusicSession::new(small_config()).unwrap();
        // kill the worker and keep it dead: stop stays set, so the liveness
        // check will not revive it
        session.stop_worker_for_test();
        // drain whatever it managed to produce
        while session.consumer.pop().is_ok() {}

        let started = Instant::now();
        let bytes = session.next_chunk();
        let waited = started.elapsed();

        assert!(
            waited < NEXT_CHUNK_TIMEOUT + Duration::from_millis(200),
            "next_chunk blocked past its bound: {waited:?}"
        );
        let samples = decode(&bytes);
        assert_eq!(samples.len(), 1_000);
        assert!(samples.iter().all(|&s| s == 0.0), "timeout chunk is silence");
    }

    #[test]
    fn zero_volume_silences_the_output() {
        let mut session = MusicSession::new(small_config()).unwrap();
        session.set_volume(0.0);
        // volume applies at pull time, so even queued chunks come out muted
        let samples = decode(&session.next_chunk());
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn dead_worker_is_revived_by_public_calls() {
        let mut session = MusicSession::new(small_config()).unwrap();
        session.stop_worker_for_test();
        session.resume_after_test_stop();
        assert!(session.worker.as_ref().unwrap().is_finished());

        // any public call restarts production
        session.set_focus(40.0);
        let bytes = session.next_chunk();
        assert_eq!(bytes.len(), 1_000 * 4);
        assert!(
            session.worker.as_ref().is_some_and(|h| !h.is_finished()),
            "worker should be running again"
        );
    }

    #[test]
    fn skip_is_consumed_without_disrupting_output() {
        let mut session = MusicSession::new(small_config()).unwrap();
        for _ in 0..3 {
            session.skip();
            let bytes = session.next_chunk();
            assert_eq!(bytes.len(), 1_000 * 4);
        }
    }
}
