//! Realtime callback bodies
//!
//! Everything in this module may run on a backend's realtime thread. The data
//! paths here never allocate, never block on a lock and never log: buffer
//! halves are taken with `try_lock`, scratch space is sized at stream-open
//! time, and problems are reported through atomic counters only.
//!
//! # Gate
//!
//! Each stream owns a [`StreamShared`] whose `active` flag and `in_flight`
//! marker form a two-flag handshake with the application thread:
//!
//! - the callback raises `in_flight`, then checks `active`
//! - `pause()` lowers `active`, then waits for `in_flight` to drop
//!
//! With sequentially consistent ordering at least one side sees the other,
//! so once `close_gate()` returns no invocation is touching the buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Producer};
use serde::{Deserialize, Serialize};

use super::buffer::{AudioBuffer, BufferLayout};
use super::config::MAX_CALLBACK_FRAMES;
use super::sample::Sample;

/// Snapshot of a stream's runtime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Data callbacks that ran while the stream was playing
    pub callbacks: u64,
    /// Hardware frames handled by those callbacks
    pub frames: u64,
    /// Output callbacks that could not be fully served from the buffer
    pub underruns: u64,
    /// Input callbacks that could not store every captured frame
    pub overruns: u64,
    /// Captured samples discarded by overruns
    pub dropped_samples: u64,
    /// Errors reported by the backend's error callback
    pub backend_errors: u64,
}

/// State shared between a stream handle and its callbacks
#[derive(Debug, Default)]
pub(crate) struct StreamShared {
    active: AtomicBool,
    in_flight: AtomicBool,
    callbacks: AtomicU64,
    frames: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    dropped_samples: AtomicU64,
    backend_errors: AtomicU64,
}

/// Marks a callback invocation as in flight until dropped
pub(crate) struct GateGuard<'a> {
    shared: &'a StreamShared,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::SeqCst);
    }
}

impl StreamShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let callbacks through
    pub fn open_gate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop callbacks and wait for one that is already running
    ///
    /// The wait is bounded by a single callback period.
    pub fn close_gate(&self) {
        self.active.store(false, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Enter the gate from a callback
    ///
    /// Returns `None` while the stream is not playing.
    pub fn enter(&self) -> Option<GateGuard<'_>> {
        self.in_flight.store(true, Ordering::SeqCst);
        if self.active.load(Ordering::SeqCst) {
            Some(GateGuard { shared: self })
        } else {
            self.in_flight.store(false, Ordering::SeqCst);
            None
        }
    }

    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }

    fn record_callback(&self, frames: usize) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

/// Deterministic sine source for beep streams
///
/// Emits the same value on every channel of a frame.
#[derive(Debug, Clone)]
pub struct BeepGenerator {
    phase: f64,
    increment: f64,
    amplitude: f32,
}

impl BeepGenerator {
    /// Create a generator at `frequency_hz` for a stream at `sample_rate`
    ///
    /// The amplitude is clamped to `[0.0, 1.0]`.
    pub fn new(frequency_hz: f32, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            increment: f64::from(frequency_hz) / f64::from(sample_rate.max(1)),
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    /// Value of the next frame
    pub fn next_sample(&mut self) -> f32 {
        let value = (self.phase * std::f64::consts::TAU).sin() as f32 * self.amplitude;
        self.phase = (self.phase + self.increment).fract();
        value
    }
}

/// Where an output stream's samples come from
pub(crate) enum OutputSource {
    Buffer(AudioBuffer),
    Beep(BeepGenerator),
}

/// Output callback body
pub(crate) struct OutputRenderer {
    source: OutputSource,
    channels: usize,
    shared: Arc<StreamShared>,
    scratch: Box<[f32]>,
}

impl OutputRenderer {
    pub fn new(source: OutputSource, channels: u16, shared: Arc<StreamShared>) -> Self {
        let channels = usize::from(channels.max(1));
        if let OutputSource::Buffer(buffer) = &source {
            buffer.bind_channels(channels);
        }
        Self {
            source,
            channels,
            shared,
            scratch: vec![0.0; MAX_CALLBACK_FRAMES * channels].into_boxed_slice(),
        }
    }

    /// Fill one hardware period
    pub fn render<T: Sample>(&mut self, out: &mut [T]) {
        let Self {
            source,
            channels,
            shared,
            scratch,
        } = self;
        let channels = *channels;

        let Some(_gate) = shared.enter() else {
            out.fill(T::EQUILIBRIUM);
            return;
        };

        let frames = out.len() / channels;
        shared.record_callback(frames);

        let whole = frames * channels;
        out[whole..].fill(T::EQUILIBRIUM);
        let out = &mut out[..whole];

        match source {
            OutputSource::Beep(beep) => {
                for frame in out.chunks_exact_mut(channels) {
                    frame.fill(T::from_f32(beep.next_sample()));
                }
            }
            OutputSource::Buffer(buffer) => {
                let complete = render_from_buffer(buffer, channels, scratch, out);
                if !complete {
                    shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Drain whole frames from `buffer` into `out`, padding with silence
///
/// Returns false when the buffer could not supply every frame. A partial
/// frame left at the front on an underrun is discarded so the next period
/// starts on a frame boundary.
fn render_from_buffer<T: Sample>(
    buffer: &AudioBuffer,
    channels: usize,
    scratch: &mut [f32],
    out: &mut [T],
) -> bool {
    let Some(mut consumer) = buffer.try_consumer() else {
        out.fill(T::EQUILIBRIUM);
        return out.is_empty();
    };

    let layout = buffer.layout();
    let per_frame = match layout {
        BufferLayout::Interleaved => channels,
        BufferLayout::Mono => 1,
    };

    let mut complete = true;
    for chunk in out.chunks_mut(MAX_CALLBACK_FRAMES * channels) {
        let wanted = chunk.len() / channels;
        let available = buffer.length() / per_frame;
        let take = wanted.min(available);

        let staged = &mut scratch[..take * per_frame];
        let read = consumer.pop_slice(staged) / per_frame;

        match layout {
            BufferLayout::Interleaved => {
                for (dst, src) in chunk.iter_mut().zip(&staged[..read * channels]) {
                    *dst = T::from_f32(*src);
                }
            }
            BufferLayout::Mono => {
                for (frame, src) in chunk.chunks_exact_mut(channels).zip(&staged[..read]) {
                    frame.fill(T::from_f32(*src));
                }
            }
        }

        chunk[read * channels..].fill(T::EQUILIBRIUM);
        if read < wanted {
            complete = false;
        }
    }

    if !complete && per_frame > 1 {
        // Pushes after binding are whole frames, so the remainder is the stray
        consumer.skip(buffer.length() % per_frame);
    }

    complete
}

/// Input callback body
pub(crate) struct InputCapturer {
    buffer: AudioBuffer,
    channels: usize,
    shared: Arc<StreamShared>,
    scratch: Box<[f32]>,
}

impl InputCapturer {
    pub fn new(buffer: AudioBuffer, channels: u16, shared: Arc<StreamShared>) -> Self {
        let channels = usize::from(channels.max(1));
        buffer.bind_channels(channels);
        Self {
            buffer,
            channels,
            shared,
            scratch: vec![0.0; MAX_CALLBACK_FRAMES * channels].into_boxed_slice(),
        }
    }

    /// Store one hardware period
    ///
    /// Frames that do not fit are dropped (newest first) and counted.
    pub fn capture<T: Sample>(&mut self, data: &[T]) {
        let Self {
            buffer,
            channels,
            shared,
            scratch,
        } = self;
        let channels = *channels;

        let Some(_gate) = shared.enter() else {
            return;
        };

        let frames = data.len() / channels;
        shared.record_callback(frames);

        let per_frame = match buffer.layout() {
            BufferLayout::Interleaved => channels,
            BufferLayout::Mono => 1,
        };

        let lost = match buffer.try_producer() {
            Some(mut producer) => {
                let mut lost = 0;
                for chunk in data[..frames * channels].chunks(MAX_CALLBACK_FRAMES * channels) {
                    let chunk_frames = chunk.len() / channels;
                    let fit = chunk_frames.min(buffer.vacant() / per_frame);
                    let staged = &mut scratch[..fit * per_frame];

                    if per_frame == 1 && channels > 1 {
                        for (dst, frame) in staged.iter_mut().zip(chunk.chunks_exact(channels)) {
                            *dst = frame[0].to_f32();
                        }
                    } else {
                        for (dst, src) in staged.iter_mut().zip(chunk) {
                            *dst = src.to_f32();
                        }
                    }

                    let pushed = producer.push_slice(staged);
                    lost += chunk_frames * per_frame - pushed;
                }
                lost
            }
            None => frames * per_frame,
        };

        if lost > 0 {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            shared
                .dropped_samples
                .fetch_add(lost as u64, Ordering::Relaxed);
        }
    }
}
