//! Audio buffer module
//!
//! A bounded single-producer/single-consumer queue of interleaved `f32`
//! samples, shared between application code and a stream's realtime callback.
//!
//! # Features
//!
//! - Lock-free ring storage (`ringbuf`), allocated once at construction
//! - Each half sits behind its own mutex; the realtime side only ever uses
//!   `try_lock`, so it never waits on the application thread
//! - Length reads go straight to the ring's atomic indices and take no lock
//!
//! # Roles
//!
//! For an output stream the application pushes and the callback pops. For an
//! input stream the callback pushes and the application pops. Each side sticks
//! to its role; `clear()` is rejected while a bound stream is playing.
//!
//! Opening a stream on an interleaved buffer binds its channel count, after
//! which `push` only accepts whole frames.
//!
//! # Example
//!
//! ```
//! use soundport::audio::buffer::AudioBuffer;
//!
//! let buffer = AudioBuffer::with_capacity(4096);
//! buffer.push(&[0.1, 0.2, 0.3]);
//! assert_eq!(buffer.length(), 3);
//!
//! buffer.clear().unwrap();
//! assert_eq!(buffer.length(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};

/// Default capacity: 10 seconds of stereo at 48 kHz
pub const DEFAULT_CAPACITY: usize = 48_000 * 2 * 10;

/// How buffer samples map onto stream channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferLayout {
    /// One sample per channel per frame
    #[default]
    Interleaved,
    /// One sample per frame: copied to every output channel, taken from the
    /// first input channel
    Mono,
}

struct Shared {
    rb: Arc<HeapRb<f32>>,
    producer: Mutex<HeapProd<f32>>,
    consumer: Mutex<HeapCons<f32>>,
    layout: BufferLayout,
    /// Samples per frame of the bound stream, 1 until one is bound
    frame_width: AtomicUsize,
    /// Streams bound to this buffer that are currently playing
    playing: AtomicUsize,
}

/// Shared audio sample queue
///
/// Cloning is cheap and yields another handle to the same queue.
#[derive(Clone)]
pub struct AudioBuffer {
    shared: Arc<Shared>,
}

impl AudioBuffer {
    /// Create a buffer with the configured default capacity
    pub fn new() -> Self {
        Self::with_capacity(crate::state::config::current().buffer.capacity)
    }

    /// Create an interleaved buffer holding up to `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_layout(capacity, BufferLayout::Interleaved)
    }

    /// Create a buffer with an explicit layout
    ///
    /// A zero capacity is raised to one sample.
    pub fn with_layout(capacity: usize, layout: BufferLayout) -> Self {
        let rb = Arc::new(HeapRb::<f32>::new(capacity.max(1)));
        let (producer, consumer) = Arc::clone(&rb).split();

        Self {
            shared: Arc::new(Shared {
                rb,
                producer: Mutex::new(producer),
                consumer: Mutex::new(consumer),
                layout,
                frame_width: AtomicUsize::new(1),
                playing: AtomicUsize::new(0),
            }),
        }
    }

    /// Append samples to the end of the queue
    ///
    /// Once a stream is bound, the accepted count is rounded down to whole
    /// frames so a full buffer never splits one.
    ///
    /// # Returns
    ///
    /// The number of samples accepted; less than `samples.len()` when full
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut producer = lock(&self.shared.producer);
        let width = self.frame_width();
        let fit = samples.len().min(producer.vacant_len());
        producer.push_slice(&samples[..fit - fit % width])
    }

    /// Move up to `output.len()` samples from the front of the queue
    ///
    /// # Returns
    ///
    /// The number of samples written to `output`
    pub fn pop(&self, output: &mut [f32]) -> usize {
        lock(&self.shared.consumer).pop_slice(output)
    }

    /// Move every queued sample into a new `Vec`
    pub fn drain(&self) -> Vec<f32> {
        let mut consumer = lock(&self.shared.consumer);
        let mut output = vec![0.0f32; self.shared.rb.occupied_len()];
        let read = consumer.pop_slice(&mut output);
        output.truncate(read);
        output
    }

    /// Discard every queued sample
    ///
    /// # Errors
    ///
    /// Returns `AudioError::BufferBusy` while a bound stream is playing.
    pub fn clear(&self) -> AudioResult<()> {
        if self.is_bound_to_playing_stream() {
            return Err(AudioError::BufferBusy);
        }
        lock(&self.shared.consumer).clear();
        Ok(())
    }

    /// Number of queued samples
    pub fn length(&self) -> usize {
        self.shared.rb.occupied_len()
    }

    /// Whether no samples are queued
    pub fn is_empty(&self) -> bool {
        self.shared.rb.is_empty()
    }

    /// Free space in samples
    pub fn vacant(&self) -> usize {
        self.shared.rb.vacant_len()
    }

    /// Maximum number of queued samples
    pub fn capacity(&self) -> usize {
        self.shared.rb.capacity().get()
    }

    /// Channel mapping of the queued samples
    pub fn layout(&self) -> BufferLayout {
        self.shared.layout
    }

    /// Samples per frame that `push` keeps together
    pub fn frame_width(&self) -> usize {
        self.shared.frame_width.load(Ordering::Acquire)
    }

    /// Record the channel count of a stream opened on this buffer
    pub(crate) fn bind_channels(&self, channels: usize) {
        let width = match self.shared.layout {
            BufferLayout::Interleaved => channels.max(1),
            BufferLayout::Mono => 1,
        };
        self.shared.frame_width.store(width, Ordering::Release);
    }

    /// Whether any stream bound to this buffer is playing
    pub fn is_bound_to_playing_stream(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire) > 0
    }

    pub(crate) fn mark_playing(&self) {
        self.shared.playing.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn mark_stopped(&self) {
        // Saturating so an unbalanced call cannot wrap the count
        let _ = self
            .shared
            .playing
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Non-blocking access to the consumer half, for the realtime thread
    pub(crate) fn try_consumer(&self) -> Option<MutexGuard<'_, HeapCons<f32>>> {
        try_lock(&self.shared.consumer)
    }

    /// Non-blocking access to the producer half, for the realtime thread
    pub(crate) fn try_producer(&self) -> Option<MutexGuard<'_, HeapProd<f32>>> {
        try_lock(&self.shared.producer)
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("length", &self.length())
            .field("capacity", &self.capacity())
            .field("layout", &self.layout())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(std::sync::TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(std::sync::TryLockError::WouldBlock) => None,
    }
}
