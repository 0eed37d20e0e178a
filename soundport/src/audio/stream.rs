//! Stream lifecycle
//!
//! ```text
//! Created --play--> Playing --pause--> Paused
//!                      ^                  |
//!                      +-------play-------+
//!
//! any state --close/drop--> Stopped
//! ```
//!
//! `play()` opens the callback gate before the backend is started, and
//! `pause()` returns only once no callback is touching the buffer. Closing a
//! stream pauses it, waits, and then releases the backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backend::native::NativeStream;
use super::backend::virtual_host::VirtualStream;
use super::buffer::AudioBuffer;
use super::callback::{StreamShared, StreamStats};
use super::config::{StreamConfig, StreamDirection};
use super::error::{AudioError, AudioResult};

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// Opened, callback never started
    Created,
    /// Callback running
    Playing,
    /// Callback halted, backend resources kept
    Paused,
    /// Closed; backend resources released
    Stopped,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamState::Created => "created",
            StreamState::Playing => "playing",
            StreamState::Paused => "paused",
            StreamState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Backend handle of an open stream
pub(crate) enum StreamHandle {
    Native(NativeStream),
    Virtual(VirtualStream),
}

impl StreamHandle {
    fn play(&self) -> AudioResult<()> {
        match self {
            StreamHandle::Native(stream) => stream.play(),
            StreamHandle::Virtual(stream) => {
                stream.play();
                Ok(())
            }
        }
    }

    fn pause(&self) -> AudioResult<()> {
        match self {
            StreamHandle::Native(stream) => stream.pause(),
            StreamHandle::Virtual(stream) => {
                stream.pause();
                Ok(())
            }
        }
    }
}

/// An open audio stream
///
/// Created by [`Device`](super::device::Device). Dropping the stream closes it.
pub struct AudioStream {
    handle: Option<StreamHandle>,
    state: StreamState,
    direction: StreamDirection,
    config: StreamConfig,
    shared: Arc<StreamShared>,
    /// Bound buffer; `None` for beep streams and after close
    buffer: Option<AudioBuffer>,
}

impl AudioStream {
    pub(crate) fn new(
        handle: StreamHandle,
        direction: StreamDirection,
        config: StreamConfig,
        shared: Arc<StreamShared>,
        buffer: Option<AudioBuffer>,
    ) -> Self {
        Self {
            handle: Some(handle),
            state: StreamState::Created,
            direction,
            config,
            shared,
            buffer,
        }
    }

    /// Start or resume the realtime callback
    ///
    /// Idempotent while playing.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::StreamClosed` after `close()`, or the backend's
    /// error if it fails to start (the stream then keeps its previous state).
    pub fn play(&mut self) -> AudioResult<()> {
        match self.state {
            StreamState::Stopped => Err(AudioError::StreamClosed),
            StreamState::Playing => Ok(()),
            StreamState::Created | StreamState::Paused => {
                let handle = self.handle.as_ref().ok_or(AudioError::StreamClosed)?;

                self.shared.open_gate();
                if let Some(buffer) = &self.buffer {
                    buffer.mark_playing();
                }

                if let Err(e) = handle.play() {
                    self.shared.close_gate();
                    if let Some(buffer) = &self.buffer {
                        buffer.mark_stopped();
                    }
                    tracing::error!(direction = %self.direction, error = %e, "Failed to start stream");
                    return Err(e);
                }

                self.state = StreamState::Playing;
                tracing::info!(direction = %self.direction, config = %self.config, "Stream playing");
                Ok(())
            }
        }
    }

    /// Halt the realtime callback, keeping backend resources
    ///
    /// A no-op in `Created` and `Paused`. On return no callback invocation is
    /// touching the bound buffer.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::StreamClosed` after `close()`.
    pub fn pause(&mut self) -> AudioResult<()> {
        match self.state {
            StreamState::Stopped => Err(AudioError::StreamClosed),
            StreamState::Created | StreamState::Paused => Ok(()),
            StreamState::Playing => {
                self.halt();
                self.state = StreamState::Paused;
                tracing::info!(direction = %self.direction, "Stream paused");
                Ok(())
            }
        }
    }

    /// Stop the stream and release the backend
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == StreamState::Stopped {
            return;
        }

        if self.state == StreamState::Playing {
            self.halt();
        }
        if self.shared.is_open() {
            self.shared.close_gate();
        }

        if let Some(handle) = self.handle.take() {
            drop(handle);
        }
        self.buffer = None;
        self.state = StreamState::Stopped;

        let stats = self.shared.stats();
        tracing::info!(
            direction = %self.direction,
            callbacks = stats.callbacks,
            underruns = stats.underruns,
            overruns = stats.overruns,
            "Stream closed"
        );
    }

    /// Close the gate, then ask the backend to stop scheduling callbacks
    fn halt(&mut self) {
        self.shared.close_gate();

        if let Some(handle) = &self.handle {
            if let Err(e) = handle.pause() {
                // The gate already keeps the callback silent
                tracing::warn!(direction = %self.direction, error = %e, "Backend failed to pause stream");
            }
        }

        if let Some(buffer) = &self.buffer {
            buffer.mark_stopped();
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the callback is running
    pub fn is_playing(&self) -> bool {
        self.state == StreamState::Playing
    }

    /// Input or output
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// Negotiated config
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Buffer bound to this stream, if any
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    /// Runtime counters
    ///
    /// Remain readable after close.
    pub fn stats(&self) -> StreamStats {
        self.shared.stats()
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("state", &self.state)
            .field("direction", &self.direction)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::virtual_host::{VirtualHost, VirtualHostConfig};
    use crate::audio::device::Device;
    use crate::audio::sample::SampleFormat;
    use std::time::{Duration, Instant};

    /// Poll `done` until it holds or a generous deadline passes
    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }

    fn speakers() -> Device {
        VirtualHost::new(&VirtualHostConfig::default())
            .devices()
            .find(|d| d.name() == "Virtual Speakers")
            .map(Device::from_virtual)
            .unwrap()
    }

    fn open() -> (AudioStream, AudioBuffer) {
        let buffer = AudioBuffer::with_capacity(4096);
        let config = StreamConfig::new(48000, 2, SampleFormat::F32).with_buffer_frames(64);
        let stream = speakers().create_output_stream(&config, &buffer).unwrap();
        (stream, buffer)
    }

    #[test]
    fn test_pause_before_play_is_noop() {
        let (mut stream, _buffer) = open();
        assert_eq!(stream.state(), StreamState::Created);
        assert!(stream.pause().is_ok());
        assert_eq!(stream.state(), StreamState::Created);
    }

    #[test]
    fn test_play_pause_idempotent() {
        let (mut stream, _buffer) = open();
        stream.play().unwrap();
        stream.play().unwrap();
        assert_eq!(stream.state(), StreamState::Playing);

        stream.pause().unwrap();
        stream.pause().unwrap();
        assert_eq!(stream.state(), StreamState::Paused);

        stream.play().unwrap();
        assert!(stream.is_playing());
    }

    #[test]
    fn test_closed_stream_rejects_operations() {
        let (mut stream, buffer) = open();
        stream.play().unwrap();
        stream.close();
        stream.close();

        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(stream.play(), Err(AudioError::StreamClosed));
        assert_eq!(stream.pause(), Err(AudioError::StreamClosed));
        assert!(stream.buffer().is_none());
        assert!(buffer.clear().is_ok());
    }

    #[test]
    fn test_buffer_busy_while_playing() {
        let (mut stream, buffer) = open();
        buffer.push(&[0.1; 4]);
        assert!(buffer.clear().is_ok());

        stream.play().unwrap();
        assert_eq!(buffer.clear(), Err(AudioError::BufferBusy));

        stream.pause().unwrap();
        assert!(buffer.clear().is_ok());
    }

    #[test]
    fn test_no_callbacks_after_pause() {
        let (mut stream, _buffer) = open();
        stream.play().unwrap();
        assert!(wait_for(|| stream.stats().callbacks > 0));
        stream.pause().unwrap();

        let frozen = stream.stats();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(stream.stats(), frozen);
        assert!(frozen.callbacks > 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StreamState::Playing.to_string(), "playing");
        assert_eq!(StreamState::Stopped.to_string(), "stopped");
    }
}
