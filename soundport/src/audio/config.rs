//! Stream configuration and capability ranges
//!
//! A [`StreamConfig`] is what the application asks for; a
//! [`SupportedStreamConfigRange`] is what a device reports it can do.
//! Negotiation never clamps: a config either fits a range or is rejected.

use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};
use super::sample::SampleFormat;

/// Maximum frames a single callback chunk converts at once
///
/// Callbacks asking for more are processed in several chunks of this size,
/// so the scratch space can be allocated once at stream-open time.
pub const MAX_CALLBACK_FRAMES: usize = 8192;

/// Direction of a stream relative to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// Capture: the backend writes into the buffer
    Input,
    /// Playback: the backend reads from the buffer
    Output,
}

impl std::fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamDirection::Input => f.write_str("input"),
            StreamDirection::Output => f.write_str("output"),
        }
    }
}

/// Requested hardware buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend choose
    #[default]
    Default,
    /// Request a specific period in frames
    Fixed(u32),
}

impl BufferSize {
    /// Frames requested, or None for the backend default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Buffer sizes a device accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SupportedBufferSize {
    /// Inclusive frame range
    Range {
        /// Smallest accepted period
        min: u32,
        /// Largest accepted period
        max: u32,
    },
    /// The backend cannot report a range
    #[default]
    Unknown,
}

/// A negotiated stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Native sample format on the device side
    pub sample_format: SampleFormat,
    /// Requested period size
    #[serde(default)]
    pub buffer_size: BufferSize,
}

impl StreamConfig {
    /// Create a config with the backend's default buffer size
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
            buffer_size: BufferSize::Default,
        }
    }

    /// Request a fixed period size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Check the structural invariants that do not depend on a device
    pub fn validate(&self) -> AudioResult<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidConfig(
                "channel count must be positive".to_string(),
            ));
        }
        if self.buffer_size == BufferSize::Fixed(0) {
            return Err(AudioError::InvalidConfig(
                "fixed buffer size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Check this config against a device's reported ranges
    ///
    /// With no ranges reported the config must equal the device default in
    /// rate, channels and format.
    pub fn negotiate(
        &self,
        ranges: &[SupportedStreamConfigRange],
        default: Option<&StreamConfig>,
    ) -> AudioResult<()> {
        self.validate()?;

        if ranges.is_empty() {
            return match default {
                Some(default) if self.matches_format_of(default) => Ok(()),
                Some(default) => Err(AudioError::InvalidConfig(format!(
                    "{} is not the device default ({}) and no ranges are reported",
                    self, default
                ))),
                None => Err(AudioError::InvalidConfig(format!(
                    "{} cannot be verified: device reports no capabilities",
                    self
                ))),
            };
        }

        if ranges.iter().any(|range| range.contains(self)) {
            Ok(())
        } else {
            Err(AudioError::InvalidConfig(format!(
                "{} is outside every supported range",
                self
            )))
        }
    }

    /// Rate, channels and format are equal (buffer size ignored)
    pub fn matches_format_of(&self, other: &StreamConfig) -> bool {
        self.sample_rate == other.sample_rate
            && self.channels == other.channels
            && self.sample_format == other.sample_format
    }

    /// Samples in `frames` frames of this config
    pub fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

impl std::fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate, self.channels, self.sample_format
        )?;
        if let BufferSize::Fixed(frames) = self.buffer_size {
            write!(f, ", {} frames", frames)?;
        }
        Ok(())
    }
}

/// One capability range reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedStreamConfigRange {
    /// Exact channel count of this range
    pub channels: u16,
    /// Lowest supported sample rate
    pub min_sample_rate: u32,
    /// Highest supported sample rate
    pub max_sample_rate: u32,
    /// Native format of this range
    pub sample_format: SampleFormat,
    /// Accepted period sizes
    #[serde(default)]
    pub buffer_size: SupportedBufferSize,
}

impl SupportedStreamConfigRange {
    /// Whether `config` lies inside this range
    pub fn contains(&self, config: &StreamConfig) -> bool {
        let buffer_ok = match (config.buffer_size, self.buffer_size) {
            (BufferSize::Fixed(frames), SupportedBufferSize::Range { min, max }) => {
                (min..=max).contains(&frames)
            }
            _ => true,
        };

        config.channels == self.channels
            && config.sample_format == self.sample_format
            && (self.min_sample_rate..=self.max_sample_rate).contains(&config.sample_rate)
            && buffer_ok
    }

    /// Pick a concrete config at `sample_rate`, if the range covers it
    pub fn with_sample_rate(&self, sample_rate: u32) -> Option<StreamConfig> {
        (self.min_sample_rate..=self.max_sample_rate)
            .contains(&sample_rate)
            .then(|| StreamConfig::new(sample_rate, self.channels, self.sample_format))
    }

    /// Pick the highest rate of the range
    pub fn with_max_sample_rate(&self) -> StreamConfig {
        StreamConfig::new(self.max_sample_rate, self.channels, self.sample_format)
    }
}
