//! Native hosts through cpal
//!
//! Translates between cpal's types and ours, and builds monomorphised cpal
//! streams around the shared callback bodies.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::audio::callback::{InputCapturer, OutputRenderer, StreamShared};
use crate::audio::config::{
    BufferSize, StreamConfig, StreamDirection, SupportedBufferSize, SupportedStreamConfigRange,
};
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::sample::{Sample, SampleFormat};

/// Map a cpal format onto the codec's set
///
/// cpal's enum is non-exhaustive; formats added later yield `None`.
pub(crate) fn format_from_cpal(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::I8 => Some(SampleFormat::I8),
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::I16),
        cpal::SampleFormat::U16 => Some(SampleFormat::U16),
        cpal::SampleFormat::I32 => Some(SampleFormat::I32),
        cpal::SampleFormat::U32 => Some(SampleFormat::U32),
        cpal::SampleFormat::I64 => Some(SampleFormat::I64),
        cpal::SampleFormat::U64 => Some(SampleFormat::U64),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32),
        cpal::SampleFormat::F64 => Some(SampleFormat::F64),
        _ => None,
    }
}

pub(crate) fn range_from_cpal(
    range: &cpal::SupportedStreamConfigRange,
) -> Option<SupportedStreamConfigRange> {
    Some(SupportedStreamConfigRange {
        channels: range.channels(),
        min_sample_rate: range.min_sample_rate().0,
        max_sample_rate: range.max_sample_rate().0,
        sample_format: format_from_cpal(range.sample_format())?,
        buffer_size: match range.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => SupportedBufferSize::Range {
                min: *min,
                max: *max,
            },
            cpal::SupportedBufferSize::Unknown => SupportedBufferSize::Unknown,
        },
    })
}

pub(crate) fn config_from_cpal(
    config: &cpal::SupportedStreamConfig,
    direction: StreamDirection,
) -> AudioResult<StreamConfig> {
    let format = format_from_cpal(config.sample_format()).ok_or_else(|| {
        tracing::warn!(format = %config.sample_format(), direction = %direction, "Device default format has no codec");
        AudioError::ConfigUnavailable { direction }
    })?;
    Ok(StreamConfig::new(
        config.sample_rate().0,
        config.channels(),
        format,
    ))
}

fn config_to_cpal(config: &StreamConfig) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: match config.buffer_size {
            BufferSize::Default => cpal::BufferSize::Default,
            BufferSize::Fixed(frames) => cpal::BufferSize::Fixed(frames),
        },
    }
}

pub(crate) fn default_config(
    device: &cpal::Device,
    direction: StreamDirection,
) -> AudioResult<StreamConfig> {
    let config = match direction {
        StreamDirection::Output => device.default_output_config(),
        StreamDirection::Input => device.default_input_config(),
    }
    .map_err(|e| AudioError::from_default_config(e, direction))?;

    config_from_cpal(&config, direction)
}

pub(crate) fn supported_configs(
    device: &cpal::Device,
    direction: StreamDirection,
) -> AudioResult<Vec<SupportedStreamConfigRange>> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        StreamDirection::Output => device.supported_output_configs()?.collect(),
        StreamDirection::Input => device.supported_input_configs()?.collect(),
    };

    Ok(ranges.iter().filter_map(range_from_cpal).collect())
}

/// A cpal stream handle
///
/// Not `Send` on every platform, which is why `AudioStream` is not either.
pub(crate) struct NativeStream {
    stream: cpal::Stream,
}

impl NativeStream {
    pub fn play(&self) -> AudioResult<()> {
        self.stream.play()?;
        Ok(())
    }

    pub fn pause(&self) -> AudioResult<()> {
        self.stream.pause()?;
        Ok(())
    }
}

/// Build a parked output stream for `config`
///
/// I24/U24 have no cpal stream type and are rejected.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    renderer: OutputRenderer,
    shared: Arc<StreamShared>,
) -> AudioResult<NativeStream> {
    match config.sample_format {
        SampleFormat::I8 => build_output::<i8>(device, config, renderer, shared),
        SampleFormat::U8 => build_output::<u8>(device, config, renderer, shared),
        SampleFormat::I16 => build_output::<i16>(device, config, renderer, shared),
        SampleFormat::U16 => build_output::<u16>(device, config, renderer, shared),
        SampleFormat::I32 => build_output::<i32>(device, config, renderer, shared),
        SampleFormat::U32 => build_output::<u32>(device, config, renderer, shared),
        SampleFormat::I64 => build_output::<i64>(device, config, renderer, shared),
        SampleFormat::U64 => build_output::<u64>(device, config, renderer, shared),
        SampleFormat::F32 => build_output::<f32>(device, config, renderer, shared),
        SampleFormat::F64 => build_output::<f64>(device, config, renderer, shared),
        SampleFormat::I24 | SampleFormat::U24 => Err(packed_unsupported(config)),
    }
}

/// Build a parked input stream for `config`
pub(crate) fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    capturer: InputCapturer,
    shared: Arc<StreamShared>,
) -> AudioResult<NativeStream> {
    match config.sample_format {
        SampleFormat::I8 => build_input::<i8>(device, config, capturer, shared),
        SampleFormat::U8 => build_input::<u8>(device, config, capturer, shared),
        SampleFormat::I16 => build_input::<i16>(device, config, capturer, shared),
        SampleFormat::U16 => build_input::<u16>(device, config, capturer, shared),
        SampleFormat::I32 => build_input::<i32>(device, config, capturer, shared),
        SampleFormat::U32 => build_input::<u32>(device, config, capturer, shared),
        SampleFormat::I64 => build_input::<i64>(device, config, capturer, shared),
        SampleFormat::U64 => build_input::<u64>(device, config, capturer, shared),
        SampleFormat::F32 => build_input::<f32>(device, config, capturer, shared),
        SampleFormat::F64 => build_input::<f64>(device, config, capturer, shared),
        SampleFormat::I24 | SampleFormat::U24 => Err(packed_unsupported(config)),
    }
}

fn packed_unsupported(config: &StreamConfig) -> AudioError {
    AudioError::InvalidConfig(format!(
        "{} streams are not supported by native hosts",
        config.sample_format
    ))
}

fn error_callback(shared: Arc<StreamShared>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        shared.record_backend_error();
        tracing::error!(error = %err, "Audio stream error");
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: OutputRenderer,
    shared: Arc<StreamShared>,
) -> AudioResult<NativeStream>
where
    T: Sample + cpal::SizedSample,
{
    let stream = device.build_output_stream(
        &config_to_cpal(config),
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
        error_callback(shared),
        None,
    )?;

    park(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut capturer: InputCapturer,
    shared: Arc<StreamShared>,
) -> AudioResult<NativeStream>
where
    T: Sample + cpal::SizedSample,
{
    let stream = device.build_input_stream(
        &config_to_cpal(config),
        move |data: &[T], _: &cpal::InputCallbackInfo| capturer.capture(data),
        error_callback(shared),
        None,
    )?;

    park(stream)
}

/// Some backends start streams on creation; the gate covers those that
/// cannot pause.
fn park(stream: cpal::Stream) -> AudioResult<NativeStream> {
    if let Err(e) = stream.pause() {
        tracing::debug!(error = %e, "Backend cannot pause a new stream");
    }
    Ok(NativeStream { stream })
}
