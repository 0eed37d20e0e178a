use std::sync::Arc;

use cpal::traits::DeviceTrait;
use serde::{Deserialize, Serialize};

use crate::audio::backend::native::{self, NativeStream};
use crate::audio::backend::virtual_host::VirtualDevice;
use crate::audio::buffer::AudioBuffer;
use crate::audio::callback::{BeepGenerator, InputCapturer, OutputRenderer, OutputSource, StreamShared};
use crate::audio::config::{StreamConfig, StreamDirection, SupportedStreamConfigRange};
use crate::audio::error::AudioResult;
use crate::audio::host::HostId;
use crate::audio::stream::{AudioStream, StreamHandle};

/// Device identifier, unique within a host for a process run
///
/// Formatted as `<host>:<name>`. When several devices share a name, later
/// ones in enumeration order get `:<n>` appended (`:2`, `:3`, ...).
/// Hot-plugging may invalidate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    fn new(host: HostId, name: &str, occurrence: usize) -> Self {
        if occurrence > 1 {
            Self(format!("{}:{}:{}", host.name(), name, occurrence))
        } else {
            Self(format!("{}:{}", host.name(), name))
        }
    }

    /// The identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directions a device supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Capture only
    Input,
    /// Playback only
    Output,
    /// Capture and playback
    Duplex,
}

impl DeviceType {
    /// Whether streams in `direction` can be opened
    pub fn supports(&self, direction: StreamDirection) -> bool {
        matches!(
            (self, direction),
            (DeviceType::Duplex, _)
                | (DeviceType::Input, StreamDirection::Input)
                | (DeviceType::Output, StreamDirection::Output)
        )
    }

    fn from_directions(input: bool, output: bool) -> Option<Self> {
        match (input, output) {
            (true, true) => Some(DeviceType::Duplex),
            (true, false) => Some(DeviceType::Input),
            (false, true) => Some(DeviceType::Output),
            (false, false) => None,
        }
    }
}

/// Transport a device is attached through
///
/// Native backends do not report this; it is inferred from the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Usb,
    Hdmi,
    Bluetooth,
    Virtual,
    Other,
}

impl InterfaceType {
    fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("usb") {
            InterfaceType::Usb
        } else if lower.contains("hdmi") || lower.contains("displayport") {
            InterfaceType::Hdmi
        } else if lower.contains("bluetooth") || lower.contains("bluez") || lower.contains("airpods") {
            InterfaceType::Bluetooth
        } else {
            InterfaceType::Other
        }
    }
}

/// Metadata describing a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    /// Human-readable device name
    pub name: String,
    /// Host the device belongs to
    pub host: HostId,
    /// Supported directions, `None` if the backend reports neither
    pub device_type: Option<DeviceType>,
    /// Attachment transport
    pub interface_type: InterfaceType,
}

#[derive(Clone)]
enum DeviceInner {
    Native(cpal::Device, HostId),
    Virtual(VirtualDevice),
}

/// One audio endpoint
///
/// Cheap to clone. Streams opened from a device do not borrow it.
#[derive(Clone)]
pub struct Device {
    inner: DeviceInner,
    name: Arc<str>,
    occurrence: usize,
}

impl Device {
    pub(crate) fn native(device: cpal::Device, host: HostId) -> Self {
        let name = device.name().unwrap_or_else(|e| {
            tracing::warn!(host = %host, error = %e, "Failed to read device name");
            "Unknown device".to_string()
        });
        Self {
            inner: DeviceInner::Native(device, host),
            name: name.into(),
            occurrence: 1,
        }
    }

    pub(crate) fn from_virtual(device: VirtualDevice) -> Self {
        let name = Arc::from(device.name());
        Self {
            inner: DeviceInner::Virtual(device),
            name,
            occurrence: 1,
        }
    }

    /// Mark this as the `occurrence`-th device of its name on the host
    pub(crate) fn with_occurrence(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence.max(1);
        self
    }

    /// Whether streams in `direction` can be opened
    ///
    /// Native devices are checked the same way cpal filters its input and
    /// output lists.
    pub(crate) fn supports(&self, direction: StreamDirection) -> bool {
        match &self.inner {
            DeviceInner::Native(device, _) => match direction {
                StreamDirection::Input => device
                    .supported_input_configs()
                    .map(|mut configs| configs.next().is_some())
                    .unwrap_or(false),
                StreamDirection::Output => device
                    .supported_output_configs()
                    .map(|mut configs| configs.next().is_some())
                    .unwrap_or(false),
            },
            DeviceInner::Virtual(device) => device.device_type().supports(direction),
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host this device belongs to
    pub fn host(&self) -> HostId {
        match &self.inner {
            DeviceInner::Native(_, host) => *host,
            DeviceInner::Virtual(_) => HostId::Virtual,
        }
    }

    /// Identifier, unique within the host for this process run
    pub fn id(&self) -> DeviceId {
        DeviceId::new(self.host(), &self.name, self.occurrence)
    }

    /// Name, host, directions and transport
    ///
    /// For native devices the directions are queried from the backend.
    pub fn description(&self) -> DeviceDescription {
        let (device_type, interface_type) = match &self.inner {
            DeviceInner::Native(..) => (
                DeviceType::from_directions(
                    self.supports(StreamDirection::Input),
                    self.supports(StreamDirection::Output),
                ),
                InterfaceType::from_name(&self.name),
            ),
            DeviceInner::Virtual(device) => (Some(device.device_type()), InterfaceType::Virtual),
        };

        DeviceDescription {
            name: self.name.to_string(),
            host: self.host(),
            device_type,
            interface_type,
        }
    }

    /// Default playback config
    ///
    /// # Errors
    ///
    /// Returns `AudioError::ConfigUnavailable` if the device cannot play back.
    pub fn default_output_config(&self) -> AudioResult<StreamConfig> {
        self.default_config(StreamDirection::Output)
    }

    /// Default capture config
    ///
    /// # Errors
    ///
    /// Returns `AudioError::ConfigUnavailable` if the device cannot capture.
    pub fn default_input_config(&self) -> AudioResult<StreamConfig> {
        self.default_config(StreamDirection::Input)
    }

    /// Playback capability ranges
    ///
    /// May be empty when the backend cannot report ranges; callers should
    /// then use the default config.
    pub fn supported_output_configs(&self) -> AudioResult<Vec<SupportedStreamConfigRange>> {
        self.supported_configs(StreamDirection::Output)
    }

    /// Capture capability ranges
    pub fn supported_input_configs(&self) -> AudioResult<Vec<SupportedStreamConfigRange>> {
        self.supported_configs(StreamDirection::Input)
    }

    fn default_config(&self, direction: StreamDirection) -> AudioResult<StreamConfig> {
        match &self.inner {
            DeviceInner::Native(device, _) => native::default_config(device, direction),
            DeviceInner::Virtual(device) => device.default_config(direction),
        }
    }

    fn supported_configs(
        &self,
        direction: StreamDirection,
    ) -> AudioResult<Vec<SupportedStreamConfigRange>> {
        match &self.inner {
            DeviceInner::Native(device, _) => native::supported_configs(device, direction),
            DeviceInner::Virtual(device) => device.supported_configs(direction),
        }
    }

    /// Check `config` against the device before opening a stream
    fn negotiate(&self, config: &StreamConfig, direction: StreamDirection) -> AudioResult<()> {
        let ranges = self.supported_configs(direction)?;
        let default = self.default_config(direction).ok();

        config.negotiate(&ranges, default.as_ref()).inspect_err(|e| {
            tracing::warn!(device = %self.name, direction = %direction, error = %e, "Stream config rejected");
        })
    }

    /// Open a playback stream that reads from `buffer`
    ///
    /// The stream starts in the `Created` state; call `play()` to start it.
    ///
    /// # Arguments
    /// * `config` - Requested config; must fit a supported range or equal the default
    /// * `buffer` - Source of samples; the application pushes, the stream pops
    ///
    /// # Errors
    /// Returns `AudioError::InvalidConfig` if `config` is not supported (it is never clamped).
    /// Returns `AudioError::DeviceBusy` if the device is held exclusively.
    ///
    /// # Example
    /// ```no_run
    /// use soundport::audio::{default_host, AudioBuffer};
    ///
    /// let host = default_host().unwrap();
    /// let device = host.default_output_device().unwrap();
    /// let config = device.default_output_config().unwrap();
    ///
    /// let buffer = AudioBuffer::new();
    /// let mut stream = device.create_output_stream(&config, &buffer).unwrap();
    /// buffer.push(&[0.0; 4800]);
    /// stream.play().unwrap();
    /// ```
    pub fn create_output_stream(
        &self,
        config: &StreamConfig,
        buffer: &AudioBuffer,
    ) -> AudioResult<AudioStream> {
        self.negotiate(config, StreamDirection::Output)?;
        self.open_output(*config, OutputSource::Buffer(buffer.clone()), Some(buffer.clone()))
    }

    /// Open a capture stream that writes into `buffer`
    ///
    /// # Errors
    /// Same as [`Device::create_output_stream`].
    pub fn create_input_stream(
        &self,
        config: &StreamConfig,
        buffer: &AudioBuffer,
    ) -> AudioResult<AudioStream> {
        self.negotiate(config, StreamDirection::Input)?;

        let config = *config;
        let shared = StreamShared::new();
        let capturer = InputCapturer::new(buffer.clone(), config.channels, Arc::clone(&shared));

        let handle = match &self.inner {
            DeviceInner::Native(device, _) => StreamHandle::Native(native::build_input_stream(
                device,
                &config,
                capturer,
                Arc::clone(&shared),
            )?),
            DeviceInner::Virtual(device) => StreamHandle::Virtual(device.open_input(&config, capturer)?),
        };

        tracing::info!(device = %self.name, config = %config, "Input stream created");
        Ok(AudioStream::new(
            handle,
            StreamDirection::Input,
            config,
            shared,
            Some(buffer.clone()),
        ))
    }

    /// Open a playback stream fed by an internal sine generator
    ///
    /// Uses the default output config. Frequency and amplitude come from the
    /// `beep` section of the configuration.
    pub fn create_beep_stream(&self) -> AudioResult<AudioStream> {
        let config = self.default_output_config()?;
        let beep = crate::state::config::current().beep.clone();
        let generator = BeepGenerator::new(beep.frequency_hz, beep.amplitude, config.sample_rate);

        self.open_output(config, OutputSource::Beep(generator), None)
    }

    fn open_output(
        &self,
        config: StreamConfig,
        source: OutputSource,
        buffer: Option<AudioBuffer>,
    ) -> AudioResult<AudioStream> {
        let shared = StreamShared::new();
        let renderer = OutputRenderer::new(source, config.channels, Arc::clone(&shared));

        let handle = match &self.inner {
            DeviceInner::Native(device, _) => {
                let stream: NativeStream =
                    native::build_output_stream(device, &config, renderer, Arc::clone(&shared))?;
                StreamHandle::Native(stream)
            }
            DeviceInner::Virtual(device) => StreamHandle::Virtual(device.open_output(&config, renderer)?),
        };

        tracing::info!(device = %self.name, config = %config, beep = buffer.is_none(), "Output stream created");
        Ok(AudioStream::new(
            handle,
            StreamDirection::Output,
            config,
            shared,
            buffer,
        ))
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id())
            .field("host", &self.host())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::virtual_host::{VirtualHost, VirtualHostConfig};
    use crate::audio::error::AudioError;
    use crate::audio::sample::SampleFormat;

    fn virtual_device(name: &str) -> Device {
        VirtualHost::new(&VirtualHostConfig::default())
            .devices()
            .find(|d| d.name() == name)
            .map(Device::from_virtual)
            .unwrap()
    }

    #[test]
    fn test_device_id_format() {
        let device = virtual_device("Virtual Speakers");
        assert_eq!(device.id().as_str(), "Virtual:Virtual Speakers");
        assert_eq!(device.host(), HostId::Virtual);
    }

    #[test]
    fn test_repeated_name_gets_suffix() {
        let device = virtual_device("Virtual Speakers").with_occurrence(2);
        assert_eq!(device.id().as_str(), "Virtual:Virtual Speakers:2");
        assert_eq!(device.name(), "Virtual Speakers");
    }

    #[test]
    fn test_description() {
        let description = virtual_device("Virtual Microphone").description();
        assert_eq!(description.name, "Virtual Microphone");
        assert_eq!(description.device_type, Some(DeviceType::Input));
        assert_eq!(description.interface_type, InterfaceType::Virtual);
    }

    #[test]
    fn test_device_type_supports() {
        assert!(DeviceType::Duplex.supports(StreamDirection::Input));
        assert!(DeviceType::Duplex.supports(StreamDirection::Output));
        assert!(!DeviceType::Input.supports(StreamDirection::Output));
        assert_eq!(DeviceType::from_directions(false, false), None);
    }

    #[test]
    fn test_interface_from_name() {
        assert_eq!(InterfaceType::from_name("USB Audio CODEC"), InterfaceType::Usb);
        assert_eq!(InterfaceType::from_name("HDA Intel HDMI 0"), InterfaceType::Hdmi);
        assert_eq!(InterfaceType::from_name("Built-in Output"), InterfaceType::Other);
    }

    #[test]
    fn test_missing_direction() {
        let microphone = virtual_device("Virtual Microphone");
        assert_eq!(
            microphone.default_output_config(),
            Err(AudioError::ConfigUnavailable {
                direction: StreamDirection::Output
            })
        );
        let buffer = AudioBuffer::with_capacity(16);
        let config = StreamConfig::new(48000, 1, SampleFormat::F32);
        assert!(microphone.create_output_stream(&config, &buffer).is_err());
    }

    #[test]
    fn test_out_of_range_config_is_rejected() {
        let speakers = virtual_device("Virtual Speakers");
        let buffer = AudioBuffer::with_capacity(16);

        let config = StreamConfig::new(384_000, 2, SampleFormat::F32);
        assert!(matches!(
            speakers.create_output_stream(&config, &buffer),
            Err(AudioError::InvalidConfig(_))
        ));
    }
}
