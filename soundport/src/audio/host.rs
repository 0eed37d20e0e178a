//! Audio host registry
//!
//! A host is one audio subsystem (ALSA, CoreAudio, WASAPI, ...). The set of
//! hosts is fixed at compile time; [`available_hosts`] reports which of them
//! can actually be used in this process.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use cpal::traits::HostTrait;
use serde::{Deserialize, Serialize};

use super::backend::virtual_host::VirtualHost;
use super::config::StreamDirection;
use super::device::{Device, DeviceId};
use super::error::{AudioError, AudioResult};

/// Identifier of an audio host
///
/// Stable across builds: variants exist whether or not the backend was
/// compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostId {
    /// Advanced Linux Sound Architecture
    Alsa,
    /// JACK Audio Connection Kit
    Jack,
    /// Windows Audio Session API
    Wasapi,
    /// Steinberg ASIO
    Asio,
    /// Apple CoreAudio
    CoreAudio,
    /// Web Audio via Emscripten
    Emscripten,
    /// Software-clocked devices, always available
    Virtual,
}

/// Every host known to this crate, in catalog order
const ALL_HOSTS: [HostId; 7] = [
    HostId::Alsa,
    HostId::Jack,
    HostId::Wasapi,
    HostId::Asio,
    HostId::CoreAudio,
    HostId::Emscripten,
    HostId::Virtual,
];

impl HostId {
    /// Display name, matching the backend's own naming
    pub fn name(&self) -> &'static str {
        match self {
            HostId::Alsa => "ALSA",
            HostId::Jack => "JACK",
            HostId::Wasapi => "WASAPI",
            HostId::Asio => "ASIO",
            HostId::CoreAudio => "CoreAudio",
            HostId::Emscripten => "Emscripten",
            HostId::Virtual => "Virtual",
        }
    }

    /// The host a platform uses when the caller has no preference
    pub fn platform_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            HostId::Alsa
        }

        #[cfg(target_os = "macos")]
        {
            HostId::CoreAudio
        }

        #[cfg(target_os = "windows")]
        {
            HostId::Wasapi
        }

        #[cfg(target_os = "emscripten")]
        {
            HostId::Emscripten
        }

        #[cfg(not(any(
            target_os = "linux",
            target_os = "macos",
            target_os = "windows",
            target_os = "emscripten"
        )))]
        {
            HostId::Virtual
        }
    }

    /// Whether this host is backed by a native audio subsystem
    pub fn is_native(&self) -> bool {
        *self != HostId::Virtual
    }

    fn from_cpal(id: cpal::HostId) -> Option<Self> {
        let name = id.name().to_lowercase();
        ALL_HOSTS
            .iter()
            .copied()
            .find(|host| host.is_native() && host.name().to_lowercase() == name)
    }

    fn to_cpal(self) -> Option<cpal::HostId> {
        cpal::available_hosts()
            .into_iter()
            .find(|id| HostId::from_cpal(*id) == Some(self))
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every host id this crate knows about, available or not
pub fn all_hosts() -> &'static [HostId] {
    &ALL_HOSTS
}

/// Hosts usable in this process
///
/// Native hosts compiled into the build plus the virtual host, so the list
/// is never empty. Computed once.
pub fn available_hosts() -> &'static [HostId] {
    static AVAILABLE: OnceLock<Vec<HostId>> = OnceLock::new();

    AVAILABLE.get_or_init(|| {
        let mut hosts: Vec<HostId> = cpal::available_hosts()
            .into_iter()
            .filter_map(HostId::from_cpal)
            .collect();
        hosts.push(HostId::Virtual);

        tracing::debug!(hosts = ?hosts, "Audio hosts available");
        hosts
    })
}

/// Open the platform default host
///
/// # Errors
///
/// Returns `AudioError::HostUnavailable` if the platform's backend is missing
/// or fails to initialise.
pub fn default_host() -> AudioResult<Host> {
    host_from_id(HostId::platform_default())
}

/// Open a specific host
///
/// # Errors
///
/// Returns `AudioError::HostUnavailable` if `id` is not in
/// [`available_hosts`] or the backend fails to initialise.
///
/// # Example
///
/// ```
/// use soundport::audio::host::{host_from_id, HostId};
///
/// let host = host_from_id(HostId::Virtual).unwrap();
/// assert_eq!(host.id(), HostId::Virtual);
/// ```
pub fn host_from_id(id: HostId) -> AudioResult<Host> {
    if !available_hosts().contains(&id) {
        tracing::warn!(host = %id, "Audio host not available");
        return Err(AudioError::HostUnavailable(id));
    }

    let inner = match id {
        HostId::Virtual => HostInner::Virtual(VirtualHost::from_config()),
        native => {
            let cpal_id = native.to_cpal().ok_or(AudioError::HostUnavailable(native))?;
            let host = cpal::host_from_id(cpal_id).map_err(|e| {
                tracing::warn!(host = %native, error = %e, "Failed to initialise audio host");
                AudioError::HostUnavailable(native)
            })?;
            HostInner::Native(host, native)
        }
    };

    tracing::info!(host = %id, "Audio host opened");
    Ok(Host {
        inner: Arc::new(inner),
    })
}

enum HostInner {
    Native(cpal::Host, HostId),
    Virtual(VirtualHost),
}

/// An opened audio host
///
/// Cheap to clone; all clones refer to the same backend binding.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Identifier of this host
    pub fn id(&self) -> HostId {
        match &*self.inner {
            HostInner::Native(_, id) => *id,
            HostInner::Virtual(_) => HostId::Virtual,
        }
    }

    /// Display name of this host
    pub fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Every device currently attached, inputs and outputs alike
    ///
    /// Order is backend-defined and may change when hardware changes. Ids
    /// are assigned here, so devices sharing a name still get distinct ids.
    pub fn devices(&self) -> AudioResult<Vec<Device>> {
        let devices = match &*self.inner {
            HostInner::Native(host, id) => {
                number_duplicates(host.devices()?.map(|device| Device::native(device, *id)))
            }
            HostInner::Virtual(host) => number_duplicates(host.devices().map(Device::from_virtual)),
        };

        tracing::debug!(host = %self.id(), count = devices.len(), "Enumerated audio devices");
        Ok(devices)
    }

    /// Devices that can capture, with the same ids `devices()` gives them
    pub fn input_devices(&self) -> AudioResult<Vec<Device>> {
        self.devices_supporting(StreamDirection::Input)
    }

    /// Devices that can play back, with the same ids `devices()` gives them
    pub fn output_devices(&self) -> AudioResult<Vec<Device>> {
        self.devices_supporting(StreamDirection::Output)
    }

    fn devices_supporting(&self, direction: StreamDirection) -> AudioResult<Vec<Device>> {
        Ok(self
            .devices()?
            .into_iter()
            .filter(|device| device.supports(direction))
            .collect())
    }

    /// The system's preferred playback device, if any
    ///
    /// Native backends cannot tell same-named devices apart, so the default
    /// carries the id of the first device with its name.
    pub fn default_output_device(&self) -> Option<Device> {
        match &*self.inner {
            HostInner::Native(host, id) => host
                .default_output_device()
                .map(|device| Device::native(device, *id)),
            HostInner::Virtual(host) => host
                .devices()
                .find(|device| device.supports_output())
                .map(Device::from_virtual),
        }
    }

    /// The system's preferred capture device, if any
    ///
    /// Ids follow the same rule as [`Host::default_output_device`].
    pub fn default_input_device(&self) -> Option<Device> {
        match &*self.inner {
            HostInner::Native(host, id) => host
                .default_input_device()
                .map(|device| Device::native(device, *id)),
            HostInner::Virtual(host) => host
                .devices()
                .find(|device| device.supports_input())
                .map(Device::from_virtual),
        }
    }

    /// Look a device up by id
    ///
    /// Returns `Ok(None)` when no attached device has that id.
    pub fn find_device(&self, id: &DeviceId) -> AudioResult<Option<Device>> {
        Ok(self.devices()?.into_iter().find(|device| device.id() == *id))
    }
}

/// Give each device the first id no earlier device in the list holds
fn number_duplicates(devices: impl Iterator<Item = Device>) -> Vec<Device> {
    let mut taken: HashSet<DeviceId> = HashSet::new();
    devices
        .map(|mut device| {
            let mut occurrence = 1;
            while !taken.insert(device.id()) {
                occurrence += 1;
                device = device.with_occurrence(occurrence);
            }
            device
        })
        .collect()
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("id", &self.id()).finish()
    }
}
