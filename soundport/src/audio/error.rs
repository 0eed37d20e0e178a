use thiserror::Error;

use super::config::StreamDirection;
use super::host::HostId;

/// Audio-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Backend is not compiled in or cannot be initialised
    #[error("Audio host '{0}' is not available")]
    HostUnavailable(HostId),

    /// Device does not support the requested direction
    #[error("Device does not support {direction} streams")]
    ConfigUnavailable {
        /// Direction that was asked for
        direction: StreamDirection,
    },

    /// Requested config is not supported by the device
    #[error("Invalid stream config: {0}")]
    InvalidConfig(String),

    /// Device is held exclusively by another stream or process
    #[error("Audio device is busy: {0}")]
    DeviceBusy(String),

    /// Device disappeared (unplugged, driver reset)
    #[error("Audio device is no longer available: {0}")]
    DeviceNotAvailable(String),

    /// Operation on a stream that has been closed
    #[error("Audio stream has been closed")]
    StreamClosed,

    /// Buffer mutation while a bound stream is playing
    #[error("Audio buffer is bound to a playing stream")]
    BufferBusy,

    /// Backend error with no portable equivalent
    #[error("Audio backend error: {0}")]
    BackendSpecific(String),
}

impl AudioError {
    /// Whether the caller can reasonably retry or pick an alternative
    ///
    /// `StreamClosed` and `BufferBusy` are programming errors.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AudioError::StreamClosed | AudioError::BufferBusy | AudioError::BackendSpecific(_)
        )
    }

    /// Translate a cpal default-config failure for a given direction
    pub fn from_default_config(
        err: cpal::DefaultStreamConfigError,
        direction: StreamDirection,
    ) -> Self {
        match err {
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                AudioError::ConfigUnavailable { direction }
            }
            other => other.into(),
        }
    }
}

/// Classify a backend-specific description
///
/// Native backends only report exclusive-access conflicts as text
/// (ALSA: "Device or resource busy", WASAPI: "AUDCLNT_E_DEVICE_IN_USE").
fn backend_specific(err: cpal::BackendSpecificError) -> AudioError {
    let lower = err.description.to_lowercase();
    if lower.contains("busy") || lower.contains("in_use") || lower.contains("in use") {
        AudioError::DeviceBusy(err.description)
    } else {
        AudioError::BackendSpecific(err.description)
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        match err {
            cpal::DevicesError::BackendSpecific { err } => backend_specific(err),
            #[allow(unreachable_patterns)]
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        match err {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                AudioError::DeviceNotAvailable(err.to_string())
            }
            cpal::SupportedStreamConfigsError::BackendSpecific { err } => backend_specific(err),
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                AudioError::DeviceNotAvailable(err.to_string())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => backend_specific(err),
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotAvailable(err.to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument => AudioError::InvalidConfig(err.to_string()),
            cpal::BuildStreamError::BackendSpecific { err } => backend_specific(err),
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotAvailable(err.to_string())
            }
            cpal::PlayStreamError::BackendSpecific { err } => backend_specific(err),
            #[allow(unreachable_patterns)]
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        match err {
            cpal::PauseStreamError::DeviceNotAvailable => {
                AudioError::DeviceNotAvailable(err.to_string())
            }
            cpal::PauseStreamError::BackendSpecific { err } => backend_specific(err),
            #[allow(unreachable_patterns)]
            other => AudioError::BackendSpecific(other.to_string()),
        }
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(AudioError::HostUnavailable(HostId::Asio).is_recoverable());
        assert!(AudioError::DeviceBusy("hw:0".into()).is_recoverable());
        assert!(AudioError::InvalidConfig("x".into()).is_recoverable());
        assert!(!AudioError::StreamClosed.is_recoverable());
        assert!(!AudioError::BufferBusy.is_recoverable());
    }

    #[test]
    fn test_busy_backend_errors_map_to_device_busy() {
        let err = cpal::BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "ALSA function 'snd_pcm_open' failed: Device or resource busy".into(),
            },
        };
        assert!(matches!(AudioError::from(err), AudioError::DeviceBusy(_)));

        let err = cpal::BuildStreamError::StreamConfigNotSupported;
        assert!(matches!(AudioError::from(err), AudioError::InvalidConfig(_)));
    }

    #[test]
    fn test_default_config_direction() {
        let err = AudioError::from_default_config(
            cpal::DefaultStreamConfigError::StreamTypeNotSupported,
            StreamDirection::Input,
        );
        assert_eq!(
            err,
            AudioError::ConfigUnavailable {
                direction: StreamDirection::Input
            }
        );
        assert_eq!(err.to_string(), "Device does not support input streams");
    }
}
