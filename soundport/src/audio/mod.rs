/// Backend variants (native through cpal, virtual)
pub mod backend;

/// Realtime-safe sample queue
pub mod buffer;

/// Realtime callback bodies and stream counters
pub mod callback;

/// Stream configuration and capability ranges
pub mod config;

/// Audio device metadata and stream factory
pub mod device;

/// Audio-related error types
pub mod error;

/// Host registry
pub mod host;

/// Sample format conversions
pub mod sample;

/// Stream lifecycle
pub mod stream;

// Re-export commonly used types
pub use buffer::{AudioBuffer, BufferLayout};
pub use callback::{BeepGenerator, StreamStats};
pub use config::{BufferSize, StreamConfig, StreamDirection, SupportedBufferSize, SupportedStreamConfigRange};
pub use device::{Device, DeviceDescription, DeviceId, DeviceType, InterfaceType};
pub use error::{AudioError, AudioResult};
pub use host::{all_hosts, available_hosts, default_host, host_from_id, Host, HostId};
pub use sample::{convert_slice, Sample, SampleFormat, I24, U24};
pub use stream::{AudioStream, StreamState};
