//! Backend variants
//!
//! - `native` - ALSA, CoreAudio, WASAPI, JACK and ASIO through cpal
//! - `virtual_host` - software-clocked devices described in configuration
//!
//! Hosts, devices and streams hold one variant each and dispatch with a
//! `match`; both variants drive the same callback bodies.

pub(crate) mod native;
pub mod virtual_host;

pub use virtual_host::{VirtualDeviceConfig, VirtualHostConfig};
