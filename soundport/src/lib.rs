/// Audio hosts, devices, streams and buffers
pub mod audio;

/// Configuration state
pub mod state;

/// Utility modules
pub mod utils;
