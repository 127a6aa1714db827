pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod message;
pub mod mirror;
pub mod mutex;
pub mod period;
pub mod reconfig;
pub mod stream_io;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod hw;
#[cfg(all(unix, not(target_os = "macos")))]
pub mod session;
