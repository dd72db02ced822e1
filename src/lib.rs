//! mcompass: GPS compass firmware core.
//!
//! Everything that decides (BLE session lifecycle, GPS duty cycling, write
//! decoding, settings) lives in this `no_std` library so it can be tested on
//! the host with `cargo test`. The embedded binary in `main.rs` (feature
//! `embedded`) owns the SoftDevice, UART, GPIO and flash and drives
//! [`app::App`] from a single task.

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod ble;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod gps;
pub mod location;
pub mod storage;
pub mod timer;

pub use app::{App, Expiry, Timing};
pub use error::Error;
