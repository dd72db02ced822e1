//! Application-wide constants and compile-time configuration.
//!
//! Timing parameters, the GPS sleep table, BLE identities and the flash
//! layout live here so they can be tuned in one place.

use crate::gps::sleep_policy::SleepConfig;

// GPS

/// Receiver duty-cycle table, ascending by distance threshold.
///
/// The first entry is the always-on zone around the target.
pub const SLEEP_TABLE: [SleepConfig; 4] = [
    SleepConfig::new(10.0, 0, true),
    SleepConfig::new(50.0, 5 * 60, false),
    SleepConfig::new(100.0, 10 * 60, false),
    SleepConfig::new(200.0, 15 * 60, false),
];

/// Window after boot in which the receiver must produce NMEA data (seconds).
/// Without data the receiver is considered absent and powered down for good.
pub const GPS_DETECT_TIMEOUT_SECS: u64 = 30;

/// Only every Nth fix is logged in full.
pub const GPS_FIX_LOG_EVERY: u32 = 10;

// BLE

/// One-shot configuration window after boot (seconds).
pub const BLE_IDLE_SHUTDOWN_SECS: u64 = 60;

/// Minimum spacing between two azimuth notifications (milliseconds).
pub const AZIMUTH_NOTIFY_INTERVAL_MS: u64 = 1000;

/// Advertised device name.
pub const BLE_DEVICE_NAME: &str = "MCOMPASS";

/// Requested ATT MTU.
pub const BLE_ATT_MTU: u16 = 255;

/// Connection parameters requested after a peer connects.
/// Interval in 1.25 ms units (80 = 100 ms, 100 = 125 ms).
pub const BLE_CONN_INTERVAL_MIN: u16 = 80;
pub const BLE_CONN_INTERVAL_MAX: u16 = 100;

/// Peripheral latency (connection events the device may skip).
pub const BLE_SLAVE_LATENCY: u16 = 4;

/// Supervision timeout in 10 ms units. 200 = 2 s.
pub const BLE_SUP_TIMEOUT: u16 = 200;

/// Maximum accepted characteristic write payload.
pub const BLE_MAX_WRITE_LEN: usize = 32;

// Service and characteristic UUIDs

pub const BASE_SERVICE_UUID: &str = "d6f8a7e0-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const ADVANCED_SERVICE_UUID: &str = "d6f8a7e0-3c1b-4b8e-9a5d-2f6b1c0e7a20";

pub const SPAWN_CHARACTERISTIC_UUID: &str = "d6f8a7e1-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const COLOR_CHARACTERISTIC_UUID: &str = "d6f8a7e2-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const AZIMUTH_CHARACTERISTIC_UUID: &str = "d6f8a7e3-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const INFO_CHARACTERISTIC_UUID: &str = "d6f8a7e4-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const CALIBRATE_CHARACTERISTIC_UUID: &str = "d6f8a7e5-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const BRIGHTNESS_CHARACTERISTIC_UUID: &str = "d6f8a7e6-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const REBOOT_CHARACTERISTIC_UUID: &str = "d6f8a7e7-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const SERVER_MODE_CHARACTERISTIC_UUID: &str = "d6f8a7e8-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const CUSTOM_MODEL_CHARACTERISTIC_UUID: &str = "d6f8a7e9-3c1b-4b8e-9a5d-2f6b1c0e7a10";
pub const VIRTUAL_AZIMUTH_CHARACTERISTIC_UUID: &str = "d6f8a7e1-3c1b-4b8e-9a5d-2f6b1c0e7a20";
pub const VIRTUAL_LOCATION_CHARACTERISTIC_UUID: &str = "d6f8a7e2-3c1b-4b8e-9a5d-2f6b1c0e7a20";

// Defaults applied when flash holds no settings

pub const DEFAULT_BRIGHTNESS: u8 = 32;
pub const DEFAULT_SOUTH_COLOR: u32 = 0xFF_00_00;
pub const DEFAULT_SPAWN_COLOR: u32 = 0x00_FF_00;

// Settings storage

/// Flash page index where settings storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for settings storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 2;
