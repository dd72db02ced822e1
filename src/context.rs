//! Shared device state.
//!
//! `Context` is the single owner of everything the BLE and GPS components
//! read or mutate. It is created once by the application task and passed by
//! reference into each component; nothing reaches it through a global.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BRIGHTNESS, DEFAULT_SOUTH_COLOR, DEFAULT_SPAWN_COLOR};
use crate::event::Source;
use crate::location::Location;

/// Largest value a 24-bit RGB color can hold.
pub const COLOR_MAX: u32 = 0x00FF_FFFF;

/// Needle colors, 24-bit RGB each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PointerColor {
    pub south_color: u32,
    pub spawn_color: u32,
}

impl Default for PointerColor {
    fn default() -> Self {
        Self {
            south_color: DEFAULT_SOUTH_COLOR,
            spawn_color: DEFAULT_SPAWN_COLOR,
        }
    }
}

/// Hardware variant the firmware is running on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Model {
    /// Compass only, points south.
    #[default]
    Standard,
    /// Compass with GPS, points at the spawn location.
    Gps,
}

impl Model {
    /// Whether this model needs a spawn location to be useful.
    pub fn requires_gps(&self) -> bool {
        matches!(self, Model::Gps)
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Model::Standard => 0,
            Model::Gps => 1,
        }
    }
}

impl TryFrom<u8> for Model {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Model::Standard),
            1 => Ok(Model::Gps),
            other => Err(other),
        }
    }
}

/// Transport the configuration server uses after the BLE window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerMode {
    Wifi,
    #[default]
    Ble,
}

impl ServerMode {
    /// Decode the wire byte; unknown values yield `None`.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(ServerMode::Wifi),
            1 => Some(ServerMode::Ble),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ServerMode::Wifi => 0,
            ServerMode::Ble => 1,
        }
    }
}

/// Device state shared by all components.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Context {
    current_location: Location,
    spawn_location: Location,
    color: PointerColor,
    brightness: u8,
    model: Model,
    server_mode: ServerMode,
    gps_detected: bool,
    gps_fixed: bool,
    has_sensor: bool,
    subscribe_source: Source,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            current_location: Location::UNSET,
            spawn_location: Location::UNSET,
            color: PointerColor::default(),
            brightness: DEFAULT_BRIGHTNESS,
            model: Model::default(),
            server_mode: ServerMode::default(),
            gps_detected: false,
            gps_fixed: false,
            has_sensor: false,
            subscribe_source: Source::Sensor,
        }
    }

    pub fn current_location(&self) -> Location {
        self.current_location
    }

    pub fn set_current_location(&mut self, location: Location) {
        self.current_location = location;
    }

    pub fn spawn_location(&self) -> Location {
        self.spawn_location
    }

    pub fn set_spawn_location(&mut self, location: Location) {
        self.spawn_location = location;
    }

    pub fn color(&self) -> PointerColor {
        self.color
    }

    pub fn set_color(&mut self, color: PointerColor) {
        self.color = color;
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    pub fn server_mode(&self) -> ServerMode {
        self.server_mode
    }

    pub fn set_server_mode(&mut self, mode: ServerMode) {
        self.server_mode = mode;
    }

    /// Any NMEA data has been seen since boot.
    pub fn gps_detected(&self) -> bool {
        self.gps_detected
    }

    pub fn set_gps_detected(&mut self, detected: bool) {
        self.gps_detected = detected;
    }

    /// At least one fix with a valid lock has been received.
    pub fn gps_fixed(&self) -> bool {
        self.gps_fixed
    }

    pub fn set_gps_fixed(&mut self, fixed: bool) {
        self.gps_fixed = fixed;
    }

    pub fn has_sensor(&self) -> bool {
        self.has_sensor
    }

    pub fn set_has_sensor(&mut self, present: bool) {
        self.has_sensor = present;
    }

    pub fn subscribe_source(&self) -> Source {
        self.subscribe_source
    }

    pub fn set_subscribe_source(&mut self, source: Source) {
        self.subscribe_source = source;
    }

    /// GPS models stay configurable until a target has been set.
    pub fn awaiting_spawn_location(&self) -> bool {
        self.model.requires_gps() && !self.spawn_location.is_valid()
    }
}
