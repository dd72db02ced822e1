//! Characteristic write decoding and azimuth notification throttling.
//!
//! Writes are decoded per characteristic, validated, then committed to the
//! context and the settings store together. Malformed payloads are returned
//! as `WriteError` for the caller to log; they never leave partial updates
//! behind.

use crate::ble::Characteristic;
use crate::context::{Context, Model, PointerColor, ServerMode, COLOR_MAX};
use crate::error::WriteError;
use crate::event::{Event, EventKind, Source};
use crate::location::Location;
use crate::storage::SettingsStore;
use crate::timer::{Duration, Instant};

/// A committed configuration change.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Setting {
    SpawnLocation(Location),
    Color(PointerColor),
    Brightness(u8),
    ServerMode(ServerMode),
    Model(Model),
}

/// What an accepted write did.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOutcome {
    /// Context and settings store updated.
    Updated(Setting),
    /// Event to publish on the bus.
    Posted(Event),
    /// Accepted but deliberately not acted on.
    Ignored,
}

/// Drops azimuth updates arriving within `interval` of the last one let
/// through. Dropped values are not queued.
#[derive(Clone, Copy, Debug)]
pub struct AzimuthThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl AzimuthThrottle {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            match now.checked_duration_since(last) {
                Some(elapsed) if elapsed < self.interval => return false,
                // Clock went backwards; treat as inside the window.
                None => return false,
                _ => {}
            }
        }
        self.last = Some(now);
        true
    }
}

pub struct ConfigDispatcher {
    azimuth: AzimuthThrottle,
}

impl ConfigDispatcher {
    pub const fn new(notify_interval: Duration) -> Self {
        Self {
            azimuth: AzimuthThrottle::new(notify_interval),
        }
    }

    /// Decode and commit one characteristic write.
    pub fn handle_write(
        &mut self,
        ctx: &mut Context,
        store: &mut SettingsStore,
        characteristic: Characteristic,
        payload: &[u8],
    ) -> Result<WriteOutcome, WriteError> {
        if !characteristic.is_writable() {
            return Err(WriteError::NotWritable);
        }

        match characteristic {
            Characteristic::SpawnLocation => {
                let location = parse_spawn_location(payload)?;
                store.save_spawn_location(location);
                ctx.set_spawn_location(location);
                Ok(WriteOutcome::Updated(Setting::SpawnLocation(location)))
            }
            Characteristic::Color => {
                let color = parse_color(payload, ctx.color())?;
                store.save_pointer_color(color);
                ctx.set_color(color);
                Ok(WriteOutcome::Updated(Setting::Color(color)))
            }
            Characteristic::Brightness => {
                let brightness = single_byte(payload)?;
                store.save_brightness(brightness);
                ctx.set_brightness(brightness);
                Ok(WriteOutcome::Updated(Setting::Brightness(brightness)))
            }
            Characteristic::ServerMode => {
                match payload.first().copied().and_then(ServerMode::from_byte) {
                    Some(mode) => {
                        store.save_server_mode(mode);
                        ctx.set_server_mode(mode);
                        Ok(WriteOutcome::Updated(Setting::ServerMode(mode)))
                    }
                    None => Ok(WriteOutcome::Ignored),
                }
            }
            Characteristic::CustomModel => {
                let model = Model::try_from(single_byte(payload)?)
                    .map_err(WriteError::UnknownModel)?;
                store.save_model(model);
                ctx.set_model(model);
                Ok(WriteOutcome::Updated(Setting::Model(model)))
            }
            Characteristic::Reboot => Ok(WriteOutcome::Posted(Event::new(
                EventKind::FactoryReset,
                Source::Ble,
            ))),
            Characteristic::Calibrate => Ok(WriteOutcome::Posted(Event::new(
                EventKind::SensorCalibrate,
                Source::Ble,
            ))),
            // Not wired to anything yet; the caller logs the payload.
            Characteristic::VirtualAzimuth | Characteristic::VirtualLocation => {
                Ok(WriteOutcome::Ignored)
            }
            Characteristic::Azimuth | Characteristic::Info => Err(WriteError::NotWritable),
        }
    }

    /// Bus event handler. Returns the angle to notify when an azimuth
    /// update passes the rate limit.
    pub fn on_bus_event(&mut self, now: Instant, event: &Event) -> Option<u16> {
        let angle = event.azimuth()?;
        self.azimuth.admit(now).then_some(angle)
    }
}

fn single_byte(payload: &[u8]) -> Result<u8, WriteError> {
    match payload {
        [value] => Ok(*value),
        _ => Err(WriteError::InvalidLength {
            expected: 1,
            actual: payload.len(),
        }),
    }
}

/// Parse `"<latitude>,<longitude>"`.
pub fn parse_spawn_location(payload: &[u8]) -> Result<Location, WriteError> {
    let text = core::str::from_utf8(payload).map_err(|_| WriteError::InvalidUtf8)?;
    let (lat, lon) = text.split_once(',').ok_or(WriteError::MissingSeparator)?;

    let latitude: f32 = lat.trim().parse().map_err(|_| WriteError::InvalidNumber)?;
    let longitude: f32 = lon.trim().parse().map_err(|_| WriteError::InvalidNumber)?;

    let location = Location::new(latitude, longitude);
    if !location.is_valid() {
        return Err(WriteError::OutOfRange);
    }
    Ok(location)
}

/// Parse one 24-bit hex color token (`ab`, `0xab`, `#ab`).
pub fn parse_hex_color(token: &str) -> Option<u32> {
    let token = token.trim();
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .or_else(|| token.strip_prefix('#'))
        .unwrap_or(token);

    // `from_str_radix` would also take a sign.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    u32::from_str_radix(digits, 16)
        .ok()
        .filter(|value| *value <= COLOR_MAX)
}

/// Apply a `"south[,spawn]"` write on top of `current`.
///
/// A token that fails to parse keeps its field; the write is rejected only
/// when no field could be updated.
pub fn parse_color(payload: &[u8], current: PointerColor) -> Result<PointerColor, WriteError> {
    let text = core::str::from_utf8(payload).map_err(|_| WriteError::InvalidUtf8)?;
    let mut tokens = text.split(',');

    let south = tokens.next().and_then(parse_hex_color);
    let spawn = tokens.next().and_then(parse_hex_color);

    if south.is_none() && spawn.is_none() {
        return Err(WriteError::InvalidHex);
    }

    Ok(PointerColor {
        south_color: south.unwrap_or(current.south_color),
        spawn_color: spawn.unwrap_or(current.spawn_color),
    })
}
