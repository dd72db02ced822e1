//! Typed events carried on the process-wide event bus.
//!
//! The bus itself belongs to the firmware (an `embassy-sync` pub/sub
//! channel); handlers for factory reset and calibration live outside this
//! crate.

/// Who produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    Ble,
    Sensor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Wipe settings and reboot.
    FactoryReset,
    /// Run the magnetometer calibration routine.
    SensorCalibrate,
    /// Heading changed, in whole degrees.
    Azimuth(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    pub kind: EventKind,
    pub source: Source,
}

impl Event {
    pub const fn new(kind: EventKind, source: Source) -> Self {
        Self { kind, source }
    }

    pub fn azimuth(&self) -> Option<u16> {
        match self.kind {
            EventKind::Azimuth(angle) => Some(angle),
            _ => None,
        }
    }
}
