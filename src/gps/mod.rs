//! GPS receiver power management.
//!
//! 1. **Sleep policy** - maps distance-to-target onto a sleep interval and
//!    a receiver power directive.
//! 2. **Duty cycle** - owns the receiver enable line, the detect timeout and
//!    the wake-up timer.
//!
//! NMEA decoding happens in the firmware's UART task; this module only sees
//! the resulting `GpsFix` values.

pub mod duty_cycle;
pub mod sleep_policy;

use crate::location::Location;

/// A decoded receiver report.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsFix {
    /// Reported position; meaningless without a lock.
    pub location: Location,
    /// The receiver reports a valid position lock.
    pub has_lock: bool,
    /// Satellites used for the solution.
    pub satellites: u8,
    /// Horizontal dilution of precision.
    pub hdop: f32,
}

impl GpsFix {
    /// NMEA data arrived but carried no position solution.
    pub const fn no_lock() -> Self {
        Self {
            location: Location::UNSET,
            has_lock: false,
            satellites: 0,
            hdop: 0.0,
        }
    }

    pub const fn locked(location: Location, satellites: u8, hdop: f32) -> Self {
        Self {
            location,
            has_lock: true,
            satellites,
            hdop,
        }
    }
}
