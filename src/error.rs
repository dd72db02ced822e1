//! Unified error types for mcompass.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The SoftDevice returned a BLE-level error.
    Ble(BleError),

    // Configuration input
    /// A characteristic write could not be decoded.
    Write(WriteError),

    /// The sleep policy rejected its input or table.
    Policy(PolicyError),

    // Storage
    /// Flash read/write/erase failed.
    Storage,

    /// Settings record could not be encoded or decoded.
    Codec,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// GATT server registration failed.
    ServerInit,
    /// Advertising could not be started.
    AdvertiseFailed,
    /// Notification could not be queued.
    NotifyFailed,
}

/// Why a characteristic write was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError {
    /// Payload is not UTF-8 text.
    InvalidUtf8,
    /// Expected `"<latitude>,<longitude>"`.
    MissingSeparator,
    /// A numeric field did not parse.
    InvalidNumber,
    /// Coordinates parsed but lie outside the valid range.
    OutOfRange,
    /// No hex token could be parsed.
    InvalidHex,
    /// Payload length differs from what the characteristic accepts.
    InvalidLength { expected: usize, actual: usize },
    /// Byte does not name a known device model.
    UnknownModel(u8),
    /// The characteristic does not accept writes.
    NotWritable,
}

/// Rejections from the distance sleep policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PolicyError {
    /// Distance below zero.
    NegativeDistance,
    /// Distance is NaN or infinite.
    NonFiniteDistance,
    /// Sleep table has no entries.
    EmptyTable,
    /// Thresholds are not positive and strictly increasing.
    UnorderedTable,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl From<WriteError> for Error {
    fn from(e: WriteError) -> Self {
        Error::Write(e)
    }
}

impl From<PolicyError> for Error {
    fn from(e: PolicyError) -> Self {
        Error::Policy(e)
    }
}

impl From<postcard::Error> for Error {
    fn from(_: postcard::Error) -> Self {
        Error::Codec
    }
}
