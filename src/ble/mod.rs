//! Bluetooth Low Energy configuration interface.
//!
//! The firmware runs the Nordic SoftDevice S140 in **Peripheral** role. This
//! module holds the decision logic behind it:
//!
//! 1. **Session** - advertise / connect / idle-shutdown state machine.
//! 2. **Dispatcher** - decodes characteristic writes into settings changes
//!    and bus events, and rate-limits azimuth notifications.
//! 3. **Values** - renders readable characteristic values from the context.
//!
//! Characteristic identity is a tagged enum so handlers `match` on it
//! instead of comparing UUIDs.

pub mod dispatcher;
pub mod session;
pub mod values;

use crate::config;

/// Every characteristic the GATT server exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    SpawnLocation,
    Color,
    Azimuth,
    Info,
    Calibrate,
    Brightness,
    Reboot,
    ServerMode,
    CustomModel,
    VirtualAzimuth,
    VirtualLocation,
}

impl Characteristic {
    pub const ALL: [Characteristic; 11] = [
        Characteristic::SpawnLocation,
        Characteristic::Color,
        Characteristic::Azimuth,
        Characteristic::Info,
        Characteristic::Calibrate,
        Characteristic::Brightness,
        Characteristic::Reboot,
        Characteristic::ServerMode,
        Characteristic::CustomModel,
        Characteristic::VirtualAzimuth,
        Characteristic::VirtualLocation,
    ];

    pub fn uuid(&self) -> &'static str {
        match self {
            Characteristic::SpawnLocation => config::SPAWN_CHARACTERISTIC_UUID,
            Characteristic::Color => config::COLOR_CHARACTERISTIC_UUID,
            Characteristic::Azimuth => config::AZIMUTH_CHARACTERISTIC_UUID,
            Characteristic::Info => config::INFO_CHARACTERISTIC_UUID,
            Characteristic::Calibrate => config::CALIBRATE_CHARACTERISTIC_UUID,
            Characteristic::Brightness => config::BRIGHTNESS_CHARACTERISTIC_UUID,
            Characteristic::Reboot => config::REBOOT_CHARACTERISTIC_UUID,
            Characteristic::ServerMode => config::SERVER_MODE_CHARACTERISTIC_UUID,
            Characteristic::CustomModel => config::CUSTOM_MODEL_CHARACTERISTIC_UUID,
            Characteristic::VirtualAzimuth => config::VIRTUAL_AZIMUTH_CHARACTERISTIC_UUID,
            Characteristic::VirtualLocation => config::VIRTUAL_LOCATION_CHARACTERISTIC_UUID,
        }
    }

    /// Whether the characteristic lives in the advanced service.
    pub fn is_advanced(&self) -> bool {
        matches!(
            self,
            Characteristic::VirtualAzimuth | Characteristic::VirtualLocation
        )
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Characteristic::Azimuth | Characteristic::Info)
    }
}

/// 128-bit UUID text in advertising (little-endian) byte order.
///
/// Meant for constants: a malformed UUID fails const evaluation.
pub const fn uuid_le_bytes(uuid: &str) -> [u8; 16] {
    let text = uuid.as_bytes();
    let mut out = [0u8; 16];
    let mut nibbles = 0;
    let mut i = 0;
    while i < text.len() {
        let c = text[i];
        i += 1;
        let value = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            b'-' => continue,
            _ => panic!("invalid UUID character"),
        };
        assert!(nibbles < 32, "UUID too long");
        let byte = 15 - nibbles / 2;
        out[byte] = if nibbles % 2 == 0 {
            value << 4
        } else {
            out[byte] | value
        };
        nibbles += 1;
    }
    assert!(nibbles == 32, "UUID too short");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_are_unique() {
        for (i, a) in Characteristic::ALL.iter().enumerate() {
            for b in &Characteristic::ALL[i + 1..] {
                assert_ne!(a.uuid(), b.uuid());
            }
        }
    }

    #[test]
    fn characteristics_sit_under_their_service() {
        let base = &config::BASE_SERVICE_UUID[8..];
        let advanced = &config::ADVANCED_SERVICE_UUID[8..];
        for c in Characteristic::ALL {
            let suffix = if c.is_advanced() { advanced } else { base };
            assert!(c.uuid().ends_with(suffix), "{:?}", c);
        }
    }

    #[test]
    fn uuid_bytes_are_reversed_for_advertising() {
        assert_eq!(
            uuid_le_bytes(config::BASE_SERVICE_UUID),
            [
                0x10, 0x7a, 0x0e, 0x1c, 0x6b, 0x2f, 0x5d, 0x9a, 0x8e, 0x4b, 0x1b, 0x3c, 0xe0, 0xa7,
                0xf8, 0xd6,
            ]
        );
        assert_eq!(
            uuid_le_bytes("D6F8A7E0-3C1B-4B8E-9A5D-2F6B1C0E7A20"),
            uuid_le_bytes(config::ADVANCED_SERVICE_UUID)
        );
    }

    #[test]
    fn advanced_and_read_only_sets() {
        assert!(Characteristic::VirtualLocation.is_advanced());
        assert!(!Characteristic::Color.is_advanced());
        assert!(!Characteristic::Info.is_writable());
        assert!(!Characteristic::Azimuth.is_writable());
        assert!(Characteristic::Reboot.is_writable());
    }
}
