//! Persistent device settings.
//!
//! Settings live in the nRF52840's internal flash via the
//! `sequential-storage` crate, as a single `postcard`-encoded record under
//! one key. The in-memory `SettingsStore` tracks a dirty flag; the
//! application task hands a snapshot to the storage task whenever it is set,
//! so flash writes never run on the event dispatch path.

use serde::{Deserialize, Serialize};

use crate::context::{Context, Model, PointerColor, ServerMode};
use crate::error::Error;
use crate::location::Location;

/// Key for the settings record in the map storage.
pub const KEY_SETTINGS: u8 = 0x01;

/// Upper bound for the encoded record.
pub const MAX_RECORD_SIZE: usize = 64;

/// Everything that survives a reboot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub spawn_location: Location,
    pub color: PointerColor,
    pub brightness: u8,
    pub server_mode: ServerMode,
    pub model: Model,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_context(&Context::new())
    }
}

impl Settings {
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            spawn_location: ctx.spawn_location(),
            color: ctx.color(),
            brightness: ctx.brightness(),
            server_mode: ctx.server_mode(),
            model: ctx.model(),
        }
    }

    /// Copy the persisted fields into `ctx`.
    pub fn apply_to(&self, ctx: &mut Context) {
        ctx.set_spawn_location(self.spawn_location);
        ctx.set_color(self.color);
        ctx.set_brightness(self.brightness);
        ctx.set_server_mode(self.server_mode);
        ctx.set_model(self.model);
    }

    /// Serialize into `buf`, returning the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let used = postcard::to_slice(self, buf)?;
        Ok(used.len())
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// In-memory settings, synced with flash by the storage task.
pub struct SettingsStore {
    settings: Settings,
    /// Dirty flag - true if the cache differs from flash.
    dirty: bool,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            dirty: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save_spawn_location(&mut self, location: Location) {
        self.settings.spawn_location = location;
        self.dirty = true;
    }

    pub fn save_pointer_color(&mut self, color: PointerColor) {
        self.settings.color = color;
        self.dirty = true;
    }

    pub fn save_brightness(&mut self, brightness: u8) {
        self.settings.brightness = brightness;
        self.dirty = true;
    }

    pub fn save_server_mode(&mut self, mode: ServerMode) {
        self.settings.server_mode = mode;
        self.dirty = true;
    }

    pub fn save_model(&mut self, model: Model) {
        self.settings.model = model;
        self.dirty = true;
    }

    /// Snapshot to persist, clearing the dirty flag. `None` when clean.
    pub fn take_dirty(&mut self) -> Option<Settings> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.settings)
    }
}

#[cfg(feature = "embedded")]
mod flash {
    use super::{Settings, KEY_SETTINGS, MAX_RECORD_SIZE};
    use crate::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
    use crate::error::Error;
    use defmt::{error, info};

    /// Flash page size for nRF52840 (4 KB).
    const FLASH_PAGE_SIZE: u32 = 4096;

    /// Start address of our storage region.
    const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

    /// End address (exclusive) of our storage region.
    const STORAGE_END: u32 =
        (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

    /// Load settings from flash. Missing or unreadable records yield `None`.
    pub async fn load_from_flash(
        flash: &mut impl embedded_storage_async::nor_flash::NorFlash,
    ) -> Option<Settings> {
        let mut buf = [0u8; MAX_RECORD_SIZE];

        match sequential_storage::map::fetch_item::<u8, &[u8], _>(
            flash,
            STORAGE_START..STORAGE_END,
            &mut sequential_storage::cache::NoCache::new(),
            &mut buf,
            &KEY_SETTINGS,
        )
        .await
        {
            Ok(Some(data)) => match Settings::decode(data) {
                Ok(settings) => {
                    info!("Loaded settings from flash");
                    Some(settings)
                }
                Err(e) => {
                    error!("Settings record corrupt: {:?}", e);
                    None
                }
            },
            Ok(None) => {
                info!("No settings in flash");
                None
            }
            Err(e) => {
                error!("Flash read error: {:?}", defmt::Debug2Format(&e));
                None
            }
        }
    }

    /// Persist `settings` to flash.
    pub async fn save_to_flash(
        flash: &mut impl embedded_storage_async::nor_flash::NorFlash,
        settings: &Settings,
    ) -> Result<(), Error> {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let mut data_buf = [0u8; MAX_RECORD_SIZE];

        let len = settings.encode(&mut data_buf)?;
        let item = &data_buf[..len];

        sequential_storage::map::store_item::<u8, &[u8], _>(
            flash,
            STORAGE_START..STORAGE_END,
            &mut sequential_storage::cache::NoCache::new(),
            &mut buf,
            &KEY_SETTINGS,
            &item,
        )
        .await
        .map_err(|e| {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            Error::Storage
        })?;

        info!("Saved settings to flash");
        Ok(())
    }
}

#[cfg(feature = "embedded")]
pub use flash::{load_from_flash, save_to_flash};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_encoding() {
        let settings = Settings {
            spawn_location: Location::new(-33.8688, 151.2093),
            color: PointerColor {
                south_color: 0x12_34_56,
                spawn_color: 0xAB_CD_EF,
            },
            brightness: 200,
            server_mode: ServerMode::Wifi,
            model: Model::Gps,
        };

        let mut buf = [0u8; MAX_RECORD_SIZE];
        let len = settings.encode(&mut buf).unwrap();
        assert!(len > 0 && len <= MAX_RECORD_SIZE);
        assert_eq!(Settings::decode(&buf[..len]).unwrap(), settings);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let len = Settings::default().encode(&mut buf).unwrap();
        assert_eq!(Settings::decode(&buf[..len / 2]), Err(Error::Codec));
    }

    #[test]
    fn encode_into_tiny_buffer_fails() {
        let mut buf = [0u8; 4];
        assert_eq!(Settings::default().encode(&mut buf), Err(Error::Codec));
    }

    #[test]
    fn dirty_tracking() {
        let mut store = SettingsStore::new(Settings::default());
        assert!(store.take_dirty().is_none());

        store.save_brightness(255);
        assert!(store.is_dirty());
        let snapshot = store.take_dirty().unwrap();
        assert_eq!(snapshot.brightness, 255);
        assert!(!store.is_dirty());
        assert!(store.take_dirty().is_none());
    }

    #[test]
    fn apply_to_context() {
        let mut settings = Settings::default();
        settings.model = Model::Gps;
        settings.brightness = 9;
        settings.spawn_location = Location::new(1.5, 2.5);

        let mut ctx = Context::new();
        settings.apply_to(&mut ctx);
        assert_eq!(ctx.model(), Model::Gps);
        assert_eq!(ctx.brightness(), 9);
        assert_eq!(ctx.spawn_location(), Location::new(1.5, 2.5));
        assert_eq!(Settings::from_context(&ctx), settings);
    }
}
