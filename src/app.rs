//! Application core.
//!
//! `App` owns the context, the settings store and the four components. The
//! firmware's application task is its only caller: it feeds in fixes, writes,
//! link changes and bus events in arrival order, sleeps until
//! [`App::next_deadline`], then drains [`App::poll`]. Everything here is
//! synchronous, so the same sequence can be replayed on the host.

use heapless::String;

use crate::ble::dispatcher::{ConfigDispatcher, WriteOutcome};
use crate::ble::session::{BleSession, IdleOutcome, LinkAction, ShutdownOutcome};
use crate::ble::values::{self, BuildInfo};
use crate::ble::Characteristic;
use crate::config::{
    AZIMUTH_NOTIFY_INTERVAL_MS, BLE_IDLE_SHUTDOWN_SECS, GPS_DETECT_TIMEOUT_SECS,
};
use crate::context::Context;
use crate::error::WriteError;
use crate::event::{Event, Source};
use crate::gps::duty_cycle::{FixOutcome, GpsDutyCycle, ReceiverPower, TimerOutcome};
use crate::gps::sleep_policy::SleepPolicy;
use crate::gps::GpsFix;
use crate::storage::{Settings, SettingsStore};
use crate::timer::{earliest, Duration, Instant};

/// A timer expiry, tagged with the component that owned it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Expiry {
    Gps(TimerOutcome),
    Ble(IdleOutcome),
}

/// Timeouts the core runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub gps_detect: Duration,
    pub ble_idle: Duration,
    pub azimuth_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            gps_detect: Duration::secs(GPS_DETECT_TIMEOUT_SECS),
            ble_idle: Duration::secs(BLE_IDLE_SHUTDOWN_SECS),
            azimuth_interval: Duration::millis(AZIMUTH_NOTIFY_INTERVAL_MS),
        }
    }
}

pub struct App<'a, P> {
    ctx: Context,
    store: SettingsStore,
    gps: GpsDutyCycle<'a, P>,
    ble: BleSession,
    dispatcher: ConfigDispatcher,
    timing: Timing,
    build: BuildInfo,
}

impl<'a, P: ReceiverPower> App<'a, P> {
    /// Build the core from persisted settings.
    pub fn new(power: P, policy: SleepPolicy<'a>, settings: Settings, timing: Timing) -> Self {
        let mut ctx = Context::new();
        settings.apply_to(&mut ctx);

        Self {
            ctx,
            store: SettingsStore::new(settings),
            gps: GpsDutyCycle::new(power, policy),
            ble: BleSession::new(timing.ble_idle),
            dispatcher: ConfigDispatcher::new(timing.azimuth_interval),
            timing,
            build: BuildInfo::current(),
        }
    }

    /// Override the build metadata reported through Info.
    pub fn with_build_info(mut self, build: BuildInfo) -> Self {
        self.build = build;
        self
    }

    /// Boot sequence: power the receiver for detection and open the BLE
    /// configuration window.
    pub fn start(&mut self, now: Instant) {
        self.gps.arm_detect_timeout(now, self.timing.gps_detect);
        self.ble.start(now);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn session(&self) -> &BleSession {
        &self.ble
    }

    pub fn gps(&self) -> &GpsDutyCycle<'a, P> {
        &self.gps
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    pub fn on_fix(&mut self, now: Instant, fix: &GpsFix) -> FixOutcome {
        self.gps.on_fix(now, &mut self.ctx, fix)
    }

    pub fn on_write(
        &mut self,
        characteristic: Characteristic,
        payload: &[u8],
    ) -> Result<WriteOutcome, WriteError> {
        self.dispatcher
            .handle_write(&mut self.ctx, &mut self.store, characteristic, payload)
    }

    pub fn on_connect(&mut self) {
        self.ble.on_connect();
    }

    pub fn on_disconnect(&mut self) -> LinkAction {
        self.ble.on_disconnect()
    }

    /// The radio refused a shutdown because a peer connected first.
    pub fn on_shutdown_refused(&mut self) -> bool {
        self.ble.resume_for_peer()
    }

    /// Returns the angle to notify when an azimuth update is admitted and
    /// someone is connected to receive it.
    ///
    /// A heading from the sensor also marks the sensor as present.
    pub fn on_bus_event(&mut self, now: Instant, event: &Event) -> Option<u16> {
        if event.source == Source::Sensor && event.azimuth().is_some() {
            self.ctx.set_has_sensor(true);
        }
        let angle = self.dispatcher.on_bus_event(now, event)?;
        (self.ble.connected_peers() > 0).then_some(angle)
    }

    pub fn shutdown_ble(&mut self) -> ShutdownOutcome {
        self.ble.shutdown()
    }

    /// Report one expired timer. Call until it returns `None`.
    pub fn poll(&mut self, now: Instant) -> Option<Expiry> {
        if let Some(outcome) = self.gps.poll(now, &self.ctx) {
            return Some(Expiry::Gps(outcome));
        }
        self.ble.poll(now, &self.ctx).map(Expiry::Ble)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.gps.next_deadline(), self.ble.next_deadline())
    }

    /// Settings snapshot to persist, if anything changed since the last call.
    pub fn take_dirty_settings(&mut self) -> Option<Settings> {
        self.store.take_dirty()
    }

    pub fn info(&self) -> String<256> {
        values::info_json(&self.ctx, &self.build)
    }
}
