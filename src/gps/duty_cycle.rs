//! Receiver duty-cycle controller.
//!
//! Owns the receiver enable line and two one-shot timers:
//! - the **detect** timer, armed at boot, powers the receiver down for good
//!   when no NMEA data shows up in time (no module fitted);
//! - the **sleep** timer, armed when the sleep policy switches the receiver
//!   off, powers it back on without re-evaluating distance. The next fix
//!   after waking does that.

use crate::context::Context;
use crate::error::PolicyError;
use crate::event::Source;
use crate::gps::sleep_policy::SleepPolicy;
use crate::gps::GpsFix;
use crate::timer::{earliest, Duration, Instant, OneShot};

/// Receiver power-enable line.
pub trait ReceiverPower {
    fn set_receiver_enabled(&mut self, enabled: bool);
}

/// Duty-cycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyState {
    /// Powered, waiting for the first NMEA data.
    Detecting,
    /// Powered and tracking.
    Active,
    /// Powered down until the sleep timer fires.
    Sleeping,
    /// No receiver detected; powered down permanently.
    Disabled,
}

/// Result of feeding a fix to the controller.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixOutcome {
    /// Controller is disabled; the fix was dropped.
    Ignored,
    /// Data without a position lock; sleep state untouched.
    NoLock,
    /// Locked fix with coordinates out of range.
    Malformed,
    /// No spawn location configured; receiver stays on.
    NoTarget,
    /// Inside an always-on zone.
    Awake { distance_km: f32 },
    /// Receiver powered down for `interval_secs`.
    Sleeping { distance_km: f32, interval_secs: u32 },
    /// The policy refused the computed distance.
    Rejected(PolicyError),
}

/// Timer expiries reported by [`GpsDutyCycle::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerOutcome {
    /// Sleep interval elapsed; receiver powered back on.
    Woke,
    /// No receiver found before the detect timeout; powered down.
    DetectTimeout,
}

pub struct GpsDutyCycle<'a, P> {
    power: P,
    policy: SleepPolicy<'a>,
    state: DutyState,
    detect_timer: OneShot,
    sleep_timer: OneShot,
}

impl<'a, P: ReceiverPower> GpsDutyCycle<'a, P> {
    pub fn new(power: P, policy: SleepPolicy<'a>) -> Self {
        Self {
            power,
            policy,
            state: DutyState::Detecting,
            detect_timer: OneShot::new(),
            sleep_timer: OneShot::new(),
        }
    }

    pub fn state(&self) -> DutyState {
        self.state
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    /// Power the receiver for detection and start the detect window.
    pub fn arm_detect_timeout(&mut self, now: Instant, timeout: Duration) {
        self.power.set_receiver_enabled(true);
        self.state = DutyState::Detecting;
        self.detect_timer.arm(now, timeout);
    }

    /// Feed one decoded receiver report.
    pub fn on_fix(&mut self, now: Instant, ctx: &mut Context, fix: &GpsFix) -> FixOutcome {
        if self.state == DutyState::Disabled {
            return FixOutcome::Ignored;
        }

        // Any data at all proves the receiver is fitted.
        ctx.set_gps_detected(true);
        self.detect_timer.cancel();
        if self.state == DutyState::Detecting {
            self.state = DutyState::Active;
        }

        if !fix.has_lock {
            return FixOutcome::NoLock;
        }
        if !fix.location.is_valid() {
            return FixOutcome::Malformed;
        }

        ctx.set_gps_fixed(true);
        ctx.set_current_location(fix.location);
        ctx.set_subscribe_source(Source::Sensor);

        let target = ctx.spawn_location();
        if !target.is_valid() {
            self.wake();
            return FixOutcome::NoTarget;
        }

        let distance_km = fix.location.distance_km(&target);
        let directive = match self.policy.select(distance_km) {
            Ok(directive) => directive,
            Err(e) => return FixOutcome::Rejected(e),
        };

        if directive.receiver_power_enabled {
            self.wake();
            FixOutcome::Awake { distance_km }
        } else {
            self.power.set_receiver_enabled(false);
            self.sleep_timer.arm(
                now,
                Duration::secs(u64::from(directive.sleep_interval_secs)),
            );
            self.state = DutyState::Sleeping;
            FixOutcome::Sleeping {
                distance_km,
                interval_secs: directive.sleep_interval_secs,
            }
        }
    }

    /// Handle expired timers. Reports at most one expiry per call; call
    /// again until it returns `None`.
    pub fn poll(&mut self, now: Instant, ctx: &Context) -> Option<TimerOutcome> {
        if self.detect_timer.fire(now) && !ctx.gps_detected() {
            self.sleep_timer.cancel();
            self.power.set_receiver_enabled(false);
            self.state = DutyState::Disabled;
            return Some(TimerOutcome::DetectTimeout);
        }

        if self.sleep_timer.fire(now) {
            self.power.set_receiver_enabled(true);
            self.state = DutyState::Active;
            return Some(TimerOutcome::Woke);
        }

        None
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.detect_timer.deadline(), self.sleep_timer.deadline())
    }

    fn wake(&mut self) {
        self.sleep_timer.cancel();
        self.power.set_receiver_enabled(true);
        self.state = DutyState::Active;
    }
}
