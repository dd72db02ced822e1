//! Owned one-shot timer handles.
//!
//! A `OneShot` is just a deadline. Its owner arms or cancels it and polls it
//! with the current time; the firmware sleeps on the earliest armed deadline
//! with `embassy_time::Timer::at`. Nothing is captured across the await, so
//! expiry is always handled by the component that armed the timer.

/// Microsecond timestamps, matching the SoftDevice RTC tick conversion.
pub type Instant = fugit::TimerInstantU64<1_000_000>;

/// Microsecond durations.
pub type Duration = fugit::MicrosDurationU64;

/// A single-shot deadline. Re-arming replaces the previous deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneShot {
    deadline: Option<Instant>,
}

impl OneShot {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer to expire `after` from `now`.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Cancel a pending expiry. Returns whether the timer was armed.
    ///
    /// Cancelling an idle or already-fired timer is a no-op.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the expiry if `now` has reached the deadline.
    ///
    /// Returns `true` exactly once per arming.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
        (a, None) => a,
        (None, b) => b,
    }
}
