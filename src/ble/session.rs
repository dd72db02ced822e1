//! BLE session lifecycle.
//!
//! BLE is a one-time configuration window per boot: `start` arms a single
//! idle-shutdown timer, and when it fires with nobody connected the radio is
//! torn down. GPS models that have never been given a spawn location keep
//! the window open, since the operator still needs it.

use crate::context::Context;
use crate::timer::{Duration, Instant, OneShot};

/// Session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disabled,
    Advertising,
    Connected,
}

/// What the radio layer must do after a connection change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAction {
    None,
    RestartAdvertising,
}

/// Result of the idle-shutdown timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdleOutcome {
    /// A peer is connected; the window stays open.
    PeerConnected,
    /// GPS model without a spawn location; the window stays open.
    AwaitingSpawnLocation,
    /// Advertising and radio torn down.
    ShutDown,
}

/// Result of an explicit shutdown request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownOutcome {
    AlreadyDisabled,
    PeerConnected,
    ShutDown,
}

pub struct BleSession {
    state: SessionState,
    connected_peers: u8,
    idle_timer: OneShot,
    idle_timeout: Duration,
}

impl BleSession {
    pub const fn new(idle_timeout: Duration) -> Self {
        Self {
            state: SessionState::Disabled,
            connected_peers: 0,
            idle_timer: OneShot::new(),
            idle_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connected_peers(&self) -> u8 {
        self.connected_peers
    }

    pub fn is_enabled(&self) -> bool {
        self.state != SessionState::Disabled
    }

    /// Begin advertising and arm the idle-shutdown timer.
    ///
    /// Returns `false` if the session was already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_enabled() {
            return false;
        }
        self.state = SessionState::Advertising;
        self.connected_peers = 0;
        self.idle_timer.arm(now, self.idle_timeout);
        true
    }

    pub fn on_connect(&mut self) {
        if !self.is_enabled() {
            return;
        }
        self.connected_peers = self.connected_peers.saturating_add(1);
        self.state = SessionState::Connected;
    }

    /// A peer left. Advertising restarts so the next peer can connect; the
    /// idle timer is not re-armed.
    pub fn on_disconnect(&mut self) -> LinkAction {
        if !self.is_enabled() {
            return LinkAction::None;
        }
        self.connected_peers = self.connected_peers.saturating_sub(1);
        if self.connected_peers == 0 {
            self.state = SessionState::Advertising;
        }
        LinkAction::RestartAdvertising
    }

    /// The radio kept a link that came up while a shutdown was in flight.
    /// The session resumes as connected; the idle timer stays spent.
    ///
    /// Returns `false` if the session was still enabled.
    pub fn resume_for_peer(&mut self) -> bool {
        if self.is_enabled() {
            return false;
        }
        self.connected_peers = 1;
        self.state = SessionState::Connected;
        true
    }

    /// Idle-shutdown timer expiry.
    pub fn on_idle_timeout(&mut self, ctx: &Context) -> IdleOutcome {
        if self.connected_peers > 0 {
            return IdleOutcome::PeerConnected;
        }
        if ctx.awaiting_spawn_location() {
            return IdleOutcome::AwaitingSpawnLocation;
        }
        match self.shutdown() {
            ShutdownOutcome::PeerConnected => IdleOutcome::PeerConnected,
            ShutdownOutcome::AlreadyDisabled | ShutdownOutcome::ShutDown => IdleOutcome::ShutDown,
        }
    }

    /// Tear the session down. No-op when already disabled or while a peer
    /// is connected.
    pub fn shutdown(&mut self) -> ShutdownOutcome {
        if !self.is_enabled() {
            return ShutdownOutcome::AlreadyDisabled;
        }
        if self.connected_peers > 0 {
            return ShutdownOutcome::PeerConnected;
        }
        self.idle_timer.cancel();
        self.state = SessionState::Disabled;
        ShutdownOutcome::ShutDown
    }

    /// Fire the idle timer if due. Fires at most once per `start`.
    pub fn poll(&mut self, now: Instant, ctx: &Context) -> Option<IdleOutcome> {
        if self.idle_timer.fire(now) {
            Some(self.on_idle_timeout(ctx))
        } else {
            None
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.idle_timer.deadline()
    }
}
