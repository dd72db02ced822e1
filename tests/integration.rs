//! Integration tests driving the application core the way the firmware does.

use mcompass::app::{App, Expiry, Timing};
use mcompass::ble::dispatcher::{Setting, WriteOutcome};
use mcompass::ble::session::{IdleOutcome, LinkAction, SessionState, ShutdownOutcome};
use mcompass::ble::values::BuildInfo;
use mcompass::ble::Characteristic;
use mcompass::config::SLEEP_TABLE;
use mcompass::context::{Model, PointerColor};
use mcompass::error::WriteError;
use mcompass::event::{Event, EventKind, Source};
use mcompass::gps::duty_cycle::{DutyState, FixOutcome, ReceiverPower, TimerOutcome};
use mcompass::gps::sleep_policy::SleepPolicy;
use mcompass::gps::GpsFix;
use mcompass::location::Location;
use mcompass::storage::{Settings, MAX_RECORD_SIZE};
use mcompass::timer::{Duration, Instant};

#[derive(Default)]
struct EnableLine {
    history: Vec<bool>,
}

impl EnableLine {
    fn is_on(&self) -> bool {
        self.history.last().copied().unwrap_or(false)
    }
}

impl ReceiverPower for EnableLine {
    fn set_receiver_enabled(&mut self, enabled: bool) {
        self.history.push(enabled);
    }
}

fn at_ms(ms: u64) -> Instant {
    Instant::from_ticks(ms * 1000)
}

fn at_secs(s: u64) -> Instant {
    at_ms(s * 1000)
}

fn build() -> BuildInfo {
    BuildInfo {
        date: "2024-01-01",
        time: "00:00:00",
        version: "0.0.0",
        git_branch: "test",
        git_commit: "0000000",
    }
}

fn boot(settings: Settings) -> App<'static, EnableLine> {
    let policy = SleepPolicy::new(&SLEEP_TABLE).unwrap();
    let mut app = App::new(EnableLine::default(), policy, settings, Timing::default())
        .with_build_info(build());
    app.start(at_secs(0));
    app
}

fn drain(app: &mut App<'static, EnableLine>, now: Instant) -> Vec<Expiry> {
    let mut expiries = Vec::new();
    while let Some(expiry) = app.poll(now) {
        expiries.push(expiry);
    }
    expiries
}

fn heading(angle: u16) -> Event {
    Event::new(EventKind::Azimuth(angle), Source::Sensor)
}

#[test]
fn unattended_boot_closes_window_and_drops_missing_receiver() {
    let mut app = boot(Settings::default());
    assert_eq!(app.session().state(), SessionState::Advertising);
    assert!(app.gps().power().is_on());
    assert_eq!(app.next_deadline(), Some(at_secs(30)));

    assert_eq!(
        drain(&mut app, at_secs(30)),
        vec![Expiry::Gps(TimerOutcome::DetectTimeout)]
    );
    assert_eq!(app.gps().state(), DutyState::Disabled);
    assert!(!app.gps().power().is_on());
    assert_eq!(app.next_deadline(), Some(at_secs(60)));

    assert_eq!(
        drain(&mut app, at_secs(60)),
        vec![Expiry::Ble(IdleOutcome::ShutDown)]
    );
    assert_eq!(app.session().state(), SessionState::Disabled);
    assert_eq!(app.next_deadline(), None);
}

#[test]
fn simultaneous_expiries_are_all_reported() {
    let policy = SleepPolicy::new(&SLEEP_TABLE).unwrap();
    let timing = Timing {
        gps_detect: Duration::secs(60),
        ..Timing::default()
    };
    let mut app = App::new(EnableLine::default(), policy, Settings::default(), timing);
    app.start(at_secs(0));

    assert_eq!(
        drain(&mut app, at_secs(61)),
        vec![
            Expiry::Gps(TimerOutcome::DetectTimeout),
            Expiry::Ble(IdleOutcome::ShutDown)
        ]
    );
}

#[test]
fn gps_model_keeps_window_open_until_spawn_is_set() {
    let mut app = boot(Settings::default());

    app.on_connect();
    assert_eq!(
        app.on_write(Characteristic::CustomModel, &[1]),
        Ok(WriteOutcome::Updated(Setting::Model(Model::Gps)))
    );
    assert_eq!(app.on_disconnect(), LinkAction::RestartAdvertising);

    let expiries = drain(&mut app, at_secs(60));
    assert!(expiries.contains(&Expiry::Ble(IdleOutcome::AwaitingSpawnLocation)));
    assert!(app.session().is_enabled());

    app.on_connect();
    app.on_write(Characteristic::SpawnLocation, b"12.345,67.890")
        .unwrap();
    assert_eq!(app.shutdown_ble(), ShutdownOutcome::PeerConnected);

    app.on_disconnect();
    assert_eq!(app.shutdown_ble(), ShutdownOutcome::ShutDown);
    assert_eq!(app.shutdown_ble(), ShutdownOutcome::AlreadyDisabled);
}

#[test]
fn connected_peer_blocks_idle_shutdown() {
    let mut app = boot(Settings::default());
    app.on_connect();

    let expiries = drain(&mut app, at_secs(60));
    assert!(expiries.contains(&Expiry::Ble(IdleOutcome::PeerConnected)));
    assert_eq!(app.session().state(), SessionState::Connected);
}

#[test]
fn peer_connecting_during_idle_shutdown_keeps_the_session() {
    let mut app = boot(Settings::default());

    assert_eq!(
        drain(&mut app, at_secs(60)),
        vec![
            Expiry::Gps(TimerOutcome::DetectTimeout),
            Expiry::Ble(IdleOutcome::ShutDown)
        ]
    );
    // The link came up before the radio saw the shutdown.
    app.on_connect();
    assert!(app.on_shutdown_refused());

    assert_eq!(app.session().state(), SessionState::Connected);
    assert_eq!(app.shutdown_ble(), ShutdownOutcome::PeerConnected);
    assert_eq!(app.next_deadline(), None);

    assert_eq!(app.on_disconnect(), LinkAction::RestartAdvertising);
    assert!(app.session().is_enabled());
}

#[test]
fn configuration_survives_reboot() {
    let mut app = boot(Settings::default());
    app.on_connect();

    app.on_write(Characteristic::SpawnLocation, b"48.8566,2.3522")
        .unwrap();
    app.on_write(Characteristic::Color, b"ab,cd").unwrap();
    app.on_write(Characteristic::Brightness, &[255]).unwrap();
    app.on_write(Characteristic::ServerMode, &[0]).unwrap();
    assert_eq!(
        app.on_write(Characteristic::Brightness, &[1, 2]),
        Err(WriteError::InvalidLength {
            expected: 1,
            actual: 2
        })
    );

    let snapshot = app.take_dirty_settings().unwrap();
    assert!(app.take_dirty_settings().is_none());
    assert_eq!(app.settings(), &snapshot);

    let mut record = [0u8; MAX_RECORD_SIZE];
    let len = snapshot.encode(&mut record).unwrap();
    let restored = Settings::decode(&record[..len]).unwrap();

    let rebooted = boot(restored);
    let ctx = rebooted.context();
    assert_eq!(ctx.spawn_location(), Location::new(48.8566, 2.3522));
    assert_eq!(
        ctx.color(),
        PointerColor {
            south_color: 0xAB,
            spawn_color: 0xCD
        }
    );
    assert_eq!(ctx.brightness(), 255);
    assert_eq!(ctx.server_mode().as_byte(), 0);
}

#[test]
fn rejected_write_leaves_nothing_to_persist() {
    let mut app = boot(Settings::default());
    let before = app.context().clone();

    assert_eq!(
        app.on_write(Characteristic::SpawnLocation, b"not,a,number"),
        Err(WriteError::InvalidNumber)
    );
    assert_eq!(
        app.on_write(Characteristic::Info, b"{}"),
        Err(WriteError::NotWritable)
    );
    assert_eq!(app.context(), &before);
    assert!(app.take_dirty_settings().is_none());
}

#[test]
fn reboot_write_posts_factory_reset() {
    let mut app = boot(Settings::default());
    let outcome = app.on_write(Characteristic::Reboot, &[1]).unwrap();
    assert_eq!(
        outcome,
        WriteOutcome::Posted(Event::new(EventKind::FactoryReset, Source::Ble))
    );
}

#[test]
fn far_fix_sleeps_receiver_then_wakes_it() {
    let mut settings = Settings::default();
    settings.model = Model::Gps;
    settings.spawn_location = Location::new(0.0, 10.0);
    let mut app = boot(settings);

    // ~80 km due north: 50 km band, residual ~30 km, 300 s sleep.
    let fix = GpsFix::locked(Location::new(80.0 / 111.195, 10.0), 8, 0.9);
    let outcome = app.on_fix(at_secs(5), &fix);
    assert!(matches!(
        outcome,
        FixOutcome::Sleeping {
            interval_secs: 300,
            ..
        }
    ));
    assert!(!app.gps().power().is_on());
    assert!(app.context().gps_detected());
    assert_eq!(app.next_deadline(), Some(at_secs(60)));

    // Detect timer was cancelled by the fix; only the BLE window expires.
    assert_eq!(
        drain(&mut app, at_secs(60)),
        vec![Expiry::Ble(IdleOutcome::ShutDown)]
    );
    assert_eq!(app.next_deadline(), Some(at_secs(305)));

    assert_eq!(
        drain(&mut app, at_secs(305)),
        vec![Expiry::Gps(TimerOutcome::Woke)]
    );
    assert!(app.gps().power().is_on());
    assert_eq!(app.gps().state(), DutyState::Active);
}

/// Point `km` due north of `origin` along its meridian.
fn north_of(origin: Location, km: f32) -> Location {
    Location::new(origin.latitude + km / 111.194_93, origin.longitude)
}

#[test]
fn distance_matches_great_circle() {
    let spawn = Location::new(0.0, 10.0);
    for km in [10.0f32, 54.75, 61.0, 80.0, 115.0, 215.0] {
        let d = spawn.distance_km(&north_of(spawn, km));
        assert!(
            (d - km) / km < 0.005 && (km - d) / km < 0.005,
            "{} km came out as {}",
            km,
            d
        );
    }

    let paris = Location::new(48.8566, 2.3522);
    let london = Location::new(51.5074, -0.1278);
    let d = paris.distance_km(&london);
    assert!((341.9..345.3).contains(&d), "Paris-London came out as {}", d);
}

#[test]
fn fixes_just_past_a_band_edge_sleep_for_the_residual() {
    let spawn = Location::new(0.0, 10.0);
    // Residual 11 km or 15 km beyond each band edge: 300 s, receiver off.
    for km in [61.0f32, 115.0, 215.0] {
        let mut settings = Settings::default();
        settings.spawn_location = spawn;
        let mut app = boot(settings);

        let fix = GpsFix::locked(north_of(spawn, km), 7, 1.0);
        let outcome = app.on_fix(at_secs(3), &fix);
        assert!(
            matches!(
                outcome,
                FixOutcome::Sleeping {
                    interval_secs: 300,
                    ..
                }
            ),
            "{} km gave {:?}",
            km,
            outcome
        );
        assert!(!app.gps().power().is_on());
        assert_eq!(app.gps().next_deadline(), Some(at_secs(303)));
    }
}

#[test]
fn near_fix_keeps_receiver_on() {
    let mut settings = Settings::default();
    settings.spawn_location = Location::new(0.0, 10.0);
    let mut app = boot(settings);

    let fix = GpsFix::locked(Location::new(3.0 / 111.195, 10.0), 6, 1.4);
    assert!(matches!(
        app.on_fix(at_secs(1), &fix),
        FixOutcome::Awake { .. }
    ));
    assert!(app.gps().power().is_on());
    assert_eq!(app.context().current_location(), fix.location);
}

#[test]
fn azimuth_notifications_are_rate_limited_and_need_a_peer() {
    let mut app = boot(Settings::default());

    assert_eq!(app.on_bus_event(at_ms(0), &heading(90)), None);

    app.on_connect();
    assert_eq!(app.on_bus_event(at_ms(1_000), &heading(91)), Some(91));
    assert_eq!(app.on_bus_event(at_ms(1_100), &heading(92)), None);
    assert_eq!(app.on_bus_event(at_ms(2_600), &heading(93)), Some(93));

    let reset = Event::new(EventKind::FactoryReset, Source::Ble);
    assert_eq!(app.on_bus_event(at_ms(5_000), &reset), None);
}

#[test]
fn info_reports_detection_and_model() {
    let mut app = boot(Settings::default());
    assert!(app.info().contains("\"gpsStatus\":\"0\""));
    assert!(app.info().contains("\"model\":\"0\""));

    app.on_fix(at_secs(2), &GpsFix::no_lock());
    app.on_write(Characteristic::CustomModel, &[1]).unwrap();

    let info = app.info();
    assert!(info.contains("\"gpsStatus\":\"1\""));
    assert!(info.contains("\"model\":\"1\""));
    assert!(info.contains("\"gitCommit\":\"0000000\""));
}

#[test]
fn sensor_heading_marks_sensor_present() {
    let mut app = boot(Settings::default());
    assert!(app.info().contains("\"sensorStatus\":\"0\""));

    app.on_bus_event(at_ms(0), &Event::new(EventKind::Azimuth(10), Source::Ble));
    assert!(!app.context().has_sensor());

    app.on_bus_event(at_ms(10), &heading(12));
    assert!(app.context().has_sensor());
    assert!(app.info().contains("\"sensorStatus\":\"1\""));
}
