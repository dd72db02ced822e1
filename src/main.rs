//! mcompass firmware entry point.
//!
//! Tasks:
//! - `softdevice_task` runs the SoftDevice event loop;
//! - `radio_task` advertises and serves the GATT configuration interface;
//! - `gnss_task` decodes NMEA from the GPS UART;
//! - `app_task` owns [`App`] and is the only code that mutates device state;
//! - `storage_task` persists settings snapshots to flash.
//!
//! Hardware callbacks only enqueue `AppEvent`s; anything that needs the
//! context goes through the application task.

#![no_std]
#![no_main]

mod gnss;
mod radio;

use defmt::{error, info, unwrap, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::{PubSubChannel, Subscriber, WaitResult};
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use mcompass::app::{App, Expiry, Timing};
use mcompass::ble::dispatcher::{Setting, WriteOutcome};
use mcompass::ble::session::{IdleOutcome, LinkAction};
use mcompass::ble::{values, Characteristic};
use mcompass::config::{self, GPS_FIX_LOG_EVERY, SLEEP_TABLE};
use mcompass::error::{BleError, Error};
use mcompass::event::{Event, EventKind};
use mcompass::gps::duty_cycle::{FixOutcome, TimerOutcome};
use mcompass::gps::sleep_policy::SleepPolicy;
use mcompass::gps::GpsFix;
use mcompass::storage::{self, Settings};
use mcompass::timer::Instant;
use nrf_softdevice::{Flash, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use crate::gnss::ReceiverEnable;
use crate::radio::{RadioCommand, Server};

/// Raw characteristic write, capped at the largest payload we accept.
pub type WritePayload = heapless::Vec<u8, { config::BLE_MAX_WRITE_LEN }>;

/// Inputs to the application task.
pub enum AppEvent {
    Fix(GpsFix),
    Write {
        characteristic: Characteristic,
        payload: WritePayload,
    },
    Connected,
    Disconnected,
    /// A shutdown reached the radio after a peer had connected.
    ShutdownRefused,
}

/// Requests to the storage task. Only the latest pending one is kept.
enum StorageRequest {
    Save(Settings),
    FactoryReset,
}

type EventBus = PubSubChannel<CriticalSectionRawMutex, Event, 8, 2, 2>;

pub static APP_EVENTS: Channel<CriticalSectionRawMutex, AppEvent, 16> = Channel::new();
pub static RADIO_COMMANDS: Channel<CriticalSectionRawMutex, RadioCommand, 4> = Channel::new();
static EVENT_BUS: EventBus = PubSubChannel::new();
static STORAGE_REQUESTS: Signal<CriticalSectionRawMutex, StorageRequest> = Signal::new();

bind_interrupts!(struct Irqs {
    UARTE0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

fn now() -> Instant {
    Instant::from_ticks(embassy_time::Instant::now().as_micros())
}

fn to_embassy(instant: Instant) -> embassy_time::Instant {
    embassy_time::Instant::from_micros(instant.ticks())
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn storage_task(mut flash: Flash) -> ! {
    loop {
        match STORAGE_REQUESTS.wait().await {
            StorageRequest::Save(settings) => {
                // A failed write is retried with the next snapshot.
                if let Err(e) = storage::save_to_flash(&mut flash, &settings).await {
                    error!("settings not saved: {:?}", e);
                }
            }
            StorageRequest::FactoryReset => {
                warn!("factory reset");
                if let Err(e) = storage::save_to_flash(&mut flash, &Settings::default()).await {
                    error!("factory reset failed: {:?}", e);
                    continue;
                }
                Timer::after_millis(100).await;
                cortex_m::peripheral::SCB::sys_reset();
            }
        }
    }
}

/// Copy every readable value into the GATT table.
fn publish_values(app: &App<'static, ReceiverEnable>, server: &Server) {
    let ctx = app.context();
    let base = &server.base;

    let spawn = values::spawn_location(&ctx.spawn_location());
    let color = values::color(&ctx.color());
    let results = [
        base.spawn_location_set(&unwrap!(WritePayload::from_slice(spawn.as_bytes()))),
        base.color_set(&unwrap!(WritePayload::from_slice(color.as_bytes()))),
        base.brightness_set(&unwrap!(WritePayload::from_slice(&[ctx.brightness()]))),
        base.server_mode_set(&unwrap!(WritePayload::from_slice(&[ctx.server_mode().as_byte()]))),
        base.custom_model_set(&unwrap!(WritePayload::from_slice(&[ctx.model().as_byte()]))),
        base.info_set(&app.info()),
    ];

    for result in results {
        if let Err(e) = result {
            warn!("GATT value update failed: {:?}", e);
        }
    }
}

fn log_fix(count: u32, fix: &GpsFix, outcome: &FixOutcome) {
    match outcome {
        FixOutcome::Sleeping {
            distance_km,
            interval_secs,
        } => info!(
            "GPS: {} km from spawn, receiver off for {} s",
            distance_km, interval_secs
        ),
        FixOutcome::Malformed => warn!("GPS: out-of-range fix ignored: {:?}", fix.location),
        FixOutcome::Rejected(e) => warn!("GPS: fix rejected: {:?}", Error::from(*e)),
        _ if count % GPS_FIX_LOG_EVERY == 0 => info!(
            "GPS fix #{}: {:?} sats={} hdop={} -> {:?}",
            count, fix.location, fix.satellites, fix.hdop, outcome
        ),
        _ => {}
    }
}

fn on_app_event(
    app: &mut App<'static, ReceiverEnable>,
    server: &Server,
    fixes: &mut u32,
    event: AppEvent,
) {
    match event {
        AppEvent::Fix(fix) => {
            let outcome = app.on_fix(now(), &fix);
            *fixes = fixes.wrapping_add(1);
            log_fix(*fixes, &fix, &outcome);
        }
        AppEvent::Write {
            characteristic,
            payload,
        } => match app.on_write(characteristic, &payload) {
            Ok(WriteOutcome::Updated(setting)) => {
                info!("{:?} updated: {:?}", characteristic, setting);
                if let Setting::Brightness(level) = setting {
                    info!("pixel brightness -> {}", level);
                }
                publish_values(app, server);
            }
            Ok(WriteOutcome::Posted(event)) => {
                info!("posting {:?}", event);
                EVENT_BUS.immediate_publisher().publish_immediate(event);
            }
            Ok(WriteOutcome::Ignored) if characteristic.is_advanced() => {
                info!("{:?} not implemented: {=[u8]:x}", characteristic, &payload[..]);
            }
            Ok(WriteOutcome::Ignored) => {
                info!("{:?} write ignored ({} bytes)", characteristic, payload.len());
            }
            Err(e) => warn!(
                "{:?} ({}) write rejected: {:?}",
                characteristic,
                characteristic.uuid(),
                Error::from(e)
            ),
        },
        AppEvent::Connected => {
            app.on_connect();
            info!("peer connected ({} total)", app.session().connected_peers());
            publish_values(app, server);
        }
        AppEvent::Disconnected => match app.on_disconnect() {
            LinkAction::RestartAdvertising => info!("peer disconnected, advertising again"),
            LinkAction::None => {}
        },
        AppEvent::ShutdownRefused => {
            if app.on_shutdown_refused() {
                info!("BLE: session resumed for late peer");
                publish_values(app, server);
            }
        }
    }
}

fn on_bus_event(app: &mut App<'static, ReceiverEnable>, server: &Server, event: Event) {
    match event.kind {
        EventKind::FactoryReset => STORAGE_REQUESTS.signal(StorageRequest::FactoryReset),
        EventKind::SensorCalibrate => info!("calibration requested by {:?}", event.source),
        EventKind::Azimuth(_) => {
            if let Some(angle) = app.on_bus_event(now(), &event) {
                if let Err(e) = server.base.info_set(&app.info()) {
                    warn!("info update failed: {:?}", e);
                }
                if RADIO_COMMANDS
                    .try_send(RadioCommand::NotifyAzimuth(angle))
                    .is_err()
                {
                    warn!("radio busy, azimuth {} dropped", angle);
                }
            }
        }
    }
}

async fn on_expiry(expiry: Expiry) {
    match expiry {
        Expiry::Gps(TimerOutcome::Woke) => info!("GPS: sleep over, receiver on"),
        Expiry::Gps(TimerOutcome::DetectTimeout) => {
            info!("GPS: no receiver detected, powered down")
        }
        Expiry::Ble(IdleOutcome::ShutDown) => {
            info!("BLE: idle timeout, shutting down");
            RADIO_COMMANDS.send(RadioCommand::Shutdown).await;
        }
        Expiry::Ble(IdleOutcome::PeerConnected) => info!("BLE: idle timeout skipped, peer connected"),
        Expiry::Ble(IdleOutcome::AwaitingSpawnLocation) => {
            info!("BLE: idle timeout skipped, spawn location not set")
        }
    }
}

#[embassy_executor::task]
async fn app_task(
    mut app: App<'static, ReceiverEnable>,
    server: &'static Server,
    mut bus: Subscriber<'static, CriticalSectionRawMutex, Event, 8, 2, 2>,
) -> ! {
    let mut fixes: u32 = 0;

    app.start(now());
    publish_values(&app, server);

    loop {
        let deadline = app
            .next_deadline()
            .map(to_embassy)
            .unwrap_or(embassy_time::Instant::MAX);

        match select3(APP_EVENTS.receive(), bus.next_message(), Timer::at(deadline)).await {
            Either3::First(event) => on_app_event(&mut app, server, &mut fixes, event),
            Either3::Second(WaitResult::Message(event)) => on_bus_event(&mut app, server, event),
            Either3::Second(WaitResult::Lagged(n)) => warn!("event bus lagged by {}", n),
            Either3::Third(()) => {}
        }

        while let Some(expiry) = app.poll(now()) {
            on_expiry(expiry).await;
        }

        if let Some(settings) = app.take_dirty_settings() {
            STORAGE_REQUESTS.signal(StorageRequest::Save(settings));
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("mcompass {} starting", env!("CARGO_PKG_VERSION"));

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    interrupt::UARTE0_UART0.set_priority(Priority::P3);

    let sd = Softdevice::enable(&radio::softdevice_config());
    static SERVER: StaticCell<Server> = StaticCell::new();
    let server: &'static Server = SERVER.init(unwrap!(
        Server::new(sd).map_err(|_| Error::from(BleError::ServerInit))
    ));
    unwrap!(spawner.spawn(softdevice_task(sd)));

    let mut flash = Flash::take(sd);
    let settings = storage::load_from_flash(&mut flash).await.unwrap_or_default();
    info!("settings: {:?}", settings);
    unwrap!(spawner.spawn(storage_task(flash)));

    // Receiver starts powered off (enable is active low).
    let enable = Output::new(p.P0_29, Level::High, OutputDrive::Standard);
    let policy = unwrap!(SleepPolicy::new(&SLEEP_TABLE).map_err(Error::from));
    let app = App::new(ReceiverEnable::new(enable), policy, settings, Timing::default());

    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = uarte::Baudrate::BAUD9600;
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, uart_config);
    let (_tx, rx) = uart.split();

    let bus = unwrap!(EVENT_BUS.subscriber());

    unwrap!(spawner.spawn(radio::radio_task(sd, server)));
    unwrap!(spawner.spawn(gnss::gnss_task(rx)));
    unwrap!(spawner.spawn(app_task(app, server, bus)));
}
