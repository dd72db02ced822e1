//! GPS receiver: UART reader and the power-enable line.

use defmt::warn;
use embassy_nrf::gpio::Output;
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::UarteRx;
use mcompass::gps::duty_cycle::ReceiverPower;
use mcompass::gps::GpsFix;
use mcompass::location::Location;
use nmea0183::{ParseResult, Parser, Sentence};

use crate::{AppEvent, APP_EVENTS};

/// Receiver enable pin. The module is powered while the line is low.
pub struct ReceiverEnable {
    pin: Output<'static>,
}

impl ReceiverEnable {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl ReceiverPower for ReceiverEnable {
    fn set_receiver_enabled(&mut self, enabled: bool) {
        if enabled {
            self.pin.set_low();
        } else {
            self.pin.set_high();
        }
    }
}

fn to_fix(result: ParseResult) -> Option<GpsFix> {
    match result {
        ParseResult::GGA(Some(gga)) => Some(GpsFix::locked(
            Location::new(gga.latitude.as_f64() as f32, gga.longitude.as_f64() as f32),
            gga.sat_in_use,
            gga.hdop,
        )),
        // The receiver is talking but has no solution yet.
        ParseResult::GGA(None) => Some(GpsFix::no_lock()),
        _ => None,
    }
}

#[embassy_executor::task]
pub async fn gnss_task(mut rx: UarteRx<'static, UARTE0>) -> ! {
    // The parser is incremental; the chunk size only bounds latency.
    let mut buf = [0u8; 16];
    let mut parser = Parser::new().sentence_only(Sentence::GGA);

    loop {
        if let Err(e) = rx.read(&mut buf).await {
            warn!("GPS UART read error: {:?}", e);
            continue;
        }

        for result in parser.parse_from_bytes(&buf) {
            match result {
                Ok(result) => {
                    if let Some(fix) = to_fix(result) {
                        APP_EVENTS.send(AppEvent::Fix(fix)).await;
                    }
                }
                Err(e) => warn!("NMEA parse error: {}", e),
            }
        }
    }
}
