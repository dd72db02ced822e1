//! SoftDevice peripheral: GATT server, advertising and the connection loop.
//!
//! The radio task never touches the context. GATT writes and link changes
//! become `AppEvent`s; the application task answers with `RadioCommand`s.

use defmt::{info, unwrap, warn};
use embassy_futures::select::{select, Either};
use heapless::Vec;
use mcompass::ble::{uuid_le_bytes, values, Characteristic};
use mcompass::config;
use mcompass::error::{BleError, Error};
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, ServiceList,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::{raw, Softdevice};

use crate::{AppEvent, WritePayload, APP_EVENTS, RADIO_COMMANDS};

/// Requests from the application task.
#[derive(Clone, Copy, defmt::Format)]
pub enum RadioCommand {
    /// Notify the connected peer of a new heading.
    NotifyAzimuth(u16),
    /// Stop advertising for the rest of this boot. Refused while a peer is
    /// connected.
    Shutdown,
}

// UUID literals must match `mcompass::config`; tests/gatt_table.rs checks them.
#[nrf_softdevice::gatt_service(uuid = "d6f8a7e0-3c1b-4b8e-9a5d-2f6b1c0e7a10")]
pub struct BaseService {
    #[characteristic(uuid = "d6f8a7e1-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, write)]
    pub spawn_location: WritePayload,
    #[characteristic(uuid = "d6f8a7e2-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, write)]
    pub color: WritePayload,
    #[characteristic(uuid = "d6f8a7e3-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, notify)]
    pub azimuth: Vec<u8, 2>,
    #[characteristic(uuid = "d6f8a7e4-3c1b-4b8e-9a5d-2f6b1c0e7a10", read)]
    pub info: heapless::String<256>,
    #[characteristic(uuid = "d6f8a7e5-3c1b-4b8e-9a5d-2f6b1c0e7a10", write)]
    pub calibrate: WritePayload,
    #[characteristic(uuid = "d6f8a7e6-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, write)]
    pub brightness: WritePayload,
    #[characteristic(uuid = "d6f8a7e7-3c1b-4b8e-9a5d-2f6b1c0e7a10", write)]
    pub reboot: WritePayload,
    #[characteristic(uuid = "d6f8a7e8-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, write)]
    pub server_mode: WritePayload,
    #[characteristic(uuid = "d6f8a7e9-3c1b-4b8e-9a5d-2f6b1c0e7a10", read, write)]
    pub custom_model: WritePayload,
}

#[nrf_softdevice::gatt_service(uuid = "d6f8a7e0-3c1b-4b8e-9a5d-2f6b1c0e7a20")]
pub struct AdvancedService {
    #[characteristic(uuid = "d6f8a7e1-3c1b-4b8e-9a5d-2f6b1c0e7a20", write)]
    pub virtual_azimuth: WritePayload,
    #[characteristic(uuid = "d6f8a7e2-3c1b-4b8e-9a5d-2f6b1c0e7a20", write)]
    pub virtual_location: WritePayload,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub base: BaseService,
    pub advanced: AdvancedService,
}

const BASE_SERVICE_UUID_LE: [u8; 16] = uuid_le_bytes(config::BASE_SERVICE_UUID);
const ADVANCED_SERVICE_UUID_LE: [u8; 16] = uuid_le_bytes(config::ADVANCED_SERVICE_UUID);

/// SoftDevice configuration: one peripheral link, large MTU, device name.
pub fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: config::BLE_ATT_MTU,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: 4096,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: config::BLE_DEVICE_NAME.as_ptr() as _,
            current_len: config::BLE_DEVICE_NAME.len() as u16,
            max_len: config::BLE_DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

/// Forward a GATT write to the application task.
fn forward_write(characteristic: Characteristic, payload: WritePayload) {
    if APP_EVENTS
        .try_send(AppEvent::Write {
            characteristic,
            payload,
        })
        .is_err()
    {
        warn!("event queue full, dropped {:?} write", characteristic);
    }
}

fn on_server_event(event: ServerEvent) {
    match event {
        ServerEvent::Base(e) => match e {
            BaseServiceEvent::SpawnLocationWrite(v) => forward_write(Characteristic::SpawnLocation, v),
            BaseServiceEvent::ColorWrite(v) => forward_write(Characteristic::Color, v),
            BaseServiceEvent::CalibrateWrite(v) => forward_write(Characteristic::Calibrate, v),
            BaseServiceEvent::BrightnessWrite(v) => forward_write(Characteristic::Brightness, v),
            BaseServiceEvent::RebootWrite(v) => forward_write(Characteristic::Reboot, v),
            BaseServiceEvent::ServerModeWrite(v) => forward_write(Characteristic::ServerMode, v),
            BaseServiceEvent::CustomModelWrite(v) => forward_write(Characteristic::CustomModel, v),
            BaseServiceEvent::AzimuthCccdWrite { notifications, .. } => {
                info!("azimuth notifications: {}", notifications);
            }
        },
        ServerEvent::Advanced(e) => match e {
            AdvancedServiceEvent::VirtualAzimuthWrite(v) => {
                forward_write(Characteristic::VirtualAzimuth, v)
            }
            AdvancedServiceEvent::VirtualLocationWrite(v) => {
                forward_write(Characteristic::VirtualLocation, v)
            }
        },
    }
}

fn request_conn_params(conn: &Connection) {
    let params = raw::ble_gap_conn_params_t {
        min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
        max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
        slave_latency: config::BLE_SLAVE_LATENCY,
        conn_sup_timeout: config::BLE_SUP_TIMEOUT,
    };
    if let Err(e) = conn.set_conn_params(params) {
        warn!("conn param update refused: {:?}", e);
    }
}

/// Serve one connection until the peer leaves.
///
/// A shutdown that arrives while the link is up lost the race against the
/// connection; it is refused so the peer keeps its session.
async fn serve(conn: Connection, server: &Server) {
    request_conn_params(&conn);
    APP_EVENTS.send(AppEvent::Connected).await;

    let gatt = gatt_server::run(&conn, server, on_server_event);
    let commands = async {
        loop {
            match RADIO_COMMANDS.receive().await {
                RadioCommand::NotifyAzimuth(angle) => {
                    let payload = unwrap!(Vec::from_slice(&values::azimuth(angle)));
                    if let Err(e) = server.base.azimuth_notify(&conn, &payload) {
                        warn!("{:?}: {:?}", Error::from(BleError::NotifyFailed), e);
                    }
                }
                RadioCommand::Shutdown => {
                    warn!("shutdown refused, peer connected");
                    APP_EVENTS.send(AppEvent::ShutdownRefused).await;
                }
            }
        }
    };

    if let Either::First(e) = select(gatt, commands).await {
        info!("peer disconnected: {:?}", e);
    }

    APP_EVENTS.send(AppEvent::Disconnected).await;
}

#[embassy_executor::task]
pub async fn radio_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    // Name and base service fill the 31-byte advertising PDU; the advanced
    // service goes in the scan response.
    let adv_data = LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .services_128(ServiceList::Incomplete, &[BASE_SERVICE_UUID_LE])
        .full_name(config::BLE_DEVICE_NAME)
        .build();
    let scan_data = LegacyAdvertisementBuilder::new()
        .services_128(ServiceList::Incomplete, &[ADVANCED_SERVICE_UUID_LE])
        .build();
    let adv_config = peripheral::Config::default();

    loop {
        let advertisement = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data,
            scan_data: &scan_data,
        };
        info!("advertising as {}", config::BLE_DEVICE_NAME);

        let shutdown = match select(
            peripheral::advertise_connectable(sd, advertisement, &adv_config),
            RADIO_COMMANDS.receive(),
        )
        .await
        {
            Either::First(Ok(conn)) => {
                serve(conn, server).await;
                false
            }
            Either::First(Err(e)) => {
                warn!("{:?}: {:?}", Error::from(BleError::AdvertiseFailed), e);
                false
            }
            Either::Second(RadioCommand::Shutdown) => true,
            // Nobody to notify.
            Either::Second(RadioCommand::NotifyAzimuth(_)) => false,
        };

        if shutdown {
            break;
        }
    }

    // The SoftDevice stays enabled for flash access; without advertising
    // or a link the radio is idle until the next reset.
    info!("BLE radio shut down");
    loop {
        core::future::pending::<()>().await;
    }
}
