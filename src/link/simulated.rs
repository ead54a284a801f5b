//! In-process simulated companion device.
//!
//! Answers the connect / transfer-unit / discovery / subscribe sequence
//! immediately and then streams synthetic telemetry records from a
//! background thread, split into fragments no larger than the configured
//! transfer unit. Useful for running the monitor without radio hardware.

use crate::constants::{CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::link::transport::{EventSink, Transport};
use crate::link::types::{
    DeviceHandle, GattService, LinkError, SessionId, TransportEvent, TransportEventKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Largest transfer unit the simulated peer accepts.
pub const SIMULATED_MAX_MTU: u16 = 247;

/// Behaviour of one simulated band.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub handle: DeviceHandle,
    /// Expose the telemetry service and characteristic
    pub exposes_telemetry: bool,
    /// Notification payload size; records are split at this many bytes
    pub fragment_size: usize,
    /// Interval between telemetry records
    pub sample_interval: Duration,
    /// Every n-th record reports the band as not worn
    pub not_worn_every: Option<u64>,
    /// Drop the link after this many records in a session
    pub drop_after: Option<u64>,
    /// How many sessions may be dropped
    pub max_drops: u32,
    /// Stop sending (without disconnecting) after this many records
    pub silent_after: Option<u64>,
}

impl SimulatedDevice {
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            exposes_telemetry: true,
            fragment_size: 20,
            sample_interval: Duration::from_secs(2),
            not_worn_every: None,
            drop_after: None,
            max_drops: 0,
            silent_after: None,
        }
    }

    fn services(&self) -> Vec<GattService> {
        let mut services = vec![GattService {
            // Battery service
            uuid: Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
            characteristics: vec![Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb)],
        }];
        if self.exposes_telemetry {
            services.push(GattService {
                uuid: SERVICE_UUID,
                characteristics: vec![CHARACTERISTIC_UUID],
            });
        }
        services
    }
}

struct Stream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Transport backed by simulated devices.
pub struct SimulatedTransport<S> {
    devices: Vec<SimulatedDevice>,
    sink: S,
    sessions: HashMap<SessionId, SimulatedDevice>,
    streams: HashMap<SessionId, Stream>,
    drops: Arc<AtomicU32>,
}

impl<S: EventSink + Clone + 'static> SimulatedTransport<S> {
    pub fn new(devices: Vec<SimulatedDevice>, sink: S) -> Self {
        Self {
            devices,
            sink,
            sessions: HashMap::new(),
            streams: HashMap::new(),
            drops: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of sessions open on the simulated side.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn emit(&self, session: SessionId, kind: TransportEventKind) {
        self.sink.emit(TransportEvent::new(session, kind));
    }

    fn session_device(&self, session: SessionId) -> Result<&SimulatedDevice, LinkError> {
        self.sessions
            .get(&session)
            .ok_or_else(|| LinkError::TransportDisconnected(format!("{session} is not open")))
    }

    fn start_stream(&mut self, session: SessionId, device: SimulatedDevice) {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let sink = self.sink.clone();
        let drops = self.drops.clone();

        let handle = std::thread::spawn(move || {
            stream_telemetry(session, device, sink, flag, drops);
        });

        self.streams.insert(
            session,
            Stream {
                running,
                handle: Some(handle),
            },
        );
    }

    fn stop_stream(&mut self, session: SessionId) {
        if let Some(mut stream) = self.streams.remove(&session) {
            stream.running.store(false, Ordering::SeqCst);
            if let Some(handle) = stream.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl<S: EventSink + Clone + 'static> Transport for SimulatedTransport<S> {
    fn paired_devices(&mut self) -> Vec<DeviceHandle> {
        self.devices.iter().map(|d| d.handle.clone()).collect()
    }

    fn connect(&mut self, session: SessionId, device: &DeviceHandle) -> Result<(), LinkError> {
        let Some(found) = self.devices.iter().find(|d| d.handle == *device).cloned() else {
            return Err(LinkError::DeviceNotFound);
        };
        debug!(%session, device = %found.handle, "simulated connect");
        self.sessions.insert(session, found);
        self.emit(session, TransportEventKind::Connected);
        Ok(())
    }

    fn request_mtu(&mut self, session: SessionId, mtu: u16) -> Result<(), LinkError> {
        self.session_device(session)?;
        self.emit(
            session,
            TransportEventKind::MtuNegotiated {
                mtu: Some(mtu.min(SIMULATED_MAX_MTU)),
            },
        );
        Ok(())
    }

    fn discover_services(&mut self, session: SessionId) -> Result<(), LinkError> {
        let services = self.session_device(session)?.services();
        self.emit(session, TransportEventKind::ServicesDiscovered { services });
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        session: SessionId,
        service: Uuid,
        characteristic: Uuid,
        _descriptor: Uuid,
    ) -> Result<(), LinkError> {
        let device = self.session_device(session)?.clone();
        let ok = device
            .services()
            .iter()
            .any(|s| s.uuid == service && s.characteristics.contains(&characteristic));
        self.emit(session, TransportEventKind::DescriptorWritten { ok });
        if ok {
            self.start_stream(session, device);
        }
        Ok(())
    }

    fn disconnect(&mut self, session: SessionId) {
        self.stop_stream(session);
        self.sessions.remove(&session);
    }
}

impl<S> Drop for SimulatedTransport<S> {
    fn drop(&mut self) {
        for stream in self.streams.values_mut() {
            stream.running.store(false, Ordering::SeqCst);
            if let Some(handle) = stream.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn stream_telemetry<S: EventSink>(
    session: SessionId,
    device: SimulatedDevice,
    sink: S,
    running: Arc<AtomicBool>,
    drops: Arc<AtomicU32>,
) {
    let step = Duration::from_millis(10).min(device.sample_interval);
    let mut index: u64 = 0;

    while running.load(Ordering::SeqCst) {
        // Sleep in short steps so a disconnect is noticed promptly
        let mut waited = Duration::ZERO;
        while waited < device.sample_interval {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(step);
            waited += step;
        }

        if device.drop_after == Some(index)
            && drops
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < device.max_drops).then_some(n + 1)
                })
                .is_ok()
        {
            sink.emit(TransportEvent::new(
                session,
                TransportEventKind::Disconnected {
                    reason: "simulated link loss".into(),
                },
            ));
            return;
        }

        if device.silent_after.is_some_and(|n| index >= n) {
            index += 1;
            continue;
        }

        let worn = device
            .not_worn_every
            .map_or(true, |n| n == 0 || (index + 1) % n != 0);
        let record = synthetic_record(index, worn);
        for payload in fragment(record.as_bytes(), device.fragment_size) {
            sink.emit(TransportEvent::new(
                session,
                TransportEventKind::Notification {
                    payload: payload.to_vec(),
                },
            ));
        }
        index += 1;
    }
}

/// Split a payload into chunks of at most `size` bytes.
pub fn fragment(payload: &[u8], size: usize) -> impl Iterator<Item = &[u8]> {
    payload.chunks(size.max(1))
}

/// Deterministic, physiologically plausible telemetry record.
pub fn synthetic_record(index: u64, worn: bool) -> String {
    let t = index as f64;
    format!(
        "{{\"bpm\":{:.1},\"hrv\":{:.1},\"temp\":{:.2},\"acc_x\":{:.3},\"acc_y\":{:.3},\"acc_z\":{:.3},\"bvp\":{:.2},\"finger\":{}}}",
        72.0 + 8.0 * (t * 0.3).sin(),
        45.0 + 5.0 * (t * 0.2).cos(),
        33.0 + 0.2 * (t * 0.05).sin(),
        0.1 * t.sin(),
        9.7 + 0.2 * (t * 0.7).cos(),
        0.3 * (t * 1.3).sin(),
        20.0 * (t * 0.9).sin(),
        u8::from(worn)
    )
}
