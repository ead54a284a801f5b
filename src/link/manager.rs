//! Connection manager state machine.
//!
//! ```text
//! Idle ─connect()─▶ Scanning ─▶ Connecting ─▶ NegotiatingTransport
//!                                  ▲                 │
//!                      (backoff)   │                 ▼
//!             Disconnected ◀───────┼────── DiscoveringServices ─▶ Subscribing ─▶ Ready
//!                  │ attempts == 3                                                │
//!                  ▼                                                              │
//!                Failed ◀──── service/characteristic missing      disconnect/stale ┘
//! ```
//!
//! The manager never blocks and owns no threads. Requests go out through the
//! [`Transport`]; outcomes come back through [`ConnectionManager::handle_event`];
//! deadlines are evaluated by [`ConnectionManager::poll_timers`]. Callers
//! drain [`LinkSignal`]s after each call.

use crate::constants::{
    connect_settle, connection_timeout, data_stale, retry_backoff, CCCD_UUID,
    CHARACTERISTIC_UUID, MAX_ATTEMPTS, REQUESTED_MTU, SERVICE_UUID,
};
use crate::link::timers::{TimerKind, Timers};
use crate::link::transport::{DeviceMatcher, RadioCapability, Transport};
use crate::link::types::{
    ConnectionState, DeviceHandle, GattService, LinkError, LinkSignal, RetryState, SessionId,
    TransportEvent, TransportEventKind,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing policy. Defaults are the protocol constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub connect_settle: Duration,
    pub connection_timeout: Duration,
    pub retry_backoff: Duration,
    pub data_stale: Duration,
    pub max_attempts: u32,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            connect_settle: connect_settle(),
            connection_timeout: connection_timeout(),
            retry_backoff: retry_backoff(),
            data_stale: data_stale(),
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

pub struct ConnectionManager<T, R> {
    transport: T,
    radio: R,
    matcher: DeviceMatcher,
    timing: LinkTiming,
    state: ConnectionState,
    retry: RetryState,
    /// Device of the open (or last) session
    device: Option<DeviceHandle>,
    last_known: Option<DeviceHandle>,
    session: Option<SessionId>,
    next_session: u64,
    timers: Timers,
    signals: VecDeque<LinkSignal>,
}

impl<T: Transport, R: RadioCapability> ConnectionManager<T, R> {
    pub fn new(transport: T, radio: R, matcher: DeviceMatcher) -> Self {
        Self::with_timing(transport, radio, matcher, LinkTiming::default())
    }

    pub fn with_timing(transport: T, radio: R, matcher: DeviceMatcher, timing: LinkTiming) -> Self {
        Self {
            transport,
            radio,
            matcher,
            timing,
            state: ConnectionState::Idle,
            retry: RetryState::new(timing.max_attempts),
            device: None,
            last_known: None,
            session: None,
            next_session: 1,
            timers: Timers::new(),
            signals: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry(&self) -> RetryState {
        self.retry
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn last_known_device(&self) -> Option<&DeviceHandle> {
        self.last_known.as_ref()
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Earliest deadline the owner must wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Take every signal produced since the last drain.
    pub fn drain_signals(&mut self) -> Vec<LinkSignal> {
        self.signals.drain(..).collect()
    }

    /// Start a new connection cycle.
    ///
    /// Allowed from Idle, Disconnected and Failed. A failing capability gate
    /// or an empty scan leaves the manager Idle-equivalent and returns the
    /// error without touching the retry counter.
    pub fn connect(&mut self, now: Instant) -> Result<(), LinkError> {
        // Scanning never outlives a call, so only open sessions can be busy
        if self.state.has_session() {
            return Err(LinkError::InvalidState(self.state));
        }
        self.radio.check()?;

        self.timers.cancel_all();
        self.retry.reset();

        let device = self.scan()?;
        self.begin_attempt(device, now);
        Ok(())
    }

    /// Tear down any session, cancel every timer and return to Idle.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.retry.reset();
        self.set_state(ConnectionState::Idle);
    }

    /// Process one transport event.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        if Some(event.session) != self.session {
            debug!(session = %event.session, "dropping event for inactive session");
            return;
        }

        match (self.state, event.kind) {
            (_, TransportEventKind::Disconnected { reason }) => {
                self.fail_attempt(LinkError::TransportDisconnected(reason), now);
            }
            (ConnectionState::Connecting, TransportEventKind::Connected) => {
                self.set_state(ConnectionState::NegotiatingTransport);
                let session = event.session;
                if let Err(e) = self.transport.request_mtu(session, REQUESTED_MTU) {
                    debug!(error = %e, "transfer unit request rejected, continuing");
                    self.start_discovery(session, now);
                }
            }
            (ConnectionState::NegotiatingTransport, TransportEventKind::MtuNegotiated { mtu }) => {
                match mtu {
                    Some(mtu) => debug!(mtu, "transfer unit negotiated"),
                    None => debug!("transfer unit negotiation refused"),
                }
                self.start_discovery(event.session, now);
            }
            (
                ConnectionState::DiscoveringServices,
                TransportEventKind::ServicesDiscovered { services },
            ) => {
                self.subscribe(event.session, &services, now);
            }
            (ConnectionState::Subscribing, TransportEventKind::DescriptorWritten { ok: true }) => {
                self.become_ready(now);
            }
            (ConnectionState::Subscribing, TransportEventKind::DescriptorWritten { ok: false }) => {
                self.fail_attempt(
                    LinkError::TransportDisconnected("notification enable failed".into()),
                    now,
                );
            }
            (ConnectionState::Ready, TransportEventKind::Notification { payload }) => {
                self.signals.push_back(LinkSignal::Data(payload));
            }
            (state, kind) => {
                debug!(%state, ?kind, "ignoring transport event");
            }
        }
    }

    /// Fire every deadline due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        for kind in self.timers.expired(now) {
            match (kind, self.state) {
                (TimerKind::ConnectSettle, ConnectionState::Connecting) => self.issue_connect(now),
                (TimerKind::ConnectionTimeout, state) if state.is_establishing() => {
                    warn!(%state, "connection attempt timed out");
                    self.fail_attempt(LinkError::ConnectionTimeout, now);
                }
                (TimerKind::RetryBackoff, ConnectionState::Disconnected) => self.retry_attempt(now),
                (TimerKind::StaleLink, ConnectionState::Ready) => {
                    warn!(
                        stale_ms = self.timing.data_stale.as_millis() as u64,
                        "no telemetry received, treating link as lost"
                    );
                    self.signals.push_back(LinkSignal::StaleLink);
                    self.fail_attempt(
                        LinkError::TransportDisconnected("no telemetry received".into()),
                        now,
                    );
                }
                (kind, state) => debug!(?kind, %state, "timer no longer relevant"),
            }
        }
    }

    /// A decoded sample arrived; push the stale-link deadline out.
    pub fn note_fresh_sample(&mut self, now: Instant) {
        if self.state == ConnectionState::Ready {
            self.timers.arm(TimerKind::StaleLink, now + self.timing.data_stale);
        }
    }

    fn scan(&mut self) -> Result<DeviceHandle, LinkError> {
        self.set_state(ConnectionState::Scanning);
        let devices = self.transport.paired_devices();
        match self.matcher.select(&devices) {
            Some(device) => {
                info!(%device, candidates = devices.len(), "matched device");
                Ok(device)
            }
            None => {
                warn!(candidates = devices.len(), "no matching device among paired devices");
                self.set_state(ConnectionState::Idle);
                Err(LinkError::DeviceNotFound)
            }
        }
    }

    fn begin_attempt(&mut self, device: DeviceHandle, now: Instant) {
        self.teardown();

        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.session = Some(session);

        info!(%device, %session, attempt = self.retry.attempts() + 1, "opening session");
        self.device = Some(device);
        self.set_state(ConnectionState::Connecting);
        self.timers.arm(TimerKind::ConnectionTimeout, now + self.timing.connection_timeout);
        self.timers.arm(TimerKind::ConnectSettle, now + self.timing.connect_settle);
    }

    fn issue_connect(&mut self, now: Instant) {
        let (Some(session), Some(device)) = (self.session, self.device.clone()) else {
            return;
        };
        if let Err(e) = self.transport.connect(session, &device) {
            self.fail_attempt(e, now);
        }
    }

    fn start_discovery(&mut self, session: SessionId, now: Instant) {
        self.set_state(ConnectionState::DiscoveringServices);
        if let Err(e) = self.transport.discover_services(session) {
            self.fail_attempt(e, now);
        }
    }

    fn subscribe(&mut self, session: SessionId, services: &[GattService], now: Instant) {
        let Some(service) = services.iter().find(|s| s.uuid == SERVICE_UUID) else {
            return self.protocol_failure(LinkError::ServiceMissing(SERVICE_UUID));
        };
        if !service.characteristics.contains(&CHARACTERISTIC_UUID) {
            return self.protocol_failure(LinkError::CharacteristicMissing(CHARACTERISTIC_UUID));
        }

        self.set_state(ConnectionState::Subscribing);
        if let Err(e) =
            self.transport
                .enable_notifications(session, SERVICE_UUID, CHARACTERISTIC_UUID, CCCD_UUID)
        {
            self.fail_attempt(e, now);
        }
    }

    fn become_ready(&mut self, now: Instant) {
        self.timers.cancel(TimerKind::ConnectionTimeout);
        self.retry.reset();
        self.set_state(ConnectionState::Ready);
        self.timers.arm(TimerKind::StaleLink, now + self.timing.data_stale);

        if let Some(device) = self.device.clone() {
            self.last_known = Some(device.clone());
            self.signals.push_back(LinkSignal::Connected(device));
        }
    }

    /// Route a lost or aborted attempt through the retry policy.
    fn fail_attempt(&mut self, error: LinkError, now: Instant) {
        if !error.is_retryable() {
            return self.protocol_failure(error);
        }

        self.teardown();
        self.set_state(ConnectionState::Disconnected);

        let attempts = self.retry.record_failure();
        self.signals.push_back(LinkSignal::Disconnected {
            error: error.clone(),
            attempts,
        });

        if self.retry.exhausted() {
            error!(attempts, last_error = %error, "giving up on device link");
            self.set_state(ConnectionState::Failed);
            self.signals
                .push_back(LinkSignal::Failed(LinkError::RetriesExhausted { attempts }));
        } else {
            warn!(
                attempts,
                max = self.retry.max_attempts(),
                error = %error,
                "link lost, retrying after backoff"
            );
            self.timers.arm(TimerKind::RetryBackoff, now + self.timing.retry_backoff);
        }
    }

    /// Non-retryable failure: surface immediately without consuming an attempt.
    fn protocol_failure(&mut self, error: LinkError) {
        error!(%error, "link failure is not retryable");
        self.teardown();
        self.set_state(ConnectionState::Failed);
        self.signals.push_back(LinkSignal::Failed(error));
    }

    fn retry_attempt(&mut self, now: Instant) {
        let device = match self.last_known.clone().or_else(|| self.device.clone()) {
            Some(device) => device,
            None => match self.scan() {
                Ok(device) => device,
                Err(e) => {
                    self.set_state(ConnectionState::Failed);
                    self.signals.push_back(LinkSignal::Failed(e));
                    return;
                }
            },
        };
        self.begin_attempt(device, now);
    }

    fn teardown(&mut self) {
        self.timers.cancel_all();
        if let Some(session) = self.session.take() {
            debug!(%session, "tearing down session");
            self.transport.disconnect(session);
        }
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "link state");
        self.state = to;
        self.signals.push_back(LinkSignal::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::transport::AlwaysAvailable;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect(SessionId, String),
        RequestMtu(SessionId, u16),
        Discover(SessionId),
        Subscribe(SessionId),
        Disconnect(SessionId),
    }

    #[derive(Default)]
    struct Recording {
        devices: Vec<DeviceHandle>,
        calls: Vec<Call>,
        connect_error: Option<LinkError>,
    }

    impl Transport for Recording {
        fn paired_devices(&mut self) -> Vec<DeviceHandle> {
            self.devices.clone()
        }

        fn connect(&mut self, session: SessionId, device: &DeviceHandle) -> Result<(), LinkError> {
            self.calls.push(Call::Connect(session, device.address.clone()));
            match self.connect_error.clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn request_mtu(&mut self, session: SessionId, mtu: u16) -> Result<(), LinkError> {
            self.calls.push(Call::RequestMtu(session, mtu));
            Ok(())
        }

        fn discover_services(&mut self, session: SessionId) -> Result<(), LinkError> {
            self.calls.push(Call::Discover(session));
            Ok(())
        }

        fn enable_notifications(
            &mut self,
            session: SessionId,
            _service: uuid::Uuid,
            _characteristic: uuid::Uuid,
            descriptor: uuid::Uuid,
        ) -> Result<(), LinkError> {
            assert_eq!(descriptor, CCCD_UUID);
            self.calls.push(Call::Subscribe(session));
            Ok(())
        }

        fn disconnect(&mut self, session: SessionId) {
            self.calls.push(Call::Disconnect(session));
        }
    }

    fn matcher() -> DeviceMatcher {
        DeviceMatcher::new("ESP32_EmotionBand", vec!["ESP32".into()])
    }

    fn manager() -> ConnectionManager<Recording, AlwaysAvailable> {
        let transport = Recording {
            devices: vec![DeviceHandle::new("AA:BB", "ESP32_EmotionBand")],
            ..Default::default()
        };
        ConnectionManager::new(transport, AlwaysAvailable, matcher())
    }

    fn event(session: SessionId, kind: TransportEventKind) -> TransportEvent {
        TransportEvent::new(session, kind)
    }

    fn telemetry_services() -> Vec<GattService> {
        vec![GattService {
            uuid: SERVICE_UUID,
            characteristics: vec![CHARACTERISTIC_UUID],
        }]
    }

    /// Walk a freshly connected manager to Ready.
    fn drive_to_ready(m: &mut ConnectionManager<Recording, AlwaysAvailable>, t: Instant) {
        m.poll_timers(t + connect_settle());
        let s = m.session().unwrap();
        m.handle_event(event(s, TransportEventKind::Connected), t);
        m.handle_event(event(s, TransportEventKind::MtuNegotiated { mtu: Some(247) }), t);
        m.handle_event(
            event(
                s,
                TransportEventKind::ServicesDiscovered {
                    services: telemetry_services(),
                },
            ),
            t,
        );
        m.handle_event(event(s, TransportEventKind::DescriptorWritten { ok: true }), t);
    }

    #[test]
    fn test_happy_path_reaches_ready() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m.transport().calls.is_empty(), "connect waits for the settle delay");

        drive_to_ready(&mut m, t0);
        assert_eq!(m.state(), ConnectionState::Ready);
        assert_eq!(
            m.transport().calls,
            vec![
                Call::Connect(SessionId(1), "AA:BB".into()),
                Call::RequestMtu(SessionId(1), REQUESTED_MTU),
                Call::Discover(SessionId(1)),
                Call::Subscribe(SessionId(1)),
            ]
        );
        assert!(!m.timers().is_armed(TimerKind::ConnectionTimeout));
        assert!(m.timers().is_armed(TimerKind::StaleLink));

        let signals = m.drain_signals();
        assert!(signals.contains(&LinkSignal::Connected(DeviceHandle::new(
            "AA:BB",
            "ESP32_EmotionBand"
        ))));
    }

    #[test]
    fn test_mtu_refusal_still_discovers() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        m.poll_timers(t0 + connect_settle());
        let s = m.session().unwrap();
        m.handle_event(event(s, TransportEventKind::Connected), t0);
        m.handle_event(event(s, TransportEventKind::MtuNegotiated { mtu: None }), t0);
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);
    }

    #[test]
    fn test_gate_blocks_connect_without_state_change() {
        let mut m = ConnectionManager::new(Recording::default(), || false, matcher());
        assert_eq!(m.connect(Instant::now()), Err(LinkError::PermissionDenied));
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(m.drain_signals().is_empty());
    }

    #[test]
    fn test_no_matching_device() {
        let mut m = ConnectionManager::new(Recording::default(), AlwaysAvailable, matcher());
        assert_eq!(m.connect(Instant::now()), Err(LinkError::DeviceNotFound));
        assert_eq!(m.state(), ConnectionState::Idle);
        assert_eq!(m.retry().attempts(), 0);
    }

    #[test]
    fn test_retry_exhaustion_after_three_disconnects() {
        let mut t = Instant::now();
        let mut m = manager();
        m.connect(t).unwrap();

        for attempt in 1..=3u32 {
            assert_eq!(m.state(), ConnectionState::Connecting);
            let s = m.session().unwrap();
            m.handle_event(
                event(
                    s,
                    TransportEventKind::Disconnected {
                        reason: "link loss".into(),
                    },
                ),
                t,
            );
            assert_eq!(m.retry().attempts(), attempt);

            if attempt < 3 {
                assert_eq!(m.state(), ConnectionState::Disconnected);
                t += retry_backoff();
                m.poll_timers(t);
            }
        }

        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.retry().attempts(), 3);
        assert_eq!(m.next_deadline(), None);

        let signals = m.drain_signals();
        assert_eq!(
            signals.last(),
            Some(&LinkSignal::Failed(LinkError::RetriesExhausted { attempts: 3 }))
        );
    }

    #[test]
    fn test_success_resets_attempts() {
        let mut t = Instant::now();
        let mut m = manager();
        m.connect(t).unwrap();
        let s = m.session().unwrap();
        m.handle_event(
            event(s, TransportEventKind::Disconnected { reason: "x".into() }),
            t,
        );
        assert_eq!(m.retry().attempts(), 1);

        t += retry_backoff();
        m.poll_timers(t);
        drive_to_ready(&mut m, t);
        assert_eq!(m.state(), ConnectionState::Ready);
        assert_eq!(m.retry().attempts(), 0);
    }

    #[test]
    fn test_connection_timeout_counts_as_attempt() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        m.poll_timers(t0 + connect_settle());
        m.poll_timers(t0 + connection_timeout());

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.retry().attempts(), 1);
        assert!(m.transport().calls.contains(&Call::Disconnect(SessionId(1))));
        assert!(m.drain_signals().contains(&LinkSignal::Disconnected {
            error: LinkError::ConnectionTimeout,
            attempts: 1
        }));
    }

    #[test]
    fn test_missing_service_fails_without_consuming_attempt() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        m.poll_timers(t0 + connect_settle());
        let s = m.session().unwrap();
        m.handle_event(event(s, TransportEventKind::Connected), t0);
        m.handle_event(event(s, TransportEventKind::MtuNegotiated { mtu: None }), t0);
        m.handle_event(
            event(
                s,
                TransportEventKind::ServicesDiscovered {
                    services: vec![GattService {
                        uuid: SERVICE_UUID,
                        characteristics: vec![],
                    }],
                },
            ),
            t0,
        );

        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.retry().attempts(), 0);
        assert_eq!(m.next_deadline(), None);
        assert_eq!(
            m.drain_signals().last(),
            Some(&LinkSignal::Failed(LinkError::CharacteristicMissing(
                CHARACTERISTIC_UUID
            )))
        );
    }

    #[test]
    fn test_transport_errors_route_by_retryability() {
        let t0 = Instant::now();
        let mut m = manager();
        m.transport_mut().connect_error = Some(LinkError::PermissionDenied);
        m.connect(t0).unwrap();
        m.poll_timers(t0 + connect_settle());

        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.retry().attempts(), 0);
        assert_eq!(m.next_deadline(), None);
        let signals = m.drain_signals();
        assert!(signals.contains(&LinkSignal::Failed(LinkError::PermissionDenied)));
        assert!(!signals
            .iter()
            .any(|s| matches!(s, LinkSignal::Disconnected { .. })));

        let mut m = manager();
        m.transport_mut().connect_error = Some(LinkError::TransportDisconnected("busy".into()));
        m.connect(t0).unwrap();
        m.poll_timers(t0 + connect_settle());

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.retry().attempts(), 1);
        assert!(m.timers().is_armed(TimerKind::RetryBackoff));
    }

    #[test]
    fn test_stale_link_trips_after_silence() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        drive_to_ready(&mut m, t0);
        m.drain_signals();

        let t1 = t0 + Duration::from_secs(5);
        m.note_fresh_sample(t1);
        m.poll_timers(t0 + data_stale());
        assert_eq!(m.state(), ConnectionState::Ready, "fresh sample re-armed the watchdog");

        m.poll_timers(t1 + data_stale());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        let signals = m.drain_signals();
        assert!(signals.contains(&LinkSignal::StaleLink));
        assert!(m.timers().is_armed(TimerKind::RetryBackoff));
    }

    #[test]
    fn test_retry_reuses_last_known_device() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        drive_to_ready(&mut m, t0);
        m.transport_mut().devices.clear();

        let s = m.session().unwrap();
        m.handle_event(
            event(s, TransportEventKind::Disconnected { reason: "x".into() }),
            t0,
        );
        m.poll_timers(t0 + retry_backoff());
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.session(), Some(SessionId(2)));
    }

    #[test]
    fn test_events_from_old_session_are_dropped() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        drive_to_ready(&mut m, t0);
        m.disconnect();
        m.drain_signals();

        m.connect(t0).unwrap();
        m.handle_event(
            event(
                SessionId(1),
                TransportEventKind::Notification {
                    payload: b"{}".to_vec(),
                },
            ),
            t0,
        );
        m.handle_event(
            event(SessionId(1), TransportEventKind::Disconnected { reason: "late".into() }),
            t0,
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.retry().attempts(), 0);
        assert!(!m
            .drain_signals()
            .iter()
            .any(|s| matches!(s, LinkSignal::Data(_) | LinkSignal::Disconnected { .. })));
    }

    #[test]
    fn test_disconnect_cancels_everything() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        m.disconnect();
        assert_eq!(m.state(), ConnectionState::Idle);
        assert_eq!(m.next_deadline(), None);
        assert_eq!(m.session(), None);
        m.poll_timers(t0 + Duration::from_secs(60));
        assert_eq!(m.transport().calls, vec![Call::Disconnect(SessionId(1))]);
    }

    #[test]
    fn test_connect_while_busy_is_rejected() {
        let t0 = Instant::now();
        let mut m = manager();
        m.connect(t0).unwrap();
        assert_eq!(
            m.connect(t0),
            Err(LinkError::InvalidState(ConnectionState::Connecting))
        );

        drive_to_ready(&mut m, t0);
        assert_eq!(
            m.connect(t0),
            Err(LinkError::InvalidState(ConnectionState::Ready))
        );
        assert_eq!(m.state(), ConnectionState::Ready);
    }
}
