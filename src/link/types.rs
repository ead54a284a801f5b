//! Link-layer types shared by the connection manager and transports.

use crate::constants::MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    NegotiatingTransport,
    DiscoveringServices,
    Subscribing,
    Ready,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// True while an attempt is underway and the connection timeout applies.
    pub fn is_establishing(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::NegotiatingTransport
                | ConnectionState::DiscoveringServices
                | ConnectionState::Subscribing
        )
    }

    /// True when a transport session is open.
    pub fn has_session(self) -> bool {
        self.is_establishing() || self == ConnectionState::Ready
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::NegotiatingTransport => "negotiating transport",
            ConnectionState::DiscoveringServices => "discovering services",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A paired or known peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Opaque platform identifier (hardware address on most hosts)
    pub address: String,
    /// Advertised or paired display name
    pub name: String,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.address)
    }
}

/// Bounded attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count one failed attempt and return the new total.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

/// Identifies one transport session. Events from any other session are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A discovered GATT service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Asynchronous outcome reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub session: SessionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(session: SessionId, kind: TransportEventKind) -> Self {
        Self { session, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    /// The link-layer connection is up.
    Connected,
    /// The link dropped.
    Disconnected { reason: String },
    /// Transfer-unit negotiation finished; `None` when the peer refused.
    MtuNegotiated { mtu: Option<u16> },
    /// Service discovery finished.
    ServicesDiscovered { services: Vec<GattService> },
    /// The notification-enable descriptor write completed.
    DescriptorWritten { ok: bool },
    /// One characteristic-changed notification.
    Notification { payload: Vec<u8> },
}

/// Something the connection manager wants its owner to know.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkSignal {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The link reached Ready.
    Connected(DeviceHandle),
    /// An established or in-progress link was lost; a retry may follow.
    Disconnected { error: LinkError, attempts: u32 },
    /// No decoded sample arrived in time while Ready.
    StaleLink,
    /// Terminal failure; no further automatic attempts.
    Failed(LinkError),
    /// Notification payload from the current Ready session.
    Data(Vec<u8>),
}

/// Errors raised by the device link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    PermissionDenied,
    RadioUnavailable,
    DeviceNotFound,
    ConnectionTimeout,
    ServiceMissing(Uuid),
    CharacteristicMissing(Uuid),
    TransportDisconnected(String),
    RetriesExhausted { attempts: u32 },
    InvalidState(ConnectionState),
}

impl LinkError {
    /// Whether this error feeds the bounded retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionTimeout | LinkError::TransportDisconnected(_)
        )
    }
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::PermissionDenied => write!(f, "Radio permission has not been granted"),
            LinkError::RadioUnavailable => write!(f, "Radio is unavailable or switched off"),
            LinkError::DeviceNotFound => write!(f, "No matching paired device found"),
            LinkError::ConnectionTimeout => write!(f, "Connection attempt timed out"),
            LinkError::ServiceMissing(uuid) => write!(f, "Telemetry service {uuid} not found"),
            LinkError::CharacteristicMissing(uuid) => {
                write!(f, "Telemetry characteristic {uuid} not found")
            }
            LinkError::TransportDisconnected(reason) => {
                write!(f, "Transport disconnected: {reason}")
            }
            LinkError::RetriesExhausted { attempts } => {
                write!(f, "Could not connect after {attempts} attempts")
            }
            LinkError::InvalidState(state) => {
                write!(f, "Operation not allowed while {state}")
            }
        }
    }
}

impl std::error::Error for LinkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_state_bounds() {
        let mut retry = RetryState::new(3);
        assert_eq!(retry.record_failure(), 1);
        assert_eq!(retry.record_failure(), 2);
        assert!(!retry.exhausted());
        assert_eq!(retry.record_failure(), 3);
        assert!(retry.exhausted());
        assert_eq!(retry.record_failure(), 3);
        retry.reset();
        assert_eq!(retry.attempts(), 0);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LinkError::ConnectionTimeout.is_retryable());
        assert!(LinkError::TransportDisconnected("gone".into()).is_retryable());
        assert!(!LinkError::ServiceMissing(Uuid::nil()).is_retryable());
        assert!(!LinkError::PermissionDenied.is_retryable());
    }

    #[test]
    fn test_establishing_states() {
        assert!(ConnectionState::Subscribing.is_establishing());
        assert!(!ConnectionState::Ready.is_establishing());
        assert!(ConnectionState::Ready.has_session());
        assert!(!ConnectionState::Disconnected.has_session());
    }
}
