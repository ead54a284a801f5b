//! Device link: connection lifecycle, retry policy and watchdogs.
//!
//! The [`ConnectionManager`] is sans-IO. It talks to the radio through the
//! [`Transport`] trait and is driven by transport events and deadline polls
//! from a single owner (see [`crate::monitor`]).

pub mod manager;
pub mod simulated;
pub mod timers;
pub mod transport;
pub mod types;

pub use manager::{ConnectionManager, LinkTiming};
pub use simulated::{SimulatedDevice, SimulatedTransport};
pub use timers::{TimerKind, Timers};
pub use transport::{AlwaysAvailable, DeviceMatcher, EventSink, RadioCapability, Transport};
pub use types::{
    ConnectionState, DeviceHandle, GattService, LinkError, LinkSignal, RetryState, SessionId,
    TransportEvent, TransportEventKind,
};
