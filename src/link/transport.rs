//! Platform seams: the radio transport, the capability gate and device matching.
//!
//! A transport issues requests synchronously and reports their outcomes later
//! as [`TransportEvent`]s through an [`EventSink`], each stamped with the
//! session that issued it.

use crate::link::types::{DeviceHandle, LinkError, SessionId, TransportEvent};
use crossbeam_channel::Sender;
use uuid::Uuid;

/// The host radio stack.
pub trait Transport {
    /// Devices already paired with or known to the host.
    fn paired_devices(&mut self) -> Vec<DeviceHandle>;

    /// Open a link to `device`. Completion arrives as `Connected`.
    fn connect(&mut self, session: SessionId, device: &DeviceHandle) -> Result<(), LinkError>;

    /// Ask for a larger transfer unit. Completion arrives as `MtuNegotiated`.
    fn request_mtu(&mut self, session: SessionId, mtu: u16) -> Result<(), LinkError>;

    /// Enumerate services. Completion arrives as `ServicesDiscovered`.
    fn discover_services(&mut self, session: SessionId) -> Result<(), LinkError>;

    /// Write the notification-enable descriptor of `characteristic`.
    /// Completion arrives as `DescriptorWritten`.
    fn enable_notifications(
        &mut self,
        session: SessionId,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<(), LinkError>;

    /// Disconnect and release the session. No events for it may follow.
    fn disconnect(&mut self, session: SessionId);
}

/// Where a transport delivers its asynchronous events.
pub trait EventSink: Send {
    fn emit(&self, event: TransportEvent);
}

impl<T> EventSink for Sender<T>
where
    T: From<TransportEvent> + Send,
{
    fn emit(&self, event: TransportEvent) {
        // A closed channel means the owner is gone; nothing is left to notify
        let _ = self.send(T::from(event));
    }
}

/// Whether the host lets us use the radio right now.
pub trait RadioCapability {
    fn permission_granted(&self) -> bool;

    fn radio_enabled(&self) -> bool {
        true
    }

    /// Check both conditions, permission first.
    fn check(&self) -> Result<(), LinkError> {
        if !self.permission_granted() {
            return Err(LinkError::PermissionDenied);
        }
        if !self.radio_enabled() {
            return Err(LinkError::RadioUnavailable);
        }
        Ok(())
    }
}

impl<F: Fn() -> bool> RadioCapability for F {
    fn permission_granted(&self) -> bool {
        self()
    }
}

/// Capability gate for hosts where permission is granted out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl RadioCapability for AlwaysAvailable {
    fn permission_granted(&self) -> bool {
        true
    }
}

/// Name-based device allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    canonical_name: String,
    fragments: Vec<String>,
}

impl DeviceMatcher {
    pub fn new(canonical_name: impl Into<String>, fragments: Vec<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            fragments,
        }
    }

    /// Exact canonical name or any fragment as a substring, case-sensitive.
    pub fn matches(&self, name: &str) -> bool {
        name == self.canonical_name
            || self
                .fragments
                .iter()
                .any(|fragment| !fragment.is_empty() && name.contains(fragment.as_str()))
    }

    /// Pick one device. Canonical-name matches win, then candidates are
    /// ordered by address and name so the choice does not depend on host
    /// enumeration order.
    pub fn select(&self, devices: &[DeviceHandle]) -> Option<DeviceHandle> {
        devices
            .iter()
            .filter(|device| self.matches(&device.name))
            .min_by(|a, b| {
                let canonical = |d: &DeviceHandle| d.name != self.canonical_name;
                canonical(a)
                    .cmp(&canonical(b))
                    .then_with(|| a.address.cmp(&b.address))
                    .then_with(|| a.name.cmp(&b.name))
            })
            .cloned()
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> DeviceMatcher {
        DeviceMatcher::new(
            "ESP32_EmotionBand",
            vec!["ESP32".into(), "AuraSense".into(), "EmotionBand".into()],
        )
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let m = matcher();
        assert!(m.matches("ESP32_EmotionBand"));
        assert!(m.matches("AuraSense-7"));
        assert!(!m.matches("esp32_emotionband"));
        assert!(!m.matches("Pixel Buds"));
    }

    #[test]
    fn test_select_prefers_canonical_then_address() {
        let m = matcher();
        let devices = vec![
            DeviceHandle::new("CC:00", "Headphones"),
            DeviceHandle::new("BB:00", "AuraSense-2"),
            DeviceHandle::new("AA:00", "AuraSense-1"),
            DeviceHandle::new("DD:00", "ESP32_EmotionBand"),
        ];
        assert_eq!(m.select(&devices).map(|d| d.address), Some("DD:00".into()));

        let devices = &devices[..3];
        assert_eq!(m.select(devices).map(|d| d.address), Some("AA:00".into()));
        assert_eq!(m.select(&devices[..1]), None);
    }

    #[test]
    fn test_capability_gate() {
        assert_eq!((|| false).check(), Err(LinkError::PermissionDenied));
        assert_eq!((|| true).check(), Ok(()));

        struct Off;
        impl RadioCapability for Off {
            fn permission_granted(&self) -> bool {
                true
            }
            fn radio_enabled(&self) -> bool {
                false
            }
        }
        assert_eq!(Off.check(), Err(LinkError::RadioUnavailable));
    }

    #[test]
    fn test_sender_sink() {
        let (tx, rx) = crossbeam_channel::unbounded::<TransportEvent>();
        tx.emit(TransportEvent::new(
            SessionId(1),
            crate::link::types::TransportEventKind::Connected,
        ));
        assert_eq!(rx.try_recv().map(|e| e.session), Ok(SessionId(1)));
    }
}
