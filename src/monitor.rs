//! The monitor: single owner of the link and the telemetry pipeline.
//!
//! Every input (transport events, user commands, timer expiry) is handled
//! on one thread, in arrival order, by [`Monitor`]. Transports and other
//! threads talk to it only through the [`MonitorEvent`] channel, so the
//! reassembly buffer, window, prediction history, connection state and retry
//! state never need a lock.
//!
//! Results are published to an explicit list of [`TelemetryListener`]s.

use crate::core::classifier::{Classifier, EmotionalState, InferenceError};
use crate::core::pipeline::{Pipeline, PipelineEvent};
use crate::core::telemetry::TelemetrySample;
use crate::link::{
    ConnectionManager, ConnectionState, DeviceHandle, LinkError, LinkSignal, RadioCapability,
    Transport, TransportEvent,
};
use crate::stats::{create_shared_stats, SharedStats};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Input to the monitor loop.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Transport(TransportEvent),
    /// Start (or restart after Failed) a connection cycle.
    Connect,
    /// Drop the link and stay idle.
    Disconnect,
    /// Tear everything down and leave [`Monitor::run`].
    Shutdown,
}

impl From<TransportEvent> for MonitorEvent {
    fn from(event: TransportEvent) -> Self {
        MonitorEvent::Transport(event)
    }
}

/// Create the monitor's event channel.
pub fn channel() -> (Sender<MonitorEvent>, Receiver<MonitorEvent>) {
    unbounded()
}

/// Receives what the monitor observes. All methods default to no-ops.
pub trait TelemetryListener: Send {
    fn on_link_state(&mut self, _from: ConnectionState, _to: ConnectionState) {}

    fn on_connected(&mut self, _device: &DeviceHandle) {}

    fn on_disconnected(&mut self, _error: &LinkError, _attempts: u32) {}

    /// Terminal link failure; only an explicit connect starts over.
    fn on_link_failed(&mut self, _error: &LinkError) {}

    /// A worn sample was decoded.
    fn on_sample(&mut self, _sample: &TelemetrySample) {}

    /// The band is off the wrist; live values should be cleared.
    fn on_not_worn(&mut self, _sample: &TelemetrySample) {}

    /// The committed label after each classified window.
    fn on_stable_label(&mut self, _label: u8) {}

    /// The committed label differs from the last one announced.
    fn on_state_change(&mut self, _old: Option<EmotionalState>, _new: EmotionalState) {}

    fn on_decode_error(&mut self, _raw: &str) {}

    fn on_inference_error(&mut self, _error: &InferenceError) {}
}

pub struct Monitor<T, R, C> {
    manager: ConnectionManager<T, R>,
    pipeline: Pipeline<C>,
    listeners: Vec<Box<dyn TelemetryListener>>,
    events: Receiver<MonitorEvent>,
    stats: SharedStats,
    /// Last label announced through `on_state_change`
    announced: Option<u8>,
}

impl<T, R, C> Monitor<T, R, C>
where
    T: Transport,
    R: RadioCapability,
    C: Classifier,
{
    pub fn new(
        manager: ConnectionManager<T, R>,
        pipeline: Pipeline<C>,
        events: Receiver<MonitorEvent>,
    ) -> Self {
        Self::with_stats(manager, pipeline, events, create_shared_stats())
    }

    pub fn with_stats(
        manager: ConnectionManager<T, R>,
        pipeline: Pipeline<C>,
        events: Receiver<MonitorEvent>,
        stats: SharedStats,
    ) -> Self {
        Self {
            manager,
            pipeline: pipeline.with_stats(stats.clone()),
            listeners: Vec::new(),
            events,
            stats,
            announced: None,
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn TelemetryListener>) {
        self.listeners.push(listener);
    }

    pub fn manager(&self) -> &ConnectionManager<T, R> {
        &self.manager
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Start a connection cycle now.
    pub fn connect(&mut self, now: Instant) -> Result<(), LinkError> {
        let result = self.manager.connect(now);
        self.dispatch_link(now);
        result
    }

    /// Handle one event. Returns `false` once the monitor should stop.
    pub fn handle(&mut self, event: MonitorEvent, now: Instant) -> bool {
        match event {
            MonitorEvent::Transport(event) => self.manager.handle_event(event, now),
            MonitorEvent::Connect => {
                if let Err(e) = self.manager.connect(now) {
                    warn!(error = %e, "connect request refused");
                    for listener in &mut self.listeners {
                        listener.on_link_failed(&e);
                    }
                }
            }
            MonitorEvent::Disconnect => self.manager.disconnect(),
            MonitorEvent::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        self.dispatch_link(now);
        // A busy channel must not postpone overdue timers
        self.poll(now);
        true
    }

    /// Fire due timers.
    pub fn poll(&mut self, now: Instant) {
        self.manager.poll_timers(now);
        self.dispatch_link(now);
    }

    /// Handle every event already queued without blocking.
    /// Returns `false` if a shutdown was among them.
    pub fn drain_pending(&mut self, now: Instant) -> bool {
        while let Ok(event) = self.events.try_recv() {
            if !self.handle(event, now) {
                return false;
            }
        }
        true
    }

    /// Run until `Shutdown` arrives or every sender is gone.
    pub fn run(&mut self) {
        info!("monitor running");
        loop {
            let received = match self.manager.next_deadline() {
                Some(deadline) => self.events.recv_deadline(deadline),
                None => self
                    .events
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => {
                    if !self.handle(event, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.poll(Instant::now()),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("event channel closed");
                    self.shutdown();
                    break;
                }
            }
        }
        info!("monitor stopped");
    }

    /// Cancel every timer, close the session and drop partial state.
    pub fn shutdown(&mut self) {
        self.manager.disconnect();
        self.dispatch_link(Instant::now());
        self.pipeline.reset_context();
    }

    fn dispatch_link(&mut self, now: Instant) {
        loop {
            let signals = self.manager.drain_signals();
            if signals.is_empty() {
                break;
            }
            for signal in signals {
                self.on_link_signal(signal, now);
            }
        }
    }

    fn on_link_signal(&mut self, signal: LinkSignal, now: Instant) {
        match signal {
            LinkSignal::StateChanged { from, to } => {
                if from == ConnectionState::Ready {
                    // New link, new measurement context
                    self.pipeline.reset_context();
                }
                for listener in &mut self.listeners {
                    listener.on_link_state(from, to);
                }
            }
            LinkSignal::Connected(device) => {
                self.stats.record_connect();
                for listener in &mut self.listeners {
                    listener.on_connected(&device);
                }
            }
            LinkSignal::Disconnected { error, attempts } => {
                self.stats.record_disconnect();
                for listener in &mut self.listeners {
                    listener.on_disconnected(&error, attempts);
                }
            }
            LinkSignal::StaleLink => {
                self.stats.record_stale_link();
                self.pipeline.invalidate_label();
                self.announced = None;
            }
            LinkSignal::Failed(error) => {
                for listener in &mut self.listeners {
                    listener.on_link_failed(&error);
                }
            }
            LinkSignal::Data(payload) => {
                let events = self.pipeline.ingest(&payload);
                let fresh = events.iter().any(|e| {
                    matches!(e, PipelineEvent::Sample { .. } | PipelineEvent::NotWorn(_))
                });
                for event in events {
                    self.on_pipeline_event(event);
                }
                if fresh {
                    self.manager.note_fresh_sample(now);
                }
            }
        }
    }

    fn on_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Sample { sample, .. } => {
                for listener in &mut self.listeners {
                    listener.on_sample(&sample);
                }
            }
            PipelineEvent::NotWorn(sample) => {
                // Re-wearing announces the state again
                self.announced = None;
                for listener in &mut self.listeners {
                    listener.on_not_worn(&sample);
                }
            }
            PipelineEvent::DecodeError(e) => {
                for listener in &mut self.listeners {
                    listener.on_decode_error(&e.raw);
                }
            }
            PipelineEvent::Classified {
                stable: Some(label),
                ..
            } => {
                for listener in &mut self.listeners {
                    listener.on_stable_label(label);
                }
                if self.announced != Some(label) {
                    self.announce(label);
                }
            }
            PipelineEvent::Classified { stable: None, .. } => {}
            PipelineEvent::InferenceError(e) => {
                for listener in &mut self.listeners {
                    listener.on_inference_error(&e);
                }
            }
        }
    }

    fn announce(&mut self, label: u8) {
        let Some(new) = EmotionalState::from_label(label) else {
            debug!(label, "label outside the known states");
            return;
        };
        let old = self.announced.and_then(EmotionalState::from_label);
        info!(?old, %new, "emotional state changed");
        self.stats.record_label_change();
        self.announced = Some(label);
        for listener in &mut self.listeners {
            listener.on_state_change(old, new);
        }
    }
}
