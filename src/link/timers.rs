//! Cancellable deadlines, one per purpose.
//!
//! Timers are plain deadlines polled by the owner of the connection manager.
//! Arming a purpose replaces its previous deadline, so a purpose can never
//! fire twice or late.

use std::time::Instant;

/// Purpose of a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delay between opening a session and issuing the connect call.
    ConnectSettle,
    /// Bound on reaching Ready.
    ConnectionTimeout,
    /// Delay before the next automatic attempt.
    RetryBackoff,
    /// Watchdog for the absence of decoded samples while Ready.
    StaleLink,
}

impl TimerKind {
    const ALL: [TimerKind; 4] = [
        TimerKind::ConnectSettle,
        TimerKind::ConnectionTimeout,
        TimerKind::RetryBackoff,
        TimerKind::StaleLink,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::ConnectSettle => 0,
            TimerKind::ConnectionTimeout => 1,
            TimerKind::RetryBackoff => 2,
            TimerKind::StaleLink => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timers {
    deadlines: [Option<Instant>; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` at `deadline`, cancelling any earlier arming.
    pub fn arm(&mut self, kind: TimerKind, deadline: Instant) {
        self.deadlines[kind.slot()] = Some(deadline);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.slot()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.deadlines = [None; 4];
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.slot()]
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every timer due at `now`, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = TimerKind::ALL
            .iter()
            .filter_map(|&kind| match self.deadline(kind) {
                Some(at) if at <= now => Some((at, kind)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);

        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
