use serde::{Deserialize, Serialize};

/// The two derived-event timers a trip owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// One-shot, armed by the first over-limit sample
    ProlongedSpeeding,
    /// Repeating, runs while the trip is active
    SmoothDriving,
}

/// Identifies one scheduled firing of a timer.
///
/// A token is only honoured if its generation and deadline still match the
/// timer; cancelling or re-arming bumps the generation, so tokens handed out
/// earlier go stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
    pub deadline: f64,
}

/// Cancellable one-shot or repeating timer driven by an external clock.
#[derive(Debug, Clone)]
pub struct CancellableTimer {
    kind: TimerKind,
    generation: u64,
    deadline: Option<f64>,
    period: Option<f64>,
}

impl CancellableTimer {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            deadline: None,
            period: None,
        }
    }

    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire once at `now + delay`.
    pub fn arm_once(&mut self, now: f64, delay: f64) -> TimerToken {
        self.generation += 1;
        self.deadline = Some(now + delay);
        self.period = None;
        self.token(now + delay)
    }

    /// Fire every `period` seconds, first at `now + period`.
    pub fn arm_repeating(&mut self, now: f64, period: f64) -> TimerToken {
        self.generation += 1;
        self.deadline = Some(now + period);
        self.period = Some(period);
        self.token(now + period)
    }

    /// Idempotent; always invalidates outstanding tokens.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.deadline = None;
        self.period = None;
    }

    /// Token for the current deadline if it has been reached.
    pub fn due(&self, now: f64) -> Option<TimerToken> {
        match self.deadline {
            Some(deadline) if deadline <= now => Some(self.token(deadline)),
            _ => None,
        }
    }

    /// Consume a firing. Returns false for stale tokens, which must be
    /// ignored by the caller.
    pub fn accept(&mut self, token: TimerToken) -> bool {
        if token.kind != self.kind || token.generation != self.generation {
            return false;
        }
        match self.deadline {
            Some(deadline) if deadline == token.deadline => {
                match self.period {
                    Some(period) => self.deadline = Some(deadline + period),
                    None => self.deadline = None,
                }
                true
            }
            _ => false,
        }
    }

    fn token(&self, deadline: f64) -> TimerToken {
        TimerToken {
            kind: self.kind,
            generation: self.generation,
            deadline,
        }
    }
}

/// Both trip timers, addressable by kind.
#[derive(Debug, Clone)]
pub struct TripTimers {
    pub speeding: CancellableTimer,
    pub smooth: CancellableTimer,
}

impl TripTimers {
    pub fn new() -> Self {
        Self {
            speeding: CancellableTimer::new(TimerKind::ProlongedSpeeding),
            smooth: CancellableTimer::new(TimerKind::SmoothDriving),
        }
    }

    pub fn get_mut(&mut self, kind: TimerKind) -> &mut CancellableTimer {
        match kind {
            TimerKind::ProlongedSpeeding => &mut self.speeding,
            TimerKind::SmoothDriving => &mut self.smooth,
        }
    }

    pub fn cancel_all(&mut self) {
        self.speeding.cancel();
        self.smooth.cancel();
    }

    /// Earliest pending deadline across both timers.
    pub fn next_deadline(&self) -> Option<f64> {
        match (self.speeding.deadline(), self.smooth.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Earliest due firing at `now`; speeding wins ties.
    pub fn next_due(&self, now: f64) -> Option<TimerToken> {
        match (self.speeding.due(now), self.smooth.due(now)) {
            (Some(a), Some(b)) => Some(if b.deadline < a.deadline { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

impl Default for TripTimers {
    fn default() -> Self {
        Self::new()
    }
}
