use serde::Serialize;
use tracing::debug;

/// Handed out for every fetch the scheduler releases; returned on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    pub stream: &'static str,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Result belongs to the live polling run; apply it.
    Deliver,
    /// Scheduler was stopped or restarted while the fetch was out; drop it.
    Discard,
}

/// 轮询调度器 (Polling Scheduler)
/// Timer bookkeeping for one polling stream, driven by explicit timestamps
/// so it runs the same under a real or a virtual clock. At most one fetch
/// is outstanding at any time, across stop/start cycles too.
#[derive(Debug, Clone)]
pub struct PollingScheduler {
    stream: &'static str,
    interval_ms: u64,
    immediate: bool,
    active: bool,
    due_ms: Option<u64>,
    in_flight: Option<u64>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub active: bool,
    pub in_flight: bool,
    pub due_ms: Option<u64>,
}

impl PollingScheduler {
    pub fn new(stream: &'static str, interval_ms: u64) -> Self {
        Self {
            stream,
            interval_ms,
            immediate: false,
            active: false,
            due_ms: None,
            in_flight: None,
            generation: 0,
        }
    }

    /// The first fetch after `start` is due right away instead of one interval later.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            active: self.active,
            in_flight: self.in_flight.is_some(),
            due_ms: self.due_ms,
        }
    }

    pub fn start(&mut self, now_ms: u64) {
        if self.active {
            return;
        }
        self.active = true;
        self.generation += 1;
        // An older fetch may still be out; completion re-arms in that case.
        if self.in_flight.is_none() {
            self.due_ms = Some(if self.immediate { now_ms } else { now_ms + self.interval_ms });
        }
        debug!(stream = self.stream, "Polling started");
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.due_ms = None;
        self.generation += 1;
        debug!(stream = self.stream, "Polling stopped");
    }

    /// Deadline the driver should sleep until, if any.
    pub fn next_due(&self) -> Option<u64> {
        if self.active && self.in_flight.is_none() {
            self.due_ms
        } else {
            None
        }
    }

    /// Releases a fetch when the timer has fired and nothing is outstanding.
    pub fn poll_due(&mut self, now_ms: u64) -> Option<PollTicket> {
        if !self.active || self.in_flight.is_some() {
            return None;
        }
        match self.due_ms {
            Some(due) if now_ms >= due => {
                self.due_ms = None;
                self.in_flight = Some(self.generation);
                Some(PollTicket { stream: self.stream, generation: self.generation })
            }
            _ => None,
        }
    }

    /// Marks the outstanding fetch as resolved and re-arms the timer while active.
    pub fn complete(&mut self, ticket: PollTicket, now_ms: u64) -> Completion {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
        if self.active && self.due_ms.is_none() && self.in_flight.is_none() {
            self.due_ms = Some(now_ms + self.interval_ms);
        }
        if self.active && ticket.generation == self.generation {
            Completion::Deliver
        } else {
            debug!(stream = self.stream, "Fetch resolved after stop, result discarded");
            Completion::Discard
        }
    }
}
