use std::time::{Duration, Instant};

/// Time-based rate limiter for one command channel.
///
/// Values themselves are not stored here: the caller always sends its latest state, so a
/// pending flag is enough to guarantee the last intent eventually goes out.
#[derive(Debug, Clone)]
pub struct CommandThrottle {
    interval: Duration,
    last_send: Option<Instant>,
    pending: bool,
}

impl CommandThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_send: None,
            pending: false,
        }
    }

    /// A new value arrived. `true` means send it now; otherwise it is marked pending.
    pub fn offer(&mut self, now: Instant) -> bool {
        if self.try_send(now) {
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Plain rate limit with no trailing flush.
    pub fn try_send(&mut self, now: Instant) -> bool {
        if self.ready(now) {
            self.last_send = Some(now);
            true
        } else {
            false
        }
    }

    /// Periodic tick. `true` means the pending value must be flushed now.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.pending && self.ready(now) {
            self.last_send = Some(now);
            self.pending = false;
            true
        } else {
            false
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn discard_pending(&mut self) {
        self.pending = false;
    }

    fn ready(&self, now: Instant) -> bool {
        match self.last_send {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}
