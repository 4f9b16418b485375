//! Cooperative deferred-callback queue.
//!
//! Engines poll [`Timers::due`] from their per-frame update instead of
//! sleeping. Cancelling everything bumps an epoch; a payload that was
//! scheduled under an older epoch is never handed back, even if it was
//! already due when the cancel happened.

/// Handle for a single scheduled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Pending<T> {
    id: TimerId,
    due: f64,
    epoch: u64,
    payload: T,
}

pub struct Timers<T> {
    next_id: u64,
    epoch: u64,
    pending: Vec<Pending<T>>,
}

impl<T> Timers<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            epoch: 0,
            pending: Vec::new(),
        }
    }

    /// Current cancellation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn schedule(&mut self, due: f64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due,
            epoch: self.epoch,
            payload,
        });
        id
    }

    /// Remove a single payload. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Drop every pending payload and invalidate anything scheduled so far.
    pub fn cancel_all(&mut self) {
        self.epoch += 1;
        self.pending.clear();
    }

    /// Remove and return every payload due at or before `now`, earliest first.
    pub fn due(&mut self, now: f64) -> Vec<T> {
        let epoch = self.epoch;
        let mut fired: Vec<Pending<T>> = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= now {
                fired.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        fired.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.id.0.cmp(&b.id.0)));
        fired
            .into_iter()
            .filter(|p| p.epoch == epoch)
            .map(|p| p.payload)
            .collect()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.pending.iter().map(|p| p.due).min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}
