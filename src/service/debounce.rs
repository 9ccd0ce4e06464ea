use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|n| *n).unwrap_or_else(|e| *e.into_inner())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
    pub user_id: String,
    pub module_id: String,
    pub game_mode_id: String,
}

impl SubmissionKey {
    pub fn new(user_id: &str, module_id: &str, game_mode_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            module_id: module_id.to_string(),
            game_mode_id: game_mode_id.to_string(),
        }
    }
}

/// Rejects a second submission for the same key inside the window.
pub struct Debouncer {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_accepted: Mutex<HashMap<SubmissionKey, Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// True if the submission may go ahead; records its time if so.
    pub fn try_acquire(&self, key: &SubmissionKey) -> bool {
        let now = self.clock.now();
        let mut last = match self.last_accepted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Keep the map from growing without bound over a long session.
        last.retain(|_, at| now.saturating_duration_since(*at) < self.window);
        if last.contains_key(key) {
            return false;
        }
        last.insert(key.clone(), now);
        true
    }

    /// Forget a key, so a retry after a failed call is not mistaken for a
    /// duplicate.
    pub fn release(&self, key: &SubmissionKey) {
        if let Ok(mut last) = self.last_accepted.lock() {
            last.remove(key);
        }
    }
}
