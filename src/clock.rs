use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;

/// Source of "now" for rate windows and review timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Server-local calendar day used to key rate windows.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock pinned to an instant that only moves via `advance`.
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}
