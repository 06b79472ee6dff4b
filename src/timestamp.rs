use std::{fmt, mem};

use libc::{time_t, timespec};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Timestamp consisting of a seconds and a microseconds component
pub struct Timestamp {
    pub sec: time_t,
    pub usec: time_t,
}

impl Timestamp {
    /// Returns a timestamp representation
    ///
    /// # Arguments
    ///
    /// * `sec` - Seconds
    /// * `usec` - Microseconds
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::Timestamp;
    /// let ts = Timestamp::new(5, 5);
    /// ```
    pub fn new(sec: time_t, usec: time_t) -> Self {
        Timestamp { sec, usec }
    }

    /// Returns the current time of the monotonic system clock
    ///
    /// Finished frames are stamped with this clock, so timestamps of consecutive frames never go
    /// backwards even when the wall clock is adjusted.
    pub fn now() -> Self {
        let mut ts: timespec = unsafe { mem::zeroed() };
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if ret != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "cannot read monotonic clock"
            );
            return Timestamp::default();
        }
        Timestamp::from(ts)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let floating: f64 = self.sec as f64 + self.usec as f64 / 1_000_000.0;
        write!(f, "{} [s]", floating)
    }
}

impl From<timespec> for Timestamp {
    fn from(ts: timespec) -> Self {
        Timestamp {
            sec: ts.tv_sec as time_t,
            usec: (ts.tv_nsec / 1000) as time_t,
        }
    }
}
