//! Monotonic deadline timers.

use std::cmp::Ordering;
use std::ops::{Add, Sub};
use std::time::Duration;

use bridge_traits::abi::Relocatable;
use bridge_traits::ffi::TimerType;
use bridge_traits::{assert_abi_contract, assert_same_layout};

/// A point on the monotonic clock, or "forever".
///
/// The default value has already expired.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineTimer {
    t1: i64,
    t2: u32,
    timer_type: i32,
}

unsafe impl Relocatable for DeadlineTimer {}

assert_abi_contract!(Trivial, DeadlineTimer, { t1: i64, t2: u32, timer_type: i32 });
assert_same_layout!(DeadlineTimer, bridge_native::NativeDeadlineTimer);

extern "C" {
    fn netbridge_deadline_current(timer_type: TimerType) -> DeadlineTimer;
    fn netbridge_deadline_forever(timer_type: TimerType) -> DeadlineTimer;
    fn netbridge_deadline_add_nsecs(deadline: DeadlineTimer, nsecs: i64) -> DeadlineTimer;
    fn netbridge_deadline_deadline(deadline: *const DeadlineTimer) -> i64;
    fn netbridge_deadline_deadline_nsecs(deadline: *const DeadlineTimer) -> i64;
    fn netbridge_deadline_has_expired(deadline: *const DeadlineTimer) -> bool;
    fn netbridge_deadline_is_forever(deadline: *const DeadlineTimer) -> bool;
    fn netbridge_deadline_remaining_time(deadline: *const DeadlineTimer) -> i64;
    fn netbridge_deadline_remaining_time_nsecs(deadline: *const DeadlineTimer) -> i64;
    fn netbridge_deadline_set_deadline(deadline: *mut DeadlineTimer, msecs: i64, timer_type: TimerType);
    fn netbridge_deadline_set_precise_deadline(
        deadline: *mut DeadlineTimer,
        secs: i64,
        nsecs: i64,
        timer_type: TimerType,
    );
    fn netbridge_deadline_set_remaining_time(deadline: *mut DeadlineTimer, msecs: i64, timer_type: TimerType);
    fn netbridge_deadline_set_precise_remaining_time(
        deadline: *mut DeadlineTimer,
        secs: i64,
        nsecs: i64,
        timer_type: TimerType,
    );
    fn netbridge_deadline_set_timer_type(deadline: *mut DeadlineTimer, timer_type: TimerType);
    fn netbridge_deadline_timer_type(deadline: *const DeadlineTimer) -> TimerType;
    fn netbridge_deadline_eq(a: *const DeadlineTimer, b: *const DeadlineTimer) -> bool;
    fn netbridge_deadline_cmp(a: *const DeadlineTimer, b: *const DeadlineTimer) -> i32;
}

fn saturating_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

impl DeadlineTimer {
    /// An already expired deadline with the given accuracy.
    pub fn new(timer_type: TimerType) -> Self {
        let mut deadline = Self::default();
        deadline.set_timer_type(timer_type);
        deadline
    }

    pub fn current(timer_type: TimerType) -> Self {
        unsafe { netbridge_deadline_current(timer_type) }
    }

    pub fn forever(timer_type: TimerType) -> Self {
        unsafe { netbridge_deadline_forever(timer_type) }
    }

    /// Expires `msecs` from now; negative means never.
    pub fn from_msecs(msecs: i64, timer_type: TimerType) -> Self {
        let mut deadline = Self::new(timer_type);
        deadline.set_remaining_time(msecs, timer_type);
        deadline
    }

    /// Absolute deadline in milliseconds on the monotonic clock.
    pub fn deadline(&self) -> i64 {
        unsafe { netbridge_deadline_deadline(self) }
    }

    pub fn deadline_nsecs(&self) -> i64 {
        unsafe { netbridge_deadline_deadline_nsecs(self) }
    }

    pub fn has_expired(&self) -> bool {
        unsafe { netbridge_deadline_has_expired(self) }
    }

    pub fn is_forever(&self) -> bool {
        unsafe { netbridge_deadline_is_forever(self) }
    }

    /// Milliseconds left: `0` once expired, `-1` for forever.
    pub fn remaining_time(&self) -> i64 {
        unsafe { netbridge_deadline_remaining_time(self) }
    }

    pub fn remaining_time_nsecs(&self) -> i64 {
        unsafe { netbridge_deadline_remaining_time_nsecs(self) }
    }

    /// `None` for a deadline that never expires.
    pub fn remaining_time_as_duration(&self) -> Option<Duration> {
        if self.is_forever() {
            return None;
        }
        Some(Duration::from_nanos(self.remaining_time_nsecs().max(0) as u64))
    }

    pub fn set_deadline(&mut self, msecs: i64, timer_type: TimerType) {
        unsafe { netbridge_deadline_set_deadline(self, msecs, timer_type) }
    }

    pub fn set_precise_deadline(&mut self, secs: i64, nsecs: i64, timer_type: TimerType) {
        unsafe { netbridge_deadline_set_precise_deadline(self, secs, nsecs, timer_type) }
    }

    pub fn set_remaining_time(&mut self, msecs: i64, timer_type: TimerType) {
        unsafe { netbridge_deadline_set_remaining_time(self, msecs, timer_type) }
    }

    pub fn set_precise_remaining_time(&mut self, secs: i64, nsecs: i64, timer_type: TimerType) {
        unsafe { netbridge_deadline_set_precise_remaining_time(self, secs, nsecs, timer_type) }
    }

    pub fn set_timer_type(&mut self, timer_type: TimerType) {
        unsafe { netbridge_deadline_set_timer_type(self, timer_type) }
    }

    pub fn timer_type(&self) -> TimerType {
        unsafe { netbridge_deadline_timer_type(self) }
    }

    /// Moves the deadline by `nsecs`; a forever deadline stays put.
    pub fn add_nsecs(self, nsecs: i64) -> Self {
        unsafe { netbridge_deadline_add_nsecs(self, nsecs) }
    }
}

impl PartialEq for DeadlineTimer {
    fn eq(&self, other: &Self) -> bool {
        unsafe { netbridge_deadline_eq(self, other) }
    }
}

impl Eq for DeadlineTimer {}

impl PartialOrd for DeadlineTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeadlineTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        unsafe { netbridge_deadline_cmp(self, other) }.cmp(&0)
    }
}

impl Add<Duration> for DeadlineTimer {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        self.add_nsecs(saturating_nanos(rhs))
    }
}

impl Sub<Duration> for DeadlineTimer {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        self.add_nsecs(-saturating_nanos(rhs))
    }
}

/// A coarse deadline `duration` from now.
impl From<Duration> for DeadlineTimer {
    fn from(duration: Duration) -> Self {
        let mut deadline = Self::default();
        deadline.set_precise_remaining_time(
            i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            i64::from(duration.subsec_nanos()),
            TimerType::CoarseTimer,
        );
        deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_expired() {
        let deadline = DeadlineTimer::default();
        assert!(deadline.has_expired());
        assert_eq!(deadline.remaining_time(), 0);
        assert_eq!(deadline.remaining_time_as_duration(), Some(Duration::ZERO));
    }

    #[test]
    fn test_duration_arithmetic() {
        let base = DeadlineTimer::forever(TimerType::PreciseTimer);
        assert!((base + Duration::from_secs(1)).is_forever());
        assert_eq!(base.remaining_time_as_duration(), None);

        let mut start = DeadlineTimer::new(TimerType::PreciseTimer);
        start.set_precise_deadline(100, 0, TimerType::PreciseTimer);
        let later = start + Duration::from_millis(250);
        assert_eq!(later.deadline(), 100_250);
        assert_eq!(later - Duration::from_millis(250), start);
        assert!(start < later);
    }

    #[test]
    fn test_from_duration_is_in_the_future() {
        let deadline = DeadlineTimer::from(Duration::from_secs(60));
        assert!(!deadline.has_expired());
        assert_eq!(deadline.timer_type(), TimerType::CoarseTimer);
    }
}
