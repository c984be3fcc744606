//! Monotonic deadlines.
//!
//! A deadline is an absolute point on `CLOCK_MONOTONIC`, stored as whole
//! seconds plus nanoseconds. `t1 == i64::MAX` marks a deadline that never
//! expires. The all-zero value lies at the clock's origin and has therefore
//! always expired.

use std::cmp::Ordering;

use bridge_traits::abi::Relocatable;
use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::TimerType;
use nix::time::{clock_gettime, ClockId};

const NSECS_PER_SEC: i64 = 1_000_000_000;
const NSECS_PER_MSEC: i64 = 1_000_000;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDeadlineTimer {
    t1: i64,
    t2: u32,
    timer_type: i32,
}

unsafe impl Relocatable for NativeDeadlineTimer {}

assert_abi_contract!(Trivial, NativeDeadlineTimer, { t1: i64, t2: u32, timer_type: i32 });

fn monotonic_now() -> (i64, u32) {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(now) => (i64::from(now.tv_sec()), now.tv_nsec() as u32),
        Err(err) => {
            tracing::warn!(error = %err, "CLOCK_MONOTONIC unavailable");
            (0, 0)
        }
    }
}

impl NativeDeadlineTimer {
    pub const fn forever(timer_type: TimerType) -> Self {
        Self {
            t1: i64::MAX,
            t2: 0,
            timer_type: timer_type as i32,
        }
    }

    pub fn current(timer_type: TimerType) -> Self {
        let (t1, t2) = monotonic_now();
        Self {
            t1,
            t2,
            timer_type: timer_type as i32,
        }
    }

    pub fn is_forever(&self) -> bool {
        self.t1 == i64::MAX
    }

    pub fn timer_type(&self) -> TimerType {
        TimerType::try_from(self.timer_type).unwrap_or_default()
    }

    pub fn deadline_nsecs(&self) -> i64 {
        if self.is_forever() {
            return i64::MAX;
        }
        self.t1
            .saturating_mul(NSECS_PER_SEC)
            .saturating_add(i64::from(self.t2))
    }

    fn set_nsecs(&mut self, nsecs: i64) {
        self.t1 = nsecs.div_euclid(NSECS_PER_SEC);
        self.t2 = nsecs.rem_euclid(NSECS_PER_SEC) as u32;
    }

    pub fn set_precise_deadline(&mut self, secs: i64, nsecs: i64, timer_type: TimerType) {
        self.timer_type = timer_type as i32;
        if secs == i64::MAX {
            *self = Self::forever(timer_type);
            return;
        }
        let total = secs
            .saturating_mul(NSECS_PER_SEC)
            .saturating_add(nsecs);
        if total == i64::MAX {
            *self = Self::forever(timer_type);
        } else {
            self.set_nsecs(total);
        }
    }

    pub fn set_precise_remaining_time(&mut self, secs: i64, nsecs: i64, timer_type: TimerType) {
        if secs < 0 {
            *self = Self::forever(timer_type);
            return;
        }
        let now = Self::current(timer_type);
        *self = now.add_nsecs(secs.saturating_mul(NSECS_PER_SEC).saturating_add(nsecs));
    }

    /// Nanoseconds left; `0` once expired and `-1` for forever.
    pub fn remaining_time_nsecs(&self) -> i64 {
        if self.is_forever() {
            return -1;
        }
        let now = Self::current(self.timer_type()).deadline_nsecs();
        self.deadline_nsecs().saturating_sub(now).max(0)
    }

    pub fn add_nsecs(self, nsecs: i64) -> Self {
        if self.is_forever() {
            return self;
        }
        let mut result = self;
        let total = self.deadline_nsecs().saturating_add(nsecs);
        if total == i64::MAX {
            result.t1 = i64::MAX;
            result.t2 = 0;
        } else {
            result.set_nsecs(total);
        }
        result
    }
}

impl PartialEq for NativeDeadlineTimer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NativeDeadlineTimer {}

impl PartialOrd for NativeDeadlineTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NativeDeadlineTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.t1, self.t2).cmp(&(other.t1, other.t2))
    }
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_current(timer_type: TimerType) -> NativeDeadlineTimer {
    NativeDeadlineTimer::current(timer_type)
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_forever(timer_type: TimerType) -> NativeDeadlineTimer {
    NativeDeadlineTimer::forever(timer_type)
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_add_nsecs(
    deadline: NativeDeadlineTimer,
    nsecs: i64,
) -> NativeDeadlineTimer {
    deadline.add_nsecs(nsecs)
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_deadline(deadline: &NativeDeadlineTimer) -> i64 {
    if deadline.is_forever() {
        return i64::MAX;
    }
    deadline
        .t1
        .saturating_mul(1000)
        .saturating_add(i64::from(deadline.t2) / NSECS_PER_MSEC)
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_deadline_nsecs(deadline: &NativeDeadlineTimer) -> i64 {
    deadline.deadline_nsecs()
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_has_expired(deadline: &NativeDeadlineTimer) -> bool {
    if deadline.is_forever() {
        return false;
    }
    NativeDeadlineTimer::current(deadline.timer_type()) >= *deadline
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_is_forever(deadline: &NativeDeadlineTimer) -> bool {
    deadline.is_forever()
}

/// Milliseconds left, rounded up so a live deadline never reads as `0`.
#[no_mangle]
pub extern "C" fn netbridge_deadline_remaining_time(deadline: &NativeDeadlineTimer) -> i64 {
    let nsecs = deadline.remaining_time_nsecs();
    if nsecs < 0 {
        return -1;
    }
    (nsecs + NSECS_PER_MSEC - 1) / NSECS_PER_MSEC
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_remaining_time_nsecs(deadline: &NativeDeadlineTimer) -> i64 {
    deadline.remaining_time_nsecs()
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_set_deadline(
    deadline: &mut NativeDeadlineTimer,
    msecs: i64,
    timer_type: TimerType,
) {
    if msecs == i64::MAX {
        *deadline = NativeDeadlineTimer::forever(timer_type);
        return;
    }
    deadline.set_precise_deadline(
        msecs.div_euclid(1000),
        msecs.rem_euclid(1000) * NSECS_PER_MSEC,
        timer_type,
    );
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_set_precise_deadline(
    deadline: &mut NativeDeadlineTimer,
    secs: i64,
    nsecs: i64,
    timer_type: TimerType,
) {
    deadline.set_precise_deadline(secs, nsecs, timer_type);
}

/// Negative `msecs` means the deadline never expires.
#[no_mangle]
pub extern "C" fn netbridge_deadline_set_remaining_time(
    deadline: &mut NativeDeadlineTimer,
    msecs: i64,
    timer_type: TimerType,
) {
    if msecs < 0 {
        *deadline = NativeDeadlineTimer::forever(timer_type);
        return;
    }
    deadline.set_precise_remaining_time(
        msecs / 1000,
        (msecs % 1000) * NSECS_PER_MSEC,
        timer_type,
    );
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_set_precise_remaining_time(
    deadline: &mut NativeDeadlineTimer,
    secs: i64,
    nsecs: i64,
    timer_type: TimerType,
) {
    deadline.set_precise_remaining_time(secs, nsecs, timer_type);
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_set_timer_type(
    deadline: &mut NativeDeadlineTimer,
    timer_type: TimerType,
) {
    deadline.timer_type = timer_type as i32;
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_timer_type(deadline: &NativeDeadlineTimer) -> TimerType {
    deadline.timer_type()
}

#[no_mangle]
pub extern "C" fn netbridge_deadline_eq(a: &NativeDeadlineTimer, b: &NativeDeadlineTimer) -> bool {
    a == b
}

/// Returns `-1`, `0` or `1`.
#[no_mangle]
pub extern "C" fn netbridge_deadline_cmp(a: &NativeDeadlineTimer, b: &NativeDeadlineTimer) -> i32 {
    a.cmp(b) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_expired() {
        let deadline = NativeDeadlineTimer::default();
        assert!(netbridge_deadline_has_expired(&deadline));
        assert_eq!(netbridge_deadline_remaining_time(&deadline), 0);
    }

    #[test]
    fn test_forever_never_expires() {
        let deadline = NativeDeadlineTimer::forever(TimerType::CoarseTimer);
        assert!(!netbridge_deadline_has_expired(&deadline));
        assert_eq!(netbridge_deadline_remaining_time(&deadline), -1);
        assert_eq!(netbridge_deadline_deadline(&deadline), i64::MAX);
        assert!(deadline.add_nsecs(5).is_forever());
    }

    #[test]
    fn test_set_deadline_splits_millis() {
        let mut deadline = NativeDeadlineTimer::default();
        netbridge_deadline_set_deadline(&mut deadline, 1_500, TimerType::PreciseTimer);
        assert_eq!(deadline.t1, 1);
        assert_eq!(deadline.t2, 500_000_000);
        assert_eq!(netbridge_deadline_deadline(&deadline), 1_500);
        assert_eq!(netbridge_deadline_timer_type(&deadline), TimerType::PreciseTimer);
    }

    #[test]
    fn test_add_nsecs_carries_into_seconds() {
        let mut deadline = NativeDeadlineTimer::default();
        deadline.set_precise_deadline(10, 900_000_000, TimerType::CoarseTimer);
        let later = deadline.add_nsecs(200_000_000);
        assert_eq!((later.t1, later.t2), (11, 100_000_000));
        assert_eq!(netbridge_deadline_cmp(&deadline, &later), -1);
    }
}
