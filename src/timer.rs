use crate::poller::unix::sys_close;

use std::os::unix::io::RawFd;
use std::time::Duration;

/// A one-shot timer descriptor.
///
/// A `TimerFd` wraps a Linux `timerfd` armed to fire exactly once. It is
/// created by a timed wait, added to the waiting coroutine's descriptor
/// set, and closed when the wait finishes, whether the timer fired or some
/// other descriptor ended the wait first.
pub(crate) struct TimerFd(RawFd);

impl TimerFd {
    /// Create a timer that becomes readable after `delay`.
    ///
    /// A zero delay is clamped to one nanosecond: an all-zero expiration
    /// would disarm the timer instead of firing it immediately.
    pub(crate) fn oneshot(delay: Duration) -> Self {
        let fd = unsafe {
            libc::timerfd_create(
                libc::CLOCK_MONOTONIC,
                libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
            )
        };
        assert!(fd >= 0, "timerfd_create failed");

        let mut spec: libc::itimerspec = unsafe { std::mem::zeroed() };
        spec.it_value.tv_sec = delay.as_secs() as libc::time_t;
        spec.it_value.tv_nsec = delay.subsec_nanos() as libc::c_long;
        if spec.it_value.tv_sec == 0 && spec.it_value.tv_nsec == 0 {
            spec.it_value.tv_nsec = 1;
        }

        let rc = unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
        assert!(rc == 0, "timerfd_settime failed");

        Self(fd)
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for TimerFd {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}
