use crate::poller::unix::sys_close;

use std::os::unix::io::RawFd;

/// A wake-up descriptor private to one coroutine.
///
/// An `EventFd` wraps a Linux `eventfd`. Writing a counter value makes the
/// descriptor readable; draining the counter makes it dormant again. The
/// scheduler includes the descriptor in its aggregate poll set whenever the
/// owning coroutine is suspended, so triggering the event wakes the
/// coroutine without any external I/O.
///
/// The semantics are level triggered: after [`trigger`](Self::trigger) the
/// descriptor stays readable until [`clear`](Self::clear) drains it, no
/// matter how many triggers have accumulated in between.
pub(crate) struct EventFd(RawFd);

impl EventFd {
    /// Create a new dormant event descriptor.
    ///
    /// Descriptor exhaustion is fatal, there is no recovery path for a
    /// scheduler that cannot allocate its wake-up channel.
    pub(crate) fn new() -> Self {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(fd >= 0, "eventfd failed");

        Self(fd)
    }

    /// The raw descriptor, for inclusion in a poll set.
    pub(crate) fn fd(&self) -> RawFd {
        self.0
    }

    /// Make the descriptor readable.
    pub(crate) fn trigger(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }

    /// Drain all pending triggers, making the descriptor dormant.
    ///
    /// A no-op when the event is not currently triggered.
    pub(crate) fn clear(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(self.0, &mut buf as *mut _ as *mut _, 8);
        }
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::unix::sys_poll;

    fn is_readable(fd: RawFd) -> bool {
        let mut fds = [libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        sys_poll(&mut fds, 0).unwrap() == 1
    }

    #[test]
    fn trigger_then_clear() {
        let event = EventFd::new();
        assert!(!is_readable(event.fd()));

        event.trigger();
        event.trigger();
        assert!(is_readable(event.fd()));

        event.clear();
        assert!(!is_readable(event.fd()));
    }

    #[test]
    fn clear_when_dormant_is_a_noop() {
        let event = EventFd::new();
        event.clear();
        assert!(!is_readable(event.fd()));
    }
}
