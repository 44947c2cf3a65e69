use std::os::unix::io::RawFd;

/// Readiness interest for a file descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Interest in read readiness only.
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };

    /// Interest in write readiness only.
    pub const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Convert to a `poll(2)` event mask.
    pub(crate) fn events(self) -> i16 {
        let mut events = 0;

        if self.read {
            events |= libc::POLLIN;
        }
        if self.write {
            events |= libc::POLLOUT;
        }

        events
    }
}

/// A file descriptor paired with the readiness interest to wait for.
#[derive(Clone, Copy, Debug)]
pub struct WaitFd {
    /// Descriptor to watch.
    pub fd: RawFd,

    /// Readiness to wait for.
    pub interest: Interest,
}

impl WaitFd {
    /// A read-readiness wait on `fd`.
    pub fn readable(fd: RawFd) -> Self {
        Self {
            fd,
            interest: Interest::READ,
        }
    }

    /// A write-readiness wait on `fd`.
    pub fn writable(fd: RawFd) -> Self {
        Self {
            fd,
            interest: Interest::WRITE,
        }
    }
}
