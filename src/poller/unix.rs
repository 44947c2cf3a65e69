use std::io;

/// Block in `poll(2)` until a descriptor becomes ready or the timeout
/// expires.
///
/// `timeout_ms` follows the syscall convention: `-1` blocks indefinitely,
/// `0` returns immediately. The call is retried transparently when it is
/// interrupted by a signal.
pub(crate) fn sys_poll(fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<usize> {
    loop {
        let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        return Ok(n as usize);
    }
}

pub(crate) fn sys_close(fd: std::os::unix::io::RawFd) {
    unsafe { libc::close(fd) };
}
