//! Example: waking a coroutine through descriptor readiness.
//!
//! A producer writes one byte to a pipe every 100 ms; a consumer waits on
//! the read end and echoes what arrives.

use fibra::{Interest, Machine};

use std::os::unix::io::RawFd;
use std::time::Duration;

fn main() {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe failed");
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let machine = Machine::new();

    machine.coroutine().name("producer").spawn(move |co| {
        for byte in *b"abc" {
            co.sleep(Duration::from_millis(100));
            unsafe { libc::write(write_fd, &byte as *const _ as *const _, 1) };
        }
    });

    machine.coroutine().name("consumer").spawn(move |co| {
        for _ in 0..3 {
            let ready = co.wait(read_fd, Interest::READ, None);
            assert_eq!(ready, Some(read_fd));

            let mut byte = 0u8;
            unsafe { libc::read(read_fd, &mut byte as *mut _ as *mut _, 1) };
            println!("received {:?}", byte as char);
        }
    });

    machine.run().unwrap();

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}
