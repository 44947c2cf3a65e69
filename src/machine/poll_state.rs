use std::os::unix::io::RawFd;

/// The aggregate poll set of a machine, for embedding in a host event loop.
///
/// A `PollState` is filled by [`Machine::get_poll_state`](crate::Machine::get_poll_state)
/// with one `pollfd` entry per descriptor any suspended coroutine is
/// waiting on. The host merges these entries into its own `poll(2)` call,
/// fills in the `revents`, and hands the state back to
/// [`Machine::process_poll`](crate::Machine::process_poll) for dispatch.
///
/// The machine's internal interrupt descriptor is never part of the set;
/// it belongs to [`Machine::run`](crate::Machine::run).
#[derive(Default)]
pub struct PollState {
    pub(crate) fds: Vec<libc::pollfd>,
    /// Owning coroutine id of the descriptor at the same index.
    pub(crate) owners: Vec<usize>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The descriptor entries to merge into the host's poll call.
    pub fn pollfds(&self) -> &[libc::pollfd] {
        &self.fds
    }

    /// Mutable access to the entries, so the host's poll call can fill in
    /// the `revents` fields.
    pub fn pollfds_mut(&mut self) -> &mut [libc::pollfd] {
        &mut self.fds
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.fds.clear();
        self.owners.clear();
    }

    pub(crate) fn push(&mut self, fd: RawFd, events: i16, owner: usize) {
        self.fds.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
        self.owners.push(owner);
    }

    /// The first descriptor owned by coroutine `id` that poll reported on.
    ///
    /// Error conditions (`POLLERR`, `POLLHUP`, `POLLNVAL`) count as
    /// readiness; the coroutine observes the failure on its next I/O
    /// attempt.
    pub(crate) fn ready_fd_for(&self, id: usize) -> Option<RawFd> {
        self.fds
            .iter()
            .zip(&self.owners)
            .find(|(pfd, owner)| **owner == id && pfd.revents != 0)
            .map(|(pfd, _)| pfd.fd)
    }
}
