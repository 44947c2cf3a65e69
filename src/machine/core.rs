use crate::coroutine::core::CoroCore;
use crate::coroutine::{Coroutine, CoroutineBuilder, CoroutineHandle, Fiber, State};
use crate::event::EventFd;
use crate::machine::PollState;
use crate::poller::unix::sys_poll;

use corosensei::stack::DefaultStack;
use corosensei::CoroutineResult;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resume value passed to a coroutine dispatched from the ready set rather
/// than woken by a descriptor.
const NO_FD: RawFd = -1;

type CompletionCallback = Box<dyn FnMut(&CoroutineHandle)>;

/// The stop signal shared between a machine and its [`StopHandle`]s.
///
/// Wraps the interrupt descriptor that unblocks the poll call, plus the
/// flag that tells the run loop to exit. The descriptor write makes a stop
/// effective even while the machine is blocked in `poll(2)`.
pub(crate) struct Interrupt {
    event: EventFd,
    stopped: AtomicBool,
}

impl Interrupt {
    fn new() -> Self {
        Self {
            event: EventFd::new(),
            stopped: AtomicBool::new(false),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.event.trigger();
    }

    fn take_stopped(&self) -> bool {
        self.stopped.swap(false, Ordering::Acquire)
    }
}

/// Requests a running machine to stop, from anywhere.
///
/// A `StopHandle` is `Send`, so a machine blocked in its poll call can be
/// stopped from another thread (or a signal-handling context the
/// application routes through a thread). Stopping does not terminate any
/// coroutine; [`Machine::run`] simply returns.
#[derive(Clone)]
pub struct StopHandle {
    interrupt: Arc<Interrupt>,
}

impl StopHandle {
    /// Make the machine's current or next [`Machine::run`] return.
    pub fn stop(&self) {
        self.interrupt.stop();
    }
}

/// One live coroutine as the scheduler tracks it: the shared state cell
/// and the switching context. The fiber is taken out of the entry for the
/// duration of a dispatch, so the live list stays borrowable from within
/// the running body.
struct Entry {
    core: Rc<CoroCore>,
    fiber: Option<Fiber>,
}

pub(crate) struct MachineCore {
    /// Live coroutines in insertion order. Insertion order is the
    /// tie-break between equal suspension ticks.
    coroutines: RefCell<Vec<Entry>>,

    /// Id allocator, plus the most recently freed id as the reuse hint.
    ids: RefCell<crate::utils::bitset::BitSet>,
    last_freed_id: Cell<Option<usize>>,

    /// Monotonic counter, incremented once per scheduling decision.
    tick: Cell<u64>,

    /// Id of the coroutine currently being executed, if any.
    current: Cell<Option<usize>>,

    /// Whether a `run` loop is active.
    running: Cell<bool>,

    interrupt: Arc<Interrupt>,

    completion: RefCell<Option<CompletionCallback>>,

    /// Reusable aggregate poll set for the run loop.
    scratch: RefCell<PollState>,
}

impl MachineCore {
    pub(crate) fn tick_count(&self) -> u64 {
        self.tick.get()
    }
}

/// The scheduler.
///
/// A `Machine` owns a set of coroutines and drives them from a single
/// thread: it aggregates every suspended coroutine's descriptors into one
/// poll set, blocks in `poll(2)`, picks the runnable coroutine that has
/// been waiting longest, and switches into it. The loop ends when the last
/// coroutine dies or the machine is stopped.
///
/// `Machine` is a cheap handle; clones refer to the same scheduler.
/// Everything except [`StopHandle::stop`] must happen on the thread the
/// machine runs on.
///
/// # Examples
///
/// ```rust,ignore
/// let machine = Machine::new();
///
/// machine.spawn(|co| {
///     println!("hello");
///     co.yield_now();
///     println!("goodbye");
/// });
///
/// machine.run().unwrap();
/// ```
#[derive(Clone)]
pub struct Machine {
    core: Rc<MachineCore>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Creates an empty machine.
    pub fn new() -> Self {
        Self {
            core: Rc::new(MachineCore {
                coroutines: RefCell::new(Vec::new()),
                ids: RefCell::new(crate::utils::bitset::BitSet::new()),
                last_freed_id: Cell::new(None),
                tick: Cell::new(0),
                current: Cell::new(None),
                running: Cell::new(false),
                interrupt: Arc::new(Interrupt::new()),
                completion: RefCell::new(None),
                scratch: RefCell::new(PollState::new()),
            }),
        }
    }

    /// Starts configuring a new coroutine on this machine.
    pub fn coroutine(&self) -> CoroutineBuilder<'_> {
        CoroutineBuilder::new(self)
    }

    /// Spawns a coroutine with default options (generated name, 32 KiB
    /// stack, autostart).
    pub fn spawn<F>(&self, body: F) -> CoroutineHandle
    where
        F: FnOnce(&Coroutine<'_>) + 'static,
    {
        self.coroutine().spawn(body)
    }

    /// Number of live coroutines.
    pub fn len(&self) -> usize {
        self.core.coroutines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.coroutines.borrow().is_empty()
    }

    /// Installs the callback invoked once for every coroutine that dies.
    ///
    /// The callback runs after the coroutine has been unlinked from
    /// scheduling and its id released, but before its stack is reclaimed.
    pub fn set_completion_callback<F>(&self, callback: F)
    where
        F: FnMut(&CoroutineHandle) + 'static,
    {
        *self.core.completion.borrow_mut() = Some(Box::new(callback));
    }

    /// A `Send` handle that can stop this machine from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            interrupt: Arc::clone(&self.core.interrupt),
        }
    }

    /// Makes the current or next [`run`](Self::run) return.
    ///
    /// Running coroutines are not terminated; they stay parked in their
    /// current state and a later `run` resumes scheduling them.
    pub fn stop(&self) {
        self.core.interrupt.stop();
    }

    /// Runs the machine until every coroutine has died or
    /// [`stop`](Self::stop) is invoked.
    ///
    /// All waiting descriptors are multiplexed onto one `poll(2)` call per
    /// scheduling pass. The poll blocks indefinitely unless a coroutine is
    /// ready to run; timeouts are carried by per-wait timer descriptors.
    ///
    /// # Errors
    ///
    /// Returns the error when the poll syscall itself fails. Readiness
    /// errors on individual descriptors are not errors here; they wake the
    /// owning coroutine instead.
    ///
    /// # Panics
    ///
    /// Panics when invoked from inside a coroutine or while another `run`
    /// is active.
    pub fn run(&self) -> io::Result<()> {
        assert!(!self.core.running.get(), "run is not reentrant");
        assert!(
            self.core.current.get().is_none(),
            "run invoked from inside a coroutine"
        );

        self.core.running.set(true);
        let result = self.run_loop();
        self.core.running.set(false);

        result
    }

    fn run_loop(&self) -> io::Result<()> {
        loop {
            if self.core.coroutines.borrow().is_empty() {
                return Ok(());
            }
            if self.core.interrupt.take_stopped() {
                return Ok(());
            }

            let mut state = self.core.scratch.take();
            self.build_poll_state(&mut state);
            let interrupt_index = state.len();
            state.push(
                self.core.interrupt.event.fd(),
                libc::POLLIN,
                usize::MAX,
            );

            // Timeouts are all expressed as timer descriptors in the set,
            // so the poll itself only needs to distinguish "something is
            // already runnable" from "block until readiness".
            let timeout_ms = if self.has_ready() { 0 } else { -1 };
            let poll_result = sys_poll(state.pollfds_mut(), timeout_ms);

            let interrupted = state.pollfds()[interrupt_index].revents != 0;
            let chosen = poll_result.as_ref().ok().and_then(|_| self.choose(&state));
            self.core.scratch.replace(state);
            poll_result?;

            if interrupted {
                self.core.interrupt.event.clear();
                if self.core.interrupt.take_stopped() {
                    return Ok(());
                }
            }

            if let Some((id, fd)) = chosen {
                self.switch_to(id, fd);
            }
        }
    }

    /// Populates `state` with every descriptor the machine needs polled:
    /// the wait set of each waiting coroutine and the private event of
    /// each yielded one. The interrupt descriptor is not included; it
    /// belongs to [`run`](Self::run).
    ///
    /// This is one half of embedding the machine into a host-owned event
    /// loop; the other half is [`process_poll`](Self::process_poll).
    pub fn get_poll_state(&self, state: &mut PollState) {
        self.build_poll_state(state);
    }

    /// Dispatches at most one coroutine based on a poll the host
    /// performed.
    ///
    /// `state` must have been filled by [`get_poll_state`](Self::get_poll_state)
    /// and its `revents` populated by the host's own poll call. Ready
    /// coroutines are dispatched even when no descriptor fired. Returns
    /// whether a coroutine was dispatched, so a host can drain ready work
    /// before blocking again:
    ///
    /// ```rust,ignore
    /// let mut state = PollState::new();
    /// loop {
    ///     machine.get_poll_state(&mut state);
    ///     // merge state.pollfds_mut() into the host poll here
    ///     while machine.process_poll(&state) {}
    /// }
    /// ```
    ///
    /// # Panics
    ///
    /// Panics when invoked from inside a coroutine.
    pub fn process_poll(&self, state: &PollState) -> bool {
        assert!(
            self.core.current.get().is_none(),
            "process_poll invoked from inside a coroutine"
        );

        match self.choose(state) {
            Some((id, fd)) => {
                self.switch_to(id, fd);
                true
            }
            None => false,
        }
    }

    /// Writes a human-readable dump of every live coroutine to stderr.
    ///
    /// The format is for debugging only and not a compatibility surface.
    pub fn show(&self) {
        for entry in self.core.coroutines.borrow().iter() {
            eprintln!(
                "coroutine {:4}  {:<24} {:?} (last tick {})",
                entry.core.id(),
                entry.core.name(),
                entry.core.state(),
                entry.core.last_tick(),
            );
        }
    }

    pub(crate) fn add_coroutine(
        &self,
        name: Option<String>,
        stack_size: usize,
        autostart: bool,
        user_data: Option<Rc<dyn Any>>,
        body: Box<dyn FnOnce(&Coroutine<'_>)>,
    ) -> CoroutineHandle {
        let id = {
            let mut ids = self.core.ids.borrow_mut();
            match self.core.last_freed_id.take() {
                Some(hint) => ids.allocate_hint(hint),
                None => ids.allocate(),
            }
        };

        let name = name.unwrap_or_else(|| format!("co-{id}"));
        let core = Rc::new(CoroCore::new(Rc::downgrade(&self.core), id, name));
        core.set_user_data(user_data);

        let stack = DefaultStack::new(stack_size).expect("failed to allocate coroutine stack");
        let body_core = Rc::clone(&core);
        let fiber = Fiber::with_stack(stack, move |yielder, _first: RawFd| {
            let co = Coroutine::new(body_core, yielder);
            body(&co);
        });

        self.core.coroutines.borrow_mut().push(Entry {
            core: Rc::clone(&core),
            fiber: Some(fiber),
        });

        if autostart {
            core.set_state(State::Ready);
        }

        CoroutineHandle { core }
    }

    fn has_ready(&self) -> bool {
        self.core
            .coroutines
            .borrow()
            .iter()
            .any(|e| e.core.state() == State::Ready)
    }

    fn build_poll_state(&self, state: &mut PollState) {
        state.clear();

        let mut fds = Vec::new();
        for entry in self.core.coroutines.borrow().iter() {
            fds.clear();
            entry.core.poll_fds(&mut fds);
            for &(fd, events) in &fds {
                state.push(fd, events, entry.core.id());
            }
        }
    }

    /// Selects the next coroutine to dispatch, and the descriptor that
    /// made it runnable (`-1` for a ready coroutine).
    ///
    /// Candidates are the ready coroutines plus every suspended coroutine
    /// with at least one descriptor reported by the poll. The candidate
    /// with the lowest suspension tick wins; insertion order breaks ties,
    /// so simultaneously woken coroutines are served round-robin.
    fn choose(&self, state: &PollState) -> Option<(usize, RawFd)> {
        let coroutines = self.core.coroutines.borrow();
        let mut best: Option<(u64, usize, RawFd)> = None;

        for entry in coroutines.iter() {
            let fd = match entry.core.state() {
                State::Ready => Some(NO_FD),
                State::Yielded | State::Waiting => state.ready_fd_for(entry.core.id()),
                _ => None,
            };

            if let Some(fd) = fd {
                let tick = entry.core.last_tick();
                if best.map_or(true, |(t, _, _)| tick < t) {
                    best = Some((tick, entry.core.id(), fd));
                }
            }
        }

        best.map(|(_, id, fd)| (id, fd))
    }

    /// Switches into coroutine `id`, resuming it with the descriptor that
    /// triggered the wake-up, and handles its next suspension or death.
    fn switch_to(&self, id: usize, fd: RawFd) {
        self.core.tick.set(self.core.tick.get() + 1);

        // The fiber leaves the entry while it runs, so the body can
        // reach the live list through the machine without re-borrowing it.
        let (core, mut fiber) = {
            let mut coroutines = self.core.coroutines.borrow_mut();
            let entry = coroutines
                .iter_mut()
                .find(|e| e.core.id() == id)
                .expect("chosen coroutine disappeared");
            entry.core.set_state(State::Running);
            let fiber = entry.fiber.take().expect("coroutine is already running");
            (Rc::clone(&entry.core), fiber)
        };

        self.core.current.set(Some(id));
        let result = fiber.resume(fd);
        self.core.current.set(None);

        let dead = match result {
            CoroutineResult::Return(()) => true,
            CoroutineResult::Yield(()) => core.state() == State::Dead,
        };

        if dead {
            core.set_state(State::Dead);
            self.reap(&core, fiber);
        } else {
            let mut coroutines = self.core.coroutines.borrow_mut();
            if let Some(entry) = coroutines.iter_mut().find(|e| e.core.id() == id) {
                entry.fiber = Some(fiber);
            }
        }
    }

    /// Unlinks a dead coroutine, releases its id, reports it through the
    /// completion callback, and reclaims its stack.
    fn reap(&self, core: &Rc<CoroCore>, fiber: Fiber) {
        {
            let mut coroutines = self.core.coroutines.borrow_mut();
            if let Some(position) = coroutines.iter().position(|e| e.core.id() == core.id()) {
                coroutines.remove(position);
            }
        }

        // A caller suspended in an unfinished call must be woken so it can
        // observe the death instead of sleeping forever.
        if let Some(caller) = core.caller() {
            caller.event().trigger();
        }

        self.core.ids.borrow_mut().free(core.id());
        self.core.last_freed_id.set(Some(core.id()));

        // The callback is moved out for the call so it may itself install
        // a replacement or spawn coroutines without re-borrowing.
        let mut callback = self.core.completion.borrow_mut().take();
        if let Some(callback) = callback.as_mut() {
            let handle = CoroutineHandle {
                core: Rc::clone(core),
            };
            callback(&handle);
        }
        let mut slot = self.core.completion.borrow_mut();
        if slot.is_none() {
            *slot = callback;
        }
        drop(slot);

        // Dropping a suspended fiber unwinds its stack, running any
        // destructors the body still holds; a finished fiber is inert.
        drop(fiber);
    }
}
