use crate::coroutine::State;
use crate::event::EventFd;
use crate::machine::core::MachineCore;
use crate::timer::TimerFd;

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};

/// Where a pending call wants its value delivered.
///
/// The pointer targets a `Cell<Option<T>>` local to the calling
/// coroutine's stack frame, which stays pinned while the caller is
/// suspended. The `TypeId` is checked at delivery so a mismatched
/// call/yield pair asserts instead of corrupting the slot.
#[derive(Clone, Copy)]
pub(crate) struct ResultSlot {
    pub(crate) ptr: *const (),
    pub(crate) type_id: TypeId,
}

/// State shared between a coroutine's body, its outside handles, and the
/// scheduler.
///
/// All fields use single-threaded interior mutability; the runtime never
/// crosses threads. Borrows are always released before a context switch.
pub(crate) struct CoroCore {
    /// Owning scheduler. Weak, the machine owns the coroutines.
    machine: Weak<MachineCore>,

    /// Unique id, stable for this coroutine's whole life.
    id: usize,

    /// Debug label, mutable at any time.
    name: RefCell<String>,

    state: Cell<State>,

    /// Scheduler tick of the most recent suspension. Oldest goes first.
    last_tick: Cell<u64>,

    /// Private wake-up descriptor.
    event: EventFd,

    /// Descriptors of the wait in progress, including `event` and the
    /// timeout timer. Populated on entry to a wait, cleared on resume.
    wait_fds: RefCell<Vec<libc::pollfd>>,

    /// Timer backing the current wait's timeout, if any.
    timer: RefCell<Option<TimerFd>>,

    /// The coroutine that has a call in flight against this one.
    caller: RefCell<Option<Weak<CoroCore>>>,

    /// Delivery slot installed by that call; present until the next
    /// yielded value claims it.
    result: Cell<Option<ResultSlot>>,

    /// Opaque application data. Never inspected by the runtime.
    user_data: RefCell<Option<Rc<dyn Any>>>,
}

impl CoroCore {
    pub(crate) fn new(machine: Weak<MachineCore>, id: usize, name: String) -> Self {
        Self {
            machine,
            id,
            name: RefCell::new(name),
            state: Cell::new(State::New),
            last_tick: Cell::new(0),
            event: EventFd::new(),
            wait_fds: RefCell::new(Vec::new()),
            timer: RefCell::new(None),
            caller: RefCell::new(None),
            result: Cell::new(None),
            user_data: RefCell::new(None),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    pub(crate) fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    pub(crate) fn last_tick(&self) -> u64 {
        self.last_tick.get()
    }

    pub(crate) fn set_last_tick(&self, tick: u64) {
        self.last_tick.set(tick);
    }

    pub(crate) fn event(&self) -> &EventFd {
        &self.event
    }

    pub(crate) fn machine(&self) -> Option<Rc<MachineCore>> {
        self.machine.upgrade()
    }

    pub(crate) fn same_machine(&self, other: &CoroCore) -> bool {
        Weak::ptr_eq(&self.machine, &other.machine)
    }

    /// Install the descriptor set for a wait about to suspend.
    pub(crate) fn begin_wait(&self, fds: Vec<libc::pollfd>, timer: Option<TimerFd>) {
        *self.wait_fds.borrow_mut() = fds;
        *self.timer.borrow_mut() = timer;
    }

    /// Tear down the wait descriptor set, returning the timeout timer so
    /// the wait can tell whether it was the trigger. Dropping the timer
    /// closes it.
    pub(crate) fn end_wait(&self) -> Option<TimerFd> {
        self.wait_fds.borrow_mut().clear();
        self.timer.borrow_mut().take()
    }

    pub(crate) fn caller(&self) -> Option<Rc<CoroCore>> {
        self.caller.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn has_caller(&self) -> bool {
        self.caller.borrow().is_some()
    }

    pub(crate) fn link_call(&self, caller: Weak<CoroCore>, slot: ResultSlot) {
        *self.caller.borrow_mut() = Some(caller);
        self.result.set(Some(slot));
    }

    pub(crate) fn unlink_call(&self) {
        *self.caller.borrow_mut() = None;
        self.result.set(None);
    }

    /// Claim the pending delivery slot, if a call has installed one.
    pub(crate) fn take_result(&self) -> Option<ResultSlot> {
        self.result.take()
    }

    pub(crate) fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.user_data.borrow().clone()
    }

    pub(crate) fn set_user_data(&self, data: Option<Rc<dyn Any>>) {
        *self.user_data.borrow_mut() = data;
    }

    /// The first descriptor of this coroutine's current poll interest set,
    /// as seen by the scheduler: the wait set while waiting, the private
    /// event while yielded.
    pub(crate) fn poll_fds(&self, out: &mut Vec<(RawFd, i16)>) {
        match self.state.get() {
            State::Yielded => out.push((self.event.fd(), libc::POLLIN)),
            State::Waiting => {
                for pfd in self.wait_fds.borrow().iter() {
                    out.push((pfd.fd, pfd.events));
                }
            }
            _ => {}
        }
    }
}
