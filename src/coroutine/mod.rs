//! Coroutines and the operations available to their bodies.
//!
//! A coroutine is a suspendable flow of control with a private fixed-size
//! stack, scheduled cooperatively by a [`Machine`](crate::Machine). Its
//! body receives a [`Coroutine`] handle and suspends through it: yielding,
//! waiting for descriptor readiness, sleeping, or exchanging values with
//! another coroutine via [`call`](Coroutine::call) and
//! [`yield_value`](Coroutine::yield_value).
//!
//! Outside the body, a cloneable [`CoroutineHandle`] starts the coroutine,
//! wakes it, and inspects its state.

pub(crate) mod core;

mod builder;

pub use builder::CoroutineBuilder;

use self::core::{CoroCore, ResultSlot};
use crate::poller::common::{Interest, WaitFd};
use crate::timer::TimerFd;

use corosensei::Yielder;

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Default stack size for a new coroutine: 32 KiB.
pub const DEFAULT_STACK_SIZE: usize = 32 * 1024;

/// The lifecycle state of a coroutine.
///
/// Exactly one coroutine of a machine is `Running` at any moment. The
/// suspended states differ in what wakes the coroutine next: a scheduling
/// pass for `Ready`, its private event for `Yielded`, any descriptor of
/// its wait set for `Waiting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Constructed but not yet started.
    New,
    /// Runnable, waiting for a scheduling pass.
    Ready,
    /// Currently executing.
    Running,
    /// Suspended until its private event is triggered.
    Yielded,
    /// Suspended until a descriptor of its wait set becomes ready.
    Waiting,
    /// Finished. Terminal.
    Dead,
}

pub(crate) type Fiber = corosensei::Coroutine<RawFd, (), ()>;

/// A running coroutine's view of itself.
///
/// The body of every coroutine receives `&Coroutine` as its only argument.
/// All suspension points live here; the handle borrows the underlying
/// switching context, so it cannot escape the body, and the suspension
/// operations can only ever be invoked by the coroutine they suspend.
///
/// # Examples
///
/// ```rust,ignore
/// machine.spawn(|co| {
///     co.sleep(Duration::from_millis(10));
///     co.yield_now();
/// });
/// ```
pub struct Coroutine<'y> {
    core: Rc<CoroCore>,
    yielder: &'y Yielder<RawFd, ()>,
}

impl<'y> Coroutine<'y> {
    pub(crate) fn new(core: Rc<CoroCore>, yielder: &'y Yielder<RawFd, ()>) -> Self {
        Self { core, yielder }
    }

    /// This coroutine's unique id.
    pub fn id(&self) -> usize {
        self.core.id()
    }

    /// The debug name.
    pub fn name(&self) -> String {
        self.core.name()
    }

    /// Change the debug name. Takes effect immediately.
    pub fn set_name(&self, name: impl Into<String>) {
        self.core.set_name(name.into());
    }

    /// The scheduler tick at this coroutine's most recent suspension.
    pub fn last_tick(&self) -> u64 {
        self.core.last_tick()
    }

    /// The application data attached to this coroutine, if any.
    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.core.user_data()
    }

    /// Attach application data to this coroutine.
    pub fn set_user_data(&self, data: Option<Rc<dyn Any>>) {
        self.core.set_user_data(data);
    }

    /// An outside-the-body handle to this coroutine.
    ///
    /// Unlike `self`, the returned handle is `'static` and cloneable; it
    /// can be stored, passed to other coroutines, or used as a
    /// [`call`](Self::call) target.
    pub fn handle(&self) -> CoroutineHandle {
        CoroutineHandle {
            core: Rc::clone(&self.core),
        }
    }

    /// Suspend and give every other runnable coroutine a chance to run.
    ///
    /// The coroutine signals its own event before suspending, so the next
    /// scheduling pass sees it as runnable again; with no other work
    /// pending it resumes immediately.
    pub fn yield_now(&self) {
        self.core.event().trigger();
        self.suspend(State::Yielded);
        self.core.event().clear();
    }

    /// Wait for one descriptor to become ready.
    ///
    /// Returns `Some(fd)` when the descriptor triggered the wake-up, and
    /// `None` for a timeout or a wake through this coroutine's private
    /// event. A `None` means "re-examine the condition": the two causes
    /// are deliberately indistinguishable.
    ///
    /// With `timeout` of `None` the wait has no time limit.
    pub fn wait(&self, fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Option<RawFd> {
        self.wait_many(&[WaitFd { fd, interest }], timeout)
    }

    /// Wait for any descriptor of a set to become ready.
    ///
    /// Exactly one descriptor is reported even if several became ready at
    /// once; the first ready entry of `fds`, in the order given, wins.
    /// The private event descriptor always takes part in the wait, so a
    /// [`trigger_event`](CoroutineHandle::trigger_event) or an incoming
    /// call wakes the coroutine early (returning `None`).
    pub fn wait_many(&self, fds: &[WaitFd], timeout: Option<Duration>) -> Option<RawFd> {
        let mut set: Vec<libc::pollfd> = Vec::with_capacity(fds.len() + 2);
        for w in fds {
            set.push(libc::pollfd {
                fd: w.fd,
                events: w.interest.events(),
                revents: 0,
            });
        }
        set.push(libc::pollfd {
            fd: self.core.event().fd(),
            events: libc::POLLIN,
            revents: 0,
        });

        let timer = timeout.map(TimerFd::oneshot);
        if let Some(timer) = &timer {
            set.push(libc::pollfd {
                fd: timer.fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }

        self.core.begin_wait(set, timer);
        let ready = self.suspend(State::Waiting);
        let timer = self.core.end_wait();

        if timer.is_some_and(|t| t.fd() == ready) {
            return None;
        }
        if ready == self.core.event().fd() {
            self.core.event().clear();
            return None;
        }

        Some(ready)
    }

    /// Suspend for at least `duration`.
    ///
    /// Implemented as a wait on an empty descriptor set; a trigger of the
    /// private event ends the sleep early, like any other wait.
    pub fn sleep(&self, duration: Duration) {
        self.wait_many(&[], Some(duration));
    }

    /// Call another coroutine and suspend until it yields a value.
    ///
    /// The callee is started if it has never run, or woken through its
    /// private event if it is suspended. It delivers through
    /// [`yield_value`](Self::yield_value) and stays alive afterwards, so
    /// repeated calls against the same callee drain it like a generator.
    ///
    /// # Panics
    ///
    /// Panics if the callee belongs to another machine, is this coroutine
    /// itself, is already servicing a call, is not alive, or exits without
    /// yielding a value. The value type `T` must match the callee's
    /// `yield_value` type.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let first: i32 = co.call(&generator);
    /// let second: i32 = co.call(&generator);
    /// ```
    pub fn call<T: 'static>(&self, callee: &CoroutineHandle) -> T {
        assert!(callee.is_alive(), "call target is not alive");
        assert!(
            self.core.same_machine(&callee.core),
            "call target belongs to a different machine"
        );
        assert!(
            callee.core.id() != self.core.id(),
            "a coroutine cannot call itself"
        );
        assert!(
            !callee.core.has_caller(),
            "call target is already servicing a call"
        );

        let slot: Cell<Option<T>> = Cell::new(None);
        callee.core.link_call(
            Rc::downgrade(&self.core),
            ResultSlot {
                ptr: &slot as *const Cell<Option<T>> as *const (),
                type_id: TypeId::of::<T>(),
            },
        );

        if callee.core.state() == State::New {
            callee.start();
        } else {
            callee.core.event().trigger();
        }

        loop {
            self.suspend(State::Yielded);
            self.core.event().clear();

            // The callee wrote the slot before triggering our event, so a
            // present value is complete. An empty slot is a spurious wake,
            // unless the callee died without delivering.
            if let Some(value) = slot.take() {
                callee.core.unlink_call();
                return value;
            }

            assert!(callee.is_alive(), "callee exited without yielding a value");
        }
    }

    /// Yield a value to the coroutine calling this one.
    ///
    /// If no call is in flight yet, the coroutine parks on its private
    /// event until one arrives. The value is then written to the caller's
    /// slot and the caller woken; this coroutine keeps running until its
    /// next suspension point. Returning from the body afterwards ends the
    /// generator; calling `yield_value` again serves the next call.
    ///
    /// # Panics
    ///
    /// Panics if the in-flight call expects a different value type.
    pub fn yield_value<T: 'static>(&self, value: T) {
        let mut value = Some(value);

        loop {
            if let Some(slot) = self.core.take_result() {
                assert!(
                    slot.type_id == TypeId::of::<T>(),
                    "call and yield_value value types differ"
                );
                // The slot outlives this write: it lives in the frame of a
                // call that stays suspended until the trigger below.
                let cell = unsafe { &*(slot.ptr as *const Cell<Option<T>>) };
                cell.set(value.take());

                if let Some(caller) = self.core.caller() {
                    caller.event().trigger();
                }
                return;
            }

            self.suspend(State::Yielded);
            self.core.event().clear();
        }
    }

    /// Terminate this coroutine immediately, skipping the rest of the body.
    ///
    /// The stack is unwound, so live locals are dropped. The machine reaps
    /// the coroutine in the same scheduling pass.
    pub fn exit(&self) -> ! {
        self.core.set_state(State::Dead);
        self.yielder.suspend(());
        unreachable!("a dead coroutine was resumed");
    }

    /// Park this coroutine with `state` and transfer control back to the
    /// scheduler. Returns the descriptor that caused the resume.
    fn suspend(&self, state: State) -> RawFd {
        debug_assert_eq!(self.core.state(), State::Running);

        let machine = self
            .core
            .machine()
            .expect("machine dropped while a coroutine was running");
        self.core.set_state(state);
        self.core.set_last_tick(machine.tick_count());

        self.yielder.suspend(())
    }
}

impl fmt::Debug for Coroutine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("state", &self.core.state())
            .finish()
    }
}

/// A cloneable reference to a coroutine, usable from outside its body.
///
/// Handles start the coroutine, wake it, and observe it; they do not own
/// it. The machine reclaims a dead coroutine's resources regardless of how
/// many handles remain, and the handles simply report it as not alive.
#[derive(Clone)]
pub struct CoroutineHandle {
    pub(crate) core: Rc<CoroCore>,
}

impl CoroutineHandle {
    /// The coroutine's unique id.
    ///
    /// Ids are unique among the live coroutines of a machine; after death
    /// the id may be reissued to a newer coroutine.
    pub fn id(&self) -> usize {
        self.core.id()
    }

    /// The debug name.
    pub fn name(&self) -> String {
        self.core.name()
    }

    /// Change the debug name.
    pub fn set_name(&self, name: impl Into<String>) {
        self.core.set_name(name.into());
    }

    /// The coroutine's current lifecycle state.
    pub fn state(&self) -> State {
        self.core.state()
    }

    /// The scheduler tick of the most recent suspension.
    pub fn last_tick(&self) -> u64 {
        self.core.last_tick()
    }

    /// Whether the coroutine has neither finished nor lost its machine.
    pub fn is_alive(&self) -> bool {
        self.core.machine().is_some() && self.core.state() != State::Dead
    }

    /// Make the coroutine runnable if it has never been started.
    ///
    /// A no-op in any state but [`State::New`].
    pub fn start(&self) {
        if self.core.state() == State::New {
            self.core.set_state(State::Ready);
        }
    }

    /// Trigger the coroutine's private event, waking it from a yield or a
    /// wait. The woken wait reports `None`.
    pub fn trigger_event(&self) {
        self.core.event().trigger();
    }

    /// Drain the coroutine's private event.
    pub fn clear_event(&self) {
        self.core.event().clear();
    }

    /// The application data attached to the coroutine, if any.
    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.core.user_data()
    }

    /// Attach application data to the coroutine.
    pub fn set_user_data(&self, data: Option<Rc<dyn Any>>) {
        self.core.set_user_data(data);
    }
}

impl fmt::Debug for CoroutineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineHandle")
            .field("id", &self.core.id())
            .field("name", &self.core.name())
            .field("state", &self.core.state())
            .field("last_tick", &self.core.last_tick())
            .finish()
    }
}
