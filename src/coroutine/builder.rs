use crate::coroutine::{Coroutine, CoroutineHandle, DEFAULT_STACK_SIZE};
use crate::machine::Machine;

use std::any::Any;
use std::rc::Rc;

/// Builder for configuring and spawning a coroutine.
///
/// Obtained from [`Machine::coroutine`]. By default the coroutine gets a
/// generated name, a 32 KiB stack, no user data, and starts automatically
/// on the next scheduling pass.
///
/// # Examples
///
/// ```rust,ignore
/// let producer = machine
///     .coroutine()
///     .name("producer")
///     .stack_size(64 * 1024)
///     .autostart(false)
///     .spawn(|co| {
///         co.yield_value(1u32);
///     });
/// ```
pub struct CoroutineBuilder<'m> {
    machine: &'m Machine,
    name: Option<String>,
    stack_size: usize,
    autostart: bool,
    user_data: Option<Rc<dyn Any>>,
}

impl<'m> CoroutineBuilder<'m> {
    pub(crate) fn new(machine: &'m Machine) -> Self {
        Self {
            machine,
            name: None,
            stack_size: DEFAULT_STACK_SIZE,
            autostart: true,
            user_data: None,
        }
    }

    /// Sets the debug name. Defaults to `co-<id>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the stack size in bytes.
    ///
    /// The stack is allocated once at spawn and never grows.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn stack_size(mut self, size: usize) -> Self {
        assert!(size > 0, "stack_size must be > 0");

        self.stack_size = size;
        self
    }

    /// Whether the coroutine becomes runnable immediately.
    ///
    /// With `autostart(false)` the coroutine stays in
    /// [`State::New`](crate::State::New) until
    /// [`start`](CoroutineHandle::start) is invoked or another coroutine
    /// calls it.
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Attaches application data, retrievable from both handle sides.
    pub fn user_data(mut self, data: Rc<dyn Any>) -> Self {
        self.user_data = Some(data);
        self
    }

    /// Spawns the coroutine onto the machine.
    ///
    /// The body runs exactly once, on its own stack, when the scheduler
    /// first dispatches the coroutine.
    pub fn spawn<F>(self, body: F) -> CoroutineHandle
    where
        F: FnOnce(&Coroutine<'_>) + 'static,
    {
        self.machine.add_coroutine(
            self.name,
            self.stack_size,
            self.autostart,
            self.user_data,
            Box::new(body),
        )
    }
}
