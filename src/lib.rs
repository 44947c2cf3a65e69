//! # Fibra
//!
//! **Fibra** is a cooperative, single-threaded coroutine runtime. It lets a
//! program spawn many independent flows of control, each on its own private
//! stack, that hand execution to one another at explicit suspension points:
//! yielding, waiting for descriptor readiness, sleeping, or calling another
//! coroutine for a value.
//!
//! All suspended coroutines are multiplexed onto one `poll(2)` call per
//! scheduling pass. Sleeps and wait timeouts are one-shot timer
//! descriptors, wake-ups without external I/O go through a per-coroutine
//! event descriptor, and the longest-suspended runnable coroutine always
//! goes first.
//!
//! There is no parallelism and no preemption: a coroutine runs until it
//! suspends voluntarily, which makes shared state between coroutines safe
//! to touch without locks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fibra::Machine;
//!
//! let machine = Machine::new();
//!
//! machine.spawn(|co| {
//!     for _ in 0..3 {
//!         println!("ping");
//!         co.yield_now();
//!     }
//! });
//!
//! machine.spawn(|co| {
//!     for _ in 0..3 {
//!         println!("pong");
//!         co.yield_now();
//!     }
//! });
//!
//! machine.run().unwrap();
//! ```
//!
//! ## Generators
//!
//! A coroutine that parks in [`yield_value`](Coroutine::yield_value) acts
//! as a generator: each [`call`](Coroutine::call) against it produces the
//! next value, and it stays alive in between.
//!
//! ## Embedding
//!
//! Applications that own their event loop can skip [`Machine::run`]:
//! [`Machine::get_poll_state`] exposes the aggregate descriptor set and
//! [`Machine::process_poll`] dispatches against the host's poll results.

mod event;
mod poller;
mod timer;
mod utils;

pub mod coroutine;
pub mod machine;

pub use coroutine::{Coroutine, CoroutineBuilder, CoroutineHandle, State, DEFAULT_STACK_SIZE};
pub use machine::{Machine, PollState, StopHandle};
pub use poller::common::{Interest, WaitFd};
