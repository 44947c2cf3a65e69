//! The scheduler and its embeddable poll surface.

pub(crate) mod core;

mod poll_state;

pub use self::core::{Machine, StopHandle};
pub use poll_state::PollState;
