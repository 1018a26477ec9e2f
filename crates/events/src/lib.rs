//! Job-state-change event stream for UI and logging consumers.

pub mod bus;

pub use bus::{EventBus, EventStatus, JobEvent};
