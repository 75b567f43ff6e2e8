//! Repository layer
//!
//! The scheduler calls the dispatcher and the worker make, behind traits so
//! both can be driven by fakes in tests. `SchedulerClient` implements both.

mod jobs;
mod machines;

pub use jobs::JobRepository;
pub use machines::MachineRepository;
