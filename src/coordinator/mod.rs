//! The coordinator process: job lifecycle, task dispatch, and the
//! HTTP control plane workers and clients talk to.

pub mod http;
pub mod input;
pub mod scheduler;

pub use scheduler::Scheduler;
