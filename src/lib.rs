//! `gridmr`: a distributed MapReduce coordinator/worker cluster with
//! an HTTP control plane.
//!
//! - [`coordinator`] — job lifecycle, task scheduler, and HTTP surface.
//! - [`worker`] — task executor, program loading, and HTTP surface.
//! - [`model`] — the wire data model shared by every role.
//! - [`shuffle`] — the shuffle-and-sort between map and reduce.
//! - [`partition`] — the hash partitioner.
//! - [`pathrewrite`] — the `SHARED_ROOT`/`LOCAL_MOUNT` path convention.
//! - [`loader`] — resolves a mapper/reducer URL to a built-in operator.
//! - [`store`] — the in-memory `JobStore`/`WorkerRegistry` persistence seam.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod loader;
pub mod model;
pub mod partition;
pub mod pathrewrite;
pub mod shuffle;
pub mod store;
pub mod worker;

pub use error::{Error, Result};
