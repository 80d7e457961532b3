//! Communication context consumed by pcat catalogs.
//!
//! The distributed runtime itself is an external collaborator: catalogs only need
//! rank identity, the rank count and a handful of collectives. Those are expressed
//! by the [`Communicator`] trait. Two in-process implementations ship here:
//!
//! - [`SelfComm`]: a single-rank run, every collective is the identity.
//! - [`ThreadComm`]: a fixed group of ranks living on threads of one process,
//!   used to exercise collective behavior in tests and small runs.
//!
//! # Ordering precondition
//!
//! Collective calls must be issued by every rank of a communicator in the same
//! relative order. A mismatch is a protocol violation (deadlock or a reduction
//! over unrelated values); it is not detected at runtime.

pub mod current;
pub mod single;
pub mod thread;

pub use current::CurrentComm;
pub use single::SelfComm;
pub use thread::ThreadComm;

use std::fmt;
use std::sync::Arc;

use pcat_result::Result;

/// Shared handle to a communicator, threaded explicitly through construction.
pub type CommRef = Arc<dyn Communicator>;

/// Opaque communication capability of one rank.
pub trait Communicator: fmt::Debug + Send + Sync + 'static {
    /// Index of the calling rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks participating in this communicator.
    fn size(&self) -> usize;

    /// Collective: every rank contributes `value`; every rank receives the sum.
    fn allreduce_sum(&self, value: u64) -> Result<u64>;

    /// Collective: `root` supplies `payload`, every rank receives a copy of it.
    ///
    /// Non-root ranks pass `None`. A root that passes `None` broadcasts an
    /// empty payload.
    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>>;

    /// Collective: returns once every rank has entered the barrier.
    fn barrier(&self) -> Result<()>;
}
