//! Process-wide default communicator.
//!
//! Catalogs always receive their communicator explicitly. This module only backs
//! convenience constructors that take no communicator argument: they ask
//! [`CurrentComm::get`], which returns whatever was installed with
//! [`CurrentComm::set`], or a [`SelfComm`] when nothing was installed.
//!
//! Tests that install a communicator should call [`CurrentComm::reset`] when they
//! are done so later tests see the single-rank default again.

use std::sync::{Arc, RwLock};

use crate::{CommRef, SelfComm};

static CURRENT: RwLock<Option<CommRef>> = RwLock::new(None);

/// Accessor for the process-wide default communicator.
pub struct CurrentComm;

impl CurrentComm {
    /// The installed communicator, or a single-rank communicator.
    pub fn get() -> CommRef {
        let current = CURRENT
            .read()
            .expect("CurrentComm read lock poisoned");
        match current.as_ref() {
            Some(comm) => Arc::clone(comm),
            None => Arc::new(SelfComm),
        }
    }

    /// Install `comm` as the default, returning the previously installed one.
    pub fn set(comm: CommRef) -> Option<CommRef> {
        tracing::debug!(rank = comm.rank(), size = comm.size(), "installing default communicator");
        CURRENT
            .write()
            .expect("CurrentComm write lock poisoned")
            .replace(comm)
    }

    /// Remove the installed default so [`CurrentComm::get`] falls back to [`SelfComm`].
    pub fn reset() -> Option<CommRef> {
        CURRENT
            .write()
            .expect("CurrentComm write lock poisoned")
            .take()
    }

    /// Whether a communicator has been installed explicitly.
    pub fn is_set() -> bool {
        CURRENT
            .read()
            .expect("CurrentComm read lock poisoned")
            .is_some()
    }
}
