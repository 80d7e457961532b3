use pcat_result::{Error, Result};

use crate::Communicator;

/// Communicator for a run with exactly one rank.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_sum(&self, value: u64) -> Result<u64> {
        Ok(value)
    }

    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        if root != 0 {
            return Err(Error::communication(format!(
                "broadcast root {root} out of range for a single-rank communicator"
            )));
        }
        Ok(payload.unwrap_or_default())
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}
