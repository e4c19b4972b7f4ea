//! Extent and batch planning.
//!
//! An extent is the minimal contiguous address span covering every
//! parameter of one register kind; the plan partitions it into transport
//! requests that fit the 125-word read ceiling. Planning runs once per
//! successful model resolution.

use crate::catalog::Parameter;
use crate::modbus::constants::MAX_READ_WORDS;

/// Half-open address span `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterExtent {
    pub min: u16,
    pub max: u16,
}

impl RegisterExtent {
    pub fn len(&self) -> u16 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }
}

/// One transport read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// 1-indexed start address
    pub address: u16,
    pub count: u16,
}

/// Union span of the given parameters, `None` when the iterator is empty.
pub fn extent_of<'a>(params: impl IntoIterator<Item = &'a Parameter>) -> Option<RegisterExtent> {
    let mut extent: Option<RegisterExtent> = None;
    for param in params {
        let ext = extent.get_or_insert(RegisterExtent {
            min: param.address,
            max: param.end_address(),
        });
        ext.min = ext.min.min(param.address);
        ext.max = ext.max.max(param.end_address());
    }
    extent
}

/// Partition an extent into contiguous, ordered batches of at most
/// `MAX_READ_WORDS` words whose union equals the extent exactly.
pub fn plan_batches(extent: RegisterExtent) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut address = extent.min;
    while address < extent.max {
        let count = (extent.max - address).min(MAX_READ_WORDS);
        batches.push(Batch { address, count });
        address += count;
    }
    batches
}
