//! Allocation selection by client status.

use crate::client::AllocationStub;

/// Client status of an allocation whose tasks are running.
pub const RUNNING: &str = "running";

/// Keep allocations whose client status equals `status` exactly, in input order.
pub fn allocations_by_status(
    allocations: Vec<AllocationStub>,
    status: &str,
) -> Vec<AllocationStub> {
    allocations
        .into_iter()
        .filter(|alloc| alloc.client_status == status)
        .collect()
}
