//! Resolution of the task(s) currently executing.
//!
//! Single-core kernels keep one `pxCurrentTCB` pointer; symmetric
//! multiprocessing builds turn it into an array with one slot per core.
//! Both go through the same path here: the symbol's size decides how many
//! cores there are, and the slot index is the core number.

use crate::error::SnapshotError;
use crate::memory;
use crate::symbols::TargetMap;
use probe_rs::MemoryInterface;

/// Handle of the task scheduled on each core, in core-index order.
///
/// A slot may be null before the scheduler has picked a task for that
/// core; callers treat 0 as "nothing running there".
pub fn running_tasks(
    mem: &mut dyn MemoryInterface,
    map: &TargetMap,
) -> Result<Vec<u64>, SnapshotError> {
    // SMP ports rename the scalar to pxCurrentTCBs.
    let sym = map
        .require_symbol("pxCurrentTCB")
        .or_else(|_| map.require_symbol("pxCurrentTCBs"))?;

    let width = map.layout.pointer_width;
    let cores = if sym.size > width { sym.size / width } else { 1 };

    let mut handles = Vec::with_capacity(cores as usize);
    for core in 0..cores {
        handles.push(memory::read_ptr(mem, sym.address + core * width, width, "pxCurrentTCB")?);
    }
    Ok(handles)
}
