//! The snapshot assembler: one consistent, ordered table of every task.

use crate::current;
use crate::error::SnapshotError;
use crate::memory;
use crate::registry::{TaskState, TASK_LISTS};
use crate::schema::{self, AttrValue};
use crate::symbols::TargetMap;
use crate::walker::ListRegion;
use probe_rs::MemoryInterface;
use serde::Serialize;

/// One row of the snapshot, built fresh from live memory per invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    /// The task's control-block address, used as its identity.
    pub handle: u64,
    /// State implied by the list the task was found on.
    pub state: TaskState,
    /// Core the task is executing on right now, if any.
    pub core: Option<usize>,
    /// Attribute values, matching the table header order.
    pub values: Vec<AttrValue>,
}

/// The assembled table: a header and one row per task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTable {
    /// Column names: the fixed prefix plus every enabled attribute.
    pub headers: Vec<&'static str>,
    /// Rows in registry order, then list-traversal order.
    pub rows: Vec<TaskRecord>,
}

/// Outcome of one snapshot invocation.
///
/// An empty table is never produced: finding no tasks means the scheduler
/// has not been started yet, which is a materially different condition
/// from a successful (but small) snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Snapshot {
    /// The scheduler's bookkeeping is absent, unreadable, or reports zero
    /// tasks.
    SchedulerNotStarted,
    /// The assembled task table.
    Tasks(TaskTable),
}

/// Build a point-in-time snapshot of every task the kernel knows about.
///
/// Reads are sequential and individually non-atomic against a running
/// target; the result is best-effort consistent, and the walker bounds the
/// damage a racing kernel can do. Any read failure aborts the whole
/// snapshot — a partial table is never returned.
pub fn build_snapshot(
    mem: &mut dyn MemoryInterface,
    map: &TargetMap,
) -> Result<Snapshot, SnapshotError> {
    // 1. Scheduler bookkeeping. Unreadable or zero means task creation has
    //    not happened yet, not a failure.
    match total_tasks(mem, map) {
        Ok(0) => return Ok(Snapshot::SchedulerNotStarted),
        Ok(_) => {}
        Err(e) => {
            log::debug!("scheduler bookkeeping not readable yet: {e}");
            return Ok(Snapshot::SchedulerNotStarted);
        }
    }

    // 2. Who is on a core right now.
    let running = current::running_tasks(mem, map)?;

    // 3. Walk every catalogued list and build rows.
    let fields = schema::enabled_fields(map);
    let mut rows = Vec::new();
    for source in &TASK_LISTS {
        for base in source.resolve(map)? {
            let region = ListRegion::read(mem, map, base)?;
            let owners = region.walk(&mut *mem, map)?.collect::<Result<Vec<_>, _>>()?;
            for handle in owners {
                let core = running.iter().position(|&h| h == handle);
                let mut values = Vec::with_capacity(fields.len());
                for spec in &fields {
                    values.push(spec.extract(mem, map, handle)?);
                }
                rows.push(TaskRecord { handle, state: source.state, core, values });
            }
        }
    }

    if rows.is_empty() {
        return Ok(Snapshot::SchedulerNotStarted);
    }

    // 4. Header matching exactly the columns the rows carry.
    let mut headers = vec!["ID", "STATE", "CPU"];
    headers.extend(fields.iter().map(|spec| spec.name));

    Ok(Snapshot::Tasks(TaskTable { headers, rows }))
}

fn total_tasks(mem: &mut dyn MemoryInterface, map: &TargetMap) -> Result<u64, SnapshotError> {
    let sym = map.require_symbol("uxCurrentNumberOfTasks")?;
    memory::read_uint(mem, sym.address, map.layout.pointer_width, "uxCurrentNumberOfTasks")
}
