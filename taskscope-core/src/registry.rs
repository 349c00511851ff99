//! The fixed catalog of kernel task lists.
//!
//! A task's scheduling state is never stored in the task record; it is
//! implied entirely by which kernel list holds the task's entry. The
//! catalog below partitions every non-running task, in the order the
//! report groups its rows.

use crate::error::SnapshotError;
use crate::symbols::TargetMap;
use serde::Serialize;
use std::fmt;

/// Coarse scheduling state, derived purely from list membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    /// Runnable, waiting for a core.
    Ready,
    /// Waiting on a timeout or event.
    Blocked,
    /// Suspended, or blocked without a timeout.
    Suspended,
    /// Deleted, awaiting cleanup by the idle task.
    Deleted,
}

impl TaskState {
    /// Single-letter code used in the report.
    pub fn code(self) -> char {
        match self {
            Self::Ready => 'R',
            Self::Blocked => 'B',
            Self::Suspended => 'S',
            Self::Deleted => 'D',
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One kernel list symbol and the state membership implies.
#[derive(Debug, Clone, Copy)]
pub struct ListSource {
    /// Kernel symbol naming the list (or list array).
    pub symbol: &'static str,
    /// State of every task found in it.
    pub state: TaskState,
    /// Whether the symbol is an array with one list per priority.
    pub per_priority: bool,
}

/// Every kernel list holding tasks, in display order.
///
/// The kernel keeps two delayed lists and swaps them when the tick counter
/// overflows; membership in either means Blocked.
pub const TASK_LISTS: [ListSource; 5] = [
    ListSource { symbol: "pxReadyTasksLists", state: TaskState::Ready, per_priority: true },
    ListSource { symbol: "xSuspendedTaskList", state: TaskState::Suspended, per_priority: false },
    ListSource { symbol: "xDelayedTaskList1", state: TaskState::Blocked, per_priority: false },
    ListSource { symbol: "xDelayedTaskList2", state: TaskState::Blocked, per_priority: false },
    ListSource { symbol: "xTasksWaitingTermination", state: TaskState::Deleted, per_priority: false },
];

impl ListSource {
    /// Base addresses of every `List_t` this source denotes.
    ///
    /// A priority-indexed source expands to one address per priority level,
    /// sized from the symbol; the rest resolve to their single list.
    pub fn resolve(&self, map: &TargetMap) -> Result<Vec<u64>, SnapshotError> {
        let sym = map.require_symbol(self.symbol)?;
        if !self.per_priority {
            return Ok(vec![sym.address]);
        }
        let stride = map.layout.list.size;
        let count = if stride > 0 && sym.size >= stride { sym.size / stride } else { 1 };
        Ok((0..count).map(|i| sym.address + i * stride).collect())
    }
}
