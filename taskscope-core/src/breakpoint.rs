//! Task-identity predicate for task-scoped breakpoints.

use crate::current;
use crate::schema;
use crate::symbols::TargetMap;
use probe_rs::MemoryInterface;

/// A breakpoint that only belongs to one named task.
///
/// The debugger installs an ordinary breakpoint at the address; when the
/// target stops there, [`should_stop`](Self::should_stop) decides whether
/// the stop is reported or the target is resumed silently.
#[derive(Debug, Clone)]
pub struct TaskBreakpoint {
    task_name: String,
    address: u64,
}

impl TaskBreakpoint {
    /// Watch `address` for stops by the task named `task_name`.
    pub fn new(task_name: impl Into<String>, address: u64) -> Self {
        Self { task_name: task_name.into(), address }
    }

    /// The watched task name.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The breakpoint address.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Whether a stop at this breakpoint belongs to the watched task.
    ///
    /// True iff the name of a currently running task equals the watched
    /// name exactly. The kernel may not be initialized when the stop
    /// arrives; every lookup failure degrades to "do not stop" instead of
    /// taking the debug session down.
    pub fn should_stop(&self, mem: &mut dyn MemoryInterface, map: &TargetMap) -> bool {
        let handles = match current::running_tasks(mem, map) {
            Ok(handles) => handles,
            Err(e) => {
                log::debug!("current task unavailable, ignoring stop: {e}");
                return false;
            }
        };

        for handle in handles {
            if handle == 0 {
                continue;
            }
            match schema::task_name(mem, map, handle) {
                Ok(name) if name == self.task_name => return true,
                Ok(_) => {}
                Err(e) => log::debug!("task name at {handle:#010x} unreadable: {e}"),
            }
        }
        false
    }
}
