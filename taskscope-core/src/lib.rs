//! Taskscope Core - FreeRTOS task inspection over a debug probe.
//!
//! This crate reconstructs a point-in-time snapshot of every task a
//! FreeRTOS-class kernel knows about, by walking the kernel's live
//! scheduling lists through the probe's memory interface and the firmware
//! image's symbol/type information. The result is one ordered table of
//! task rows plus a matching header.

pub mod breakpoint;
pub mod current;
pub mod error;
pub mod memory;
pub mod registry;
pub mod schema;
pub mod snapshot;
pub mod symbols;
pub mod walker;


// Re-export commonly used types
pub use breakpoint::TaskBreakpoint;
pub use error::SnapshotError;
pub use registry::{ListSource, TaskState, TASK_LISTS};
pub use schema::{AttrKind, AttrValue, AttributeSpec, TASK_ATTRIBUTES};
pub use snapshot::{build_snapshot, Snapshot, TaskRecord, TaskTable};
pub use symbols::{KernelLayout, MemberLayout, StructLayout, SymbolEntry, TargetMap};
