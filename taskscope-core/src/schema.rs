//! The build-configuration-gated catalog of per-task attributes.
//!
//! The kernel's task record changes shape with the build configuration: a
//! disabled option removes its member from the record entirely. Each
//! attribute therefore carries an optional guard that must hold for the
//! current image before the member is read — or shown — at all.

use crate::error::SnapshotError;
use crate::memory;
use crate::symbols::TargetMap;
use probe_rs::MemoryInterface;
use serde::Serialize;
use std::fmt;

/// Longest task name we will pull out of an unsized character buffer.
const NAME_CAP: u64 = 64;

/// How an attribute's bytes are decoded for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Unsigned integer, member-sized.
    Int,
    /// Pointer shown as a hex address.
    Hex,
    /// NUL-terminated string in a fixed buffer.
    Str,
}

/// One column of the task report.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    /// Column header.
    pub name: &'static str,
    /// Member of the task record to read.
    pub member: &'static str,
    /// Decode kind.
    pub kind: AttrKind,
    /// Build-configuration guard, if the member is optional.
    pub guard: Option<&'static str>,
}

/// Every task attribute, in declared column order.
pub const TASK_ATTRIBUTES: [AttributeSpec; 8] = [
    AttributeSpec { name: "PRIORITY", member: "uxPriority", kind: AttrKind::Int, guard: None },
    AttributeSpec { name: "STACK", member: "pxStack", kind: AttrKind::Hex, guard: None },
    AttributeSpec { name: "NAME", member: "pcTaskName", kind: AttrKind::Str, guard: None },
    AttributeSpec {
        name: "STACK_END",
        member: "pxEndOfStack",
        kind: AttrKind::Hex,
        guard: Some("configRECORD_STACK_HIGH_ADDRESS"),
    },
    AttributeSpec {
        name: "CRITICAL_NESTING",
        member: "uxCriticalNesting",
        kind: AttrKind::Int,
        guard: Some("portCRITICAL_NESTING_IN_TCB"),
    },
    AttributeSpec {
        name: "TCB_NUM",
        member: "uxTCBNumber",
        kind: AttrKind::Int,
        guard: Some("configUSE_TRACE_FACILITY"),
    },
    AttributeSpec {
        name: "MUTEXES",
        member: "uxMutexesHeld",
        kind: AttrKind::Int,
        guard: Some("configUSE_MUTEXES"),
    },
    AttributeSpec {
        name: "RUN_TIME",
        member: "ulRunTimeCounter",
        kind: AttrKind::Int,
        guard: Some("configGENERATE_RUN_TIME_STATS"),
    },
];

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Plain integer.
    Int(u64),
    /// Address, rendered in hex.
    Hex(u64),
    /// Task-name style string.
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Hex(v) => write!(f, "{v:#x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl AttributeSpec {
    /// Whether this image's build configuration includes the attribute.
    pub fn enabled(&self, map: &TargetMap) -> bool {
        match self.guard {
            None => true,
            Some(guard) => map.config_enabled(guard),
        }
    }

    /// Read and decode this attribute from the task record at `tcb`.
    ///
    /// Must only be called for specs whose guard holds; a guarded-out
    /// member does not exist in the record and fails as missing.
    pub fn extract(
        &self,
        mem: &mut dyn MemoryInterface,
        map: &TargetMap,
        tcb: u64,
    ) -> Result<AttrValue, SnapshotError> {
        let member = map.layout.tcb.require(self.member)?;
        let address = tcb + member.offset;
        match self.kind {
            AttrKind::Int => {
                Ok(AttrValue::Int(memory::read_uint(mem, address, member.size, self.member)?))
            }
            AttrKind::Hex => Ok(AttrValue::Hex(memory::read_ptr(
                mem,
                address,
                map.layout.pointer_width,
                self.member,
            )?)),
            AttrKind::Str => {
                let cap = member.size.clamp(1, NAME_CAP);
                Ok(AttrValue::Str(memory::read_cstring(mem, address, cap, self.member)?))
            }
        }
    }
}

/// The attributes enabled under the image's build configuration, in
/// declared order.
pub fn enabled_fields(map: &TargetMap) -> Vec<&'static AttributeSpec> {
    TASK_ATTRIBUTES.iter().filter(|spec| spec.enabled(map)).collect()
}

/// Read a task's name straight from its record.
pub fn task_name(
    mem: &mut dyn MemoryInterface,
    map: &TargetMap,
    tcb: u64,
) -> Result<String, SnapshotError> {
    let member = map.layout.tcb.require("pcTaskName")?;
    memory::read_cstring(mem, tcb + member.offset, member.size.clamp(1, NAME_CAP), "pcTaskName")
}
