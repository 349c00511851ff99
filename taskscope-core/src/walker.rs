//! Intrusive list traversal.
//!
//! Kernel lists are circular and doubly linked, closed by a sentinel node
//! embedded in the list header. Nothing read from the target is trusted:
//! traversal is bounded by both the declared item count and the sentinel
//! address, so a corrupted count cannot walk past a consistent end marker
//! and a corrupted end marker cannot walk forever under a sane count.

use crate::error::SnapshotError;
use crate::memory;
use crate::symbols::TargetMap;
use probe_rs::MemoryInterface;

/// Snapshot of one kernel list header, read at a single point in time.
#[derive(Debug, Clone, Copy)]
pub struct ListRegion {
    /// Address of the `List_t` itself.
    pub base: u64,
    /// Declared item count at read time.
    pub len: u64,
    /// Address of the embedded sentinel node.
    pub sentinel: u64,
    /// The sentinel's next pointer, i.e. the first real node.
    pub head: u64,
}

impl ListRegion {
    /// Read the list header at `base`.
    pub fn read(
        mem: &mut dyn MemoryInterface,
        map: &TargetMap,
        base: u64,
    ) -> Result<Self, SnapshotError> {
        let layout = &map.layout;
        let count = layout.list.require("uxNumberOfItems")?;
        let len = memory::read_uint(mem, base + count.offset, count.size, "uxNumberOfItems")?;

        let sentinel = base + layout.list.require("xListEnd")?.offset;
        let next = layout.mini_item.require("pxNext")?;
        let head = memory::read_ptr(
            mem,
            sentinel + next.offset,
            layout.pointer_width,
            "xListEnd.pxNext",
        )?;

        Ok(Self { base, len, sentinel, head })
    }

    /// Start a walk over this list's owner records.
    pub fn walk<'m>(
        &self,
        mem: &'m mut dyn MemoryInterface,
        map: &TargetMap,
    ) -> Result<ListWalker<'m>, SnapshotError> {
        let layout = &map.layout;
        Ok(ListWalker {
            mem,
            sentinel: self.sentinel,
            cursor: self.head,
            remaining: self.len,
            next_offset: layout.item.require("pxNext")?.offset,
            owner_offset: layout.item.require("pvOwner")?.offset,
            pointer_width: layout.pointer_width,
            failed: false,
        })
    }
}

/// Lazy, finite, non-restartable walk over one kernel list.
///
/// Yields the address of each node's owner record, head to tail. A node
/// with a null owner is reported once through the log and skipped; a read
/// failure ends the walk with the error it hit.
pub struct ListWalker<'m> {
    mem: &'m mut dyn MemoryInterface,
    sentinel: u64,
    cursor: u64,
    remaining: u64,
    next_offset: u64,
    owner_offset: u64,
    pointer_width: u64,
    failed: bool,
}

impl Iterator for ListWalker<'_> {
    type Item = Result<u64, SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.remaining == 0 || self.cursor == self.sentinel {
                return None;
            }
            if self.cursor == 0 {
                log::warn!("list node pointer is null before the sentinel, stopping walk");
                return None;
            }
            self.remaining -= 1;

            let node = self.cursor;
            let owner = match memory::read_ptr(
                self.mem,
                node + self.owner_offset,
                self.pointer_width,
                "pvOwner",
            ) {
                Ok(v) => v,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            self.cursor = match memory::read_ptr(
                self.mem,
                node + self.next_offset,
                self.pointer_width,
                "pxNext",
            ) {
                Ok(v) => v,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            if owner == 0 {
                log::warn!("task owner pointer at {node:#010x} is null, stack corruption?");
                continue;
            }
            return Some(Ok(owner));
        }
    }
}
