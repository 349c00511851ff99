//! Fake kernel images in mock memory for integration tests.

use probe_rs::MemoryInterface;
use std::collections::HashMap;
use taskscope_core::{KernelLayout, StructLayout, SymbolEntry, TargetMap};

/// Byte-addressed fake target memory. Unset addresses read as zero.
pub struct MockMemory {
    data: HashMap<u64, u8>,
    fail_at: Option<u64>,
}

impl MockMemory {
    pub fn new() -> Self {
        Self { data: HashMap::new(), fail_at: None }
    }

    /// Make any read touching `address` fail.
    pub fn fail_at(&mut self, address: u64) {
        self.fail_at = Some(address);
    }

    pub fn set_word_32(&mut self, addr: u64, val: u32) {
        for (i, byte) in val.to_le_bytes().iter().enumerate() {
            self.data.insert(addr + i as u64, *byte);
        }
    }

    pub fn set_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.data.insert(addr + i as u64, byte);
        }
    }

    fn check(&self, address: u64, len: u64) -> Result<(), probe_rs::Error> {
        if let Some(fail) = self.fail_at {
            if address <= fail && fail < address + len {
                return Err(probe_rs::Error::Timeout);
            }
        }
        Ok(())
    }
}

impl MemoryInterface for MockMemory {
    fn read_word_8(&mut self, address: u64) -> Result<u8, probe_rs::Error> {
        let mut b = [0u8; 1];
        self.read_8(address, &mut b)?;
        Ok(b[0])
    }
    fn read_word_16(&mut self, address: u64) -> Result<u16, probe_rs::Error> {
        let mut b = [0u8; 2];
        self.read_8(address, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }
    fn read_word_32(&mut self, address: u64) -> Result<u32, probe_rs::Error> {
        let mut b = [0u8; 4];
        self.read_8(address, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }
    fn read_word_64(&mut self, address: u64) -> Result<u64, probe_rs::Error> {
        let mut b = [0u8; 8];
        self.read_8(address, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }
    fn write_word_8(&mut self, address: u64, data: u8) -> Result<(), probe_rs::Error> {
        self.write_8(address, &[data])
    }
    fn write_word_16(&mut self, address: u64, data: u16) -> Result<(), probe_rs::Error> {
        self.write_8(address, &data.to_le_bytes())
    }
    fn write_word_32(&mut self, address: u64, data: u32) -> Result<(), probe_rs::Error> {
        self.write_8(address, &data.to_le_bytes())
    }
    fn write_word_64(&mut self, address: u64, data: u64) -> Result<(), probe_rs::Error> {
        self.write_8(address, &data.to_le_bytes())
    }
    fn read_8(&mut self, address: u64, data: &mut [u8]) -> Result<(), probe_rs::Error> {
        self.check(address, data.len() as u64)?;
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = *self.data.get(&(address + i as u64)).unwrap_or(&0);
        }
        Ok(())
    }
    fn write_8(&mut self, address: u64, data: &[u8]) -> Result<(), probe_rs::Error> {
        for (i, &byte) in data.iter().enumerate() {
            self.data.insert(address + i as u64, byte);
        }
        Ok(())
    }
    fn read_16(&mut self, address: u64, data: &mut [u16]) -> Result<(), probe_rs::Error> {
        for (i, word) in data.iter_mut().enumerate() {
            *word = self.read_word_16(address + (i * 2) as u64)?;
        }
        Ok(())
    }
    fn write_16(&mut self, address: u64, data: &[u16]) -> Result<(), probe_rs::Error> {
        for (i, &word) in data.iter().enumerate() {
            self.write_word_16(address + (i * 2) as u64, word)?;
        }
        Ok(())
    }
    fn read_32(&mut self, address: u64, data: &mut [u32]) -> Result<(), probe_rs::Error> {
        for (i, word) in data.iter_mut().enumerate() {
            *word = self.read_word_32(address + (i * 4) as u64)?;
        }
        Ok(())
    }
    fn write_32(&mut self, address: u64, data: &[u32]) -> Result<(), probe_rs::Error> {
        for (i, &word) in data.iter().enumerate() {
            self.write_word_32(address + (i * 4) as u64, word)?;
        }
        Ok(())
    }
    fn read_64(&mut self, address: u64, data: &mut [u64]) -> Result<(), probe_rs::Error> {
        for (i, word) in data.iter_mut().enumerate() {
            *word = self.read_word_64(address + (i * 8) as u64)?;
        }
        Ok(())
    }
    fn write_64(&mut self, address: u64, data: &[u64]) -> Result<(), probe_rs::Error> {
        for (i, &word) in data.iter().enumerate() {
            self.write_word_64(address + (i * 8) as u64, word)?;
        }
        Ok(())
    }
    fn flush(&mut self) -> Result<(), probe_rs::Error> {
        Ok(())
    }
    fn supports_native_64bit_access(&mut self) -> bool {
        false
    }
    fn supports_8bit_transfers(&self) -> Result<bool, probe_rs::Error> {
        Ok(true)
    }
}

pub const TASK_COUNT_ADDR: u64 = 0x2000_0080;
pub const CURRENT_TCB_ADDR: u64 = 0x2000_0100;
pub const READY_LISTS_ADDR: u64 = 0x2000_1000;
pub const SUSPENDED_ADDR: u64 = 0x2000_2000;
pub const DELAYED_1_ADDR: u64 = 0x2000_3000;
pub const DELAYED_2_ADDR: u64 = 0x2000_4000;
pub const TERMINATION_ADDR: u64 = 0x2000_5000;

const LIST_SIZE: u64 = 20;
const SENTINEL_OFFSET: u64 = 8;

/// A complete fake firmware image: mock memory plus the tables a
/// `TargetMap` is made of.
///
/// A fresh image has the full set of kernel symbols, every list empty and
/// no tasks created; tests overwrite the pieces they care about.
pub struct KernelImage {
    pub mem: MockMemory,
    symbols: HashMap<String, SymbolEntry>,
    configs: HashMap<String, bool>,
    layout: KernelLayout,
}

impl KernelImage {
    pub fn new() -> Self {
        let mut image = Self {
            mem: MockMemory::new(),
            symbols: HashMap::new(),
            configs: HashMap::new(),
            layout: KernelLayout::cortex_m(),
        };
        image.task_count(0);
        image.current(&[0]);
        image.ready_lists(&[&[]]);
        image.list("xSuspendedTaskList", SUSPENDED_ADDR, &[]);
        image.list("xDelayedTaskList1", DELAYED_1_ADDR, &[]);
        image.list("xDelayedTaskList2", DELAYED_2_ADDR, &[]);
        image.list("xTasksWaitingTermination", TERMINATION_ADDR, &[]);
        image
    }

    pub fn map(&self) -> TargetMap {
        TargetMap::from_parts(self.symbols.clone(), self.layout.clone(), self.configs.clone())
    }

    pub fn task_count(&mut self, n: u32) {
        self.symbols.insert(
            "uxCurrentNumberOfTasks".to_string(),
            SymbolEntry { address: TASK_COUNT_ADDR, size: 4 },
        );
        self.mem.set_word_32(TASK_COUNT_ADDR, n);
    }

    pub fn drop_symbol(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    /// One current-task slot per core.
    pub fn current(&mut self, handles: &[u64]) {
        self.symbols.insert(
            "pxCurrentTCB".to_string(),
            SymbolEntry { address: CURRENT_TCB_ADDR, size: 4 * handles.len() as u64 },
        );
        for (i, &handle) in handles.iter().enumerate() {
            self.mem.set_word_32(CURRENT_TCB_ADDR + 4 * i as u64, handle as u32);
        }
    }

    pub fn config(&mut self, name: &str, enabled: bool) {
        self.configs.insert(name.to_string(), enabled);
    }

    /// Swap in a TCB layout carrying every optional member.
    pub fn extended_tcb(&mut self) {
        self.layout.tcb = StructLayout::with_members(
            "TCB_t",
            96,
            &[
                ("pxTopOfStack", 0, 4),
                ("uxPriority", 44, 4),
                ("pxStack", 48, 4),
                ("pcTaskName", 52, 16),
                ("pxEndOfStack", 68, 4),
                ("uxCriticalNesting", 72, 4),
                ("uxTCBNumber", 76, 4),
                ("uxMutexesHeld", 80, 4),
                ("ulRunTimeCounter", 84, 4),
            ],
        );
    }

    /// Write a task record. The address doubles as the task handle.
    pub fn tcb(&mut self, addr: u64, name: &str, priority: u32, stack: u32) {
        self.mem.set_word_32(addr + 44, priority);
        self.mem.set_word_32(addr + 48, stack);
        let mut buf = [0u8; 16];
        let n = name.len().min(15);
        buf[..n].copy_from_slice(&name.as_bytes()[..n]);
        self.mem.set_bytes(addr + 52, &buf);
    }

    /// Lay out one circular list with the given owner records.
    pub fn list(&mut self, symbol: &str, base: u64, owners: &[u64]) {
        self.symbols
            .insert(symbol.to_string(), SymbolEntry { address: base, size: LIST_SIZE });
        self.write_list(base, owners, base + 0x100);
    }

    /// Lay out the ready-list array, one list per priority level.
    pub fn ready_lists(&mut self, priorities: &[&[u64]]) {
        self.symbols.insert(
            "pxReadyTasksLists".to_string(),
            SymbolEntry { address: READY_LISTS_ADDR, size: LIST_SIZE * priorities.len() as u64 },
        );
        for (i, owners) in priorities.iter().enumerate() {
            let base = READY_LISTS_ADDR + LIST_SIZE * i as u64;
            let nodes = READY_LISTS_ADDR + 0x400 + 0x100 * i as u64;
            self.write_list(base, owners, nodes);
        }
    }

    fn write_list(&mut self, base: u64, owners: &[u64], node_area: u64) {
        let sentinel = base + SENTINEL_OFFSET;
        let node = |i: usize| node_area + 0x20 * i as u64;

        self.mem.set_word_32(base, owners.len() as u32);
        self.mem.set_word_32(base + 4, sentinel as u32);
        self.mem.set_word_32(sentinel, 0xFFFF_FFFF);
        let first = if owners.is_empty() { sentinel } else { node(0) };
        let last = if owners.is_empty() { sentinel } else { node(owners.len() - 1) };
        self.mem.set_word_32(sentinel + 4, first as u32);
        self.mem.set_word_32(sentinel + 8, last as u32);

        for (i, &owner) in owners.iter().enumerate() {
            let addr = node(i);
            let next = if i + 1 == owners.len() { sentinel } else { node(i + 1) };
            let prev = if i == 0 { sentinel } else { node(i - 1) };
            self.mem.set_word_32(addr, 0);
            self.mem.set_word_32(addr + 4, next as u32);
            self.mem.set_word_32(addr + 8, prev as u32);
            self.mem.set_word_32(addr + 12, owner as u32);
            self.mem.set_word_32(addr + 16, base as u32);
        }
    }
}
