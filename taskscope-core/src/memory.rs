//! Typed read helpers over the probe's memory interface.
//!
//! Every access to kernel memory goes through these so that a failure
//! names the symbol or member that was being read.

use crate::error::SnapshotError;
use probe_rs::MemoryInterface;

/// Read an unsigned integer of the given byte width.
///
/// Kernel integer members are word sized on most ports; widths other than
/// 1/2/8 are read as 32-bit.
pub fn read_uint(
    mem: &mut dyn MemoryInterface,
    address: u64,
    width: u64,
    what: &str,
) -> Result<u64, SnapshotError> {
    let value = match width {
        1 => mem.read_word_8(address).map(u64::from),
        2 => mem.read_word_16(address).map(u64::from),
        8 => mem.read_word_64(address),
        _ => mem.read_word_32(address).map(u64::from),
    };
    value.map_err(|e| SnapshotError::read(what, e))
}

/// Read a pointer-sized value.
pub fn read_ptr(
    mem: &mut dyn MemoryInterface,
    address: u64,
    pointer_width: u64,
    what: &str,
) -> Result<u64, SnapshotError> {
    read_uint(mem, address, pointer_width, what)
}

/// Read a NUL-terminated string out of a fixed-size character buffer.
///
/// Reads at most `cap` bytes and truncates at the first NUL. Non-UTF-8
/// bytes are replaced rather than rejected; task names come from foreign
/// memory and are display-only.
pub fn read_cstring(
    mem: &mut dyn MemoryInterface,
    address: u64,
    cap: u64,
    what: &str,
) -> Result<String, SnapshotError> {
    let mut buf = vec![0u8; cap as usize];
    mem.read_8(address, &mut buf)
        .map_err(|e| SnapshotError::read(what, e))?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}
