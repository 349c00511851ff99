//! Target image handling: symbol addresses and kernel type layouts.
//!
//! The snapshot builder never guesses where a kernel structure member
//! lives. A [`TargetMap`] is built once per firmware image from the ELF
//! symbol table and the DWARF type information, and every later read is
//! resolved against it. When the image carries no usable DWARF the
//! well-known 32-bit Cortex-M offsets are assumed instead.

use crate::error::SnapshotError;
use gimli::RunTimeEndian;
use object::{Object, ObjectSection, ObjectSymbol};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

type Slice<'a> = gimli::EndianSlice<'a, RunTimeEndian>;

/// DWARF struct names of the kernel types we need, with display names.
const KERNEL_TYPES: [(&str, &str); 4] = [
    ("xLIST", "List_t"),
    ("xMINI_LIST_ITEM", "MiniListItem_t"),
    ("xLIST_ITEM", "ListItem_t"),
    ("tskTaskControlBlock", "TCB_t"),
];

/// One entry of the ELF symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Load address of the symbol.
    pub address: u64,
    /// Size in bytes, 0 when the image does not record one.
    pub size: u64,
}

/// Offset and size of one structure member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLayout {
    /// Byte offset from the start of the record.
    pub offset: u64,
    /// Size of the member in bytes.
    pub size: u64,
}

/// Byte layout of one kernel record type.
#[derive(Debug, Clone)]
pub struct StructLayout {
    /// Display name used in diagnostics, e.g. `TCB_t`.
    pub name: &'static str,
    /// Total size of the record in bytes.
    pub size: u64,
    members: HashMap<String, MemberLayout>,
}

impl StructLayout {
    /// Build a layout from an explicit member table.
    pub fn with_members(name: &'static str, size: u64, members: &[(&str, u64, u64)]) -> Self {
        let members = members
            .iter()
            .map(|&(member, offset, size)| (member.to_string(), MemberLayout { offset, size }))
            .collect();
        Self { name, size, members }
    }

    /// Layout of the named member, if this build has it.
    pub fn member(&self, name: &str) -> Option<MemberLayout> {
        self.members.get(name).copied()
    }

    /// Whether this build's record carries the named member.
    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Layout of the named member, failing with the record name attached.
    pub fn require(&self, name: &str) -> Result<MemberLayout, SnapshotError> {
        self.member(name).ok_or_else(|| SnapshotError::MissingMember {
            record: self.name.to_string(),
            member: name.to_string(),
        })
    }
}

/// Layouts of every kernel type the snapshot builder touches.
#[derive(Debug, Clone)]
pub struct KernelLayout {
    /// Pointer width of the target in bytes.
    pub pointer_width: u64,
    /// The kernel list header, `List_t`.
    pub list: StructLayout,
    /// The sentinel node embedded in every list, `MiniListItem_t`.
    pub mini_item: StructLayout,
    /// A full list node, `ListItem_t`.
    pub item: StructLayout,
    /// The per-task control block, `TCB_t`.
    pub tcb: StructLayout,
}

impl KernelLayout {
    /// The default 32-bit Cortex-M layout.
    ///
    /// Matches a stock kernel build with none of the optional TCB members
    /// enabled. Used when the image carries no DWARF type information.
    pub fn cortex_m() -> Self {
        Self {
            pointer_width: 4,
            list: StructLayout::with_members(
                "List_t",
                20,
                &[("uxNumberOfItems", 0, 4), ("pxIndex", 4, 4), ("xListEnd", 8, 12)],
            ),
            mini_item: StructLayout::with_members(
                "MiniListItem_t",
                12,
                &[("xItemValue", 0, 4), ("pxNext", 4, 4), ("pxPrevious", 8, 4)],
            ),
            item: StructLayout::with_members(
                "ListItem_t",
                20,
                &[
                    ("xItemValue", 0, 4),
                    ("pxNext", 4, 4),
                    ("pxPrevious", 8, 4),
                    ("pvOwner", 12, 4),
                    ("pvContainer", 16, 4),
                ],
            ),
            tcb: StructLayout::with_members(
                "TCB_t",
                68,
                &[
                    ("pxTopOfStack", 0, 4),
                    ("uxPriority", 44, 4),
                    ("pxStack", 48, 4),
                    ("pcTaskName", 52, 16),
                ],
            ),
        }
    }
}

/// Everything the snapshot builder knows about one firmware image.
pub struct TargetMap {
    symbols: HashMap<String, SymbolEntry>,
    /// Kernel record layouts for this build.
    pub layout: KernelLayout,
    configs: HashMap<String, bool>,
}

impl TargetMap {
    /// Load symbols and kernel type layouts from a firmware ELF.
    pub fn from_elf(path: &Path) -> Result<Self, SnapshotError> {
        let data = std::fs::read(path)?;
        let obj = object::File::parse(&*data)?;

        let mut symbols = HashMap::new();
        for symbol in obj.symbols() {
            if let Ok(name) = symbol.name() {
                if !name.is_empty() {
                    symbols.insert(
                        name.to_string(),
                        SymbolEntry { address: symbol.address(), size: symbol.size() },
                    );
                }
            }
        }

        let pointer_width = if obj.is_64() { 8 } else { 4 };
        let layout = match load_layout(&obj, pointer_width) {
            Some(layout) => layout,
            None => {
                log::warn!(
                    "no usable kernel type info in {}, assuming Cortex-M layout",
                    path.display()
                );
                KernelLayout::cortex_m()
            }
        };

        let configs = derive_configs(&layout);
        log::info!("loaded {} symbols from {}", symbols.len(), path.display());

        Ok(Self { symbols, layout, configs })
    }

    /// Assemble a map from explicit tables, for stripped images.
    pub fn from_parts(
        symbols: HashMap<String, SymbolEntry>,
        layout: KernelLayout,
        configs: HashMap<String, bool>,
    ) -> Self {
        Self { symbols, layout, configs }
    }

    /// Look up a process-wide symbol.
    pub fn symbol(&self, name: &str) -> Option<SymbolEntry> {
        self.symbols.get(name).copied()
    }

    /// Look up a symbol the snapshot cannot proceed without.
    pub fn require_symbol(&self, name: &str) -> Result<SymbolEntry, SnapshotError> {
        self.symbol(name).ok_or_else(|| SnapshotError::MissingSymbol(name.to_string()))
    }

    /// Evaluate a build-configuration guard against this image.
    pub fn config_enabled(&self, name: &str) -> bool {
        self.configs.get(name).copied().unwrap_or(false)
    }

    /// Whether the image looks like it contains the kernel's scheduler.
    pub fn has_scheduler_symbols(&self) -> bool {
        self.symbols.contains_key("pxReadyTasksLists")
    }
}

/// Derive config guard values from the shape of the TCB record.
///
/// Config macros are preprocessor-only and do not survive into DWARF, but
/// each one that matters here gates a TCB member in or out of existence.
fn derive_configs(layout: &KernelLayout) -> HashMap<String, bool> {
    let mut configs = HashMap::new();
    for spec in &crate::schema::TASK_ATTRIBUTES {
        if let Some(guard) = spec.guard {
            configs.insert(guard.to_string(), layout.tcb.has_member(spec.member));
        }
    }
    configs
}

/// Walk `.debug_info` for the kernel struct layouts.
///
/// Returns `None` when any of the four types is missing, in which case the
/// caller falls back to the Cortex-M defaults wholesale; mixing the two
/// would produce offsets from different builds.
fn load_layout(obj: &object::File, pointer_width: u64) -> Option<KernelLayout> {
    let endian = if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    let info_data = obj.section_by_name(".debug_info")?.uncompressed_data().ok()?;
    let abbrev_data = obj.section_by_name(".debug_abbrev")?.uncompressed_data().ok()?;
    let str_data = obj
        .section_by_name(".debug_str")
        .and_then(|s| s.uncompressed_data().ok())
        .unwrap_or(Cow::Borrowed(&[]));

    let debug_info = gimli::DebugInfo::new(&info_data, endian);
    let debug_abbrev = gimli::DebugAbbrev::new(&abbrev_data, endian);
    let debug_str = gimli::DebugStr::new(&str_data, endian);

    let mut found: HashMap<&'static str, StructLayout> = HashMap::new();

    let mut units = debug_info.units();
    while let Ok(Some(header)) = units.next() {
        let Ok(abbrev) = header.abbreviations(&debug_abbrev) else { continue };
        let _ = scan_unit(&header, &abbrev, &debug_str, pointer_width, &mut found);
        if found.len() == KERNEL_TYPES.len() {
            break;
        }
    }

    Some(KernelLayout {
        pointer_width,
        list: found.remove("List_t")?,
        mini_item: found.remove("MiniListItem_t")?,
        item: found.remove("ListItem_t")?,
        tcb: found.remove("TCB_t")?,
    })
}

fn scan_unit<'a>(
    header: &gimli::UnitHeader<Slice<'a>>,
    abbrev: &gimli::Abbreviations,
    debug_str: &gimli::DebugStr<Slice<'a>>,
    pointer_width: u64,
    found: &mut HashMap<&'static str, StructLayout>,
) -> gimli::Result<()> {
    let mut tree = header.entries_tree(abbrev, None)?;
    let root = tree.root()?;
    let mut children = root.children();

    while let Some(node) = children.next()? {
        if node.entry().tag() != gimli::DW_TAG_structure_type {
            continue;
        }
        let Some(name) = entry_name(node.entry(), debug_str)? else { continue };
        let Some(&(_, display)) = KERNEL_TYPES.iter().find(|&&(dwarf, _)| dwarf == name) else {
            continue;
        };
        if found.contains_key(display) {
            continue;
        }
        let layout = parse_struct(node, display, header, abbrev, debug_str, pointer_width)?;
        found.insert(display, layout);
    }

    Ok(())
}

fn parse_struct<'a>(
    node: gimli::EntriesTreeNode<'_, '_, '_, Slice<'a>>,
    display: &'static str,
    header: &gimli::UnitHeader<Slice<'a>>,
    abbrev: &gimli::Abbreviations,
    debug_str: &gimli::DebugStr<Slice<'a>>,
    pointer_width: u64,
) -> gimli::Result<StructLayout> {
    let size = node
        .entry()
        .attr_value(gimli::DW_AT_byte_size)?
        .and_then(|v| v.udata_value())
        .unwrap_or(0);

    // Collect the raw member rows first; resolving member sizes opens
    // fresh subtrees and cannot happen while this one is borrowed.
    let mut raw: Vec<(String, u64, Option<gimli::UnitOffset<usize>>)> = Vec::new();
    let mut children = node.children();
    while let Some(child) = children.next()? {
        let entry = child.entry();
        if entry.tag() != gimli::DW_TAG_member {
            continue;
        }
        let Some(name) = entry_name(entry, debug_str)? else { continue };
        let Some(offset) = entry
            .attr_value(gimli::DW_AT_data_member_location)?
            .and_then(|v| v.udata_value())
        else {
            continue;
        };
        let type_ref = match entry.attr_value(gimli::DW_AT_type)? {
            Some(gimli::AttributeValue::UnitRef(r)) => Some(r),
            _ => None,
        };
        raw.push((name, offset, type_ref));
    }

    let mut members = HashMap::new();
    for (name, offset, type_ref) in raw {
        let size = match type_ref {
            Some(r) => type_size(header, abbrev, r, pointer_width, 0)?,
            None => pointer_width,
        };
        members.insert(name, MemberLayout { offset, size });
    }

    Ok(StructLayout { name: display, size, members })
}

/// Size in bytes of the type at `offset`, following typedef/qualifier
/// chains and sizing arrays from their subrange.
fn type_size<'a>(
    header: &gimli::UnitHeader<Slice<'a>>,
    abbrev: &gimli::Abbreviations,
    offset: gimli::UnitOffset<usize>,
    pointer_width: u64,
    depth: u8,
) -> gimli::Result<u64> {
    if depth > 8 {
        return Ok(pointer_width);
    }

    let mut tree = header.entries_tree(abbrev, Some(offset))?;
    let root = tree.root()?;
    let tag = root.entry().tag();
    let byte_size = root.entry().attr_value(gimli::DW_AT_byte_size)?.and_then(|v| v.udata_value());
    let type_ref = match root.entry().attr_value(gimli::DW_AT_type)? {
        Some(gimli::AttributeValue::UnitRef(r)) => Some(r),
        _ => None,
    };

    if let Some(size) = byte_size {
        return Ok(size);
    }
    if tag == gimli::DW_TAG_pointer_type {
        return Ok(pointer_width);
    }
    if tag == gimli::DW_TAG_array_type {
        let element = match type_ref {
            Some(r) => type_size(header, abbrev, r, pointer_width, depth + 1)?,
            None => 1,
        };
        let mut count = 1u64;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_subrange_type {
                continue;
            }
            if let Some(c) = entry.attr_value(gimli::DW_AT_count)?.and_then(|v| v.udata_value()) {
                count = c;
            } else if let Some(u) =
                entry.attr_value(gimli::DW_AT_upper_bound)?.and_then(|v| v.udata_value())
            {
                count = u + 1;
            }
            break;
        }
        return Ok(element.saturating_mul(count));
    }

    match type_ref {
        Some(r) => type_size(header, abbrev, r, pointer_width, depth + 1),
        None => Ok(pointer_width),
    }
}

fn entry_name<'a>(
    entry: &gimli::DebuggingInformationEntry<'_, '_, Slice<'a>>,
    debug_str: &gimli::DebugStr<Slice<'a>>,
) -> gimli::Result<Option<String>> {
    match entry.attr_value(gimli::DW_AT_name)? {
        Some(gimli::AttributeValue::String(s)) => Ok(Some(String::from_utf8_lossy(&s).into_owned())),
        Some(gimli::AttributeValue::DebugStrRef(offset)) => match debug_str.get_str(offset) {
            Ok(s) => Ok(Some(String::from_utf8_lossy(&s).into_owned())),
            Err(_) => Ok(None),
        },
        _ => Ok(None),
    }
}
