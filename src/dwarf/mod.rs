//! DWARF-to-typed-layout extractor (spec §4.A).
//!
//! Grounded in `a2ltool`'s `src/dwarf/mod.rs` / `attributes.rs` /
//! `typereader.rs`: the same `gimli` + `object` + `memmap2` stack opens and
//! walks an ELF's DWARF data. Where the teacher extracts global *variables*
//! and their types for an A2L file, this walks the same DIE tree to extract
//! **named struct/union/typedef/enum types** directly — a Frame is selected
//! by type name, not by the address of a global variable, so no variable
//! table is built at all.

mod attributes;

use crate::error::{GenError, Result};
use crate::types::{Aggregate, ArrayType, BaseIntWidth, Enumeration, Member, Overlay, TypeDescriptor};
use attributes::{
    get_bit_size_attribute, get_byte_size_attribute, get_const_value_attribute, get_count_attribute,
    get_data_member_location_attribute, get_encoding_attribute, get_legacy_bit_offset_attribute,
    get_name_attribute, get_typeref_attribute, get_upper_bound_attribute,
};
use gimli::{Abbreviations, EndianSlice, EntriesTreeNode, RunTimeEndian, UnitHeader};
use indexmap::IndexMap;
use object::{Object, ObjectSection};
use std::collections::{HashMap, HashSet};
use std::ops::Index;
use std::path::Path;

type SliceType<'a> = EndianSlice<'a, RunTimeEndian>;

/// Output of one extraction run (spec §4.A "Output").
pub struct ExtractedDebugInfo {
    pub types: HashMap<String, TypeDescriptor>,
    pub enums: HashMap<String, Enumeration>,
}

/// Holds every `UnitHeader`/`Abbreviations` pair seen in `.debug_info`, for
/// convenient access by absolute `.debug_info` offset (grounded in
/// `a2ltool`'s `UnitList`).
struct UnitList<'a> {
    list: Vec<(UnitHeader<SliceType<'a>>, Abbreviations)>,
}

impl<'a> UnitList<'a> {
    fn new() -> Self {
        UnitList { list: Vec::new() }
    }

    fn add(&mut self, unit: UnitHeader<SliceType<'a>>, abbrev: Abbreviations) {
        self.list.push((unit, abbrev));
    }

    fn find_unit(&self, offset: usize) -> Option<usize> {
        for (idx, (unit, _)) in self.list.iter().enumerate() {
            let unit_offset = unit.offset().as_debug_info_offset()?.0;
            if unit_offset <= offset && offset < unit_offset + unit.length_including_self() {
                return Some(idx);
            }
        }
        None
    }
}

impl<'a> Index<usize> for UnitList<'a> {
    type Output = (UnitHeader<SliceType<'a>>, Abbreviations);

    fn index(&self, idx: usize) -> &Self::Output {
        &self.list[idx]
    }
}

/// Immutable per-call context: the parsed DWARF sections plus the unit
/// index. Kept apart from the mutable `Tables` below purely so that
/// borrowing an `EntriesTree` out of `ctx` never conflicts with mutably
/// borrowing the caches while recursing (the self-referential-borrow
/// problem `a2ltool` sidesteps the same way by passing `&UnitList` as a
/// plain parameter instead of bundling it with mutable state).
struct Ctx<'data> {
    dwarf: gimli::Dwarf<SliceType<'data>>,
    units: UnitList<'data>,
}

/// Mutable extraction state (spec §5: "caches ... belong to that call's
/// scope"). Lives exactly as long as one `parse_dwarf_from_elf` call.
#[derive(Default)]
struct Tables {
    /// DIE-offset-keyed cache terminating recursion through type references
    /// and deduplicating shared types (spec §4.A step 5).
    resolved: HashMap<usize, TypeDescriptor>,
    /// Tags already reported via `tracing::warn!`, so each unsupported tag
    /// is logged only once per run (spec §4.A "Failure modes").
    warned_tags: HashSet<gimli::DwTag>,
    types: HashMap<String, TypeDescriptor>,
    offset_to_name: HashMap<usize, String>,
    enums: HashMap<String, Enumeration>,
}

/// Extract the named type/enum tables from an ELF image (spec §4.A).
pub fn parse_dwarf_from_elf(path: &Path) -> Result<ExtractedDebugInfo> {
    let filedata = load_filedata(path)?;
    let elffile = load_elf_file(path, &filedata)?;

    let has_debug_info = elffile
        .section_by_name(".debug_info")
        .map(|section| section.size() > 0)
        .unwrap_or(false);
    if !has_debug_info {
        return Err(GenError::NoDebugInfo(path.to_path_buf()));
    }

    let dwarf = load_dwarf(&elffile)?;

    let mut units = UnitList::new();
    let mut candidates: Vec<(usize, usize, gimli::DwTag)> = Vec::new();

    let mut unit_iter = dwarf.debug_info.units();
    while let Ok(Some(unit_header)) = unit_iter.next() {
        let abbrev = unit_header
            .abbreviations(&dwarf.debug_abbrev)
            .map_err(|e| GenError::MalformedDebugInfo(e.to_string()))?;
        units.add(unit_header, abbrev);
        let unit_idx = units.list.len() - 1;
        let (unit, abbrev) = &units[unit_idx];

        let mut cursor = unit.entries(abbrev);
        while let Ok(Some((_depth_delta, entry))) = cursor.next_dfs() {
            let tag = entry.tag();
            if is_candidate_tag(tag) {
                if let Some(offset) = entry.offset().to_debug_info_offset(unit) {
                    candidates.push((unit_idx, offset.0, tag));
                }
            }
        }
    }

    let ctx = Ctx { dwarf, units };
    let mut tables = Tables::default();

    for (unit_idx, offset, tag) in candidates {
        if let Err(err) = process_candidate(&ctx, &mut tables, unit_idx, offset, tag) {
            if tables.warned_tags.insert(tag) {
                tracing::warn!(%tag, %err, "skipping DWARF type that could not be extracted");
            }
        }
    }

    Ok(ExtractedDebugInfo { types: tables.types, enums: tables.enums })
}

fn is_candidate_tag(tag: gimli::DwTag) -> bool {
    matches!(
        tag,
        gimli::constants::DW_TAG_typedef
            | gimli::constants::DW_TAG_structure_type
            | gimli::constants::DW_TAG_union_type
            | gimli::constants::DW_TAG_enumeration_type
    )
}

fn entries_tree<'ctx, 'data>(
    ctx: &'ctx Ctx<'data>,
    unit_idx: usize,
    offset: usize,
) -> Result<gimli::EntriesTree<'ctx, 'ctx, SliceType<'data>>> {
    let (unit, abbrev) = &ctx.units[unit_idx];
    let unit_offset = gimli::DebugInfoOffset(offset)
        .to_unit_offset(unit)
        .ok_or_else(|| GenError::MalformedDebugInfo(format!("offset {offset:#x} is outside its unit")))?;
    unit.entries_tree(abbrev, Some(unit_offset))
        .map_err(|e| GenError::MalformedDebugInfo(e.to_string()))
}

fn process_candidate(
    ctx: &Ctx,
    tables: &mut Tables,
    unit_idx: usize,
    offset: usize,
    tag: gimli::DwTag,
) -> Result<()> {
    let mut tree = entries_tree(ctx, unit_idx, offset)?;
    let node = tree.root().map_err(|e| GenError::MalformedDebugInfo(e.to_string()))?;
    let entry = node.entry();

    if tag == gimli::constants::DW_TAG_enumeration_type {
        let name = get_name_attribute(entry, &ctx.dwarf).unwrap_or_else(|| format!("anon_{offset:x}"));
        let enumeration = extract_enum(ctx, node)?;
        tables.enums.entry(name).or_insert(enumeration);
        return Ok(());
    }

    if tag == gimli::constants::DW_TAG_typedef {
        let (unit, _) = &ctx.units[unit_idx];
        let name = get_name_attribute(entry, &ctx.dwarf)
            .ok_or_else(|| GenError::MalformedDebugInfo(format!("typedef at {offset:#x} has no name")))?;
        let target_offset = get_typeref_attribute(entry, unit)
            .ok_or_else(|| GenError::MalformedDebugInfo(format!("typedef '{name}' has no target type")))?;
        let target_unit = ctx.units.find_unit(target_offset).unwrap_or(unit_idx);
        let descriptor = resolve_descriptor(ctx, tables, target_unit, target_offset)?;
        register_named_type(tables, target_offset, name, descriptor, true);
        return Ok(());
    }

    // structure_type / union_type
    let name = get_name_attribute(entry, &ctx.dwarf).unwrap_or_else(|| format!("anon_{offset:x}"));
    let descriptor = resolve_descriptor(ctx, tables, unit_idx, offset)?;
    register_named_type(tables, offset, name, descriptor, false);
    Ok(())
}

/// Spec §4.A step 4, typedef bullet: if the target DIE was already
/// registered under its synthesized anonymous name, rename that entry to
/// the typedef's name; otherwise add a new entry.
fn register_named_type(tables: &mut Tables, offset: usize, name: String, descriptor: TypeDescriptor, is_typedef: bool) {
    if is_typedef {
        if let Some(existing) = tables.offset_to_name.get(&offset).cloned() {
            if existing.starts_with("anon_") && existing != name {
                tables.types.remove(&existing);
                tables.types.insert(name.clone(), descriptor);
                tables.offset_to_name.insert(offset, name);
                return;
            }
        }
    }
    tables.types.insert(name.clone(), descriptor);
    tables.offset_to_name.entry(offset).or_insert(name);
}

fn resolve_descriptor(ctx: &Ctx, tables: &mut Tables, unit_idx: usize, offset: usize) -> Result<TypeDescriptor> {
    if let Some(cached) = tables.resolved.get(&offset) {
        return Ok(cached.clone());
    }
    let mut tree = entries_tree(ctx, unit_idx, offset)?;
    let node = tree.root().map_err(|e| GenError::MalformedDebugInfo(e.to_string()))?;
    let descriptor = build_descriptor(ctx, tables, unit_idx, node)?;
    tables.resolved.insert(offset, descriptor.clone());
    Ok(descriptor)
}

fn build_descriptor<'data>(
    ctx: &Ctx<'data>,
    tables: &mut Tables,
    unit_idx: usize,
    node: EntriesTreeNode<'_, '_, SliceType<'data>>,
) -> Result<TypeDescriptor> {
    let entry = node.entry();
    match entry.tag() {
        gimli::constants::DW_TAG_base_type => build_base_type(entry),
        gimli::constants::DW_TAG_structure_type | gimli::constants::DW_TAG_class_type => {
            build_struct(ctx, tables, unit_idx, node)
        }
        gimli::constants::DW_TAG_union_type => build_union(ctx, tables, unit_idx, node),
        gimli::constants::DW_TAG_array_type => build_array(ctx, tables, unit_idx, node),
        gimli::constants::DW_TAG_enumeration_type => {
            let byte_size = get_byte_size_attribute(entry).unwrap_or(4);
            let width = BaseIntWidth::from_byte_size(byte_size)
                .ok_or_else(|| GenError::MalformedDebugInfo(format!("enum with unsupported byte_size {byte_size}")))?;
            Ok(TypeDescriptor::BaseInt(width))
        }
        gimli::constants::DW_TAG_typedef
        | gimli::constants::DW_TAG_const_type
        | gimli::constants::DW_TAG_volatile_type => {
            let (unit, _) = &ctx.units[unit_idx];
            let target_offset = get_typeref_attribute(entry, unit)
                .ok_or_else(|| GenError::MalformedDebugInfo("qualifier/typedef with no target type".to_string()))?;
            let target_unit = ctx.units.find_unit(target_offset).unwrap_or(unit_idx);
            resolve_descriptor(ctx, tables, target_unit, target_offset)
        }
        other => Err(GenError::UnknownType(format!("unsupported DWARF tag {other}"))),
    }
}

fn build_base_type(entry: &gimli::DebuggingInformationEntry<SliceType, usize>) -> Result<TypeDescriptor> {
    let byte_size = get_byte_size_attribute(entry).unwrap_or(1);
    let encoding = get_encoding_attribute(entry).unwrap_or(gimli::constants::DW_ATE_unsigned);
    if encoding == gimli::constants::DW_ATE_float {
        return Err(GenError::UnknownType("floating-point base types are unsupported".to_string()));
    }
    if encoding == gimli::constants::DW_ATE_address {
        return Err(GenError::UnknownType("pointer base types are unsupported".to_string()));
    }
    if byte_size == 16 {
        // 16-byte bases (e.g. `__int128`) are represented as a two-element
        // array of u64 limbs; there is no native BaseInt wide enough.
        return Ok(TypeDescriptor::Array(ArrayType {
            element: Box::new(TypeDescriptor::BaseInt(BaseIntWidth::W64)),
            count: 2,
        }));
    }
    let width = BaseIntWidth::from_byte_size(byte_size)
        .ok_or_else(|| GenError::MalformedDebugInfo(format!("base type of unsupported byte_size {byte_size}")))?;
    Ok(TypeDescriptor::BaseInt(width))
}

fn build_struct<'data>(
    ctx: &Ctx<'data>,
    tables: &mut Tables,
    unit_idx: usize,
    mut node: EntriesTreeNode<'_, '_, SliceType<'data>>,
) -> Result<TypeDescriptor> {
    let entry = node.entry();
    let byte_size = get_byte_size_attribute(entry)
        .ok_or_else(|| GenError::MalformedDebugInfo("structure/class missing DW_AT_byte_size".to_string()))?;
    let bit_size: u32 = (byte_size * 8)
        .try_into()
        .map_err(|_| GenError::MalformedDebugInfo("structure size overflows a 32-bit bit count".to_string()))?;

    let mut members = IndexMap::new();
    let mut iter = node.children();
    while let Ok(Some(child)) = iter.next() {
        let child_entry = child.entry();
        if child_entry.tag() != gimli::constants::DW_TAG_member {
            continue;
        }
        let Some(name) = get_name_attribute(child_entry, &ctx.dwarf) else { continue };
        let (unit, _) = &ctx.units[unit_idx];
        let Some(member_typeref) = get_typeref_attribute(child_entry, unit) else { continue };
        let member_unit = ctx.units.find_unit(member_typeref).unwrap_or(unit_idx);
        let member_descriptor = resolve_descriptor(ctx, tables, member_unit, member_typeref)?;
        let byte_offset = get_data_member_location_attribute(child_entry).unwrap_or(0);

        let (bit_size_field, bit_offset) = if let Some(field_size) = get_bit_size_attribute(child_entry) {
            // Endian-corrected bit-field offset (spec §4.A step 4, structure
            // bullet): container_size - field_size - die_bit_offset + 8*byte_offset.
            let container_size = member_descriptor.bit_size() as i64;
            if field_size as i64 > container_size {
                return Err(GenError::MalformedDebugInfo(format!(
                    "member '{name}' bit-field size {field_size} exceeds its container's {container_size} bits"
                )));
            }
            let die_bit_offset = get_legacy_bit_offset_attribute(child_entry).unwrap_or(0);
            let computed = container_size - field_size as i64 - die_bit_offset + 8 * byte_offset as i64;
            if computed < 0 {
                return Err(GenError::MalformedDebugInfo(format!(
                    "member '{name}' has a negative computed bit offset"
                )));
            }
            (field_size as u32, computed as u32)
        } else {
            (member_descriptor.bit_size(), (8 * byte_offset) as u32)
        };

        members.insert(name, Member { descriptor: member_descriptor, bit_size: bit_size_field, bit_offset });
    }

    Ok(TypeDescriptor::Aggregate(Aggregate::new(members, bit_size)?))
}

fn build_union<'data>(
    ctx: &Ctx<'data>,
    tables: &mut Tables,
    unit_idx: usize,
    mut node: EntriesTreeNode<'_, '_, SliceType<'data>>,
) -> Result<TypeDescriptor> {
    let mut arms = IndexMap::new();
    let mut iter = node.children();
    while let Ok(Some(child)) = iter.next() {
        let child_entry = child.entry();
        if child_entry.tag() != gimli::constants::DW_TAG_member {
            continue;
        }
        let Some(name) = get_name_attribute(child_entry, &ctx.dwarf) else { continue };
        let (unit, _) = &ctx.units[unit_idx];
        let Some(member_typeref) = get_typeref_attribute(child_entry, unit) else { continue };
        let member_unit = ctx.units.find_unit(member_typeref).unwrap_or(unit_idx);
        let descriptor = resolve_descriptor(ctx, tables, member_unit, member_typeref)?;
        arms.insert(name, descriptor);
    }
    Ok(TypeDescriptor::Overlay(Overlay::new(arms)?))
}

fn build_array<'data>(
    ctx: &Ctx<'data>,
    tables: &mut Tables,
    unit_idx: usize,
    mut node: EntriesTreeNode<'_, '_, SliceType<'data>>,
) -> Result<TypeDescriptor> {
    let entry = node.entry();
    let (unit, _) = &ctx.units[unit_idx];
    let elem_typeref = get_typeref_attribute(entry, unit)
        .ok_or_else(|| GenError::MalformedDebugInfo("array type missing element type".to_string()))?;
    let elem_unit = ctx.units.find_unit(elem_typeref).unwrap_or(unit_idx);
    let element_descriptor = resolve_descriptor(ctx, tables, elem_unit, elem_typeref)?;

    let mut dims: Vec<u32> = Vec::new();
    let mut iter = node.children();
    while let Ok(Some(child)) = iter.next() {
        let child_entry = child.entry();
        if child_entry.tag() != gimli::constants::DW_TAG_subrange_type {
            continue;
        }
        let count = if let Some(ubound) = get_upper_bound_attribute(child_entry) {
            if ubound == u64::MAX { 0 } else { (ubound + 1) as u32 }
        } else if let Some(count) = get_count_attribute(child_entry) {
            if count == u64::MAX { 0 } else { count as u32 }
        } else {
            0
        };
        dims.push(count);
    }
    if dims.is_empty() {
        dims.push(0);
    }

    // Nested arrays are built in reverse subrange order so the outermost
    // wrapper carries the first (outer-major) dimension, per spec §4.A.
    let mut current = element_descriptor;
    for count in dims.into_iter().rev() {
        current = TypeDescriptor::Array(ArrayType { element: Box::new(current), count });
    }
    Ok(current)
}

fn extract_enum<'data>(ctx: &Ctx<'data>, mut node: EntriesTreeNode<'_, '_, SliceType<'data>>) -> Result<Enumeration> {
    let mut variants = IndexMap::new();
    let mut iter = node.children();
    while let Ok(Some(child)) = iter.next() {
        let child_entry = child.entry();
        if child_entry.tag() != gimli::constants::DW_TAG_enumerator {
            continue;
        }
        let Some(name) = get_name_attribute(child_entry, &ctx.dwarf) else { continue };
        let Some(value) = get_const_value_attribute(child_entry) else { continue };
        variants.insert(name, value);
    }
    Ok(Enumeration { variants })
}

fn load_filedata(path: &Path) -> Result<memmap2::Mmap> {
    let file = std::fs::File::open(path)?;
    unsafe { memmap2::Mmap::map(&file) }.map_err(GenError::Io)
}

fn load_elf_file<'data>(path: &Path, filedata: &'data [u8]) -> Result<object::File<'data>> {
    object::File::parse(filedata).map_err(|e| GenError::ObjectParse(format!("{}: {e}", path.display())))
}

fn load_dwarf<'data>(elffile: &object::File<'data>) -> Result<gimli::Dwarf<SliceType<'data>>> {
    let endian = get_endian(elffile);
    let loader = |section: gimli::SectionId| -> std::result::Result<SliceType<'data>, String> {
        Ok(get_file_section_reader(elffile, section.name(), endian))
    };
    gimli::Dwarf::load(loader).map_err(GenError::MalformedDebugInfo)
}

fn get_file_section_reader<'data>(
    elffile: &object::File<'data>,
    section_name: &str,
    endian: RunTimeEndian,
) -> SliceType<'data> {
    if let Some(section) = elffile.section_by_name(section_name) {
        if let Ok(data) = section.data() {
            return EndianSlice::new(data, endian);
        }
    }
    EndianSlice::new(&[], endian)
}

fn get_endian(elffile: &object::File) -> RunTimeEndian {
    if elffile.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::BaseIntWidth;

    #[test]
    fn candidate_tags_match_spec_allowlist() {
        assert!(is_candidate_tag(gimli::constants::DW_TAG_typedef));
        assert!(is_candidate_tag(gimli::constants::DW_TAG_structure_type));
        assert!(is_candidate_tag(gimli::constants::DW_TAG_union_type));
        assert!(is_candidate_tag(gimli::constants::DW_TAG_enumeration_type));
        assert!(!is_candidate_tag(gimli::constants::DW_TAG_base_type));
        assert!(!is_candidate_tag(gimli::constants::DW_TAG_array_type));
    }

    #[test]
    fn register_named_type_renames_anonymous_entry_for_typedef() {
        let mut tables = Tables::default();
        register_named_type(&mut tables, 0x10, "anon_10".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W32), false);
        assert!(tables.types.contains_key("anon_10"));

        register_named_type(&mut tables, 0x10, "Frame".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W32), true);
        assert!(!tables.types.contains_key("anon_10"));
        assert!(tables.types.contains_key("Frame"));
    }

    #[test]
    fn register_named_type_keeps_existing_real_name_alongside_typedef_alias() {
        let mut tables = Tables::default();
        register_named_type(&mut tables, 0x20, "tFrame".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W16), false);
        register_named_type(&mut tables, 0x20, "Frame".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W16), true);
        assert!(tables.types.contains_key("tFrame"));
        assert!(tables.types.contains_key("Frame"));
    }
}
