//! # DWARF Decoder and Index
//!
//! Lazy access to the DWARF 2-4 debug information of one ELF object. The
//! constructor only walks `.debug_info` for compile-unit headers; decoding
//! a unit's abbreviation table and attributes happens on first use of that
//! unit and is cached. Above gimli's form decoding this module maintains
//! the lookups a debugger needs: a function-name index over subprogram and
//! inlined-subroutine DIEs, address containment through `DW_AT_ranges` or
//! `[low_pc, high_pc)`, and line-table queries in both directions.
//!
//! All addresses taken from or handed to this module are [`FileAddr`]s;
//! callers convert to the inferior's address space through the owning
//! [`Elf`][crate::elf::Elf].

use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gimli::{
    AttributeValue, DebugInfoOffset, EndianRcSlice, LittleEndian, Reader, Unit, UnitHeader,
    UnitOffset,
};
use object::{Object, ObjectSection};
use tracing::{debug, trace, warn};

use crate::addr::FileAddr;
use crate::errors::Result;

pub(crate) type DwarfReader = EndianRcSlice<LittleEndian>;
type Die<'a> = gimli::DebuggingInformationEntry<'a, 'a, DwarfReader>;

/// One compile unit, identified by its `.debug_info` offset.
///
/// The full unit (with its abbreviation table) is only decoded on first
/// use.
pub struct CompileUnit {
    header: UnitHeader<DwarfReader>,
    unit: OnceCell<Unit<DwarfReader>>,
}

impl CompileUnit {
    /// Offset of this unit within `.debug_info`.
    pub fn offset(&self) -> usize {
        self.header
            .offset()
            .as_debug_info_offset()
            .map(|o| o.0)
            .unwrap_or(0)
    }

    fn unit(&self, dwarf: &gimli::Dwarf<DwarfReader>) -> Result<&Unit<DwarfReader>> {
        if self.unit.get().is_none() {
            let unit = Unit::new(dwarf, self.header.clone())?;
            let _ = self.unit.set(unit);
        }
        Ok(self.unit.get().expect("initialized above"))
    }
}

/// Position of an indexed DIE: which unit, and where inside it.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    unit: usize,
    offset: UnitOffset<usize>,
}

/// Materialized summary of a function DIE.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: Option<String>,
    pub low_pc: Option<FileAddr>,
    pub high_pc: Option<FileAddr>,
}

/// One decoded line-table row match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub file: PathBuf,
    pub line: u64,
    pub address: FileAddr,
}

/// DWARF context of one ELF object.
pub struct Dwarf {
    inner: gimli::Dwarf<DwarfReader>,
    compile_units: Vec<CompileUnit>,
    function_index: OnceCell<HashMap<String, Vec<IndexEntry>>>,
}

impl Dwarf {
    /// Copies the debug sections out of `obj` and discovers the
    /// compile-unit headers. Nothing else is parsed yet.
    pub(crate) fn load(obj: &object::File) -> Result<Self> {
        let loader = |section: gimli::SectionId| -> std::result::Result<DwarfReader, gimli::Error> {
            let data = obj
                .section_by_name(section.name())
                .and_then(|s| s.uncompressed_data().ok())
                .unwrap_or_default();
            Ok(DwarfReader::new(Rc::from(data.as_ref()), LittleEndian))
        };
        Ok(Self::from_gimli(gimli::Dwarf::load(loader)?))
    }

    fn from_gimli(inner: gimli::Dwarf<DwarfReader>) -> Self {
        let mut compile_units = Vec::new();
        let mut iter = inner.units();
        loop {
            match iter.next() {
                Ok(Some(header)) => compile_units.push(CompileUnit {
                    header,
                    unit: OnceCell::new(),
                }),
                Ok(None) => break,
                Err(e) => {
                    warn!("stopping compile unit discovery early: {e}");
                    break;
                }
            }
        }

        debug!("discovered {} compile units", compile_units.len());
        Self {
            inner,
            compile_units,
            function_index: OnceCell::new(),
        }
    }

    /// Builds a context straight from raw section bytes, for tests that
    /// need hand-assembled debug info.
    #[cfg(test)]
    fn from_sections(debug_info: &[u8], debug_abbrev: &[u8], debug_str: &[u8]) -> Self {
        let loader = |section: gimli::SectionId| -> std::result::Result<DwarfReader, gimli::Error> {
            let data: &[u8] = match section {
                gimli::SectionId::DebugInfo => debug_info,
                gimli::SectionId::DebugAbbrev => debug_abbrev,
                gimli::SectionId::DebugStr => debug_str,
                _ => &[],
            };
            Ok(DwarfReader::new(Rc::from(data), LittleEndian))
        };
        Self::from_gimli(gimli::Dwarf::load(loader).expect("loader is infallible"))
    }

    pub fn compile_units(&self) -> &[CompileUnit] {
        &self.compile_units
    }

    fn unit_at(&self, index: usize) -> Result<&Unit<DwarfReader>> {
        self.compile_units[index].unit(&self.inner)
    }

    /// All function DIEs carrying `name`, materialized.
    ///
    /// Covers subprograms and inlined subroutines whose name is attached
    /// directly or through `DW_AT_specification`/`DW_AT_abstract_origin`.
    pub fn find_functions(&self, name: &str) -> Result<Vec<FunctionInfo>> {
        let index = self.function_index()?;
        let mut out = Vec::new();
        for entry in index.get(name).into_iter().flatten() {
            out.push(self.function_info_at(*entry)?);
        }
        Ok(out)
    }

    /// The subprogram whose code ranges contain `address`.
    pub fn function_containing_address(&self, address: FileAddr) -> Result<Option<FunctionInfo>> {
        for unit_index in 0..self.compile_units.len() {
            if !self.unit_contains_address(unit_index, address)? {
                continue;
            }

            let unit = self.unit_at(unit_index)?;
            let mut cursor = unit.entries();
            while let Some((_, entry)) = cursor.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }
                if self.die_contains_address(unit, entry, address)? {
                    let offset = entry.offset();
                    return Ok(Some(self.function_info_at(IndexEntry {
                        unit: unit_index,
                        offset,
                    })?));
                }
            }
        }

        Ok(None)
    }

    /// The unit whose root DIE contains `address`. A root without
    /// `low_pc`/`high_pc` or `ranges` contains nothing.
    pub fn compile_unit_containing_address(
        &self,
        address: FileAddr,
    ) -> Result<Option<&CompileUnit>> {
        for index in 0..self.compile_units.len() {
            if self.unit_contains_address(index, address)? {
                return Ok(Some(&self.compile_units[index]));
            }
        }
        Ok(None)
    }

    /// The line-table row covering `address`, if its unit has a line
    /// program.
    pub fn line_entry_at(&self, address: FileAddr) -> Result<Option<LineEntry>> {
        let target = address.addr();
        for unit_index in 0..self.compile_units.len() {
            if !self.unit_contains_address(unit_index, address)? {
                continue;
            }

            let unit = self.unit_at(unit_index)?;
            let Some(program) = unit.line_program.clone() else {
                continue;
            };

            let mut best: Option<(u64, u64, u64)> = None;
            let mut rows = program.rows();
            while let Some((_, row)) = rows.next_row()? {
                if row.end_sequence() || row.address() > target {
                    continue;
                }
                let Some(line) = row.line() else { continue };
                if best.map(|(addr, _, _)| row.address() >= addr).unwrap_or(true) {
                    best = Some((row.address(), row.file_index(), line.get()));
                }
            }

            if let Some((addr, file_index, line)) = best {
                let program = unit.line_program.clone().expect("checked above");
                let file = self.file_entry_path(unit, program.header(), file_index)?;
                return Ok(Some(LineEntry {
                    file: file.unwrap_or_default(),
                    line,
                    address: FileAddr::new(addr),
                }));
            }
        }

        Ok(None)
    }

    /// The first statement-begin address for `(file, line)` across all
    /// units with a line program.
    ///
    /// A bare filename compares against basenames; a path with directory
    /// components must match the row's full path suffix.
    pub fn first_line_address(&self, file: &Path, line: u64) -> Result<Option<FileAddr>> {
        let bare = file.components().count() == 1;

        for unit_index in 0..self.compile_units.len() {
            let unit = self.unit_at(unit_index)?;
            let Some(program) = unit.line_program.clone() else {
                continue;
            };

            let mut rows = program.rows();
            while let Some((header, row)) = rows.next_row()? {
                if row.end_sequence() || !row.is_stmt() {
                    continue;
                }
                if row.line().map(|l| l.get()) != Some(line) {
                    continue;
                }

                let Some(row_path) = self.file_entry_path(unit, header, row.file_index())? else {
                    continue;
                };
                let matches = if bare {
                    row_path.file_name() == Some(file.as_os_str())
                } else {
                    row_path.ends_with(file)
                };
                if matches {
                    trace!("{}:{line} is at {:#x}", row_path.display(), row.address());
                    return Ok(Some(FileAddr::new(row.address())));
                }
            }
        }

        Ok(None)
    }

    fn function_index(&self) -> Result<&HashMap<String, Vec<IndexEntry>>> {
        if self.function_index.get().is_none() {
            let mut index: HashMap<String, Vec<IndexEntry>> = HashMap::new();
            for unit_index in 0..self.compile_units.len() {
                if let Err(e) = self.index_unit(unit_index, &mut index) {
                    warn!("skipping unindexable compile unit {unit_index}: {e}");
                }
            }
            debug!("indexed {} function names", index.len());
            let _ = self.function_index.set(index);
        }
        Ok(self.function_index.get().expect("initialized above"))
    }

    /// Indexes one unit's subprogram names. A DIE whose attributes do not
    /// decode is skipped; the walk carries on with its siblings.
    fn index_unit(
        &self,
        unit_index: usize,
        index: &mut HashMap<String, Vec<IndexEntry>>,
    ) -> Result<()> {
        let unit = self.unit_at(unit_index)?;
        let mut cursor = unit.entries();
        loop {
            let entry = match cursor.next_dfs() {
                Ok(Some((_, entry))) => entry,
                Ok(None) => break,
                Err(e) => {
                    // the cursor cannot size a DIE it cannot decode, so
                    // there is no way to step past this one
                    warn!("stopping index walk of compile unit {unit_index} early: {e}");
                    break;
                }
            };

            let tag = entry.tag();
            if tag != gimli::DW_TAG_subprogram && tag != gimli::DW_TAG_inlined_subroutine {
                continue;
            }

            let offset = entry.offset();
            match self.die_name(unit, entry) {
                Ok(Some(name)) => {
                    index.entry(name).or_default().push(IndexEntry {
                        unit: unit_index,
                        offset,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("skipping function DIE at {:#x} of unit {unit_index}: {e}", offset.0);
                }
            }
        }
        Ok(())
    }

    /// Resolves a DIE's name, chasing `DW_AT_specification` and
    /// `DW_AT_abstract_origin` references.
    fn die_name(&self, unit: &Unit<DwarfReader>, entry: &Die) -> Result<Option<String>> {
        if let Some(value) = entry.attr_value(gimli::DW_AT_name)? {
            let name = self.inner.attr_string(unit, value)?;
            return Ok(Some(name.to_string_lossy()?.into_owned()));
        }

        for reference in [gimli::DW_AT_specification, gimli::DW_AT_abstract_origin] {
            let Some(value) = entry.attr_value(reference)? else {
                continue;
            };
            match value {
                AttributeValue::UnitRef(offset) => {
                    let target = unit.entry(offset)?;
                    return self.die_name(unit, &target);
                }
                AttributeValue::DebugInfoRef(offset) => {
                    let Some((unit_index, local)) = self.locate_global_offset(offset) else {
                        continue;
                    };
                    let target_unit = self.unit_at(unit_index)?;
                    let target = target_unit.entry(local)?;
                    return self.die_name(target_unit, &target);
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Maps a section-relative DIE offset to its unit and unit-relative
    /// offset.
    fn locate_global_offset(
        &self,
        offset: DebugInfoOffset<usize>,
    ) -> Option<(usize, UnitOffset<usize>)> {
        for (index, cu) in self.compile_units.iter().enumerate() {
            let start = cu.header.offset().as_debug_info_offset()?.0;
            let end = start + cu.header.length_including_self();
            if start <= offset.0 && offset.0 < end {
                return Some((index, UnitOffset(offset.0 - start)));
            }
        }
        None
    }

    fn function_info_at(&self, entry: IndexEntry) -> Result<FunctionInfo> {
        let unit = self.unit_at(entry.unit)?;
        let die = unit.entry(entry.offset)?;

        let name = self.die_name(unit, &die)?;
        let low_pc = match die.attr_value(gimli::DW_AT_low_pc)? {
            Some(value) => self.inner.attr_address(unit, value)?.map(FileAddr::new),
            None => None,
        };
        let high_pc = match (low_pc, die.attr_value(gimli::DW_AT_high_pc)?) {
            (_, Some(AttributeValue::Addr(addr))) => Some(FileAddr::new(addr)),
            (Some(low), Some(value)) => value.udata_value().map(|offset| low + offset),
            _ => None,
        };

        Ok(FunctionInfo {
            name,
            low_pc,
            high_pc,
        })
    }

    /// Whether a DIE's code ranges contain `address`, honouring
    /// `DW_AT_ranges` when present and `[low_pc, high_pc)` otherwise.
    fn die_contains_address(
        &self,
        unit: &Unit<DwarfReader>,
        entry: &Die,
        address: FileAddr,
    ) -> Result<bool> {
        let target = address.addr();
        let mut ranges = self.inner.die_ranges(unit, entry)?;
        while let Some(range) = ranges.next()? {
            if range.begin <= target && target < range.end {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn unit_contains_address(&self, unit_index: usize, address: FileAddr) -> Result<bool> {
        let target = address.addr();
        let unit = self.unit_at(unit_index)?;
        let mut ranges = self.inner.unit_ranges(unit)?;
        while let Some(range) = ranges.next()? {
            if range.begin <= target && target < range.end {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Full path of a line-program file entry, composed from the unit's
    /// compilation directory, the file's directory and its name.
    fn file_entry_path(
        &self,
        unit: &Unit<DwarfReader>,
        header: &gimli::LineProgramHeader<DwarfReader>,
        file_index: u64,
    ) -> Result<Option<PathBuf>> {
        let Some(file) = header.file(file_index) else {
            return Ok(None);
        };

        let mut path = PathBuf::new();
        if let Some(dir_value) = file.directory(header) {
            let dir = self.inner.attr_string(unit, dir_value)?;
            let dir = dir.to_string_lossy()?.into_owned();
            if !dir.is_empty() {
                path.push(dir);
            }
        }

        if path.is_relative() {
            if let Some(comp_dir) = &unit.comp_dir {
                let comp_dir = PathBuf::from(comp_dir.to_string_lossy()?.into_owned());
                path = comp_dir.join(path);
            }
        }

        let name = self.inner.attr_string(unit, file.path_name())?;
        path.push(name.to_string_lossy()?.into_owned());
        Ok(Some(path))
    }
}

impl std::fmt::Debug for Dwarf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dwarf")
            .field("compile_units", &self.compile_units.len())
            .finish()
    }
}
