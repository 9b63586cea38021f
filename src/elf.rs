//! # ELF Loader
//!
//! Memory-maps an ELF64 image and copies the pieces a debugger keeps
//! asking for into owned lookup structures: section records with a
//! name map, the symbol table (`.symtab`, falling back to `.dynsym`)
//! with a demangled-name multimap and an address interval map, and the
//! entry point.
//!
//! The image's runtime position is unknown until the process controller
//! reports it through [`Elf::notify_loaded`]; before that, every
//! translation between [`FileAddr`] and [`VirtAddr`] fails.
//!
//! The associated [`Dwarf`] is built here as well, from copies of the
//! debug sections, so it stays valid independently of this mapping's
//! borrow.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use object::{Object, ObjectSection, ObjectSymbol, SectionFlags, SymbolKind};
use tracing::{debug, warn};

use crate::addr::{FileAddr, VirtAddr};
use crate::dwarf::Dwarf;
use crate::errors::{DebuggerError, Result};

/// A parsed section header, with the fields lookups need copied out.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub addr: u64,
    pub size: u64,
    file_range: Option<(u64, u64)>,
    is_alloc: bool,
}

impl Section {
    pub fn contains_file_addr(&self, addr: FileAddr) -> bool {
        self.addr <= addr.addr() && addr.addr() < self.addr + self.size
    }

    /// Whether the section occupies memory at run time (`SHF_ALLOC`).
    pub fn is_alloc(&self) -> bool {
        self.is_alloc
    }
}

/// One symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub demangled_name: String,
    pub value: u64,
    pub size: u64,
    pub is_function: bool,
}

impl Symbol {
    pub fn file_addr(&self) -> FileAddr {
        FileAddr::new(self.value)
    }
}

/// A memory-mapped ELF image with its parsed lookup structures and DWARF
/// decoder.
pub struct Elf {
    path: PathBuf,
    data: Mmap,
    entry_point: FileAddr,
    load_bias: Option<VirtAddr>,
    sections: Vec<Section>,
    section_map: HashMap<String, usize>,
    symbols: Vec<Symbol>,
    symbol_name_map: HashMap<String, Vec<usize>>,
    symbol_addr_map: BTreeMap<u64, (u64, usize)>,
    dwarf: Dwarf,
}

impl std::fmt::Debug for Elf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elf")
            .field("path", &self.path)
            .field("sections", &self.sections.len())
            .field("symbols", &self.symbols.len())
            .field("load_bias", &self.load_bias)
            .finish()
    }
}

impl Elf {
    /// Maps `path` read-only and parses it.
    ///
    /// Only little-endian ELF64 executables and shared objects are
    /// accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // the file is mapped read-only and never written through
        let data = unsafe { Mmap::map(&file)? };

        let (entry_point, sections, symbols, dwarf) = {
            let obj = object::File::parse(&data[..])?;
            if obj.format() != object::BinaryFormat::Elf {
                return Err(DebuggerError::UnsupportedElf("not an ELF image"));
            }
            if !obj.is_64() {
                return Err(DebuggerError::UnsupportedElf("not a 64-bit image"));
            }
            if !obj.is_little_endian() {
                return Err(DebuggerError::UnsupportedElf("not little-endian"));
            }
            if !matches!(
                obj.kind(),
                object::ObjectKind::Executable | object::ObjectKind::Dynamic
            ) {
                return Err(DebuggerError::UnsupportedElf(
                    "not an executable or shared object",
                ));
            }

            let sections = parse_sections(&obj);
            let symbols = parse_symbols(&obj);
            let dwarf = Dwarf::load(&obj)?;
            (FileAddr::new(obj.entry()), sections, symbols, dwarf)
        };

        debug!(
            "opened {} with {} sections and {} symbols",
            path.display(),
            sections.len(),
            symbols.len()
        );

        let mut elf = Self {
            path,
            data,
            entry_point,
            load_bias: None,
            section_map: HashMap::new(),
            symbol_name_map: HashMap::new(),
            symbol_addr_map: BTreeMap::new(),
            sections,
            symbols,
            dwarf,
        };
        elf.build_section_map();
        elf.build_symbol_maps();
        Ok(elf)
    }

    fn build_section_map(&mut self) {
        for (idx, section) in self.sections.iter().enumerate() {
            self.section_map.insert(section.name.clone(), idx);
        }
    }

    fn build_symbol_maps(&mut self) {
        for (idx, sym) in self.symbols.iter().enumerate() {
            self.symbol_name_map
                .entry(sym.name.clone())
                .or_default()
                .push(idx);
            if sym.demangled_name != sym.name {
                self.symbol_name_map
                    .entry(sym.demangled_name.clone())
                    .or_default()
                    .push(idx);
            }

            if sym.size > 0 {
                self.symbol_addr_map
                    .insert(sym.value, (sym.value + sym.size, idx));
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `e_entry` field of the header, in file address space.
    pub fn entry_point(&self) -> FileAddr {
        self.entry_point
    }

    pub fn load_bias(&self) -> Option<VirtAddr> {
        self.load_bias
    }

    /// Called once by the process controller when the inferior's mapped
    /// base is known; enables file/virt address translation.
    pub fn notify_loaded(&mut self, address: VirtAddr) {
        debug!("{} loaded with bias {address}", self.path.display());
        self.load_bias = Some(address);
    }

    pub fn dwarf(&self) -> &Dwarf {
        &self.dwarf
    }

    pub(crate) fn file_to_virt(&self, addr: FileAddr) -> Result<VirtAddr> {
        let bias = self.load_bias.ok_or(DebuggerError::NotLoaded)?;
        match self.get_section_containing_file_address(addr) {
            Some(section) if section.is_alloc => Ok(VirtAddr::new(addr.addr() + bias.addr())),
            _ => Err(DebuggerError::NotInLoadableSection),
        }
    }

    pub(crate) fn virt_to_file(&self, addr: VirtAddr) -> Result<FileAddr> {
        let bias = self.load_bias.ok_or(DebuggerError::NotLoaded)?;
        if addr < bias {
            return Err(DebuggerError::NotInLoadableSection);
        }
        let file = FileAddr::new(addr.addr() - bias.addr());
        match self.get_section_containing_file_address(file) {
            Some(section) if section.is_alloc => Ok(file),
            _ => Err(DebuggerError::NotInLoadableSection),
        }
    }

    pub fn get_section(&self, name: &str) -> Option<&Section> {
        self.section_map.get(name).map(|idx| &self.sections[*idx])
    }

    /// Raw bytes of the named section, empty if absent or without file
    /// backing.
    pub fn get_section_contents(&self, name: &str) -> &[u8] {
        self.get_section(name)
            .and_then(|s| s.file_range)
            .map(|(off, size)| &self.data[off as usize..(off + size) as usize])
            .unwrap_or_default()
    }

    pub fn get_section_start_address(&self, name: &str) -> Option<FileAddr> {
        self.get_section(name).map(|s| FileAddr::new(s.addr))
    }

    pub fn get_section_containing_file_address(&self, addr: FileAddr) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_file_addr(addr))
    }

    pub fn get_section_containing_virt_address(&self, addr: VirtAddr) -> Option<&Section> {
        let bias = self.load_bias?;
        if addr < bias {
            return None;
        }
        self.get_section_containing_file_address(FileAddr::new(addr.addr() - bias.addr()))
    }

    /// All symbols whose raw or demangled name is `name`.
    pub fn get_symbols_by_name(&self, name: &str) -> Vec<&Symbol> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for idx in self.symbol_name_map.get(name).into_iter().flatten() {
            if !seen.contains(idx) {
                seen.push(*idx);
                out.push(&self.symbols[*idx]);
            }
        }
        out
    }

    /// The symbol whose value is exactly `addr`.
    pub fn get_symbol_at_address(&self, addr: FileAddr) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.value == addr.addr())
    }

    pub fn get_symbol_at_virt_address(&self, addr: VirtAddr) -> Option<&Symbol> {
        let file = addr.to_file_addr(self).ok()?;
        self.get_symbol_at_address(file)
    }

    /// The symbol whose `[st_value, st_value + st_size)` range contains
    /// `addr`.
    pub fn get_symbol_containing_address(&self, addr: FileAddr) -> Option<&Symbol> {
        let (_, (high, idx)) = self.symbol_addr_map.range(..=addr.addr()).next_back()?;
        if addr.addr() < *high {
            Some(&self.symbols[*idx])
        } else {
            None
        }
    }

    pub fn get_symbol_containing_virt_address(&self, addr: VirtAddr) -> Option<&Symbol> {
        let file = addr.to_file_addr(self).ok()?;
        self.get_symbol_containing_address(file)
    }
}

fn parse_sections(obj: &object::File) -> Vec<Section> {
    obj.sections()
        .filter_map(|section| {
            let name = match section.name() {
                Ok(name) => name.to_string(),
                Err(e) => {
                    warn!("skipping section with unreadable name: {e}");
                    return None;
                }
            };
            let is_alloc = match section.flags() {
                SectionFlags::Elf { sh_flags } => sh_flags & u64::from(object::elf::SHF_ALLOC) != 0,
                _ => false,
            };
            Some(Section {
                name,
                addr: section.address(),
                size: section.size(),
                file_range: section.file_range(),
                is_alloc,
            })
        })
        .collect()
}

fn parse_symbols(obj: &object::File) -> Vec<Symbol> {
    fn convert<'data: 'file, 'file>(
        syms: impl Iterator<Item = object::Symbol<'data, 'file>>,
    ) -> Vec<Symbol> {
        syms.filter_map(|sym| {
            let name = sym.name().ok().filter(|n| !n.is_empty())?.to_string();
            let demangled_name = format!("{:#}", rustc_demangle::demangle(&name));
            Some(Symbol {
                demangled_name,
                value: sym.address(),
                size: sym.size(),
                is_function: sym.kind() == SymbolKind::Text,
                name,
            })
        })
        .collect()
    }

    // .symtab when present, .dynsym otherwise
    let symbols = convert(obj.symbols());
    if !symbols.is_empty() {
        symbols
    } else {
        convert(obj.dynamic_symbols())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // a function the test binary is guaranteed to carry in its symbol
    // table and debug info
    #[no_mangle]
    #[inline(never)]
    extern "C" fn burrow_elf_test_anchor() -> u64 {
        42
    }

    fn current_exe() -> Elf {
        Elf::open(std::env::current_exe().unwrap()).unwrap()
    }

    #[test]
    fn test_open_and_sections() {
        let elf = current_exe();
        let text = elf.get_section(".text").expect("every binary has .text");
        assert!(text.is_alloc());
        assert!(text.size > 0);
        assert!(!elf.get_section_contents(".text").is_empty());
        assert!(elf.get_section(".burrow_not_a_section").is_none());
    }

    #[test]
    fn test_symbol_lookup_by_name() {
        let _keep = std::hint::black_box(burrow_elf_test_anchor());
        let elf = current_exe();
        let syms = elf.get_symbols_by_name("burrow_elf_test_anchor");
        assert_eq!(syms.len(), 1);
        assert!(syms[0].is_function);
        assert!(syms[0].size > 0);
    }

    #[test]
    fn test_symbol_lookup_by_address() {
        let elf = current_exe();
        let sym = elf.get_symbols_by_name("burrow_elf_test_anchor")[0];
        let addr = sym.file_addr();

        let at = elf.get_symbol_at_address(addr).unwrap();
        assert_eq!(at.name, "burrow_elf_test_anchor");

        let containing = elf.get_symbol_containing_address(addr + 1).unwrap();
        assert_eq!(containing.name, "burrow_elf_test_anchor");

        let past_end = elf.get_symbol_containing_address(addr + sym.size);
        assert!(past_end.map(|s| s.name != "burrow_elf_test_anchor").unwrap_or(true));
    }

    #[test]
    fn test_conversion_requires_load_bias() {
        let mut elf = current_exe();
        let sym = elf.get_symbols_by_name("burrow_elf_test_anchor")[0];
        let file = sym.file_addr();

        assert!(matches!(
            file.to_virt_addr(&elf),
            Err(DebuggerError::NotLoaded)
        ));

        elf.notify_loaded(VirtAddr::new(0x555500000000));
        let virt = file.to_virt_addr(&elf).unwrap();
        assert_eq!(virt.addr(), file.addr() + 0x555500000000);

        // round trip through the bias lands on the same file address
        assert_eq!(virt.to_file_addr(&elf).unwrap(), file);
    }

    #[test]
    fn test_conversion_outside_loadable_sections() {
        let mut elf = current_exe();
        elf.notify_loaded(VirtAddr::new(0x555500000000));
        // virt addresses below the bias are never mapped by this object
        assert!(matches!(
            VirtAddr::new(0x1000).to_file_addr(&elf),
            Err(DebuggerError::NotInLoadableSection)
        ));
    }
}
