//! # Stoppoint Collection
//!
//! A generic owning container for stoppoints (breakpoint sites and
//! watchpoints), keyed simultaneously by the stoppoint's id and by its
//! virtual address. Insertion order is preserved, and at most one stoppoint
//! may live at a given address; the creating side checks this before
//! pushing.
//!
//! Removal hands the owned point back to the caller so that the process
//! controller, the one place with access to the tracee's registers, can
//! disable it before dropping it.

use crate::addr::VirtAddr;
use crate::errors::{DebuggerError, Result};

/// Access mode of a hardware stoppoint, as encoded into DR7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppointMode {
    Write,
    ReadWrite,
    Execute,
}

/// Common surface of everything that can live in a
/// [`StoppointCollection`].
pub trait Stoppoint {
    type Id: Copy + Eq;

    fn id(&self) -> Self::Id;
    fn address(&self) -> VirtAddr;
    fn is_enabled(&self) -> bool;

    fn at_address(&self, addr: VirtAddr) -> bool {
        self.address() == addr
    }

    fn in_range(&self, low: VirtAddr, high: VirtAddr) -> bool {
        low <= self.address() && self.address() < high
    }
}

/// Owning collection of stoppoints in insertion order.
#[derive(Debug, Default)]
pub struct StoppointCollection<P: Stoppoint> {
    points: Vec<P>,
}

impl<P: Stoppoint> StoppointCollection<P> {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Takes ownership of `point` and returns a reference to it.
    pub fn push(&mut self, point: P) -> &mut P {
        self.points.push(point);
        self.points.last_mut().expect("pushed just now")
    }

    pub fn contains_id(&self, id: P::Id) -> bool {
        self.find_by_id(id).is_some()
    }

    pub fn contains_address(&self, address: VirtAddr) -> bool {
        self.find_by_address(address).is_some()
    }

    pub fn enabled_stoppoint_at_address(&self, address: VirtAddr) -> bool {
        self.find_by_address(address)
            .map(|i| self.points[i].is_enabled())
            .unwrap_or(false)
    }

    pub fn get_by_id(&self, id: P::Id) -> Result<&P> {
        self.find_by_id(id)
            .map(|i| &self.points[i])
            .ok_or(DebuggerError::StoppointNotFound)
    }

    pub fn get_by_id_mut(&mut self, id: P::Id) -> Result<&mut P> {
        let idx = self
            .find_by_id(id)
            .ok_or(DebuggerError::StoppointNotFound)?;
        Ok(&mut self.points[idx])
    }

    pub fn get_by_address(&self, address: VirtAddr) -> Result<&P> {
        self.find_by_address(address)
            .map(|i| &self.points[i])
            .ok_or(DebuggerError::StoppointNotFound)
    }

    pub fn get_by_address_mut(&mut self, address: VirtAddr) -> Result<&mut P> {
        let idx = self
            .find_by_address(address)
            .ok_or(DebuggerError::StoppointNotFound)?;
        Ok(&mut self.points[idx])
    }

    /// All points whose address lies in `[low, high)`.
    pub fn get_in_region(&self, low: VirtAddr, high: VirtAddr) -> Vec<&P> {
        self.points.iter().filter(|p| p.in_range(low, high)).collect()
    }

    /// Removes the point with the given id and hands it back.
    ///
    /// The caller is expected to disable the point before letting it drop.
    pub fn remove_by_id(&mut self, id: P::Id) -> Result<P> {
        let idx = self
            .find_by_id(id)
            .ok_or(DebuggerError::StoppointNotFound)?;
        Ok(self.points.remove(idx))
    }

    /// Removes the point at the given address and hands it back.
    ///
    /// The caller is expected to disable the point before letting it drop.
    pub fn remove_by_address(&mut self, address: VirtAddr) -> Result<P> {
        let idx = self
            .find_by_address(address)
            .ok_or(DebuggerError::StoppointNotFound)?;
        Ok(self.points.remove(idx))
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.points.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.points.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn find_by_id(&self, id: P::Id) -> Option<usize> {
        self.points.iter().position(|p| p.id() == id)
    }

    fn find_by_address(&self, address: VirtAddr) -> Option<usize> {
        self.points.iter().position(|p| p.at_address(address))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct DummyPoint {
        id: i32,
        addr: VirtAddr,
        enabled: bool,
    }

    impl Stoppoint for DummyPoint {
        type Id = i32;

        fn id(&self) -> i32 {
            self.id
        }

        fn address(&self) -> VirtAddr {
            self.addr
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    fn point(id: i32, addr: u64, enabled: bool) -> DummyPoint {
        DummyPoint {
            id,
            addr: VirtAddr::new(addr),
            enabled,
        }
    }

    #[test]
    fn test_push_and_lookup() {
        let mut col = StoppointCollection::new();
        col.push(point(1, 0x1000, true));
        col.push(point(2, 0x2000, false));

        assert!(col.contains_id(1));
        assert!(col.contains_address(VirtAddr::new(0x2000)));
        assert!(!col.contains_id(3));
        assert_eq!(col.get_by_id(2).unwrap().address().addr(), 0x2000);
        assert_eq!(col.get_by_address(VirtAddr::new(0x1000)).unwrap().id(), 1);
        assert!(matches!(
            col.get_by_id(42),
            Err(DebuggerError::StoppointNotFound)
        ));
    }

    #[test]
    fn test_enabled_at_address() {
        let mut col = StoppointCollection::new();
        col.push(point(1, 0x1000, true));
        col.push(point(2, 0x2000, false));

        assert!(col.enabled_stoppoint_at_address(VirtAddr::new(0x1000)));
        assert!(!col.enabled_stoppoint_at_address(VirtAddr::new(0x2000)));
        assert!(!col.enabled_stoppoint_at_address(VirtAddr::new(0x3000)));
    }

    #[test]
    fn test_get_in_region() {
        let mut col = StoppointCollection::new();
        col.push(point(1, 0x1000, true));
        col.push(point(2, 0x1fff, true));
        col.push(point(3, 0x2000, true));

        let hits = col.get_in_region(VirtAddr::new(0x1000), VirtAddr::new(0x2000));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id(), 1);
        assert_eq!(hits[1].id(), 2);
    }

    #[test]
    fn test_remove() {
        let mut col = StoppointCollection::new();
        col.push(point(1, 0x1000, false));
        col.push(point(2, 0x2000, false));

        let removed = col.remove_by_id(1).unwrap();
        assert_eq!(removed.id, 1);
        assert!(!col.contains_id(1));

        col.remove_by_address(VirtAddr::new(0x2000)).unwrap();
        assert!(col.is_empty());
        assert!(col.remove_by_id(2).is_err());
    }

    #[test]
    fn test_insertion_order() {
        let mut col = StoppointCollection::new();
        for i in 0..4 {
            col.push(point(i, 0x1000 + i as u64, false));
        }
        let ids: Vec<i32> = col.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
