//! Interface dispatch maps.
//!
//! A dispatch map tells interface dispatch which slot of the implementing type handles a given
//! interface method. Each entry is a triple of the interface's position in the type's interface
//! map, the method's slot inside the interface, and the implementation slot on the type. An
//! implementation slot at or above the type's vtable slot count refers to the sealed virtual
//! slot table instead of the vtable.
//!
//! # Format
//!
//! ```text
//! u32 entry count
//! repeat count: u16 interface index, u16 interface slot, u16 implementation slot
//! ```

use crate::{
    file::{io::write_le_at, parser::Parser},
    Result,
};

/// Size in bytes of one encoded [`DispatchMapEntry`]
pub const DISPATCH_MAP_ENTRY_SIZE: usize = 6;

/// One interface-slot to implementation-slot mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchMapEntry {
    /// Position of the interface in the type's interface map
    pub interface_index: u16,
    /// Slot of the method within the interface
    pub interface_slot: u16,
    /// Vtable slot, or vtable slot count plus sealed slot index
    pub implementation_slot: u16,
}

/// A counted array of [`DispatchMapEntry`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DispatchMap {
    entries: Vec<DispatchMapEntry>,
}

impl DispatchMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, interface_index: u16, interface_slot: u16, implementation_slot: u16) {
        self.entries.push(DispatchMapEntry {
            interface_index,
            interface_slot,
            implementation_slot,
        });
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[DispatchMapEntry] {
        &self.entries
    }

    /// Implementation slot for (`interface_index`, `interface_slot`)
    #[must_use]
    pub fn find(&self, interface_index: u16, interface_slot: u16) -> Option<u16> {
        self.entries
            .iter()
            .find(|entry| {
                entry.interface_index == interface_index && entry.interface_slot == interface_slot
            })
            .map(|entry| entry.implementation_slot)
    }

    /// Size of the encoded map in bytes
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        4 + self.entries.len() * DISPATCH_MAP_ENTRY_SIZE
    }

    /// Encode into the counted-array format
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if the entry count does not fit the header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| invariant_error!("Dispatch map too large - {}", self.entries.len()))?;

        let mut data = vec![0u8; self.encoded_size()];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, count)?;
        for entry in &self.entries {
            write_le_at(&mut data, &mut offset, entry.interface_index)?;
            write_le_at(&mut data, &mut offset, entry.interface_slot)?;
            write_le_at(&mut data, &mut offset, entry.implementation_slot)?;
        }

        Ok(data)
    }

    /// Decode a counted array.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the count claims.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let count = parser.read_le::<u32>()? as usize;
        if count.saturating_mul(DISPATCH_MAP_ENTRY_SIZE) > parser.remaining() {
            return Err(out_of_bounds_error!());
        }

        let mut map = DispatchMap {
            entries: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let interface_index = parser.read_le::<u16>()?;
            let interface_slot = parser.read_le::<u16>()?;
            let implementation_slot = parser.read_le::<u16>()?;
            map.push(interface_index, interface_slot, implementation_slot);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_entries() {
        let mut map = DispatchMap::new();
        map.push(0, 0, 4);
        map.push(0, 1, 5);
        map.push(1, 0, 9);

        assert_eq!(map.find(0, 1), Some(5));
        assert_eq!(map.find(1, 0), Some(9));
        assert_eq!(map.find(1, 1), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn encoded_layout() {
        let mut map = DispatchMap::new();
        map.push(1, 2, 0x0103);

        let data = map.encode().unwrap();
        assert_eq!(data, vec![1, 0, 0, 0, 1, 0, 2, 0, 0x03, 0x01]);
        assert_eq!(data.len(), map.encoded_size());
        assert_eq!(DispatchMap::parse(&data).unwrap(), map);
    }

    #[test]
    fn empty_map() {
        let map = DispatchMap::new();
        assert!(map.is_empty());
        assert_eq!(map.encode().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn truncated_map() {
        assert!(DispatchMap::parse(&[2, 0, 0, 0, 1, 0, 2, 0, 3, 0]).is_err());
        assert!(DispatchMap::parse(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(DispatchMap::parse(&[1, 0]).is_err());
    }
}
