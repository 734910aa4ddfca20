//! In-memory type image.
//!
//! A [`TypeImage`] is the flat, little-endian memory region EETypes are emitted into together
//! with everything they point at: GC descriptors, optional-field blobs, dispatch maps, sealed slot
//! tables, generic compositions and indirection cells. Addresses are absolute, starting at a
//! caller chosen base, so that pointers written into the image can be followed back by
//! [`crate::runtime::eetype::EETypeView`].
//!
//! Method entrypoints never point into the image. They are synthetic addresses from a separate
//! code region, each associated with a symbol name.

use std::{collections::HashMap, fmt};

use crate::{
    file::{io::write_le_at, parser::Parser},
    utils::to_u32,
    Result, TypeSystemConfig,
};

/// Distance between the image base and the first synthetic code address
pub const CODE_REGION_OFFSET: u64 = 0x4000_0000;
/// Spacing of synthetic code addresses
pub const CODE_SYMBOL_ALIGNMENT: u64 = 0x10;

/// An absolute address in a [`TypeImage`] or its code region
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u64);

impl Address {
    /// The null address
    pub const NULL: Address = Address(0);

    /// Raw address value
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Returns true for the null address
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `self + bytes`
    #[must_use]
    pub fn offset(self, bytes: u32) -> Address {
        Address(self.0 + u64::from(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Emitted EETypes and the data they reference
#[derive(Debug, Clone)]
pub struct TypeImage {
    base: u64,
    pointer_size: u32,
    data: Vec<u8>,
    dispatch_maps: Vec<Address>,
    code_symbols: Vec<String>,
    code_lookup: HashMap<String, Address>,
    type_symbols: HashMap<String, Address>,
    type_names: HashMap<Address, String>,
    max_nesting_depth: usize,
}

impl TypeImage {
    /// Create an empty image whose first byte lives at `base`
    #[must_use]
    pub fn new(base: u64, pointer_size: u32) -> Self {
        TypeImage {
            base,
            pointer_size,
            data: Vec::new(),
            dispatch_maps: Vec::new(),
            code_symbols: Vec::new(),
            code_lookup: HashMap::new(),
            type_symbols: HashMap::new(),
            type_names: HashMap::new(),
            max_nesting_depth: TypeSystemConfig::default().max_nesting_depth,
        }
    }

    /// Bound base-chain walks over this image to `depth` types
    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Longest base-type chain a reader follows before reporting a cycle
    #[must_use]
    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    /// Address of the first byte
    #[must_use]
    pub fn base(&self) -> Address {
        Address(self.base)
    }

    /// Target pointer size
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Number of bytes allocated so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Allocate `size` zeroed bytes aligned to `alignment`
    pub fn alloc(&mut self, size: u32, alignment: u32) -> Address {
        let alignment = u64::from(alignment.max(1));
        let current = self.base + self.data.len() as u64;
        let aligned = current.div_ceil(alignment) * alignment;
        let new_len = (aligned - self.base) as usize + size as usize;
        self.data.resize(new_len, 0);
        Address(aligned)
    }

    /// Allocate and fill a blob
    pub fn alloc_bytes(&mut self, bytes: &[u8], alignment: u32) -> Result<Address> {
        let address = self.alloc(to_u32(bytes.len())?, alignment);
        self.write_bytes(address, bytes)?;
        Ok(address)
    }

    /// Allocate an indirection cell holding `target`
    pub fn alloc_indirection_cell(&mut self, target: Address) -> Result<Address> {
        let cell = self.alloc(self.pointer_size, self.pointer_size);
        self.write_pointer(cell, target)?;
        Ok(cell)
    }

    fn range(&self, address: Address, length: usize) -> Result<std::ops::Range<usize>> {
        let start = address
            .0
            .checked_sub(self.base)
            .ok_or(out_of_bounds_error!())? as usize;
        let end = start.checked_add(length).ok_or(out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(start..end)
    }

    /// Returns true if `[address, address + length)` lies inside the image
    #[must_use]
    pub fn contains(&self, address: Address, length: usize) -> bool {
        self.range(address, length).is_ok()
    }

    /// Borrow `length` bytes at `address`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range leaves the image.
    pub fn read_bytes(&self, address: Address, length: usize) -> Result<&[u8]> {
        let range = self.range(address, length)?;
        Ok(&self.data[range])
    }

    /// Borrow everything from `address` to the end of the image
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `address` is outside the image.
    pub fn bytes_from(&self, address: Address) -> Result<&[u8]> {
        let range = self.range(address, 0)?;
        Ok(&self.data[range.start..])
    }

    /// Borrow everything from the image base up to, excluding, `address`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `address` is outside the image.
    pub fn bytes_below(&self, address: Address) -> Result<&[u8]> {
        let range = self.range(address, 0)?;
        Ok(&self.data[..range.start])
    }

    /// Copy `bytes` to `address`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range leaves the image.
    pub fn write_bytes(&mut self, address: Address, bytes: &[u8]) -> Result<()> {
        let range = self.range(address, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a `u8`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the image.
    pub fn read_u8(&self, address: Address) -> Result<u8> {
        Parser::new(self.read_bytes(address, 1)?).read_le::<u8>()
    }

    /// Read a little-endian `u16`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the image.
    pub fn read_u16(&self, address: Address) -> Result<u16> {
        Parser::new(self.read_bytes(address, 2)?).read_le::<u16>()
    }

    /// Read a little-endian `u32`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the image.
    pub fn read_u32(&self, address: Address) -> Result<u32> {
        Parser::new(self.read_bytes(address, 4)?).read_le::<u32>()
    }

    /// Read a pointer-sized value
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the image.
    pub fn read_pointer(&self, address: Address) -> Result<Address> {
        let bytes = self.read_bytes(address, self.pointer_size as usize)?;
        let mut parser = Parser::new(bytes);
        if self.pointer_size == 8 {
            Ok(Address(parser.read_le::<u64>()?))
        } else {
            Ok(Address(u64::from(parser.read_le::<u32>()?)))
        }
    }

    /// Write a little-endian `u8`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write leaves the image.
    pub fn write_u8(&mut self, address: Address, value: u8) -> Result<()> {
        self.write_bytes(address, &[value])
    }

    /// Write a little-endian `u16`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write leaves the image.
    pub fn write_u16(&mut self, address: Address, value: u16) -> Result<()> {
        let range = self.range(address, 2)?;
        let mut offset = 0;
        write_le_at(&mut self.data[range], &mut offset, value)
    }

    /// Write a little-endian `u32`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write leaves the image.
    pub fn write_u32(&mut self, address: Address, value: u32) -> Result<()> {
        let range = self.range(address, 4)?;
        let mut offset = 0;
        write_le_at(&mut self.data[range], &mut offset, value)
    }

    /// Write a pointer-sized value
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write leaves the image, or
    /// [`crate::Error::InvariantViolation`] if `value` does not fit a 32-bit pointer.
    pub fn write_pointer(&mut self, address: Address, value: Address) -> Result<()> {
        let range = self.range(address, self.pointer_size as usize)?;
        let mut offset = 0;
        if self.pointer_size == 8 {
            write_le_at(&mut self.data[range], &mut offset, value.0)
        } else {
            let narrow = u32::try_from(value.0)
                .map_err(|_| invariant_error!("Address {} does not fit a 32-bit pointer", value))?;
            write_le_at(&mut self.data[range], &mut offset, narrow)
        }
    }

    /// Register a dispatch map blob and return its index in the dispatch-map table
    pub fn add_dispatch_map(&mut self, map: Address) -> u32 {
        self.dispatch_maps.push(map);
        (self.dispatch_maps.len() - 1) as u32
    }

    /// Address of the dispatch map at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an unknown index.
    pub fn dispatch_map(&self, index: u32) -> Result<Address> {
        self.dispatch_maps
            .get(index as usize)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Synthetic code address for `symbol`, allocated on first use
    pub fn code_symbol(&mut self, symbol: &str) -> Address {
        if let Some(address) = self.code_lookup.get(symbol) {
            return *address;
        }

        let index = self.code_symbols.len() as u64;
        let address = Address(self.base + CODE_REGION_OFFSET + index * CODE_SYMBOL_ALIGNMENT);
        self.code_symbols.push(symbol.to_string());
        self.code_lookup.insert(symbol.to_string(), address);
        address
    }

    /// Symbol name of a synthetic code address
    #[must_use]
    pub fn symbol_at(&self, address: Address) -> Option<&str> {
        let relative = address.0.checked_sub(self.base + CODE_REGION_OFFSET)?;
        if relative % CODE_SYMBOL_ALIGNMENT != 0 {
            return None;
        }
        self.code_symbols
            .get((relative / CODE_SYMBOL_ALIGNMENT) as usize)
            .map(String::as_str)
    }

    /// Record the EEType address of a named type
    pub fn define_type(&mut self, name: &str, address: Address) {
        self.type_symbols.insert(name.to_string(), address);
        self.type_names.insert(address, name.to_string());
    }

    /// EEType address of a named type
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<Address> {
        self.type_symbols.get(name).copied()
    }

    /// Name of the type whose EEType lives at `address`
    #[must_use]
    pub fn type_name(&self, address: Address) -> Option<&str> {
        self.type_names.get(&address).map(String::as_str)
    }

    /// Number of EETypes recorded with [`TypeImage::define_type`]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.type_symbols.len()
    }
}
