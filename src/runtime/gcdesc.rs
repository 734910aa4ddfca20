//! GC descriptor encoding.
//!
//! The collector learns which words of an object hold references from a descriptor stored
//! immediately below the EEType. The descriptor is derived from a [`GcPointerMap`], a bitmap with
//! one bit per pointer-sized cell, and comes in two instance forms told apart by the sign of the
//! word adjacent to the EEType:
//!
//! - **Object form** (classes, boxed value types, arrays of references): a positive series count
//!   followed, going down in memory, by `(offset, size - baseSize)` word pairs, one per run of
//!   reference cells. Size `(2n + 1) * P`.
//! - **Value-type array form** (arrays of structs containing references): a negated series count,
//!   the byte offset of the first reference from the object start, then one word per run holding
//!   the half-word pair `(skip bytes, pointer count)`. The skip of the final pair wraps around to
//!   the first run of the next element. Size `(n + 2) * P`.
//!
//! A third form describes GC statics: an `i32` series count followed by ascending `(size, offset)`
//! `i32` pairs. Statics without references share a single zero word.
//!
//! All encoders return bytes in ascending address order; the last byte of an instance descriptor
//! is the byte right below the EEType.
//!
//! # Example
//!
//! ```rust
//! use eetype::runtime::gcdesc::{GcLayout, GcPointerMap};
//!
//! // A class with one reference field after the EEType pointer
//! let mut map = GcPointerMap::new(3);
//! map.set(1);
//! let layout = GcLayout::Object { map, base_size: 24, is_value_type: false };
//!
//! assert_eq!(layout.descriptor_size(8), 24);
//! let bytes = layout.encode(8)?;
//! assert_eq!(bytes.len(), 24);
//! # Ok::<(), eetype::Error>(())
//! ```

use tracing::trace;

use crate::{
    file::{io::write_le_at, parser::Parser},
    Result,
};

/// Which pointer-sized cells of a layout hold GC references
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GcPointerMap {
    cells: Vec<bool>,
}

impl GcPointerMap {
    /// Create a map of `num_cells` cells, none of which holds a reference
    #[must_use]
    pub fn new(num_cells: usize) -> Self {
        GcPointerMap {
            cells: vec![false; num_cells],
        }
    }

    /// Create a map from explicit cell states
    #[must_use]
    pub fn from_cells(cells: &[bool]) -> Self {
        GcPointerMap {
            cells: cells.to_vec(),
        }
    }

    /// Mark `cell` as a reference, growing the map if needed
    pub fn set(&mut self, cell: usize) {
        if cell >= self.cells.len() {
            self.cells.resize(cell + 1, false);
        }
        self.cells[cell] = true;
    }

    /// Returns true if `cell` holds a reference
    #[must_use]
    pub fn get(&self, cell: usize) -> bool {
        self.cells.get(cell).copied().unwrap_or(false)
    }

    /// Number of cells covered by the map
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the map covers no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Extend the map to cover `num_cells` cells
    pub fn grow_to(&mut self, num_cells: usize) {
        if num_cells > self.cells.len() {
            self.cells.resize(num_cells, false);
        }
    }

    /// Copy the references of `other` into this map, shifted by `cell_offset` cells
    pub fn merge_at(&mut self, other: &GcPointerMap, cell_offset: usize) {
        for (index, is_pointer) in other.cells.iter().enumerate() {
            if *is_pointer {
                self.set(cell_offset + index);
            }
        }
    }

    /// Returns true if any cell holds a reference
    #[must_use]
    pub fn contains_pointers(&self) -> bool {
        self.cells.iter().any(|cell| *cell)
    }

    /// Maximal runs of reference cells as `(first cell, length)`, low to high
    #[must_use]
    pub fn runs(&self) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut i = 0;
        while i < self.cells.len() {
            if self.cells[i] {
                let start = i;
                while i < self.cells.len() && self.cells[i] {
                    i += 1;
                }
                runs.push((start, i - start));
            } else {
                i += 1;
            }
        }
        runs
    }

    /// Number of maximal runs of reference cells
    #[must_use]
    pub fn num_series(&self) -> usize {
        self.runs().len()
    }
}

/// The GC-relevant shape of a type, from which its instance descriptor is derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcLayout {
    /// A class, or a boxed value type whose map describes the unboxed instance
    Object {
        /// Reference cells; for classes cell 0 is the EEType pointer
        map: GcPointerMap,
        /// Base size of the type
        base_size: u32,
        /// Cells are relative to the unboxed value, so one header word is added
        is_value_type: bool,
    },
    /// An array whose elements are references
    ReferenceArray {
        /// Base size of the array type
        base_size: u32,
    },
    /// An array of value types; the map describes one element
    StructArray {
        /// Reference cells of one element
        element_map: GcPointerMap,
        /// Rank of a multi-dimensional array, `None` for a single-dimension zero-based array
        rank: Option<u32>,
    },
}

impl GcLayout {
    /// Number of series the encoded descriptor contains
    #[must_use]
    pub fn num_series(&self) -> usize {
        match self {
            GcLayout::Object { map, .. } => map.num_series(),
            GcLayout::ReferenceArray { .. } => 1,
            GcLayout::StructArray { element_map, .. } => element_map.num_series(),
        }
    }

    /// Returns true if instances hold any GC reference
    #[must_use]
    pub fn contains_pointers(&self) -> bool {
        self.num_series() > 0
    }

    /// Size of the encoded descriptor in bytes; 0 for pointer-free layouts
    #[must_use]
    pub fn descriptor_size(&self, pointer_size: u32) -> u32 {
        let num_series = self.num_series() as u32;
        if num_series == 0 {
            return 0;
        }

        match self {
            GcLayout::Object { .. } => (num_series * 2 + 1) * pointer_size,
            GcLayout::ReferenceArray { .. } => 3 * pointer_size,
            GcLayout::StructArray { .. } => (num_series + 2) * pointer_size,
        }
    }

    /// Encode the descriptor, lowest address first.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if the layout contains no references; the
    /// caller must check [`GcLayout::contains_pointers`] first.
    pub fn encode(&self, pointer_size: u32) -> Result<Vec<u8>> {
        if !self.contains_pointers() {
            return Err(invariant_error!(
                "GC descriptor requested for a layout without GC pointers"
            ));
        }
        if pointer_size != 4 && pointer_size != 8 {
            return Err(invariant_error!("Unsupported pointer size {}", pointer_size));
        }

        let mut buffer = vec![0u8; self.descriptor_size(pointer_size) as usize];
        match self {
            GcLayout::Object {
                map,
                base_size,
                is_value_type,
            } => encode_object(&mut buffer, map, *base_size, *is_value_type, pointer_size)?,
            GcLayout::ReferenceArray { base_size } => {
                let base_size = i64::from(*base_size);
                let pointer = i64::from(pointer_size);
                let mut words = WordWriter::new(&mut buffer, pointer_size);
                words.push(1)?;
                words.push(base_size - pointer)?;
                words.push(-base_size)?;
            }
            GcLayout::StructArray { element_map, rank } => {
                encode_struct_array(&mut buffer, element_map, *rank, pointer_size)?;
            }
        }

        trace!(
            num_series = self.num_series(),
            size = buffer.len(),
            "encoded GC descriptor"
        );
        Ok(buffer)
    }
}

/// Writes pointer-sized words downward from the end of a descriptor buffer
struct WordWriter<'a> {
    buffer: &'a mut [u8],
    pointer_size: u32,
    /// Byte position one past the next word to write
    top: usize,
}

impl<'a> WordWriter<'a> {
    fn new(buffer: &'a mut [u8], pointer_size: u32) -> Self {
        let top = buffer.len();
        WordWriter {
            buffer,
            pointer_size,
            top,
        }
    }

    fn push(&mut self, value: i64) -> Result<()> {
        self.top = self
            .top
            .checked_sub(self.pointer_size as usize)
            .ok_or(out_of_bounds_error!())?;
        let mut offset = self.top;
        if self.pointer_size == 8 {
            write_le_at(self.buffer, &mut offset, value)
        } else {
            write_le_at(self.buffer, &mut offset, value as i32)
        }
    }

    /// Half-word writes share the cursor with [`WordWriter::push`]
    fn push_half(&mut self, value: i64) -> Result<()> {
        let half = (self.pointer_size / 2) as usize;
        self.top = self.top.checked_sub(half).ok_or(out_of_bounds_error!())?;
        let mut offset = self.top;
        if self.pointer_size == 8 {
            write_le_at(self.buffer, &mut offset, value as i32)
        } else {
            write_le_at(self.buffer, &mut offset, value as i16)
        }
    }
}

fn encode_object(
    buffer: &mut [u8],
    map: &GcPointerMap,
    base_size: u32,
    is_value_type: bool,
    pointer_size: u32,
) -> Result<()> {
    let pointer = i64::from(pointer_size);
    let header = if is_value_type { pointer } else { 0 };
    let runs = map.runs();

    let mut words = WordWriter::new(buffer, pointer_size);
    words.push(runs.len() as i64)?;
    for (start, length) in runs {
        let series_offset = start as i64 * pointer + header;
        let series_size = length as i64 * pointer - i64::from(base_size);
        words.push(series_offset)?;
        words.push(series_size)?;
    }

    Ok(())
}

fn encode_struct_array(
    buffer: &mut [u8],
    element_map: &GcPointerMap,
    rank: Option<u32>,
    pointer_size: u32,
) -> Result<()> {
    let pointer = i64::from(pointer_size);
    let runs = element_map.runs();

    // Array header words, plus the bounds of a multi-dimensional array
    let mut base_offset: i64 = 2;
    if let Some(rank) = rank {
        base_offset += 2 * i64::from(rank) / (pointer / 4);
    }
    if let Some((first_start, _)) = runs.first() {
        base_offset += *first_start as i64;
    }

    let mut words = WordWriter::new(buffer, pointer_size);
    words.push(-(runs.len() as i64))?;
    words.push(base_offset * pointer)?;

    for pair in runs.windows(2) {
        let (start, length) = pair[0];
        let (next_start, _) = pair[1];
        words.push_half((next_start - (start + length)) as i64 * pointer)?;
        words.push_half(length as i64)?;
    }

    if let Some((start, length)) = runs.last() {
        let last = (start + length) as i64;
        let wrap = element_map.len() as i64 - last + base_offset - 2;
        words.push_half(wrap * pointer)?;
        words.push_half(*length as i64)?;
    }

    Ok(())
}

/// Size of the static GC descriptor for `map`
#[must_use]
pub fn static_descriptor_size(map: &GcPointerMap, pointer_size: u32) -> u32 {
    match map.num_series() as u32 {
        0 => pointer_size,
        num_series => 4 + 8 * num_series,
    }
}

/// Encode the static GC descriptor of a GC-statics region.
///
/// Regions without references produce the shared empty descriptor, one zero word.
///
/// # Errors
/// Returns [`crate::Error::InvariantViolation`] if a series offset or size does not fit an `i32`.
pub fn encode_static(map: &GcPointerMap, pointer_size: u32) -> Result<Vec<u8>> {
    let runs = map.runs();
    let mut buffer = vec![0u8; static_descriptor_size(map, pointer_size) as usize];
    if runs.is_empty() {
        return Ok(buffer);
    }

    let to_i32 = |value: usize| {
        i32::try_from(value).map_err(|_| invariant_error!("Static GC series too large - {}", value))
    };

    let mut offset = 0;
    write_le_at(&mut buffer, &mut offset, to_i32(runs.len())?)?;
    for (start, length) in runs {
        write_le_at(
            &mut buffer,
            &mut offset,
            to_i32(length * pointer_size as usize)?,
        )?;
        write_le_at(
            &mut buffer,
            &mut offset,
            to_i32(start * pointer_size as usize)?,
        )?;
    }

    Ok(buffer)
}

/// One `(offset, size)` pair of an object-form descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSeries {
    /// Byte offset of the first reference, from the object start
    pub offset: i64,
    /// Size of the run in bytes, minus the base size
    pub size: i64,
}

/// One `(skip, pointer count)` pair of a value-type array descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcValueSeries {
    /// Bytes to skip after this run
    pub skip: i64,
    /// Number of consecutive references
    pub num_pointers: i64,
}

/// An instance descriptor read back from memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcDescriptor {
    /// Series in the order they sit below the EEType
    Object(Vec<GcSeries>),
    /// Value-type array series in the order they sit below the EEType
    StructArray {
        /// Byte offset of the first reference of the first element
        base_offset: i64,
        /// Runs of references
        series: Vec<GcValueSeries>,
    },
}

impl GcDescriptor {
    /// Read a descriptor whose last byte is the last byte of `memory`.
    ///
    /// `memory` is everything below the EEType; only the descriptor's own words are consumed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `memory` is shorter than the descriptor it
    /// announces, and [`crate::Error::Malformed`] for a zero series count.
    pub fn read(memory: &[u8], pointer_size: u32) -> Result<Self> {
        let pointer = pointer_size as usize;
        let word_at = |index: usize| -> Result<i64> {
            let start = memory
                .len()
                .checked_sub(index * pointer)
                .ok_or(out_of_bounds_error!())?;
            let mut parser = Parser::new(&memory[start..]);
            if pointer_size == 8 {
                parser.read_le::<i64>()
            } else {
                parser.read_le::<i32>().map(i64::from)
            }
        };

        let count = word_at(1)?;
        if count == 0 {
            return Err(malformed_error!("GC descriptor with zero series"));
        }

        if count > 0 {
            let mut series = Vec::new();
            for index in 0..count as usize {
                series.push(GcSeries {
                    offset: word_at(2 + index * 2)?,
                    size: word_at(3 + index * 2)?,
                });
            }
            return Ok(GcDescriptor::Object(series));
        }

        let base_offset = word_at(2)?;
        let count = count.unsigned_abs() as usize;
        let mut series = Vec::new();
        for index in 0..count {
            let word = word_at(3 + index)?;
            let (skip, num_pointers) = if pointer_size == 8 {
                (word >> 32, i64::from(word as i32))
            } else {
                (word >> 16, i64::from(word as i16))
            };
            series.push(GcValueSeries { skip, num_pointers });
        }

        Ok(GcDescriptor::StructArray {
            base_offset,
            series,
        })
    }

    /// Number of series
    #[must_use]
    pub fn num_series(&self) -> usize {
        match self {
            GcDescriptor::Object(series) => series.len(),
            GcDescriptor::StructArray { series, .. } => series.len(),
        }
    }

    /// Size of the descriptor in bytes
    #[must_use]
    pub fn size(&self, pointer_size: u32) -> u32 {
        let num_series = self.num_series() as u32;
        match self {
            GcDescriptor::Object(_) => (num_series * 2 + 1) * pointer_size,
            GcDescriptor::StructArray { .. } => (num_series + 2) * pointer_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words64(bytes: &[u8]) -> Vec<i64> {
        bytes
            .chunks(8)
            .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn runs_are_maximal() {
        let map = GcPointerMap::from_cells(&[true, true, false, true, false, false, true]);
        assert_eq!(map.runs(), vec![(0, 2), (3, 1), (6, 1)]);
        assert_eq!(map.num_series(), 3);
        assert!(!GcPointerMap::new(4).contains_pointers());
    }

    #[test]
    fn set_grows_and_merge_shifts() {
        let mut map = GcPointerMap::new(1);
        map.set(3);
        assert_eq!(map.len(), 4);
        assert!(map.get(3));
        assert!(!map.get(10));

        let mut outer = GcPointerMap::new(2);
        outer.merge_at(&map, 2);
        assert_eq!(outer.runs(), vec![(5, 1)]);
    }

    #[test]
    fn class_with_one_reference() {
        let layout = GcLayout::Object {
            map: GcPointerMap::from_cells(&[false, true, false]),
            base_size: 24,
            is_value_type: false,
        };
        let bytes = layout.encode(8).unwrap();
        assert_eq!(words64(&bytes), vec![-16, 8, 1]);
        assert_eq!(bytes.len() as u32, layout.descriptor_size(8));

        let decoded = GcDescriptor::read(&bytes, 8).unwrap();
        assert_eq!(decoded, GcDescriptor::Object(vec![GcSeries { offset: 8, size: -16 }]));
    }

    #[test]
    fn boxed_value_type_accounts_for_header() {
        let layout = GcLayout::Object {
            map: GcPointerMap::from_cells(&[true, false, true, true]),
            base_size: 48,
            is_value_type: true,
        };
        let bytes = layout.encode(8).unwrap();
        // Lowest run sits nearest the EEType: (8, 8-48) then (24, 16-48)
        assert_eq!(words64(&bytes), vec![-32, 24, -40, 8, 2]);
        assert_eq!(bytes.len(), 40);
    }

    #[test]
    fn reference_array() {
        let layout = GcLayout::ReferenceArray { base_size: 24 };
        let bytes = layout.encode(8).unwrap();
        assert_eq!(words64(&bytes), vec![-24, 16, 1]);
        assert_eq!(layout.descriptor_size(8), 24);

        let bytes = layout.encode(4).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[8..], &1i32.to_le_bytes());
    }

    #[test]
    fn struct_array_single_run() {
        let layout = GcLayout::StructArray {
            element_map: GcPointerMap::from_cells(&[false, true, true, false]),
            rank: None,
        };
        let bytes = layout.encode(8).unwrap();
        assert_eq!(bytes.len(), 24);

        let mut expected = Vec::new();
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(&16i32.to_le_bytes());
        expected.extend_from_slice(&24i64.to_le_bytes());
        expected.extend_from_slice(&(-1i64).to_le_bytes());
        assert_eq!(bytes, expected);

        let decoded = GcDescriptor::read(&bytes, 8).unwrap();
        assert_eq!(
            decoded,
            GcDescriptor::StructArray {
                base_offset: 24,
                series: vec![GcValueSeries { skip: 16, num_pointers: 2 }],
            }
        );
    }

    #[test]
    fn struct_array_multiple_runs() {
        let layout = GcLayout::StructArray {
            element_map: GcPointerMap::from_cells(&[true, false, true]),
            rank: None,
        };
        let bytes = layout.encode(8).unwrap();
        assert_eq!(bytes.len() as u32, layout.descriptor_size(8));

        match GcDescriptor::read(&bytes, 8).unwrap() {
            GcDescriptor::StructArray { base_offset, series } => {
                assert_eq!(base_offset, 16);
                assert_eq!(
                    series,
                    vec![
                        GcValueSeries { skip: 8, num_pointers: 1 },
                        GcValueSeries { skip: 0, num_pointers: 1 },
                    ]
                );
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn multi_dimensional_struct_array_on_32_bit() {
        let layout = GcLayout::StructArray {
            element_map: GcPointerMap::from_cells(&[true, false]),
            rank: Some(2),
        };
        let bytes = layout.encode(4).unwrap();
        assert_eq!(bytes.len(), 12);

        // base offset 2 + 2*2/1 = 6 words
        match GcDescriptor::read(&bytes, 4).unwrap() {
            GcDescriptor::StructArray { base_offset, series } => {
                assert_eq!(base_offset, 24);
                assert_eq!(series, vec![GcValueSeries { skip: 20, num_pointers: 1 }]);
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn size_matches_encoding_for_every_shape() {
        let maps = [
            GcPointerMap::from_cells(&[true]),
            GcPointerMap::from_cells(&[false, true, false, true, true]),
            GcPointerMap::from_cells(&[true, true, true, false, false, true]),
        ];
        for pointer_size in [4, 8] {
            for map in &maps {
                let layouts = [
                    GcLayout::Object {
                        map: map.clone(),
                        base_size: 64,
                        is_value_type: false,
                    },
                    GcLayout::Object {
                        map: map.clone(),
                        base_size: 64,
                        is_value_type: true,
                    },
                    GcLayout::ReferenceArray { base_size: 3 * pointer_size },
                    GcLayout::StructArray {
                        element_map: map.clone(),
                        rank: None,
                    },
                    GcLayout::StructArray {
                        element_map: map.clone(),
                        rank: Some(3),
                    },
                ];
                for layout in layouts {
                    assert!(layout.num_series() > 0);
                    let bytes = layout.encode(pointer_size).unwrap();
                    assert_eq!(bytes.len() as u32, layout.descriptor_size(pointer_size));
                    let decoded = GcDescriptor::read(&bytes, pointer_size).unwrap();
                    assert_eq!(decoded.size(pointer_size), layout.descriptor_size(pointer_size));
                }
            }
        }
    }

    #[test]
    fn pointer_free_layouts() {
        let layout = GcLayout::StructArray {
            element_map: GcPointerMap::new(2),
            rank: None,
        };
        assert!(!layout.contains_pointers());
        assert_eq!(layout.descriptor_size(8), 0);
        assert!(matches!(
            layout.encode(8),
            Err(crate::Error::InvariantViolation { .. })
        ));
    }

    #[test]
    fn static_descriptor() {
        let map = GcPointerMap::from_cells(&[false, true, true, false, true]);
        let bytes = encode_static(&map, 8).unwrap();
        assert_eq!(bytes.len() as u32, static_descriptor_size(&map, 8));

        let values: Vec<i32> = bytes
            .chunks(4)
            .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![2, 16, 8, 8, 32]);

        let empty = encode_static(&GcPointerMap::new(3), 8).unwrap();
        assert_eq!(empty, vec![0u8; 8]);
    }

    #[test]
    fn truncated_descriptor() {
        let bytes = GcLayout::ReferenceArray { base_size: 24 }.encode(8).unwrap();
        assert!(GcDescriptor::read(&bytes[16..], 8).is_err());
        assert!(GcDescriptor::read(&[0u8; 8], 8).is_err());
    }
}
