//! Name-based type hash codes.
//!
//! The EEType hash code is derived from the type's name and shape alone, so it is identical in
//! every process and every image. Names are hashed over UTF-16 code units with two interleaved
//! accumulators; composite types mix the hash of their components.

/// Seed of the first name accumulator
const NAME_HASH_SEED: u32 = 0x6DA3_B944;
/// Base hash of array types; the rank is added to it
const ARRAY_HASH_BASE: u32 = 0xD531_3556;
/// Mixed into pointer type hashes
const POINTER_HASH_SALT: u32 = 0x12D0;
/// Mixed into by-ref type hashes
const BYREF_HASH_SALT: u32 = 0x4C85;

/// Incremental name hash, equivalent to hashing the concatenation of every appended piece
#[derive(Debug, Clone, Copy)]
pub struct HashCodeBuilder {
    hash1: u32,
    hash2: u32,
    characters: usize,
}

impl HashCodeBuilder {
    /// Start a hash with `seed` already appended
    #[must_use]
    pub fn new(seed: &str) -> Self {
        let mut builder = HashCodeBuilder {
            hash1: NAME_HASH_SEED,
            hash2: 0,
            characters: 0,
        };
        builder.append(seed);
        builder
    }

    /// Append `text`
    pub fn append(&mut self, text: &str) {
        for unit in text.encode_utf16() {
            let unit = u32::from(unit);
            if self.characters % 2 == 0 {
                self.hash1 = self.hash1.wrapping_add(self.hash1.rotate_left(5)) ^ unit;
            } else {
                self.hash2 = self.hash2.wrapping_add(self.hash2.rotate_left(5)) ^ unit;
            }
            self.characters += 1;
        }
    }

    /// Final hash code
    #[must_use]
    pub fn finish(&self) -> u32 {
        let hash1 = self.hash1.wrapping_add(self.hash1.rotate_left(8));
        let hash2 = self.hash2.wrapping_add(self.hash2.rotate_left(8));
        hash1 ^ hash2
    }
}

/// Hash of a name
#[must_use]
pub fn name_hash(name: &str) -> u32 {
    HashCodeBuilder::new(name).finish()
}

/// Hash of a top-level type, `namespace.name`
#[must_use]
pub fn type_hash(namespace: &str, name: &str) -> u32 {
    let mut builder = HashCodeBuilder::new(namespace);
    if !namespace.is_empty() {
        builder.append(".");
    }
    builder.append(name);
    builder.finish()
}

/// Hash of a type nested in a type with hash `enclosing`
#[must_use]
pub fn nested_type_hash(enclosing: u32, name: &str) -> u32 {
    enclosing.wrapping_add(enclosing.rotate_left(11)) ^ name_hash(name)
}

/// Hash of an array of the element with hash `element`; `rank` is 1 for single-dimension arrays
#[must_use]
pub fn array_type_hash(element: u32, rank: u32) -> u32 {
    let hash = ARRAY_HASH_BASE.wrapping_add(rank);
    let hash = hash.wrapping_add(hash.rotate_left(13)) ^ element;
    hash.wrapping_add(hash.rotate_left(15))
}

/// Hash of a pointer to the type with hash `pointee`
#[must_use]
pub fn pointer_type_hash(pointee: u32) -> u32 {
    pointee.wrapping_add(pointee.rotate_left(5)) ^ POINTER_HASH_SALT
}

/// Hash of a by-ref to the type with hash `parameter`
#[must_use]
pub fn byref_type_hash(parameter: u32) -> u32 {
    parameter.wrapping_add(parameter.rotate_left(7)) ^ BYREF_HASH_SALT
}

/// Hash of a generic instantiation of `definition` over `arguments`
#[must_use]
pub fn generic_instance_hash(definition: u32, arguments: &[u32]) -> u32 {
    let hash = arguments.iter().fold(definition, |hash, argument| {
        hash.wrapping_add(hash.rotate_left(13)) ^ argument
    });
    hash.wrapping_add(hash.rotate_left(15))
}

/// Hash of a method signature, used for function pointer types
#[must_use]
pub fn method_signature_hash(return_type: u32, parameters: &[u32]) -> u32 {
    generic_instance_hash(return_type, parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_whole() {
        let mut builder = HashCodeBuilder::new("System");
        builder.append(".");
        builder.append("Object");
        assert_eq!(builder.finish(), name_hash("System.Object"));
        assert_eq!(type_hash("System", "Object"), name_hash("System.Object"));
        assert_eq!(type_hash("", "Program"), name_hash("Program"));
    }

    #[test]
    fn empty_name() {
        let seed = NAME_HASH_SEED.wrapping_add(NAME_HASH_SEED.rotate_left(8));
        assert_eq!(name_hash(""), seed);
    }

    #[test]
    fn shapes_are_distinguished() {
        let element = type_hash("System", "Int32");
        let hashes = [
            element,
            array_type_hash(element, 1),
            array_type_hash(element, 2),
            pointer_type_hash(element),
            byref_type_hash(element),
            generic_instance_hash(element, &[element]),
        ];
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            generic_instance_hash(name_hash("List`1"), &[name_hash("A")]),
            generic_instance_hash(name_hash("List`1"), &[name_hash("A")])
        );
        assert_ne!(
            generic_instance_hash(1, &[2, 3]),
            generic_instance_hash(1, &[3, 2])
        );
        assert_ne!(nested_type_hash(7, "Inner"), name_hash("Inner"));
    }
}
