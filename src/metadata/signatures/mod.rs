//! Method, field and type signature blobs.
//!
//! Signatures are the compact ECMA-335 binary descriptions of types and members that metadata
//! records point at: a method record carries a method signature, a type specification carries
//! a type signature, a member reference carries either kind. The resolution unit parses them on
//! demand and turns the parsed form into canonical type-system entities.
//!
//! # Signature Types
//!
//! - **Method Signatures** - Calling convention, generic arity, return and parameter types
//! - **Field Signatures** - Field type and custom modifiers
//! - **TypeSpec Signatures** - Instantiations, arrays, pointers and other constructed types
//! - **MethodSpec Signatures** - Type arguments of a generic method instantiation
//!
//! Type references inside a blob are `TypeDefOrRefOrSpec` coded indices, decoded directly into
//! [`crate::metadata::handle::Handle`]s of the owning store.
//!
//! # Examples
//!
//! ```rust
//! use eetype::metadata::signatures::{parse_method_signature, TypeSignature};
//!
//! // instance string M()
//! let method_sig = parse_method_signature(&[0x20, 0x00, 0x0E])?;
//! assert!(method_sig.has_this);
//! assert_eq!(method_sig.return_type.base, TypeSignature::String);
//! # Ok::<(), eetype::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2 - Blobs and Signatures

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a `MethodSignature` from a byte slice
///
/// ## Arguments
/// * 'data' - The input slice to parse
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_signature()
}

/// Parse a `FieldSignature` from a byte slice
///
/// ## Arguments
/// * 'data' - The input slice to parse
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    let mut parser = SignatureParser::new(data);
    parser.parse_field_signature()
}

/// Parse a `TypeSpecSignature` from a byte slice
///
/// ## Arguments
/// * 'data' - The input slice to parse
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_type_spec_signature(data: &[u8]) -> Result<SignatureTypeSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_type_spec_signature()
}

/// Parse a `MethodSpecSignature` from a byte slice
///
/// ## Arguments
/// * 'data' - The input slice to parse
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_spec_signature()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::handle::{Handle, HandleType};

    #[test]
    fn test_parse_method_signature() {
        // static void M(int, string)
        let result = parse_method_signature(&[0x00, 0x02, 0x01, 0x08, 0x0E]).unwrap();

        assert!(!result.has_this);
        assert_eq!(result.return_type.base, TypeSignature::Void);
        assert_eq!(result.params.len(), 2);
        assert_eq!(result.params[0].base, TypeSignature::I4);
        assert_eq!(result.params[1].base, TypeSignature::String);
    }

    #[test]
    fn test_parse_field_signature() {
        let result = parse_field_signature(&[0x06, 0x11, 0x08]).unwrap();
        assert!(result.modifiers.is_empty());
        assert_eq!(
            result.base,
            TypeSignature::ValueType(Handle::new(HandleType::TypeDefinition, 2))
        );
    }

    #[test]
    fn test_parse_type_spec_signature() {
        // List<T> where T is the first type parameter
        let result = parse_type_spec_signature(&[0x15, 0x12, 0x05, 0x01, 0x13, 0x00]).unwrap();
        assert_eq!(
            result.base,
            TypeSignature::generic_inst(
                TypeSignature::Class(Handle::new(HandleType::TypeReference, 1)),
                vec![TypeSignature::GenericParamType(0)]
            )
        );
    }

    #[test]
    fn test_parse_method_spec_signature() {
        let result = parse_method_spec_signature(&[0x0A, 0x02, 0x08, 0x1C]).unwrap();
        assert_eq!(
            result.generic_args,
            vec![TypeSignature::I4, TypeSignature::Object]
        );

        assert!(parse_method_spec_signature(&[0x0B, 0x01, 0x08]).is_err());
    }
}
