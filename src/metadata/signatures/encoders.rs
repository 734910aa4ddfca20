//! Signature blob encoders.
//!
//! The inverse of [`crate::metadata::signatures::SignatureParser`]. The in-memory metadata store
//! uses these to turn structured signatures into the blobs the resolution unit parses, so
//! both directions share one binary format.
//!
//! # Available Encoders
//!
//! - [`encode_type_signature`] - A single type, as found inside every other signature
//! - [`encode_method_signature`] - Method signatures for method definitions and member references
//! - [`encode_field_signature`] - Field signatures for field definitions and member references
//! - [`encode_typespec_signature`] - Type specification signatures
//! - [`encode_method_spec_signature`] - Method instantiation signatures

use crate::{
    file::io::write_compressed_uint,
    metadata::{
        handle::{Handle, HandleType},
        signatures::{
            CustomModifier, SignatureField, SignatureMethod, SignatureMethodSpec,
            SignatureParameter, SignatureTypeSpec, TypeSignature, CALLING_CONVENTION,
            ELEMENT_TYPE, SIGNATURE_HEADER,
        },
    },
    Result,
};

/// Encodes a handle as a `TypeDefOrRefOrSpec` coded index (ECMA-335 §II.23.2.8).
///
/// - TypeDefinition: `(row << 2) | 0`
/// - TypeReference: `(row << 2) | 1`
/// - TypeSpecification: `(row << 2) | 2`
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the handle is of any other kind.
pub fn encode_type_handle(handle: Handle) -> Result<u32> {
    let row = handle.row();

    match handle.handle_type()? {
        HandleType::TypeDefinition => Ok(row << 2),
        HandleType::TypeReference => Ok((row << 2) | 1),
        HandleType::TypeSpecification => Ok((row << 2) | 2),
        other => Err(malformed_error!(
            "Invalid handle kind {} for a type coded index - {}",
            other,
            handle
        )),
    }
}

fn encode_custom_modifier(modifier: &CustomModifier, buffer: &mut Vec<u8>) -> Result<()> {
    buffer.push(if modifier.is_required {
        ELEMENT_TYPE::CMOD_REQD
    } else {
        ELEMENT_TYPE::CMOD_OPT
    });

    write_compressed_uint(buffer, encode_type_handle(modifier.modifier_type)?)
}

fn encode_custom_modifiers(modifiers: &[CustomModifier], buffer: &mut Vec<u8>) -> Result<()> {
    for modifier in modifiers {
        encode_custom_modifier(modifier, buffer)?;
    }
    Ok(())
}

fn encode_count(count: usize, buffer: &mut Vec<u8>) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| malformed_error!("Signature list too long - {}", count))?;
    write_compressed_uint(buffer, count)
}

/// Parameters are encoded as `CustomMod* [BYREF] Type` (ECMA-335 §II.23.2.10)
fn encode_parameter(parameter: &SignatureParameter, buffer: &mut Vec<u8>) -> Result<()> {
    encode_custom_modifiers(&parameter.modifiers, buffer)?;

    if parameter.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }

    encode_type_signature(&parameter.base, buffer)
}

/// Appends the encoding of a single type to `buffer`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for [`TypeSignature::Unknown`], for handles that are not
/// type handles, or for counts that do not fit a compressed integer.
pub fn encode_type_signature(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Unknown => {
            return Err(malformed_error!("Cannot encode an unknown type signature"))
        }
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::TypedByRef => buffer.push(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::Ptr(pointer) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_custom_modifiers(&pointer.modifiers, buffer)?;
            encode_type_signature(&pointer.base, buffer)?;
        }
        TypeSignature::ByRef(inner) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::ValueType(handle) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            write_compressed_uint(buffer, encode_type_handle(*handle)?)?;
        }
        TypeSignature::Class(handle) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            write_compressed_uint(buffer, encode_type_handle(*handle)?)?;
        }
        TypeSignature::GenericParamType(index) => {
            buffer.push(ELEMENT_TYPE::VAR);
            write_compressed_uint(buffer, *index)?;
        }
        TypeSignature::GenericParamMethod(index) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            write_compressed_uint(buffer, *index)?;
        }
        TypeSignature::Array(array) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type_signature(&array.base, buffer)?;
            write_compressed_uint(buffer, array.rank)?;

            // Sizes must form a prefix of the dimensions, as must lower bounds
            let sizes: Vec<u32> = array.dimensions.iter().map_while(|d| d.size).collect();
            encode_count(sizes.len(), buffer)?;
            for size in sizes {
                write_compressed_uint(buffer, size)?;
            }

            let bounds: Vec<u32> = array
                .dimensions
                .iter()
                .map_while(|d| d.lower_bound)
                .collect();
            encode_count(bounds.len(), buffer)?;
            for bound in bounds {
                write_compressed_uint(buffer, bound)?;
            }
        }
        TypeSignature::GenericInst(definition, arguments) => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type_signature(definition, buffer)?;
            encode_count(arguments.len(), buffer)?;
            for argument in arguments {
                encode_type_signature(argument, buffer)?;
            }
        }
        TypeSignature::FnPtr(method) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            encode_method_signature_into(method, buffer)?;
        }
        TypeSignature::SzArray(array) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_custom_modifiers(&array.modifiers, buffer)?;
            encode_type_signature(&array.base, buffer)?;
        }
        TypeSignature::Pinned(inner) => {
            buffer.push(ELEMENT_TYPE::PINNED);
            encode_type_signature(inner, buffer)?;
        }
    }

    Ok(())
}

fn encode_method_signature_into(signature: &SignatureMethod, buffer: &mut Vec<u8>) -> Result<()> {
    let mut calling_convention = if signature.vararg {
        CALLING_CONVENTION::VARARG
    } else {
        CALLING_CONVENTION::DEFAULT
    };

    if signature.has_this {
        calling_convention |= CALLING_CONVENTION::HASTHIS;
    }

    if signature.explicit_this {
        calling_convention |= CALLING_CONVENTION::EXPLICITTHIS;
    }

    if signature.param_count_generic > 0 {
        calling_convention |= CALLING_CONVENTION::GENERIC;
    }

    buffer.push(calling_convention);

    if signature.param_count_generic > 0 {
        write_compressed_uint(buffer, signature.param_count_generic)?;
    }

    encode_count(signature.params.len() + signature.varargs.len(), buffer)?;

    encode_parameter(&signature.return_type, buffer)?;
    for param in &signature.params {
        encode_parameter(param, buffer)?;
    }

    if !signature.varargs.is_empty() {
        buffer.push(ELEMENT_TYPE::SENTINEL);
        for param in &signature.varargs {
            encode_parameter(param, buffer)?;
        }
    }

    Ok(())
}

/// Encodes a method signature into its blob form.
///
/// # Errors
///
/// Returns an error if the return type or any parameter cannot be encoded.
///
/// # Examples
///
/// ```rust
/// use eetype::metadata::signatures::{encode_method_signature, SignatureMethod, TypeSignature};
///
/// let signature = SignatureMethod::new(true, TypeSignature::Void, vec![TypeSignature::I4]);
/// assert_eq!(encode_method_signature(&signature)?, vec![0x20, 0x01, 0x01, 0x08]);
/// # Ok::<(), eetype::Error>(())
/// ```
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_method_signature_into(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encodes a field signature: prolog `0x06`, custom modifiers, then the field type.
///
/// # Errors
///
/// Returns an error if the field type cannot be encoded.
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];

    encode_custom_modifiers(&signature.modifiers, &mut buffer)?;
    encode_type_signature(&signature.base, &mut buffer)?;

    Ok(buffer)
}

/// Encodes a type specification signature.
///
/// # Errors
///
/// Returns an error if the type cannot be encoded.
pub fn encode_typespec_signature(signature: &SignatureTypeSpec) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_type_signature(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encodes a method instantiation signature: prolog `0x0A`, argument count, arguments.
///
/// # Errors
///
/// Returns an error if any argument cannot be encoded.
pub fn encode_method_spec_signature(signature: &SignatureMethodSpec) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::METHOD_SPEC];

    encode_count(signature.generic_args.len(), &mut buffer)?;
    for argument in &signature.generic_args {
        encode_type_signature(argument, &mut buffer)?;
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{
        parse_field_signature, parse_method_signature, parse_type_spec_signature,
        ArrayDimensions, SignatureArray,
    };

    #[test]
    fn type_handle_coded_index() {
        assert_eq!(
            encode_type_handle(Handle::new(HandleType::TypeDefinition, 3)).unwrap(),
            12
        );
        assert_eq!(
            encode_type_handle(Handle::new(HandleType::TypeReference, 3)).unwrap(),
            13
        );
        assert_eq!(
            encode_type_handle(Handle::new(HandleType::TypeSpecification, 3)).unwrap(),
            14
        );
        assert!(encode_type_handle(Handle::new(HandleType::Method, 3)).is_err());
    }

    #[test]
    fn encode_primitive_method() {
        let signature = SignatureMethod::new(false, TypeSignature::I4, vec![TypeSignature::String]);
        assert_eq!(
            encode_method_signature(&signature).unwrap(),
            vec![0x00, 0x01, 0x08, 0x0E]
        );
    }

    #[test]
    fn encode_generic_method_parses_back() {
        let list = Handle::new(HandleType::TypeReference, 18);
        let signature = SignatureMethod::new(
            true,
            TypeSignature::generic_inst(
                TypeSignature::Class(list),
                vec![TypeSignature::GenericParamMethod(0)],
            ),
            vec![TypeSignature::sz_array(TypeSignature::GenericParamMethod(0))],
        )
        .with_generic_arity(1);

        let blob = encode_method_signature(&signature).unwrap();
        assert_eq!(&blob[..3], &[0x30, 0x01, 0x01]);
        assert_eq!(parse_method_signature(&blob).unwrap(), signature);
    }

    #[test]
    fn encode_field_with_modifier() {
        let volatile = Handle::new(HandleType::TypeReference, 2);
        let signature = SignatureField {
            modifiers: vec![CustomModifier {
                is_required: true,
                modifier_type: volatile,
            }],
            base: TypeSignature::I4,
        };

        let blob = encode_field_signature(&signature).unwrap();
        assert_eq!(blob, vec![0x06, 0x1F, 0x09, 0x08]);
        assert_eq!(parse_field_signature(&blob).unwrap(), signature);
    }

    #[test]
    fn encode_multi_dimensional_array() {
        let signature = SignatureTypeSpec {
            base: TypeSignature::Array(SignatureArray {
                base: Box::new(TypeSignature::R8),
                rank: 2,
                dimensions: vec![
                    ArrayDimensions {
                        size: Some(4),
                        lower_bound: Some(1),
                    },
                    ArrayDimensions {
                        size: Some(5),
                        lower_bound: Some(0),
                    },
                ],
            }),
        };

        let blob = encode_typespec_signature(&signature).unwrap();
        assert_eq!(blob, vec![0x14, 0x0D, 0x02, 0x02, 0x04, 0x05, 0x02, 0x01, 0x00]);
        assert_eq!(parse_type_spec_signature(&blob).unwrap(), signature);
    }

    #[test]
    fn encode_unknown_fails() {
        let mut buffer = Vec::new();
        assert!(encode_type_signature(&TypeSignature::Unknown, &mut buffer).is_err());
    }
}
