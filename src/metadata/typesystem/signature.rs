use std::fmt::Write;

use bitflags::bitflags;

use crate::{metadata::typesystem::TypeRc, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Calling-convention facts of a [`MethodSignature`]
    pub struct MethodSignatureFlags: u8 {
        /// Instance method
        const HAS_THIS = 0x01;
        /// `this` is passed as the first explicit parameter
        const EXPLICIT_THIS = 0x02;
        /// Variable argument list
        const VARARG = 0x04;
    }
}

/// A method signature over resolved types.
///
/// Equality compares the flags, the generic arity and the identity of every type, which is the
/// comparison member references are matched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Calling convention
    pub flags: MethodSignatureFlags,
    /// Number of method generic parameters
    pub generic_parameter_count: u32,
    /// Return type
    pub return_type: TypeRc,
    /// Parameter types; by-ref parameters are [`crate::metadata::typesystem::TypeKind::ByRef`]
    pub parameters: Vec<TypeRc>,
}

impl MethodSignature {
    /// Creates a new signature
    #[must_use]
    pub fn new(
        flags: MethodSignatureFlags,
        generic_parameter_count: u32,
        return_type: TypeRc,
        parameters: Vec<TypeRc>,
    ) -> Self {
        MethodSignature {
            flags,
            generic_parameter_count,
            return_type,
            parameters,
        }
    }

    /// True if the signature has no `this`
    #[must_use]
    pub fn is_static(&self) -> bool {
        !self.flags.contains(MethodSignatureFlags::HAS_THIS)
    }

    /// Substitute signature variables.
    ///
    /// `!n` is replaced by `type_arguments[n]` and `!!n` by `method_arguments[n]`; an empty
    /// argument list leaves the corresponding variables in place.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a variable outside a non-empty argument list.
    pub fn instantiate(
        &self,
        type_arguments: &[TypeRc],
        method_arguments: &[TypeRc],
    ) -> Result<MethodSignature> {
        let return_type = self
            .return_type
            .instantiate_signature(type_arguments, method_arguments)?;
        let parameters = self
            .parameters
            .iter()
            .map(|parameter| parameter.instantiate_signature(type_arguments, method_arguments))
            .collect::<Result<Vec<_>>>()?;

        Ok(MethodSignature {
            flags: self.flags,
            generic_parameter_count: self.generic_parameter_count,
            return_type,
            parameters,
        })
    }

    /// `ReturnType (Param1, Param2)`
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = self.return_type.display_name();
        result.push_str(" (");
        for (index, parameter) in self.parameters.iter().enumerate() {
            if index > 0 {
                result.push_str(", ");
            }
            let _ = write!(result, "{parameter}");
        }
        result.push(')');
        result
    }
}
