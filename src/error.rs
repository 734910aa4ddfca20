use thiserror::Error;

use crate::runtime::layout::EETypeField;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure taxonomy of the type-description engine. Format errors are
/// raised for malformed metadata or descriptor bytes, missing-member and load errors come out of
/// metadata resolution, and invariant violations flag a caller that broke a descriptor contract.
/// None of these are recovered from locally; the resolution layer only caches successes.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Malformed`] - Unknown handle kind, bad signature header, corrupt optional fields
/// - [`Error::OutOfBounds`] - Attempted to read beyond a blob or image boundary
/// - [`Error::RecursionLimit`] - Signature or reference nesting beyond the configured depth
///
/// ## Resolution Errors
/// - [`Error::MissingMember`] - Name/signature lookup exhausted every candidate
/// - [`Error::TypeLoad`] - A named type does not exist in the module it should live in
/// - [`Error::AssemblyBind`] - The assembly binder could not produce the requested assembly
/// - [`Error::UnitUnavailable`] - An entity outlived the context that created it
///
/// ## Invariant Violations
/// - [`Error::InvariantViolation`] - A descriptor contract was broken by the caller
/// - [`Error::FieldNotPresent`] - An EEType field offset was requested for an absent field
/// - [`Error::ICastableNotImplemented`] - ICastable slot lookup ran off the base-type chain
///
/// # Examples
///
/// ```rust,ignore
/// use eetype::Error;
///
/// match unit.get_type(handle) {
///     Ok(ty) => println!("resolved {}", ty.full_name()?),
///     Err(Error::TypeLoad { type_name, module }) => {
///         eprintln!("type {type_name} not found in {module}");
///     }
///     Err(Error::MissingMember { owner, member }) => {
///         eprintln!("{owner} has no member {member}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// Raised for metadata of an unexpected shape, such as an unknown handle kind or a
    /// field signature where a method signature was expected. The error carries the
    /// source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    ///
    /// Occurs when reading past the end of a blob, an optional-fields stream, or a
    /// type image.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Recursion limit reached.
    ///
    /// Signature parsing and reference resolution are recursive; this error stops
    /// malicious or cyclic input from exhausting the stack.
    ///
    /// The associated value is the depth limit that was exceeded.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A member lookup exhausted all candidates.
    ///
    /// Produced by member-reference resolution after walking the entire base-type chain,
    /// and by nested-type lookup when the enclosing type has no nested type of that name.
    #[error("Member '{member}' not found on '{owner}'")]
    MissingMember {
        /// Fully qualified name of the type that was searched
        owner: String,
        /// Name of the member that could not be found
        member: String,
    },

    /// A named type could not be found in its expected module.
    #[error("Could not load type '{type_name}' from module '{module}'")]
    TypeLoad {
        /// Fully qualified name of the type
        type_name: String,
        /// Name of the module that was searched
        module: String,
    },

    /// The assembly binder failed to produce an assembly.
    ///
    /// The binder's failure is propagated unchanged apart from being wrapped here.
    #[error("Failed to bind assembly '{name}' - {reason}")]
    AssemblyBind {
        /// Display form of the requested assembly name
        name: String,
        /// Binder supplied reason
        reason: String,
    },

    /// A descriptor invariant was violated.
    ///
    /// This indicates a bug in the caller rather than malformed input, e.g. requesting a
    /// GC descriptor for a type without GC pointers, or building a descriptor that carries
    /// both a nullable target type and sealed virtual slots.
    #[error("Invariant violated - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message to be printed for the violation
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The offset of an EEType field was requested while its presence flag is unset.
    ///
    /// Callers must check presence before asking for the offset.
    #[error("EEType field {0} is not present on this descriptor")]
    FieldNotPresent(EETypeField),

    /// ICastable slot lookup walked the whole base-type chain without finding an override.
    #[error("No ICastable implementation found on '{type_name}' or its base types")]
    ICastableNotImplemented {
        /// Description of the type the lookup started from
        type_name: String,
    },

    /// The owning metadata unit or type-system context has been dropped.
    #[error("The owning metadata unit or context is no longer available")]
    UnitUnavailable,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
