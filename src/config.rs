//! Target and type-system configuration
//!
//! Everything that varies between targets (pointer width, architecture specific rare flags) and
//! every knob of the metadata resolution layer lives here. Configuration is passed explicitly to
//! the [`crate::metadata::typesystem::TypeSystemContext`] and to the descriptor builders; there is
//! no process-wide state.

use strum::{Display, EnumIter};

/// Target architecture the descriptors are produced for.
///
/// Only affects rare flags: `RequiresAlign8` is an ARM32 concept, and homogeneous float
/// aggregates (HFA) are only tracked on ARM targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TargetArchitecture {
    /// 32-bit x86
    X86,
    /// 64-bit x86
    X64,
    /// 32-bit ARM
    Arm,
    /// 64-bit ARM
    Arm64,
}

/// Width of a target pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerSize {
    /// 32-bit pointers
    Four,
    /// 64-bit pointers
    Eight,
}

impl PointerSize {
    /// Number of bytes in a pointer
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            PointerSize::Four => 4,
            PointerSize::Eight => 8,
        }
    }
}

/// Description of the target machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDetails {
    /// Target instruction set
    pub architecture: TargetArchitecture,
    /// Target pointer width
    pub pointer_size: PointerSize,
}

impl Default for TargetDetails {
    fn default() -> Self {
        Self::x64()
    }
}

impl TargetDetails {
    /// 64-bit x86 target
    #[must_use]
    pub fn x64() -> Self {
        Self {
            architecture: TargetArchitecture::X64,
            pointer_size: PointerSize::Eight,
        }
    }

    /// 32-bit x86 target
    #[must_use]
    pub fn x86() -> Self {
        Self {
            architecture: TargetArchitecture::X86,
            pointer_size: PointerSize::Four,
        }
    }

    /// 32-bit ARM target
    #[must_use]
    pub fn arm() -> Self {
        Self {
            architecture: TargetArchitecture::Arm,
            pointer_size: PointerSize::Four,
        }
    }

    /// 64-bit ARM target
    #[must_use]
    pub fn arm64() -> Self {
        Self {
            architecture: TargetArchitecture::Arm64,
            pointer_size: PointerSize::Eight,
        }
    }

    /// Pointer size in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size.bytes()
    }

    /// Returns true for either ARM flavour
    #[must_use]
    pub fn is_arm(&self) -> bool {
        matches!(
            self.architecture,
            TargetArchitecture::Arm | TargetArchitecture::Arm64
        )
    }

    /// Smallest object the allocator hands out: sync block, EEType pointer and one slot
    #[must_use]
    pub fn minimum_object_size(&self) -> u32 {
        3 * self.pointer_size()
    }
}

/// Configuration of the type system and the metadata resolution units it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSystemConfig {
    /// The machine descriptors are computed for
    pub target: TargetDetails,

    /// Name of the assembly that defines `System.Object` and the primitives
    pub system_module: String,

    /// Namespace and name of the ICastable interface, if the runtime supports it
    pub icastable_interface: Option<(String, String)>,

    /// Maximum nesting of type references and signatures before giving up (default: 64)
    pub max_nesting_depth: usize,
}

impl Default for TypeSystemConfig {
    fn default() -> Self {
        Self {
            target: TargetDetails::default(),
            system_module: "System.Private.CoreLib".to_string(),
            icastable_interface: Some((
                "System.Runtime.CompilerServices".to_string(),
                "ICastable".to_string(),
            )),
            max_nesting_depth: 64,
        }
    }
}

impl TypeSystemConfig {
    /// Default configuration retargeted to `target`
    #[must_use]
    pub fn for_target(target: TargetDetails) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Replace the name of the system module
    #[must_use]
    pub fn with_system_module(mut self, name: impl Into<String>) -> Self {
        self.system_module = name.into();
        self
    }

    /// Disable ICastable support entirely
    #[must_use]
    pub fn without_icastable(mut self) -> Self {
        self.icastable_interface = None;
        self
    }

    /// Replace the nesting limit
    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Pointer size of the configured target, in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.target.pointer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn presets_match_architecture() {
        for arch in TargetArchitecture::iter() {
            let target = match arch {
                TargetArchitecture::X86 => TargetDetails::x86(),
                TargetArchitecture::X64 => TargetDetails::x64(),
                TargetArchitecture::Arm => TargetDetails::arm(),
                TargetArchitecture::Arm64 => TargetDetails::arm64(),
            };
            assert_eq!(target.architecture, arch);
            assert_eq!(target.minimum_object_size(), 3 * target.pointer_size());
        }
        assert_eq!(TargetDetails::arm().pointer_size(), 4);
        assert!(TargetDetails::arm64().is_arm());
        assert!(!TargetDetails::x86().is_arm());
    }

    #[test]
    fn builder_style_overrides() {
        let config = TypeSystemConfig::for_target(TargetDetails::x86())
            .with_system_module("mscorlib")
            .without_icastable()
            .with_max_nesting_depth(8);

        assert_eq!(config.pointer_size(), 4);
        assert_eq!(config.system_module, "mscorlib");
        assert!(config.icastable_interface.is_none());
        assert_eq!(config.max_nesting_depth, 8);
        assert_eq!(TypeSystemConfig::default().max_nesting_depth, 64);
    }
}
