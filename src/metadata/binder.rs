//! Assembly binding.
//!
//! The resolution unit never loads assemblies itself. When a type reference bottoms out at an
//! assembly it has not seen yet, it builds an [`AssemblyName`] from the scope reference and asks
//! the [`AssemblyBinder`] the host supplied for the metadata of that assembly.
//!
//! [`StaticBinder`] is the binder for hosts that know all their assemblies up front: stores are
//! registered by simple name and bound without any version policy.

use std::{
    fmt::{self, Write},
    sync::Arc,
};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    metadata::{
        attributes::AssemblyFlags,
        handle::Handle,
        store::{AssemblyVersion, MetadataStore},
    },
    Error, Result,
};

/// Identity of an assembly, as requested by a scope reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyName {
    /// Simple name
    pub name: String,
    /// Requested version
    pub version: AssemblyVersion,
    /// Culture, `None` when neutral
    pub culture: Option<String>,
    /// Public key or public key token, empty when not strong named
    pub public_key_or_token: Vec<u8>,
    /// Assembly flags
    pub flags: AssemblyFlags,
}

impl AssemblyName {
    /// A culture-neutral, not strong-named assembly name
    #[must_use]
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyName {
            name: name.into(),
            version,
            culture: None,
            public_key_or_token: Vec::new(),
            flags: AssemblyFlags::empty(),
        }
    }

    /// Reads the name of the scope reference `scope` from `store`
    ///
    /// # Errors
    /// Returns an error if the scope reference or one of its heap entries is missing.
    pub fn from_scope_reference(store: &dyn MetadataStore, scope: Handle) -> Result<Self> {
        let record = store.scope_reference(scope)?;
        let culture = store.string(record.culture)?;

        Ok(AssemblyName {
            name: store.string(record.name)?.to_string(),
            version: record.version,
            culture: (!culture.is_empty()).then(|| culture.to_string()),
            public_key_or_token: store.blob(record.public_key_or_token)?.to_vec(),
            flags: record.flags,
        })
    }

    /// Reads the name of the module described by `store`
    ///
    /// # Errors
    /// Returns an error if the scope definition or one of its heap entries is missing.
    pub fn from_scope_definition(store: &dyn MetadataStore) -> Result<Self> {
        let record = store.scope_definition(store.scope())?;
        let culture = store.string(record.culture)?;

        Ok(AssemblyName {
            name: store.string(record.name)?.to_string(),
            version: record.version,
            culture: (!culture.is_empty()).then(|| culture.to_string()),
            public_key_or_token: store.blob(record.public_key)?.to_vec(),
            flags: record.flags | AssemblyFlags::PUBLIC_KEY,
        })
    }

    /// Display name, `Name, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null`
    ///
    /// Full public keys are not hashed into tokens; they are printed as `PublicKey=...`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 64);

        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        if self.public_key_or_token.is_empty() {
            result.push_str(", PublicKeyToken=null");
        } else {
            if self.flags.contains(AssemblyFlags::PUBLIC_KEY) {
                result.push_str(", PublicKey=");
            } else {
                result.push_str(", PublicKeyToken=");
            }
            for byte in &self.public_key_or_token {
                let _ = write!(result, "{byte:02x}");
            }
        }

        result
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// The result of binding an assembly: its metadata and the scope inside it
#[derive(Clone)]
pub struct BoundAssembly {
    /// The metadata of the bound assembly
    pub store: Arc<dyn MetadataStore>,
    /// Its scope definition
    pub scope: Handle,
}

impl fmt::Debug for BoundAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAssembly")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Resolves assembly names to metadata
pub trait AssemblyBinder: Send + Sync {
    /// Produce the metadata of the assembly named `name`
    ///
    /// # Errors
    /// Returns [`Error::AssemblyBind`] (or any error of the binder's own making) when the
    /// assembly cannot be produced.
    fn bind(&self, name: &AssemblyName) -> Result<BoundAssembly>;
}

/// A binder over a fixed, registered set of assemblies, keyed by simple name
#[derive(Default)]
pub struct StaticBinder {
    assemblies: DashMap<String, Arc<dyn MetadataStore>>,
}

impl StaticBinder {
    /// Creates an empty binder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` under the simple name of its scope definition
    ///
    /// # Errors
    /// Returns an error if the store's scope definition cannot be read.
    pub fn register(&self, store: Arc<dyn MetadataStore>) -> Result<String> {
        let name = AssemblyName::from_scope_definition(store.as_ref())?.name;
        debug!(assembly = %name, "registered assembly");
        self.assemblies.insert(name.clone(), store);
        Ok(name)
    }

    /// Number of registered assemblies
    #[must_use]
    pub fn len(&self) -> usize {
        self.assemblies.len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }
}

impl AssemblyBinder for StaticBinder {
    fn bind(&self, name: &AssemblyName) -> Result<BoundAssembly> {
        match self.assemblies.get(&name.name) {
            Some(store) => Ok(BoundAssembly {
                store: store.value().clone(),
                scope: store.scope(),
            }),
            None => Err(Error::AssemblyBind {
                name: name.display_name(),
                reason: "assembly is not registered".to_string(),
            }),
        }
    }
}
