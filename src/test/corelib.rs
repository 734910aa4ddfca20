//! An in-memory system module with the well-known types, and a builder to add test types to it.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::TypeSystemConfig,
    metadata::{
        attributes::{
            FieldAttributes, GenericParameterAttributes, MethodAttributes, TypeAttributes,
        },
        binder::StaticBinder,
        handle::Handle,
        memory::MetadataBuilder,
        signatures::{SignatureMethod, SignatureParameter, TypeSignature},
        store::AssemblyVersion,
        typesystem::{TypeRc, TypeSystemContext},
        unit::MetadataUnit,
    },
};

/// Name of the fixture system module
pub const SYSTEM: &str = "System.Private.CoreLib";
/// Namespace of ICastable and the marker attributes
pub const COMPILER_SERVICES: &str = "System.Runtime.CompilerServices";

const PRIMITIVES: [&str; 15] = [
    "Void", "Boolean", "Char", "SByte", "Byte", "Int16", "UInt16", "Int32", "UInt32", "Int64",
    "UInt64", "IntPtr", "UIntPtr", "Single", "Double",
];

/// Signature of a parameterless instance method returning `return_type`
pub fn instance_method(return_type: TypeSignature) -> SignatureMethod {
    SignatureMethod {
        has_this: true,
        return_type: SignatureParameter {
            base: return_type,
            ..SignatureParameter::default()
        },
        ..SignatureMethod::default()
    }
}

/// Signature of an instance method taking one object and returning `return_type`
pub fn instance_method_taking_object(return_type: TypeSignature) -> SignatureMethod {
    SignatureMethod {
        params: vec![SignatureParameter {
            base: TypeSignature::Object,
            ..SignatureParameter::default()
        }],
        ..instance_method(return_type)
    }
}

/// Signature of a parameterless static method returning nothing
pub fn static_method() -> SignatureMethod {
    SignatureMethod {
        return_type: SignatureParameter {
            base: TypeSignature::Void,
            ..SignatureParameter::default()
        },
        ..SignatureMethod::default()
    }
}

/// Flags of a virtual method that introduces a slot
pub fn new_slot() -> MethodAttributes {
    MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::NEW_SLOT
        | MethodAttributes::HIDE_BY_SIG
}

/// Flags of a virtual method that overrides an inherited slot
pub fn overriding() -> MethodAttributes {
    MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::HIDE_BY_SIG
}

/// Builds the fixture system module, plus whatever test types are added to it
pub struct CorelibBuilder {
    config: TypeSystemConfig,
    metadata: MetadataBuilder,
    types: HashMap<String, (Handle, bool)>,
}

impl CorelibBuilder {
    /// Fixture corelib for the default (x64) configuration
    pub fn new() -> Self {
        Self::with_config(TypeSystemConfig::default())
    }

    /// Fixture corelib for `config`
    pub fn with_config(config: TypeSystemConfig) -> Self {
        let mut builder = CorelibBuilder {
            config,
            metadata: MetadataBuilder::new(SYSTEM).with_version(AssemblyVersion::new(8, 0, 0, 0)),
            types: HashMap::new(),
        };
        builder.define_system_types();
        builder
    }

    fn define(&mut self, namespace: &str, name: &str, flags: TypeAttributes, base: Handle) -> Handle {
        let handle = self.metadata.define_type(namespace, name, flags, base);
        let is_enum_root = namespace == "System" && name == "Enum";
        let is_value_type = !base.is_null() && self.is_value_base(base) && !is_enum_root;
        self.types
            .insert(format!("{namespace}.{name}"), (handle, is_value_type));
        handle
    }

    fn is_value_base(&self, base: Handle) -> bool {
        base == self.handle("System.ValueType") || base == self.handle("System.Enum")
    }

    /// Handle of a type defined so far, by full name
    pub fn handle(&self, full_name: &str) -> Handle {
        self.types
            .get(full_name)
            .map_or(Handle::NULL, |(handle, _)| *handle)
    }

    fn define_system_types(&mut self) {
        let public = TypeAttributes::PUBLIC;
        let sealed_struct = public | TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT;

        let object = self.define("System", "Object", public, Handle::NULL);
        self.metadata
            .add_method(
                object,
                "Finalize",
                new_slot() - MethodAttributes::PUBLIC | MethodAttributes::FAMILY,
                &instance_method(TypeSignature::Void),
            )
            .unwrap();
        self.metadata
            .add_method(object, "ToString", new_slot(), &instance_method(TypeSignature::String))
            .unwrap();

        let value_type = self.define(
            "System",
            "ValueType",
            public | TypeAttributes::ABSTRACT,
            object,
        );
        self.define(
            "System",
            "Enum",
            public | TypeAttributes::ABSTRACT,
            value_type,
        );

        for primitive in PRIMITIVES {
            self.define("System", primitive, sealed_struct, value_type);
        }

        let string = self.define("System", "String", public | TypeAttributes::SEALED, object);
        self.metadata
            .add_field(string, "_stringLength", FieldAttributes::PRIVATE, &TypeSignature::I4)
            .unwrap();
        self.metadata
            .add_field(string, "_firstChar", FieldAttributes::PRIVATE, &TypeSignature::Char)
            .unwrap();

        self.define("System", "Array", public | TypeAttributes::ABSTRACT, object);
        self.define("System", "TypedReference", sealed_struct, value_type);

        let nullable = self.define("System", "Nullable`1", sealed_struct, value_type);
        self.metadata
            .add_generic_parameter(nullable, "T", GenericParameterAttributes::empty())
            .unwrap();
        self.metadata
            .add_field(nullable, "hasValue", FieldAttributes::PRIVATE, &TypeSignature::Boolean)
            .unwrap();
        self.metadata
            .add_field(
                nullable,
                "value",
                FieldAttributes::PRIVATE,
                &TypeSignature::GenericParamType(0),
            )
            .unwrap();

        let interface = public | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        let disposable = self.define("System", "IDisposable", interface, Handle::NULL);
        self.metadata
            .add_method(
                disposable,
                "Dispose",
                new_slot() | MethodAttributes::ABSTRACT,
                &instance_method(TypeSignature::Void),
            )
            .unwrap();

        let enumerable = self.define("System", "IEnumerable`1", interface, Handle::NULL);
        self.metadata
            .add_generic_parameter(enumerable, "T", GenericParameterAttributes::COVARIANT)
            .unwrap();

        let icastable = self.define(COMPILER_SERVICES, "ICastable", interface, Handle::NULL);
        self.metadata
            .add_method(
                icastable,
                "IsInstanceOfInterface",
                new_slot() | MethodAttributes::ABSTRACT,
                &instance_method_taking_object(TypeSignature::Boolean),
            )
            .unwrap();
        self.metadata
            .add_method(
                icastable,
                "GetImplType",
                new_slot() | MethodAttributes::ABSTRACT,
                &instance_method_taking_object(TypeSignature::Object),
            )
            .unwrap();

        let attribute = self.define("System", "Attribute", public | TypeAttributes::ABSTRACT, object);
        self.define(COMPILER_SERVICES, "IsByRefLikeAttribute", public, attribute);
        self.define(COMPILER_SERVICES, "IntrinsicAttribute", public, attribute);
    }

    /// Signature of a field typed by `type_name`: a primitive or `String`/`Object` by simple
    /// name, otherwise a type of this builder, full name or simple name in `namespace`
    fn field_signature(&self, namespace: &str, type_name: &str) -> TypeSignature {
        match type_name {
            "Boolean" => TypeSignature::Boolean,
            "Char" => TypeSignature::Char,
            "SByte" => TypeSignature::I1,
            "Byte" => TypeSignature::U1,
            "Int16" => TypeSignature::I2,
            "UInt16" => TypeSignature::U2,
            "Int32" => TypeSignature::I4,
            "UInt32" => TypeSignature::U4,
            "Int64" => TypeSignature::I8,
            "UInt64" => TypeSignature::U8,
            "IntPtr" => TypeSignature::I,
            "UIntPtr" => TypeSignature::U,
            "Single" => TypeSignature::R4,
            "Double" => TypeSignature::R8,
            "String" => TypeSignature::String,
            "Object" => TypeSignature::Object,
            other => {
                let full_name = if other.contains('.') {
                    other.to_string()
                } else {
                    format!("{namespace}.{other}")
                };
                match self.types.get(&full_name) {
                    Some((handle, true)) => TypeSignature::ValueType(*handle),
                    Some((handle, false)) => TypeSignature::Class(*handle),
                    None => panic!("fixture type {full_name} is not defined"),
                }
            }
        }
    }

    fn add_fields(&mut self, namespace: &str, ty: Handle, fields: &[(&str, &str)]) {
        for (name, type_name) in fields {
            let signature = self.field_signature(namespace, type_name);
            self.metadata
                .add_field(ty, name, FieldAttributes::PUBLIC, &signature)
                .unwrap();
        }
    }

    /// A class deriving from `System.Object` with the given instance fields
    pub fn with_class(mut self, namespace: &str, name: &str, fields: &[(&str, &str)]) -> Self {
        let object = self.handle("System.Object");
        let ty = self.define(namespace, name, TypeAttributes::PUBLIC, object);
        self.add_fields(namespace, ty, fields);
        self
    }

    /// A class deriving from `base_namespace.base_name`
    pub fn with_derived_class(
        mut self,
        namespace: &str,
        name: &str,
        base_namespace: &str,
        base_name: &str,
    ) -> Self {
        let base = self.handle(&format!("{base_namespace}.{base_name}"));
        self.define(namespace, name, TypeAttributes::PUBLIC, base);
        self
    }

    /// A sequential struct with the given instance fields
    pub fn with_struct(mut self, namespace: &str, name: &str, fields: &[(&str, &str)]) -> Self {
        let value_type = self.handle("System.ValueType");
        let ty = self.define(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
            value_type,
        );
        self.add_fields(namespace, ty, fields);
        self
    }

    /// A struct marked with `IsByRefLikeAttribute`
    pub fn with_byref_like_struct(mut self, namespace: &str, name: &str) -> Self {
        self = self.with_struct(namespace, name, &[("length", "Int32")]);
        let ty = self.handle(&format!("{namespace}.{name}"));
        let attribute = self.handle(&format!("{COMPILER_SERVICES}.IsByRefLikeAttribute"));
        self.metadata.add_custom_attribute(ty, attribute).unwrap();
        self
    }

    /// An enum over the primitive `underlying`
    pub fn with_enum(mut self, namespace: &str, name: &str, underlying: &str) -> Self {
        let enum_type = self.handle("System.Enum");
        let ty = self.define(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            enum_type,
        );
        let signature = self.field_signature(namespace, underlying);
        self.metadata
            .add_field(
                ty,
                "value__",
                FieldAttributes::PUBLIC
                    | FieldAttributes::SPECIAL_NAME
                    | FieldAttributes::RT_SPECIAL_NAME,
                &signature,
            )
            .unwrap();
        self
    }

    /// An abstract class with one abstract virtual method
    pub fn with_abstract_class(mut self, namespace: &str, name: &str) -> Self {
        let object = self.handle("System.Object");
        let ty = self.define(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
            object,
        );
        self.metadata
            .add_method(
                ty,
                "Area",
                new_slot() | MethodAttributes::ABSTRACT,
                &instance_method(TypeSignature::R8),
            )
            .unwrap();
        self
    }

    /// Adds a static constructor to an already defined type
    pub fn with_static_constructor(mut self, namespace: &str, name: &str) -> Self {
        let ty = self.handle(&format!("{namespace}.{name}"));
        self.metadata
            .add_method(
                ty,
                ".cctor",
                MethodAttributes::PRIVATE
                    | MethodAttributes::STATIC
                    | MethodAttributes::SPECIAL_NAME
                    | MethodAttributes::RT_SPECIAL_NAME,
                &static_method(),
            )
            .unwrap();
        self
    }

    /// A class overriding `Object.Finalize`
    pub fn with_finalizable_class(mut self, namespace: &str, name: &str) -> Self {
        let object = self.handle("System.Object");
        let ty = self.define(namespace, name, TypeAttributes::PUBLIC, object);
        self.metadata
            .add_method(
                ty,
                "Finalize",
                overriding() - MethodAttributes::PUBLIC | MethodAttributes::FAMILY,
                &instance_method(TypeSignature::Void),
            )
            .unwrap();
        self
    }

    /// A class implementing `ICastable` and `IDisposable`
    pub fn with_icastable_class(mut self, namespace: &str, name: &str) -> Self {
        let object = self.handle("System.Object");
        let ty = self.define(namespace, name, TypeAttributes::PUBLIC, object);
        let icastable = self.handle(&format!("{COMPILER_SERVICES}.ICastable"));
        let disposable = self.handle("System.IDisposable");
        self.metadata.add_interface(ty, icastable).unwrap();
        self.metadata.add_interface(ty, disposable).unwrap();

        let implementation = new_slot() | MethodAttributes::FINAL;
        self.metadata
            .add_method(
                ty,
                "IsInstanceOfInterface",
                implementation,
                &instance_method_taking_object(TypeSignature::Boolean),
            )
            .unwrap();
        self.metadata
            .add_method(
                ty,
                "GetImplType",
                implementation,
                &instance_method_taking_object(TypeSignature::Object),
            )
            .unwrap();
        self.metadata
            .add_method(ty, "Dispose", implementation, &instance_method(TypeSignature::Void))
            .unwrap();
        self
    }

    /// A class implementing `IDisposable` and overriding `ToString`
    pub fn with_disposable_class(mut self, namespace: &str, name: &str) -> Self {
        let object = self.handle("System.Object");
        let ty = self.define(namespace, name, TypeAttributes::PUBLIC, object);
        let disposable = self.handle("System.IDisposable");
        self.metadata.add_interface(ty, disposable).unwrap();
        self.metadata
            .add_method(
                ty,
                "ToString",
                overriding(),
                &instance_method(TypeSignature::String),
            )
            .unwrap();
        self.metadata
            .add_method(
                ty,
                "Dispose",
                new_slot() | MethodAttributes::FINAL,
                &instance_method(TypeSignature::Void),
            )
            .unwrap();
        self
    }

    /// Direct access to the underlying metadata builder
    pub fn metadata(&mut self) -> &mut MetadataBuilder {
        &mut self.metadata
    }

    /// Create a context over the fixture as its only module
    pub fn build(self) -> (Arc<TypeSystemContext>, Arc<MetadataUnit>) {
        let context = TypeSystemContext::new(self.config, Arc::new(StaticBinder::new()));
        let unit = context
            .add_module(Arc::new(self.metadata.build()))
            .unwrap();
        (context, unit)
    }
}

/// A context holding only the fixture system module
pub fn context_with_corelib() -> (Arc<TypeSystemContext>, Arc<MetadataUnit>) {
    CorelibBuilder::new().build()
}

/// Type `namespace.name` of the system module
pub fn corelib_type(context: &TypeSystemContext, namespace: &str, name: &str) -> TypeRc {
    context
        .system_module()
        .unwrap()
        .type_by_name(namespace, name)
        .unwrap()
        .unwrap_or_else(|| panic!("no fixture type {namespace}.{name}"))
}
