//! The semantic type model
//!
//! Every type lives in a central [`TypeArena`] and is referenced by an
//! opaque [`TypeId`] handle, so types defined in one translation unit can
//! be referenced from many others (and from methods of the same unit that
//! were parsed before the type was closed) without reference cycles.
//! Interior references (vector elements, typedef targets, super
//! interfaces) are handles too, resolved through the arena.

pub mod wire;

use crate::fqname::FQName;
use crate::method::Method;
use crate::scope::Scope;

/// Handle of a type in the [`TypeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

/// Central owner of every [`Type`] in the process
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Type>,
}

impl TypeArena {
    pub fn new() -> TypeArena {
        TypeArena { types: Vec::new() }
    }

    pub fn alloc(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    /// Walk typedef aliases to the first non-typedef type. Alias chains
    /// are acyclic by construction (an alias can only reference a type
    /// that already exists), so this terminates.
    pub fn collapse_typedefs(&self, id: TypeId) -> TypeId {
        let mut current = id;
        while let Type::TypeDef(alias) = self.get(current) {
            current = alias.referenced;
        }
        current
    }

    /// The inheritance chain of an interface, most derived first,
    /// ending at the root.
    pub fn interface_chain(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(iface_id) = current {
            chain.push(iface_id);
            current = match self.get(iface_id) {
                Type::Interface(iface) => iface.super_type,
                other => panic!("interface chain through non-interface: {:?}", other),
            };
        }
        chain
    }

    /// Every method of the full chain, root interface first, paired with
    /// the interface that declares it. This is the emission order of stub
    /// switch cases and proxy methods.
    pub fn all_methods_from_root(&self, id: TypeId) -> Vec<(TypeId, &Method)> {
        let mut out = Vec::new();
        for iface_id in self.interface_chain(id).into_iter().rev() {
            match self.get(iface_id) {
                Type::Interface(iface) => {
                    for method in &iface.methods {
                        out.push((iface_id, method));
                    }
                }
                _ => unreachable!(),
            }
        }
        out
    }

    /// True if any method in the full chain is one-way.
    pub fn has_oneway_methods(&self, id: TypeId) -> bool {
        self.all_methods_from_root(id)
            .iter()
            .any(|(_, method)| method.oneway)
    }
}

/// Scalar kinds, the leaf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Char,
    Bool,
    Opaque,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl ScalarKind {
    pub fn cpp_type(self) -> &'static str {
        match self {
            ScalarKind::Char => "char",
            ScalarKind::Bool => "bool",
            ScalarKind::Opaque => "uint64_t",
            ScalarKind::Int8 => "int8_t",
            ScalarKind::UInt8 => "uint8_t",
            ScalarKind::Int16 => "int16_t",
            ScalarKind::UInt16 => "uint16_t",
            ScalarKind::Int32 => "int32_t",
            ScalarKind::UInt32 => "uint32_t",
            ScalarKind::Int64 => "int64_t",
            ScalarKind::UInt64 => "uint64_t",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    /// Suffix of the typed `Parcel` accessor pair, `write<suffix>` /
    /// `read<suffix>`.
    pub fn parcel_suffix(self) -> &'static str {
        match self {
            ScalarKind::Char => "Int8",
            ScalarKind::Bool => "Bool",
            ScalarKind::Opaque => "Uint64",
            ScalarKind::Int8 => "Int8",
            ScalarKind::UInt8 => "Uint8",
            ScalarKind::Int16 => "Int16",
            ScalarKind::UInt16 => "Uint16",
            ScalarKind::Int32 => "Int32",
            ScalarKind::UInt32 => "Uint32",
            ScalarKind::Int64 => "Int64",
            ScalarKind::UInt64 => "Uint64",
            ScalarKind::Float => "Float",
            ScalarKind::Double => "Double",
        }
    }

    pub fn is_java_compatible(self) -> bool {
        !matches!(self, ScalarKind::Opaque)
    }
}

/// Name pair carried by every user-defined type: the name local to its
/// scope and the full name assigned at scope insertion.
#[derive(Debug, Clone)]
pub struct NamedInfo {
    pub local_name: String,
    pub full_name: FQName,
}

impl NamedInfo {
    pub fn new(local_name: &str) -> NamedInfo {
        NamedInfo {
            local_name: local_name.to_string(),
            full_name: FQName::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: String,
    /// Initializer expression as written, if any.
    pub value: Option<String>,
}

#[derive(Debug)]
pub struct EnumType {
    pub info: NamedInfo,
    /// Underlying scalar storage type.
    pub storage: TypeId,
    pub values: Vec<EnumValue>,
}

#[derive(Debug)]
pub struct VectorType {
    pub element: TypeId,
}

#[derive(Debug)]
pub struct ArrayType {
    pub element: TypeId,
    /// Element count expression as written.
    pub size: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundStyle {
    Struct,
    Union,
}

#[derive(Debug)]
pub struct CompoundField {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug)]
pub struct CompoundType {
    pub info: NamedInfo,
    pub style: CompoundStyle,
    pub fields: Vec<CompoundField>,
    /// Types declared inside the struct/union body.
    pub scope: Scope,
}

/// A named alias. Aliases never form chains that cycle and they emit no
/// declaration of their own; resolution collapses them.
#[derive(Debug)]
pub struct TypeDefType {
    pub info: NamedInfo,
    pub referenced: TypeId,
}

#[derive(Debug)]
pub struct Interface {
    pub info: NamedInfo,
    pub super_type: Option<TypeId>,
    pub methods: Vec<Method>,
    /// Types declared inside the interface body.
    pub scope: Scope,
}

impl Interface {
    /// The distinguished root of every inheritance chain.
    pub fn is_ibase(&self) -> bool {
        self.info.full_name.package() == "android.hidl.base"
            && self.info.full_name.name() == "IBase"
    }
}

/// A symbol that exists outside the package graph, spelled with its full
/// C++ name.
#[derive(Debug)]
pub struct PredefinedType {
    pub cpp_name: String,
}

/// A named constant. Not a type, but it occupies a scope slot like one.
#[derive(Debug)]
pub struct Constant {
    pub info: NamedInfo,
    pub ty: TypeId,
    pub value: String,
}

/// The type sum
#[derive(Debug)]
pub enum Type {
    Scalar(ScalarKind),
    HidlString,
    Handle,
    Enum(EnumType),
    Vector(VectorType),
    Array(ArrayType),
    Compound(CompoundType),
    TypeDef(TypeDefType),
    Interface(Interface),
    Predefined(PredefinedType),
    Constant(Constant),
}

impl Type {
    pub fn is_interface(&self) -> bool {
        matches!(self, Type::Interface(_))
    }

    pub fn is_typedef(&self) -> bool {
        matches!(self, Type::TypeDef(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Type::Enum(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Type::Compound(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Type::Constant(_))
    }

    pub fn is_named_type(&self) -> bool {
        self.named_info().is_some()
    }

    pub fn named_info(&self) -> Option<&NamedInfo> {
        match self {
            Type::Enum(t) => Some(&t.info),
            Type::Compound(t) => Some(&t.info),
            Type::TypeDef(t) => Some(&t.info),
            Type::Interface(t) => Some(&t.info),
            Type::Constant(t) => Some(&t.info),
            _ => None,
        }
    }

    pub fn named_info_mut(&mut self) -> Option<&mut NamedInfo> {
        match self {
            Type::Enum(t) => Some(&mut t.info),
            Type::Compound(t) => Some(&mut t.info),
            Type::TypeDef(t) => Some(&mut t.info),
            Type::Interface(t) => Some(&mut t.info),
            Type::Constant(t) => Some(&mut t.info),
            _ => None,
        }
    }

    pub fn local_name(&self) -> Option<&str> {
        self.named_info().map(|info| info.local_name.as_str())
    }

    pub fn full_name(&self) -> Option<&FQName> {
        self.named_info().map(|info| &info.full_name)
    }

    pub fn as_interface(&self) -> Option<&Interface> {
        match self {
            Type::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    pub fn as_interface_mut(&mut self) -> Option<&mut Interface> {
        match self {
            Type::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    /// In-memory C++ type, the form stored in locals and struct fields.
    pub fn cpp_stack_type(&self, arena: &TypeArena) -> String {
        match self {
            Type::Scalar(kind) => kind.cpp_type().to_string(),
            Type::HidlString => "::android::hardware::hidl_string".to_string(),
            Type::Handle => "const ::native_handle_t*".to_string(),
            Type::Enum(t) => t.info.full_name.cpp_name(),
            Type::Vector(t) => format!(
                "::android::hardware::hidl_vec<{}>",
                arena.get(t.element).cpp_stack_type(arena)
            ),
            Type::Array(t) => format!(
                "::android::hardware::hidl_array<{}, {}>",
                arena.get(t.element).cpp_stack_type(arena),
                t.size
            ),
            Type::Compound(t) => t.info.full_name.cpp_name(),
            Type::TypeDef(t) => arena.get(t.referenced).cpp_stack_type(arena),
            Type::Interface(t) => format!("::android::sp<{}>", t.info.full_name.cpp_name()),
            Type::Predefined(t) => t.cpp_name.clone(),
            Type::Constant(_) => panic!("constants have no C++ type"),
        }
    }

    /// Value-returnable form: reference types come back from the parcel
    /// as pointers into its buffer.
    pub fn cpp_result_type(&self, arena: &TypeArena) -> String {
        match self {
            Type::HidlString | Type::Vector(_) | Type::Array(_) | Type::Compound(_) => {
                format!("const {}*", self.cpp_stack_type(arena))
            }
            Type::TypeDef(t) => arena.get(t.referenced).cpp_result_type(arena),
            _ => self.cpp_stack_type(arena),
        }
    }

    /// Parameter form in generated signatures.
    pub fn cpp_argument_type(&self, arena: &TypeArena) -> String {
        match self {
            Type::Scalar(_) | Type::Enum(_) | Type::Handle => self.cpp_stack_type(arena),
            Type::TypeDef(t) => arena.get(t.referenced).cpp_argument_type(arena),
            _ => format!("const {}&", self.cpp_stack_type(arena)),
        }
    }

    /// True when the callback receives this result as pointer-to-value
    /// and the forwarded argument must be dereferenced.
    pub fn result_needs_deref(&self, arena: &TypeArena) -> bool {
        match self {
            Type::HidlString | Type::Vector(_) | Type::Array(_) | Type::Compound(_) => true,
            Type::TypeDef(t) => arena.get(t.referenced).result_needs_deref(arena),
            _ => false,
        }
    }

    /// Whether marshaling this type requires the second, reference-fixup
    /// pass over the parcel.
    pub fn needs_resolve_references(&self, arena: &TypeArena) -> bool {
        match self {
            Type::HidlString | Type::Vector(_) => true,
            Type::Array(t) => arena.get(t.element).needs_resolve_references(arena),
            Type::Compound(t) => t
                .fields
                .iter()
                .any(|field| arena.get(field.ty).needs_resolve_references(arena)),
            Type::TypeDef(t) => arena.get(t.referenced).needs_resolve_references(arena),
            _ => false,
        }
    }

    pub fn is_java_compatible(&self, arena: &TypeArena) -> bool {
        match self {
            Type::Scalar(kind) => kind.is_java_compatible(),
            Type::HidlString => true,
            Type::Handle => false,
            Type::Enum(t) => arena.get(t.storage).is_java_compatible(arena),
            Type::Vector(t) => arena.get(t.element).is_java_compatible(arena),
            Type::Array(t) => arena.get(t.element).is_java_compatible(arena),
            Type::Compound(t) => t
                .fields
                .iter()
                .all(|field| arena.get(field.ty).is_java_compatible(arena)),
            Type::TypeDef(t) => arena.get(t.referenced).is_java_compatible(arena),
            Type::Interface(t) => {
                t.methods.iter().all(|m| m.is_java_compatible(arena))
                    && t.super_type
                        .map_or(true, |sup| arena.get(sup).is_java_compatible(arena))
            }
            Type::Predefined(_) => false,
            Type::Constant(t) => arena.get(t.ty).is_java_compatible(arena),
        }
    }
}
