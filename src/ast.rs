//! One translation unit and the process-wide unit registry
//!
//! An [`Ast`] is built by the parser through the scope-entry API, closed,
//! and registered. Imports are parsed synchronously through the
//! [`Coordinator`] and land in the same registry, deduplicated by unit
//! name, so the import graph is a DAG of registry handles. After an AST
//! is closed it is only ever read.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error};

use crate::coordinator::Coordinator;
use crate::error::{Error, ResolveError};
use crate::fqname::FQName;
use crate::method::Method;
use crate::scope::Scope;
use crate::types::{
    CompoundField, CompoundStyle, CompoundType, Constant, EnumType, EnumValue, Interface,
    NamedInfo, PredefinedType, Type, TypeArena, TypeDefType, TypeId,
};

/// Handle of a registered translation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AstId(u32);

/// Owner of every closed [`Ast`], keyed by unit name
#[derive(Debug, Default)]
pub struct AstRegistry {
    asts: Vec<Ast>,
    by_unit: HashMap<String, AstId>,
}

impl AstRegistry {
    pub fn new() -> AstRegistry {
        AstRegistry::default()
    }

    /// Register a closed unit. The unit name (`p@1.0::IFoo` or
    /// `p@1.0::types`) must not already be present.
    pub fn register(&mut self, ast: Ast, arena: &TypeArena) -> AstId {
        let unit = ast.unit_fqname(arena).string();
        assert!(
            !self.by_unit.contains_key(&unit),
            "duplicate registration of {}",
            unit
        );
        let id = AstId(self.asts.len() as u32);
        self.by_unit.insert(unit, id);
        self.asts.push(ast);
        id
    }

    pub fn lookup(&self, unit: &FQName) -> Option<AstId> {
        self.by_unit.get(&unit.string()).copied()
    }

    pub fn get(&self, id: AstId) -> &Ast {
        &self.asts[id.0 as usize]
    }
}

/// One step of the active scope path
#[derive(Debug, Clone, Copy)]
enum ScopeHandle {
    Root,
    /// A type whose variant owns a scope (interface or compound).
    Nested(TypeId),
}

/// A single parsed translation unit
#[derive(Debug)]
pub struct Ast {
    package: FQName,
    path: String,
    root_scope: Scope,
    scope_path: Vec<ScopeHandle>,
    imported_asts: BTreeSet<AstId>,
    /// Every type defined transitively in this unit, by full name.
    defined_types: BTreeMap<FQName, TypeId>,
    /// Names whose artifacts must be `#include`d by generated C++.
    imported_names: BTreeSet<FQName>,
    /// Referenced named types visible to the Java backend.
    imported_names_for_java: BTreeSet<FQName>,
}

impl Ast {
    /// `package` must be a package reference: package and version set,
    /// no type name.
    pub fn new(package: FQName, path: &str) -> Ast {
        assert!(
            package.is_valid() && !package.package().is_empty() && package.name().is_empty(),
            "not a package reference: {}",
            package
        );
        Ast {
            package,
            path: path.to_string(),
            root_scope: Scope::new(""),
            scope_path: vec![ScopeHandle::Root],
            imported_asts: BTreeSet::new(),
            defined_types: BTreeMap::new(),
            imported_names: BTreeSet::new(),
            imported_names_for_java: BTreeSet::new(),
        }
    }

    pub fn package(&self) -> &FQName {
        &self.package
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn root_scope(&self) -> &Scope {
        &self.root_scope
    }

    pub fn imported_asts(&self) -> &BTreeSet<AstId> {
        &self.imported_asts
    }

    pub fn imported_names(&self) -> &BTreeSet<FQName> {
        &self.imported_names
    }

    pub fn imported_names_for_java(&self) -> &BTreeSet<FQName> {
        &self.imported_names_for_java
    }

    pub fn defined_types(&self) -> &BTreeMap<FQName, TypeId> {
        &self.defined_types
    }

    /// The root interface, if this unit defines one.
    pub fn interface_id(&self) -> Option<TypeId> {
        self.root_scope.interface()
    }

    pub fn interface_name(&self, arena: &TypeArena) -> Option<String> {
        self.interface_id()
            .map(|id| arena.get(id).local_name().expect("unnamed interface").to_string())
    }

    pub fn is_interface(&self) -> bool {
        self.interface_id().is_some()
    }

    /// `p@1.0::IFoo` for an interface unit, `p@1.0::types` otherwise.
    pub fn unit_fqname(&self, arena: &TypeArena) -> FQName {
        let name = self
            .interface_name(arena)
            .unwrap_or_else(|| "types".to_string());
        self.package.with_name(&name)
    }

    // ---- scope-entry API (used by the parser) ----

    fn current_handle(&self) -> ScopeHandle {
        *self
            .scope_path
            .last()
            .expect("scope path empty outside parsing")
    }

    fn scope_of<'a>(&'a self, arena: &'a TypeArena, handle: ScopeHandle) -> &'a Scope {
        match handle {
            ScopeHandle::Root => &self.root_scope,
            ScopeHandle::Nested(id) => match arena.get(id) {
                Type::Interface(iface) => &iface.scope,
                Type::Compound(compound) => &compound.scope,
                other => panic!("scope path through scopeless type: {:?}", other),
            },
        }
    }

    pub fn leave_scope(&mut self) {
        assert!(self.scope_path.len() > 1, "cannot leave the root scope");
        self.scope_path.pop();
    }

    /// Insert a freshly allocated named type into the current scope,
    /// assign its full name from the scope path, and index it.
    pub fn add_scoped_type(
        &mut self,
        arena: &mut TypeArena,
        type_id: TypeId,
    ) -> Result<(), ResolveError> {
        let (local_name, is_interface) = {
            let ty = arena.get(type_id);
            (
                ty.local_name()
                    .expect("add_scoped_type on unnamed type")
                    .to_string(),
                ty.is_interface(),
            )
        };

        let mut path = String::new();
        for handle in &self.scope_path[1..] {
            let scope = self.scope_of(arena, *handle);
            path.push_str(scope.local_name());
            path.push('.');
        }
        path.push_str(&local_name);

        let full_name = FQName::new(self.package.package(), self.package.version(), &path);

        match self.current_handle() {
            ScopeHandle::Root => self.root_scope.add_type(&local_name, type_id, is_interface)?,
            ScopeHandle::Nested(scope_ty) => {
                let scope = match arena.get_mut(scope_ty) {
                    Type::Interface(iface) => &mut iface.scope,
                    Type::Compound(compound) => &mut compound.scope,
                    _ => unreachable!(),
                };
                scope.add_type(&local_name, type_id, is_interface)?;
            }
        }

        arena
            .get_mut(type_id)
            .named_info_mut()
            .expect("named type lost its info")
            .full_name = full_name.clone();
        let previous = self.defined_types.insert(full_name, type_id);
        assert!(previous.is_none(), "full name indexed twice");
        Ok(())
    }

    /// Declare an interface and enter its scope.
    pub fn enter_interface(
        &mut self,
        arena: &mut TypeArena,
        local_name: &str,
        super_type: Option<TypeId>,
    ) -> Result<TypeId, ResolveError> {
        let id = arena.alloc(Type::Interface(Interface {
            info: NamedInfo::new(local_name),
            super_type,
            methods: Vec::new(),
            scope: Scope::new(local_name),
        }));
        self.add_scoped_type(arena, id)?;
        self.scope_path.push(ScopeHandle::Nested(id));
        Ok(id)
    }

    /// Append a method to the interface whose scope is active. The
    /// serial id continues the numbering of the full inherited chain.
    pub fn add_method(&mut self, arena: &mut TypeArena, method: Method) {
        let iface_id = match self.current_handle() {
            ScopeHandle::Nested(id) if arena.get(id).is_interface() => id,
            _ => panic!("add_method outside an interface scope"),
        };
        let serial = arena.all_methods_from_root(iface_id).len() as u32 + 1;
        let iface = arena
            .get_mut(iface_id)
            .as_interface_mut()
            .expect("interface vanished");
        let mut method = method;
        method.serial_id = serial;
        iface.methods.push(method);
    }

    /// Declare a struct or union and enter its scope.
    pub fn enter_compound(
        &mut self,
        arena: &mut TypeArena,
        local_name: &str,
        style: CompoundStyle,
    ) -> Result<TypeId, ResolveError> {
        let id = arena.alloc(Type::Compound(CompoundType {
            info: NamedInfo::new(local_name),
            style,
            fields: Vec::new(),
            scope: Scope::new(local_name),
        }));
        self.add_scoped_type(arena, id)?;
        self.scope_path.push(ScopeHandle::Nested(id));
        Ok(id)
    }

    pub fn add_field(&mut self, arena: &mut TypeArena, name: &str, ty: TypeId) {
        match self.current_handle() {
            ScopeHandle::Nested(id) => match arena.get_mut(id) {
                Type::Compound(compound) => compound.fields.push(CompoundField {
                    name: name.to_string(),
                    ty,
                }),
                _ => panic!("add_field outside a compound scope"),
            },
            ScopeHandle::Root => panic!("add_field outside a compound scope"),
        }
    }

    pub fn add_enum(
        &mut self,
        arena: &mut TypeArena,
        local_name: &str,
        storage: TypeId,
        values: Vec<EnumValue>,
    ) -> Result<TypeId, ResolveError> {
        let id = arena.alloc(Type::Enum(EnumType {
            info: NamedInfo::new(local_name),
            storage,
            values,
        }));
        self.add_scoped_type(arena, id)?;
        Ok(id)
    }

    /// Declare a named alias. The alias suppresses any type definition of
    /// its own; it exists so references through it resolve.
    pub fn add_typedef(
        &mut self,
        arena: &mut TypeArena,
        local_name: &str,
        referenced: TypeId,
    ) -> Result<TypeId, ResolveError> {
        let id = arena.alloc(Type::TypeDef(TypeDefType {
            info: NamedInfo::new(local_name),
            referenced,
        }));
        self.add_scoped_type(arena, id)?;
        Ok(id)
    }

    pub fn add_constant(
        &mut self,
        arena: &mut TypeArena,
        local_name: &str,
        ty: TypeId,
        value: &str,
    ) -> Result<TypeId, ResolveError> {
        let id = arena.alloc(Type::Constant(Constant {
            info: NamedInfo::new(local_name),
            ty,
            value: value.to_string(),
        }));
        self.add_scoped_type(arena, id)?;
        Ok(id)
    }

    // ---- imports and resolution ----

    /// Process one `import` statement. A bare package reference pulls in
    /// every interface of that package plus its types unit; anything else
    /// names a single artifact.
    pub fn add_import(
        &mut self,
        import: &str,
        coordinator: &mut dyn Coordinator,
        registry: &mut AstRegistry,
        arena: &mut TypeArena,
    ) -> Result<(), Error> {
        let mut fq_name = FQName::parse(import)?;
        fq_name.apply_defaults(self.package.package(), self.package.version());
        debug!(import = %fq_name, unit = %self.package, "importing");

        if fq_name.package() == self.package.package()
            && fq_name.version() == self.package.version()
        {
            return Err(ResolveError::SelfImport(fq_name).into());
        }

        if fq_name.name().is_empty() {
            let mut package_interfaces = Vec::new();
            coordinator.append_package_interfaces_to_set(&fq_name, &mut package_interfaces)?;
            for sub_fq_name in &package_interfaces {
                let id =
                    coordinator.parse(sub_fq_name, registry, arena, &mut self.imported_asts)?;
                self.imported_asts.insert(id);
            }
            return Ok(());
        }

        let id = coordinator.parse(&fq_name, registry, arena, &mut self.imported_asts)?;
        self.imported_asts.insert(id);
        Ok(())
    }

    /// Scan this unit's defined-types index for the first full name that
    /// ends with `fq_name`.
    pub fn find_defined_type(&self, fq_name: &FQName) -> Option<(&FQName, TypeId)> {
        self.defined_types
            .iter()
            .find(|(key, _)| key.ends_with(fq_name))
            .map(|(key, id)| (key, *id))
    }

    /// Resolve a type reference from inside this unit.
    ///
    /// Bare identifiers try the active scope path innermost first; any
    /// remaining reference is matched against the defined types of every
    /// imported unit. More than one distinct match is an error, reported
    /// with every candidate. Typedefs are collapsed on the way out, and
    /// the artifact that must be `#include`d for the reference is
    /// recorded as a side effect.
    pub fn lookup_type(
        &mut self,
        fq_name: &FQName,
        registry: &AstRegistry,
        arena: &mut TypeArena,
    ) -> Result<TypeId, ResolveError> {
        assert!(fq_name.is_valid(), "lookup of invalid name");

        let is_bare = fq_name.package().is_empty() && fq_name.version().is_empty();
        if is_bare {
            for handle in self.scope_path.iter().rev() {
                if let Some(id) = self.scope_of(arena, *handle).lookup_type(fq_name) {
                    return Ok(arena.collapse_typedefs(id));
                }
            }
        }

        let mut resolved: Option<(FQName, TypeId)> = None;
        for ast_id in &self.imported_asts {
            let imported = registry.get(*ast_id);
            if let Some((matching_name, id)) = imported.find_defined_type(fq_name) {
                match &resolved {
                    // Identical resolutions across units are not a
                    // conflict; only distinct types are.
                    Some((_, prior)) if *prior == id => {}
                    Some((prior_name, _)) => {
                        error!(query = %fq_name, first = %prior_name, second = %matching_name,
                               "ambiguous type reference");
                        return Err(ResolveError::AmbiguousType {
                            query: fq_name.string(),
                            candidates: vec![prior_name.string(), matching_name.string()],
                        });
                    }
                    None => resolved = Some((matching_name.clone(), id)),
                }
            }
        }

        let (resolved_name, resolved_id) = match resolved {
            Some(found) => found,
            None if is_bare && fq_name.name() == "MQDescriptor" => {
                return Ok(arena.alloc(Type::Predefined(PredefinedType {
                    cpp_name: "::android::hardware::MQDescriptor".to_string(),
                })));
            }
            None => return Err(ResolveError::UndefinedType(fq_name.string())),
        };

        let collapsed = arena.collapse_typedefs(resolved_id);
        self.record_reference(&resolved_name, collapsed, registry, arena);
        Ok(collapsed)
    }

    /// Record the include target of a resolved reference. A non-interface
    /// type defined inside some interface `IQ` pulls in `IQ`'s header;
    /// any other non-interface type pulls in its package's `types`
    /// header; an interface pulls in its own header. The Java-visible
    /// set collects the referenced named types themselves.
    fn record_reference(
        &mut self,
        resolved_name: &FQName,
        collapsed: TypeId,
        registry: &AstRegistry,
        arena: &TypeArena,
    ) {
        let mut include_target = collapsed;

        if !arena.get(include_target).is_interface() {
            let enclosing = FQName::new(
                resolved_name.package(),
                resolved_name.version(),
                resolved_name.names()[0],
            );
            for ast_id in &self.imported_asts {
                if let Some((_, id)) = registry.get(*ast_id).find_defined_type(&enclosing) {
                    if arena.get(id).is_interface() {
                        include_target = id;
                    }
                }
            }
        }

        match arena.get(include_target) {
            Type::Interface(iface) => {
                // Use the interface's own name, not the (possibly
                // typedef'd) name the reference was spelled with.
                self.imported_names.insert(iface.info.full_name.clone());
                self.imported_names_for_java
                    .insert(iface.info.full_name.clone());
            }
            _ => {
                self.imported_names.insert(FQName::new(
                    resolved_name.package(),
                    resolved_name.version(),
                    "types",
                ));
                let resolved = arena.get(collapsed);
                if resolved.is_named_type() && !resolved.is_typedef() {
                    self.imported_names_for_java
                        .insert(resolved.full_name().expect("named type").clone());
                }
            }
        }
    }

    /// Foreign packages referenced by this unit, for build-system
    /// integration. The own package never appears.
    pub fn imported_packages(&self) -> BTreeSet<FQName> {
        let mut packages = BTreeSet::new();
        for fq_name in &self.imported_names {
            let package = FQName::new(fq_name.package(), fq_name.version(), "");
            if package != self.package {
                packages.insert(package);
            }
        }
        packages
    }

    /// A types-only unit is Java-compatible iff all of its root types
    /// are; an interface unit defers to its interface.
    pub fn is_java_compatible(&self, arena: &TypeArena) -> bool {
        match self.interface_id() {
            Some(iface) => arena.get(iface).is_java_compatible(arena),
            None => self
                .root_scope
                .types()
                .iter()
                .all(|id| arena.get(*id).is_java_compatible(arena)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::TypedVar;
    use crate::types::ScalarKind;

    fn package(text: &str) -> FQName {
        FQName::parse(text).unwrap()
    }

    /// Build a `q@1.0::types` unit defining struct Bar and alias BarAlias.
    fn types_unit(arena: &mut TypeArena) -> Ast {
        let mut ast = Ast::new(package("q.pkg@1.0"), "q/1.0/types.hal");
        let bar = ast
            .enter_compound(arena, "Bar", CompoundStyle::Struct)
            .unwrap();
        let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
        ast.add_field(arena, "x", int32);
        ast.leave_scope();
        ast.add_typedef(arena, "BarAlias", bar).unwrap();
        ast
    }

    #[test]
    fn defined_types_carry_full_names() {
        let mut arena = TypeArena::new();
        let ast = types_unit(&mut arena);

        for (full_name, id) in ast.defined_types() {
            assert_eq!(arena.get(*id).full_name().unwrap(), full_name);
            assert_eq!(full_name.package(), "q.pkg");
        }
        let bar = FQName::parse("q.pkg@1.0::Bar").unwrap();
        assert!(ast.defined_types().contains_key(&bar));
    }

    #[test]
    fn nested_types_get_dotted_paths() {
        let mut arena = TypeArena::new();
        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");
        ast.enter_interface(&mut arena, "IFoo", None).unwrap();
        let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
        ast.add_enum(&mut arena, "Mode", int32, vec![]).unwrap();
        ast.leave_scope();

        let mode = FQName::parse("p.pkg@1.0::IFoo.Mode").unwrap();
        assert!(ast.defined_types().contains_key(&mode));
    }

    #[test]
    fn bare_lookup_walks_scope_path_and_collapses_typedefs() {
        let mut arena = TypeArena::new();
        let registry = AstRegistry::new();
        let mut ast = types_unit(&mut arena);

        let bar = ast
            .lookup_type(&FQName::parse("BarAlias").unwrap(), &registry, &mut arena)
            .unwrap();
        assert!(arena.get(bar).is_compound());
        assert_eq!(
            arena.get(bar).full_name().unwrap().string(),
            "q.pkg@1.0::Bar"
        );
    }

    #[test]
    fn imported_lookup_records_types_include() {
        let mut arena = TypeArena::new();
        let mut registry = AstRegistry::new();
        let types = types_unit(&mut arena);
        let types_id = registry.register(types, &arena);

        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");
        ast.imported_asts.insert(types_id);

        let bar = ast
            .lookup_type(&FQName::parse("Bar").unwrap(), &registry, &mut arena)
            .unwrap();
        assert!(arena.get(bar).is_compound());
        assert!(ast
            .imported_names()
            .contains(&FQName::parse("q.pkg@1.0::types").unwrap()));
    }

    #[test]
    fn type_nested_in_interface_pulls_interface_include() {
        let mut arena = TypeArena::new();
        let mut registry = AstRegistry::new();

        let mut unit = Ast::new(package("q.pkg@1.0"), "q/1.0/IQ.hal");
        unit.enter_interface(&mut arena, "IQ", None).unwrap();
        unit.enter_compound(&mut arena, "Folder", CompoundStyle::Struct)
            .unwrap();
        unit.leave_scope();
        unit.leave_scope();
        let unit_id = registry.register(unit, &arena);

        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");
        ast.imported_asts.insert(unit_id);

        ast.lookup_type(&FQName::parse("Folder").unwrap(), &registry, &mut arena)
            .unwrap();
        assert!(ast
            .imported_names()
            .contains(&FQName::parse("q.pkg@1.0::IQ").unwrap()));
        assert!(!ast
            .imported_names()
            .contains(&FQName::parse("q.pkg@1.0::types").unwrap()));
    }

    #[test]
    fn ambiguous_reference_names_both_candidates() {
        let mut arena = TypeArena::new();
        let mut registry = AstRegistry::new();

        let first = types_unit(&mut arena);
        let first_id = registry.register(first, &arena);

        let mut second = Ast::new(package("r.pkg@1.0"), "r/1.0/types.hal");
        second
            .enter_compound(&mut arena, "Bar", CompoundStyle::Struct)
            .unwrap();
        second.leave_scope();
        let second_id = registry.register(second, &arena);

        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");
        ast.imported_asts.insert(first_id);
        ast.imported_asts.insert(second_id);

        let err = ast
            .lookup_type(&FQName::parse("Bar").unwrap(), &registry, &mut arena)
            .unwrap_err();
        match err {
            ResolveError::AmbiguousType { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.contains(&"q.pkg@1.0::Bar".to_string()));
                assert!(candidates.contains(&"r.pkg@1.0::Bar".to_string()));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn mq_descriptor_is_predefined() {
        let mut arena = TypeArena::new();
        let registry = AstRegistry::new();
        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");

        let id = ast
            .lookup_type(&FQName::parse("MQDescriptor").unwrap(), &registry, &mut arena)
            .unwrap();
        match arena.get(id) {
            Type::Predefined(t) => {
                assert_eq!(t.cpp_name, "::android::hardware::MQDescriptor")
            }
            other => panic!("expected predefined, got {:?}", other),
        }
    }

    #[test]
    fn undefined_reference_fails() {
        let mut arena = TypeArena::new();
        let registry = AstRegistry::new();
        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");

        let err = ast
            .lookup_type(&FQName::parse("Missing").unwrap(), &registry, &mut arena)
            .unwrap_err();
        assert!(matches!(err, ResolveError::UndefinedType(_)));
    }

    #[test]
    fn serial_ids_continue_across_the_chain() {
        let mut arena = TypeArena::new();

        let mut parent = Ast::new(package("p.pkg@1.0"), "p/1.0/IParent.hal");
        let parent_id = parent.enter_interface(&mut arena, "IParent", None).unwrap();
        let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
        parent.add_method(
            &mut arena,
            Method::new("m1", vec![TypedVar::new("x", int32)], vec![]),
        );
        parent.leave_scope();

        let mut child = Ast::new(package("p.pkg@1.0"), "p/1.0/IChild.hal");
        let child_id = child
            .enter_interface(&mut arena, "IChild", Some(parent_id))
            .unwrap();
        child.add_method(&mut arena, Method::new("m2", vec![], vec![]));
        child.leave_scope();

        let all = arena.all_methods_from_root(child_id);
        let serials: Vec<u32> = all.iter().map(|(_, m)| m.serial_id).collect();
        assert_eq!(serials, vec![1, 2]);
    }

    #[test]
    fn imported_packages_excludes_own() {
        let mut arena = TypeArena::new();
        let mut registry = AstRegistry::new();
        let types = types_unit(&mut arena);
        let types_id = registry.register(types, &arena);

        let mut ast = Ast::new(package("p.pkg@1.0"), "p/1.0/IFoo.hal");
        ast.imported_asts.insert(types_id);
        ast.lookup_type(&FQName::parse("Bar").unwrap(), &registry, &mut arena)
            .unwrap();
        ast.imported_names
            .insert(FQName::parse("p.pkg@1.0::types").unwrap());

        let packages = ast.imported_packages();
        assert_eq!(packages.len(), 1);
        assert!(packages.contains(&FQName::parse("q.pkg@1.0").unwrap()));
    }
}
