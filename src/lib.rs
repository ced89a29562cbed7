//! HIDL interface compiler core
//!
//! The semantic model of an Android-style hardware interface language
//! (fully-qualified names, a typed arena, scopes, per-unit ASTs with an
//! import resolver) and the C++ binder backend that emits the six
//! artifacts of a translation unit: interface header, wire-format
//! helper, server stub, client proxy, pass-through adapter, and the
//! combined implementation file.
//!
//! Parsing, package file lookup and the output directory layout are
//! external collaborators, consumed through the [`Coordinator`] and
//! [`SinkFactory`] traits.

// Code generation call sites thread parcel/name/mode state through.
#![allow(clippy::too_many_arguments)]

pub mod ast;
pub mod codegen;
pub mod coordinator;
pub mod error;
pub mod formatter;
pub mod fqname;
pub mod method;
pub mod scope;
pub mod types;

// Re-export main types
pub use ast::{Ast, AstId, AstRegistry};
pub use codegen::generate_cpp;
pub use coordinator::{Coordinator, FsSinkFactory, MemorySinkFactory, SinkFactory};
pub use error::{CodegenError, Error, ResolveError};
pub use formatter::Formatter;
pub use fqname::FQName;
pub use method::{Annotation, Method, TypedVar};
pub use scope::Scope;
pub use types::{ScalarKind, Type, TypeArena, TypeId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_unit_end_to_end() {
        let mut arena = TypeArena::new();
        let mut ast = Ast::new(
            FQName::parse("android.hardware.demo@1.0").unwrap(),
            "demo.hal",
        );
        ast.enter_interface(&mut arena, "IDemo", None).unwrap();
        let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
        ast.add_method(
            &mut arena,
            Method::new("poke", vec![TypedVar::new("x", int32)], vec![]),
        );
        ast.leave_scope();

        assert!(ast.is_interface());
        assert_eq!(
            ast.unit_fqname(&arena).string(),
            "android.hardware.demo@1.0::IDemo"
        );
    }
}
