//! Interface methods and their signatures

use crate::formatter::Formatter;
use crate::types::{Type, TypeArena, TypeId};

/// A named, typed slot: method argument or result
#[derive(Debug, Clone)]
pub struct TypedVar {
    pub name: String,
    pub ty: TypeId,
}

impl TypedVar {
    pub fn new(name: &str, ty: TypeId) -> TypedVar {
        TypedVar {
            name: name.to_string(),
            ty,
        }
    }
}

/// A source annotation, dumped verbatim above the method declaration
#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    /// `key=value` pairs as written, including any quoting.
    pub params: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub args: Vec<TypedVar>,
    pub results: Vec<TypedVar>,
    pub oneway: bool,
    pub annotations: Vec<Annotation>,
    /// Binder transaction code; assigned when the method joins an
    /// interface whose super chain is known. Numbered root-first from 1.
    pub serial_id: u32,
}

impl Method {
    pub fn new(name: &str, args: Vec<TypedVar>, results: Vec<TypedVar>) -> Method {
        Method {
            name: name.to_string(),
            args,
            results,
            oneway: false,
            annotations: Vec::new(),
            serial_id: 0,
        }
    }

    pub fn oneway(mut self) -> Method {
        self.oneway = true;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Method {
        self.annotations.push(annotation);
        self
    }

    /// The single result returned by value instead of through a callback,
    /// if elision applies: exactly one result of scalar class (scalar or
    /// enum, both value-sized on the wire).
    pub fn can_elide_callback<'a>(&'a self, arena: &TypeArena) -> Option<&'a TypedVar> {
        if self.results.len() != 1 {
            return None;
        }
        let result = &self.results[0];
        match arena.get(arena.collapse_typedefs(result.ty)) {
            Type::Scalar(_) | Type::Enum(_) => Some(result),
            _ => None,
        }
    }

    pub fn returns_value(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn is_java_compatible(&self, arena: &TypeArena) -> bool {
        self.args
            .iter()
            .chain(self.results.iter())
            .all(|var| arena.get(var.ty).is_java_compatible(arena))
    }

    /// `int32_t x, const ::android::hardware::hidl_string& name`
    pub fn arg_signature(arena: &TypeArena, vars: &[TypedVar]) -> String {
        vars.iter()
            .map(|var| {
                format!(
                    "{} {}",
                    arena.get(var.ty).cpp_argument_type(arena),
                    var.name
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The method's C++ return type: `::android::hardware::Return<R>`
    /// with R the elided scalar type, or `Return<void>`.
    pub fn cpp_return_type(&self, arena: &TypeArena) -> String {
        match self.can_elide_callback(arena) {
            Some(elided) => format!(
                "::android::hardware::Return<{}>",
                arena.get(elided.ty).cpp_result_type(arena)
            ),
            None => "::android::hardware::Return<void>".to_string(),
        }
    }

    /// Full signature, optionally qualified with a defining class for
    /// out-of-class definitions.
    pub fn cpp_signature(&self, arena: &TypeArena, class_name: Option<&str>) -> String {
        let mut sig = format!("{} ", self.cpp_return_type(arena));
        if let Some(class_name) = class_name {
            sig.push_str(class_name);
            sig.push_str("::");
        }
        sig.push_str(&self.name);
        sig.push('(');
        sig.push_str(&Method::arg_signature(arena, &self.args));
        if self.returns_value() && self.can_elide_callback(arena).is_none() {
            if !self.args.is_empty() {
                sig.push_str(", ");
            }
            sig.push_str(&self.name);
            sig.push_str("_cb _hidl_cb");
        }
        sig.push(')');
        sig
    }

    pub fn dump_annotations(&self, out: &mut Formatter) {
        for annotation in &self.annotations {
            out.write(&format!("@{}", annotation.name));
            if !annotation.params.is_empty() {
                let params = annotation
                    .params
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.write(&format!("({})", params));
            }
            out.write("\n");
        }
    }
}
