//! Parcel reader/writer emission
//!
//! Marshaling is a two-pass scheme. The first pass writes (or reads) each
//! argument's own bytes through `writeBuffer`/`readBuffer` or a typed
//! accessor, recording a parent handle for every buffer. The second pass
//! fixes up embedded references (string payloads, vector payloads) now
//! that the parent buffers' locations are known, walking the same
//! structure with `writeEmbeddedToParcel`/`readEmbeddedFromParcel`.

use crate::formatter::Formatter;

use super::{Type, TypeArena};

/// What to emit after each parcel call when `_hidl_err` is bad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    /// `return _hidl_err;`
    Return,
    /// `goto _hidl_error;`
    Goto,
    /// `break;` out of the enclosing switch case
    Break,
    /// nothing; the call site cannot fail usefully
    Ignore,
}

pub fn handle_error(out: &mut Formatter, mode: ErrorMode) {
    match mode {
        ErrorMode::Return => out.writeln("if (_hidl_err != ::android::OK) { return _hidl_err; }"),
        ErrorMode::Goto => out.writeln("if (_hidl_err != ::android::OK) { goto _hidl_error; }"),
        ErrorMode::Break => out.writeln("if (_hidl_err != ::android::OK) { break; }"),
        ErrorMode::Ignore => out.writeln("/* _hidl_err ignored! */"),
    }
}

fn parcel_member(parcel_obj: &str, parcel_is_pointer: bool) -> String {
    if parcel_is_pointer {
        format!("{}->", parcel_obj)
    } else {
        format!("{}.", parcel_obj)
    }
}

fn parcel_as_pointer(parcel_obj: &str, parcel_is_pointer: bool) -> String {
    if parcel_is_pointer {
        parcel_obj.to_string()
    } else {
        format!("&{}", parcel_obj)
    }
}

fn parcel_as_ref(parcel_obj: &str, parcel_is_pointer: bool) -> String {
    if parcel_is_pointer {
        format!("*{}", parcel_obj)
    } else {
        parcel_obj.to_string()
    }
}

/// Namespace-qualified embedded hook for a type: the libhidl helper for
/// strings and vectors, the generated per-UDT free function for compound
/// types.
fn embedded_hook(ty: &Type, is_reader: bool) -> String {
    let function = if is_reader {
        "readEmbeddedFromParcel"
    } else {
        "writeEmbeddedToParcel"
    };
    match ty {
        Type::Compound(t) => format!("{}::{}", t.info.full_name.cpp_namespace(), function),
        _ => format!("::android::hardware::{}", function),
    }
}

impl Type {
    /// First-pass read or write of `name` against the parcel.
    pub fn emit_reader_writer(
        &self,
        out: &mut Formatter,
        arena: &TypeArena,
        name: &str,
        parcel_obj: &str,
        parcel_is_pointer: bool,
        is_reader: bool,
        mode: ErrorMode,
    ) {
        let parcel = parcel_member(parcel_obj, parcel_is_pointer);
        match self {
            Type::Scalar(kind) => {
                if is_reader {
                    out.writeln(&format!(
                        "_hidl_err = {}read{}(&{});",
                        parcel,
                        kind.parcel_suffix(),
                        name
                    ));
                } else {
                    out.writeln(&format!(
                        "_hidl_err = {}write{}({});",
                        parcel,
                        kind.parcel_suffix(),
                        name
                    ));
                }
                handle_error(out, mode);
            }
            Type::Enum(t) => {
                let storage = match arena.get(t.storage) {
                    Type::Scalar(kind) => *kind,
                    other => panic!("enum storage must be scalar, found {:?}", other),
                };
                if is_reader {
                    out.writeln(&format!(
                        "_hidl_err = {}read{}(reinterpret_cast<{} *>(&{}));",
                        parcel,
                        storage.parcel_suffix(),
                        storage.cpp_type(),
                        name
                    ));
                } else {
                    out.writeln(&format!(
                        "_hidl_err = {}write{}(({}){});",
                        parcel,
                        storage.parcel_suffix(),
                        storage.cpp_type(),
                        name
                    ));
                }
                handle_error(out, mode);
            }
            Type::Handle => {
                if is_reader {
                    out.writeln(&format!(
                        "_hidl_err = {}readNullableNativeHandleNoDup(&{});",
                        parcel, name
                    ));
                } else {
                    out.writeln(&format!(
                        "_hidl_err = {}writeNativeHandleNoDup({});",
                        parcel, name
                    ));
                }
                handle_error(out, mode);
            }
            Type::HidlString | Type::Vector(_) | Type::Array(_) | Type::Compound(_)
            | Type::Predefined(_) => {
                out.writeln(&format!("size_t _hidl_{}_parent;", name));
                if is_reader {
                    out.writeln(&format!(
                        "_hidl_err = {}readBuffer(&_hidl_{}_parent, reinterpret_cast<const void **>(&{}));",
                        parcel, name, name
                    ));
                } else {
                    out.writeln(&format!(
                        "_hidl_err = {}writeBuffer(&{}, sizeof({}), &_hidl_{}_parent);",
                        parcel, name, name, name
                    ));
                }
                handle_error(out, mode);
            }
            Type::Interface(t) => {
                let iface = t.info.full_name.cpp_name();
                let proxy = format!(
                    "{}::{}",
                    t.info.full_name.cpp_namespace(),
                    t.info.full_name.interface_proxy_name()
                );
                let stub = format!(
                    "{}::{}",
                    t.info.full_name.cpp_namespace(),
                    t.info.full_name.interface_stub_name()
                );
                if is_reader {
                    out.block(|out| {
                        out.writeln("::android::sp<::android::hardware::IBinder> _hidl_binder;");
                        out.writeln(&format!(
                            "_hidl_err = {}readNullableStrongBinder(&_hidl_binder);",
                            parcel
                        ));
                        handle_error(out, mode);
                        out.writeln(&format!(
                            "{} = ::android::hardware::fromBinder<{}, {}, {}>(_hidl_binder);",
                            name, iface, proxy, stub
                        ));
                    })
                    .endl();
                } else {
                    out.s_if(&format!("{} == nullptr", name), |out| {
                        out.writeln(&format!(
                            "_hidl_err = {}writeStrongBinder(nullptr);",
                            parcel
                        ));
                    })
                    .s_else(|out| {
                        out.writeln(
                            "::android::sp<::android::hardware::IBinder> _hidl_binder =",
                        );
                        out.indent_by(2, |out| {
                            out.writeln(&format!(
                                "::android::hardware::toBinder<{}, {}>({});",
                                iface, proxy, name
                            ));
                        });
                        out.s_if("_hidl_binder.get() != nullptr", |out| {
                            out.writeln(&format!(
                                "_hidl_err = {}writeStrongBinder(_hidl_binder);",
                                parcel
                            ));
                        })
                        .s_else(|out| {
                            out.writeln("_hidl_err = ::android::UNKNOWN_ERROR;");
                        })
                        .endl();
                    })
                    .endl();
                    handle_error(out, mode);
                }
            }
            Type::TypeDef(t) => {
                arena.get(t.referenced).emit_reader_writer(
                    out,
                    arena,
                    name,
                    parcel_obj,
                    parcel_is_pointer,
                    is_reader,
                    mode,
                );
            }
            Type::Constant(_) => panic!("constants are never marshaled"),
        }
    }

    /// Second-pass reference fixup for `name`. Only meaningful when
    /// [`Type::needs_resolve_references`] holds; a no-op otherwise.
    pub fn emit_resolve_references(
        &self,
        out: &mut Formatter,
        arena: &TypeArena,
        name: &str,
        name_is_pointer: bool,
        parcel_obj: &str,
        parcel_is_pointer: bool,
        is_reader: bool,
        mode: ErrorMode,
    ) {
        if !self.needs_resolve_references(arena) {
            return;
        }
        let obj = if name_is_pointer {
            format!("(*{})", name)
        } else {
            name.to_string()
        };
        let parent_handle = format!("_hidl_{}_parent", name);
        self.emit_embedded_resolve(
            out,
            arena,
            &obj,
            &parcel_var(parcel_obj, parcel_is_pointer, is_reader),
            &parent_handle,
            "0 /* parentOffset */",
            is_reader,
            mode,
            name,
            0,
        );
    }

    /// Fix up one object known to sit in a parent buffer at
    /// `offset_expr`. Recurses into vector elements with a fresh child
    /// handle per nesting depth; `hint` is the identifier-safe name the
    /// handle variables derive from.
    pub(crate) fn emit_embedded_resolve(
        &self,
        out: &mut Formatter,
        arena: &TypeArena,
        obj: &str,
        parcel: &str,
        parent_handle: &str,
        offset_expr: &str,
        is_reader: bool,
        mode: ErrorMode,
        hint: &str,
        depth: usize,
    ) {
        let target = if is_reader {
            format!("const_cast<{} &>({})", self.cpp_stack_type(arena), obj)
        } else {
            obj.to_string()
        };
        match self {
            Type::HidlString | Type::Compound(_) => {
                out.writeln(&format!("_hidl_err = {}(", embedded_hook(self, is_reader)));
                out.indent_by(2, |out| {
                    out.writeln(&format!("{},", target));
                    out.writeln(&format!("{},", parcel));
                    out.writeln(&format!("{},", parent_handle));
                    out.writeln(&format!("{});", offset_expr));
                });
                handle_error(out, mode);
            }
            Type::Vector(t) => {
                let element = arena.get(t.element);
                let child_handle = if depth == 0 {
                    format!("_hidl_{}_child", hint)
                } else {
                    format!("_hidl_{}_child_{}", hint, depth)
                };
                out.writeln(&format!("size_t {};", child_handle));
                out.writeln(&format!("_hidl_err = {}(", embedded_hook(self, is_reader)));
                out.indent_by(2, |out| {
                    out.writeln(&format!("{},", target));
                    out.writeln(&format!("{},", parcel));
                    out.writeln(&format!("{},", parent_handle));
                    out.writeln(&format!("{},", offset_expr));
                    out.writeln(&format!("&{});", child_handle));
                });
                handle_error(out, mode);
                if element.needs_resolve_references(arena) {
                    let index = format!("_hidl_index_{}", depth);
                    out.write(&format!(
                        "for (size_t {index} = 0; {index} < {obj}.size(); ++{index}) ",
                        index = index,
                        obj = obj
                    ));
                    out.block(|out| {
                        element.emit_embedded_resolve(
                            out,
                            arena,
                            &format!("{}[{}]", obj, index),
                            parcel,
                            &child_handle,
                            &format!(
                                "{} * sizeof({})",
                                index,
                                element.cpp_stack_type(arena)
                            ),
                            is_reader,
                            mode,
                            hint,
                            depth + 1,
                        );
                    })
                    .endl();
                }
            }
            Type::Array(t) => {
                let element = arena.get(t.element);
                if element.needs_resolve_references(arena) {
                    let index = format!("_hidl_index_{}", depth);
                    out.write(&format!(
                        "for (size_t {index} = 0; {index} < {size}; ++{index}) ",
                        index = index,
                        size = t.size
                    ));
                    out.block(|out| {
                        element.emit_embedded_resolve(
                            out,
                            arena,
                            &format!("{}[{}]", obj, index),
                            parcel,
                            parent_handle,
                            &format!(
                                "{} * sizeof({})",
                                index,
                                element.cpp_stack_type(arena)
                            ),
                            is_reader,
                            mode,
                            hint,
                            depth + 1,
                        );
                    })
                    .endl();
                }
            }
            Type::TypeDef(t) => {
                arena.get(t.referenced).emit_embedded_resolve(
                    out,
                    arena,
                    obj,
                    parcel,
                    parent_handle,
                    offset_expr,
                    is_reader,
                    mode,
                    hint,
                    depth,
                );
            }
            _ => {}
        }
    }
}

/// The parcel expression handed to the embedded hooks: pointer for
/// writers, const reference for readers.
fn parcel_var(parcel_obj: &str, parcel_is_pointer: bool, is_reader: bool) -> String {
    if is_reader {
        parcel_as_ref(parcel_obj, parcel_is_pointer)
    } else {
        parcel_as_pointer(parcel_obj, parcel_is_pointer)
    }
}
