//! C++ binder backend
//!
//! One file per artifact role, mirroring the generated set: interface
//! header, wire-format helper header, stub, proxy, pass-through, and the
//! combined source. This module owns the fixed emission order and the
//! helpers every artifact shares (guards, package includes, namespace
//! brackets, instrumentation hooks, argument marshaling wrappers).

pub mod all_source;
pub mod hw_header;
pub mod interface_header;
pub mod passthrough;
pub mod proxy;
pub mod stub;

use std::io::Write;

use tracing::debug;

use crate::ast::{Ast, AstRegistry};
use crate::coordinator::{Coordinator, SinkFactory};
use crate::error::{CodegenError, Error};
use crate::formatter::Formatter;
use crate::fqname::FQName;
use crate::method::{Method, TypedVar};
use crate::types::wire::ErrorMode;
use crate::types::{Interface, Type, TypeArena, TypeId};

pub(crate) const IBASE_CPP: &str = "::android::hidl::base::V1_0::IBase";
pub(crate) const SERVICE_MANAGER_CPP: &str = "::android::hidl::manager::V1_0::IServiceManager";
pub(crate) const SERVICE_NOTIFICATION_CPP: &str =
    "::android::hidl::manager::V1_0::IServiceNotification";

/// Read-only emission context for one translation unit
pub struct CppGen<'a> {
    pub ast: &'a Ast,
    pub registry: &'a AstRegistry,
    pub arena: &'a TypeArena,
}

impl<'a> CppGen<'a> {
    pub fn package(&self) -> &FQName {
        self.ast.package()
    }

    pub fn interface(&self) -> Option<(TypeId, &'a Interface)> {
        let id = self.ast.interface_id()?;
        Some((id, self.arena.get(id).as_interface().expect("root interface")))
    }

    /// `IFoo` for an interface unit, `types` otherwise.
    pub fn base_file_name(&self) -> String {
        self.ast
            .interface_name(self.arena)
            .unwrap_or_else(|| "types".to_string())
    }

    pub(crate) fn iface_fqname(&self, id: TypeId) -> &'a FQName {
        &self
            .arena
            .get(id)
            .as_interface()
            .expect("interface id")
            .info
            .full_name
    }
}

/// Emit all artifacts of one unit, in the fixed order, stopping on the
/// first failure. A types-only unit produces only the type artifacts.
pub fn generate_cpp(
    ast: &Ast,
    registry: &AstRegistry,
    arena: &TypeArena,
    coordinator: &dyn Coordinator,
    sinks: &mut dyn SinkFactory,
) -> Result<(), Error> {
    debug!(unit = %ast.unit_fqname(arena), "generating C++ artifacts");
    let ctx = CppGen {
        ast,
        registry,
        arena,
    };
    let dir = format!(
        "{}{}",
        coordinator.convert_package_root_to_path(ast.package()),
        coordinator.get_package_path(ast.package(), true /* relative */)
    );
    let is_interface = ast.is_interface();
    let base = ctx.base_file_name();

    write_artifact(
        sinks,
        &format!("{}{}.h", dir, base),
        interface_header::generate(&ctx)?,
    )?;
    if is_interface {
        write_artifact(
            sinks,
            &format!("{}{}.h", dir, ctx.package().with_name(&base).interface_stub_name()),
            stub::generate_header(&ctx)?,
        )?;
    }
    write_artifact(
        sinks,
        &format!("{}{}.h", dir, hw_header::class_name(&ctx)),
        hw_header::generate(&ctx)?,
    )?;
    if is_interface {
        write_artifact(
            sinks,
            &format!(
                "{}{}.h",
                dir,
                ctx.package().with_name(&base).interface_proxy_name()
            ),
            proxy::generate_header(&ctx)?,
        )?;
    }
    let source_name = if is_interface {
        format!("{}All.cpp", ctx.package().with_name(&base).interface_base_name())
    } else {
        "types.cpp".to_string()
    };
    write_artifact(sinks, &format!("{}{}", dir, source_name), all_source::generate(&ctx)?)?;
    if is_interface {
        write_artifact(
            sinks,
            &format!(
                "{}{}.h",
                dir,
                ctx.package().with_name(&base).interface_passthrough_name()
            ),
            passthrough::generate_header(&ctx)?,
        )?;
    }
    Ok(())
}

fn write_artifact(
    sinks: &mut dyn SinkFactory,
    relative_path: &str,
    text: String,
) -> Result<(), Error> {
    let mut sink = sinks.open(relative_path)?;
    sink.write_all(text.as_bytes()).map_err(CodegenError::Io)?;
    Ok(())
}

/// `HIDL_GENERATED_ANDROID_HARDWARE_FOO_V1_0_IFOO_H`
pub(crate) fn header_guard(package: &FQName, base_name: &str) -> String {
    format!(
        "HIDL_GENERATED_{}_{}_H",
        package.token_name().to_uppercase(),
        base_name.to_uppercase()
    )
}

/// `#include <android/hardware/foo/1.0/IFoo.h>`
pub(crate) fn package_include(out: &mut Formatter, package: &FQName, klass: &str) {
    out.write("#include <");
    for component in package.package_and_version_components(false /* cpp_compatible */) {
        out.write(&component);
        out.write("/");
    }
    out.write(&format!("{}.h>\n", klass));
}

pub(crate) fn enter_namespace(out: &mut Formatter, package: &FQName) {
    for component in package.package_and_version_components(true /* cpp_compatible */) {
        out.writeln(&format!("namespace {} {{", component));
    }
}

pub(crate) fn leave_namespace(out: &mut Formatter, package: &FQName) {
    for component in package
        .package_and_version_components(true /* cpp_compatible */)
        .iter()
        .rev()
    {
        out.writeln(&format!("}}  // namespace {}", component));
    }
}

/// The six hook points of the generated instrumentation contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstrumentationEvent {
    ServerApiEntry,
    ServerApiExit,
    ClientApiEntry,
    ClientApiExit,
    PassthroughEntry,
    PassthroughExit,
}

impl InstrumentationEvent {
    fn symbol(self) -> &'static str {
        match self {
            InstrumentationEvent::ServerApiEntry => "InstrumentationEvent::SERVER_API_ENTRY",
            InstrumentationEvent::ServerApiExit => "InstrumentationEvent::SERVER_API_EXIT",
            InstrumentationEvent::ClientApiEntry => "InstrumentationEvent::CLIENT_API_ENTRY",
            InstrumentationEvent::ClientApiExit => "InstrumentationEvent::CLIENT_API_EXIT",
            InstrumentationEvent::PassthroughEntry => "InstrumentationEvent::PASSTHROUGH_ENTRY",
            InstrumentationEvent::PassthroughExit => "InstrumentationEvent::PASSTHROUGH_EXIT",
        }
    }

    fn is_entry(self) -> bool {
        matches!(
            self,
            InstrumentationEvent::ServerApiEntry
                | InstrumentationEvent::ClientApiEntry
                | InstrumentationEvent::PassthroughEntry
        )
    }

    fn atrace_role(self) -> &'static str {
        match self {
            InstrumentationEvent::ServerApiEntry | InstrumentationEvent::ServerApiExit => "server",
            InstrumentationEvent::ClientApiEntry | InstrumentationEvent::ClientApiExit => "client",
            InstrumentationEvent::PassthroughEntry | InstrumentationEvent::PassthroughExit => {
                "passthrough"
            }
        }
    }
}

/// Atrace scope plus the callback-list dispatch with the method's
/// arguments (entry) or results (exit) as type-erased pointers.
pub(crate) fn emit_instrumentation_call(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    iface_name: &str,
    method: &Method,
    event: InstrumentationEvent,
) {
    if event.is_entry() {
        out.writeln(&format!(
            "atrace_begin(ATRACE_TAG_HAL, \"HIDL::{}::{}::{}\");",
            iface_name,
            method.name,
            event.atrace_role()
        ));
    } else {
        out.writeln("atrace_end(ATRACE_TAG_HAL);");
    }

    out.s_if("UNLIKELY(mEnableInstrumentation)", |out| {
        out.writeln("std::vector<void *> _hidl_args;");
        match event {
            InstrumentationEvent::ServerApiEntry => {
                for arg in &method.args {
                    let deref = ctx.arena.get(arg.ty).result_needs_deref(ctx.arena);
                    out.writeln(&format!(
                        "_hidl_args.push_back((void *){}{});",
                        if deref { "" } else { "&" },
                        arg.name
                    ));
                }
            }
            InstrumentationEvent::ClientApiEntry | InstrumentationEvent::PassthroughEntry => {
                for arg in &method.args {
                    out.writeln(&format!("_hidl_args.push_back((void *)&{});", arg.name));
                }
            }
            InstrumentationEvent::ClientApiExit => {
                for result in &method.results {
                    let deref = ctx.arena.get(result.ty).result_needs_deref(ctx.arena);
                    out.writeln(&format!(
                        "_hidl_args.push_back((void *){}_hidl_out_{});",
                        if deref { "" } else { "&" },
                        result.name
                    ));
                }
            }
            InstrumentationEvent::ServerApiExit | InstrumentationEvent::PassthroughExit => {
                for result in &method.results {
                    out.writeln(&format!(
                        "_hidl_args.push_back((void *)&_hidl_out_{});",
                        result.name
                    ));
                }
            }
        }
        out.write("for (const auto &callback: mInstrumentationCallbacks) ");
        out.block(|out| {
            out.writeln(&format!(
                "callback({}, \"{}\", \"{}\", \"{}\", \"{}\", &_hidl_args);",
                event.symbol(),
                ctx.package().package(),
                ctx.package().version(),
                iface_name,
                method.name
            ));
        })
        .endl();
    })
    .endl()
    .endl();
}

/// `const hidl_vec<int32_t>* _hidl_out_ys;` style locals for everything
/// about to be read out of a parcel.
pub(crate) fn declare_reader_locals(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    vars: &[TypedVar],
    for_results: bool,
) {
    if vars.is_empty() {
        return;
    }
    for var in vars {
        out.writeln(&format!(
            "{} {}{};",
            ctx.arena.get(var.ty).cpp_result_type(ctx.arena),
            if for_results { "_hidl_out_" } else { "" },
            var.name
        ));
    }
    out.endl();
}

/// First marshaling pass for one argument.
pub(crate) fn emit_reader_writer(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    var: &TypedVar,
    parcel_obj: &str,
    parcel_is_pointer: bool,
    is_reader: bool,
    mode: ErrorMode,
    add_prefix: bool,
) {
    let name = prefixed(&var.name, add_prefix);
    ctx.arena.get(var.ty).emit_reader_writer(
        out,
        ctx.arena,
        &name,
        parcel_obj,
        parcel_is_pointer,
        is_reader,
        mode,
    );
}

/// Second marshaling pass for one argument, if its type needs it.
pub(crate) fn emit_resolve_references(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    var: &TypedVar,
    parcel_obj: &str,
    parcel_is_pointer: bool,
    is_reader: bool,
    mode: ErrorMode,
    add_prefix: bool,
) {
    let ty = ctx.arena.get(var.ty);
    if !ty.needs_resolve_references(ctx.arena) {
        return;
    }
    let name = prefixed(&var.name, add_prefix);
    ty.emit_resolve_references(
        out,
        ctx.arena,
        &name,
        is_reader, /* name_is_pointer */
        parcel_obj,
        parcel_is_pointer,
        is_reader,
        mode,
    );
}

fn prefixed(name: &str, add_prefix: bool) -> String {
    if add_prefix {
        format!("_hidl_out_{}", name)
    } else {
        name.to_string()
    }
}

/// Null-callback guard returning `EX_ILLEGAL_ARGUMENT`.
pub(crate) fn emit_check_non_null(out: &mut Formatter, expr: &str) {
    out.s_if(&format!("{} == nullptr", expr), |out| {
        out.writeln("return ::android::hardware::Status::fromExceptionCode(");
        out.indent_by(2, |out| {
            out.writeln("::android::hardware::Status::EX_ILLEGAL_ARGUMENT);");
        });
    })
    .endl()
    .endl();
}

/// Drive `gen` over every method of the full chain, root first, with a
/// `// Methods from X follow.` banner per defining interface.
pub(crate) fn for_each_chain_method(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    iface_id: TypeId,
    mut gen: impl FnMut(&mut Formatter, TypeId, &Method) -> Result<(), CodegenError>,
) -> Result<(), CodegenError> {
    let mut previous: Option<TypeId> = None;
    for (super_id, method) in ctx.arena.all_methods_from_root(iface_id) {
        if previous != Some(super_id) {
            if previous.is_some() {
                out.endl();
            }
            out.writeln(&format!(
                "// Methods from {} follow.",
                ctx.iface_fqname(super_id).cpp_name()
            ));
            previous = Some(super_id);
        }
        gen(out, super_id, method)?;
    }
    out.endl();
    Ok(())
}

/// Walk every compound type defined in the unit, outermost first.
pub(crate) fn for_each_compound(
    ctx: &CppGen<'_>,
    mut visit: impl FnMut(TypeId, &crate::types::CompoundType),
) {
    // The defined-types index covers nested scopes too and iterates in
    // a stable order.
    for (_, id) in ctx.ast.defined_types() {
        if let Type::Compound(compound) = ctx.arena.get(*id) {
            visit(*id, compound);
        }
    }
}
