//! Artifact 1: the abstract interface header (`IFoo.h` / `types.h`)

use crate::error::CodegenError;
use crate::formatter::Formatter;
use crate::method::Method;
use crate::scope::Scope;
use crate::types::{CompoundStyle, Type};

use super::{
    enter_namespace, header_guard, leave_namespace, package_include, CppGen,
    SERVICE_NOTIFICATION_CPP,
};

pub fn generate(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let mut out = Formatter::new();
    let base = ctx.base_file_name();
    let guard = header_guard(ctx.package(), &base);

    out.writeln(&format!("#ifndef {}", guard));
    out.writeln(&format!("#define {}", guard));
    out.endl();

    for item in ctx.ast.imported_names() {
        package_include(&mut out, item, item.name());
    }
    if !ctx.ast.imported_names().is_empty() {
        out.endl();
    }

    let iface = ctx.interface();
    if let Some((_, iface)) = iface {
        if iface.is_ibase() {
            out.writeln("// skipped #include IServiceNotification.h");
            out.endl();
        } else {
            out.writeln("#include <android/hidl/manager/1.0/IServiceNotification.h>");
            out.endl();
        }
    }

    out.writeln("#include <hidl/HidlSupport.h>");
    out.writeln("#include <hidl/MQDescriptor.h>");
    if iface.is_some() {
        out.writeln("#include <hidl/Status.h>");
    }
    out.writeln("#include <utils/NativeHandle.h>");
    out.writeln("#include <utils/misc.h>");
    out.endl();

    enter_namespace(&mut out, ctx.package());
    out.endl();

    if let Some((iface_id, iface)) = iface {
        out.write(&format!("struct {}", iface.info.local_name));
        match iface.super_type {
            None => out.write(" : virtual public ::android::RefBase"),
            Some(super_id) => {
                out.write(&format!(" : public {}", ctx.iface_fqname(super_id).cpp_name()))
            }
        }
        out.writeln(" {");
        out.indent();

        emit_type_declarations(&mut out, ctx, &iface.scope)?;

        out.write("virtual bool isRemote() const ");
        if !iface.is_ibase() {
            out.write("override ");
        }
        out.writeln("{ return false; }");
        out.endl();

        for method in &iface.methods {
            out.endl();
            emit_method_declaration(&mut out, ctx, method);
        }

        out.writeln("// cast static functions");
        let child_result = ctx.arena.get(iface_id).cpp_stack_type(ctx.arena);
        for super_id in ctx.arena.interface_chain(iface_id) {
            out.writeln(&format!(
                "static {} castFrom({} parent);",
                child_result,
                ctx.arena.get(super_id).cpp_argument_type(ctx.arena)
            ));
        }
        out.endl();

        out.writeln("static const char* descriptor;");
        out.endl();

        if iface.is_ibase() {
            out.writeln("// skipped getService, registerAsService, registerForNotifications");
            out.endl();
        } else {
            declare_service_manager_interactions(&mut out, &iface.info.local_name);
        }

        out.writeln("private: static int hidlStaticBlock;");
        out.unindent();
        out.writeln("};");
        out.endl();
    }

    // Package-level types (everything for a types file, stray siblings
    // of an interface otherwise).
    emit_root_type_declarations(&mut out, ctx)?;

    out.endl();
    leave_namespace(&mut out, ctx.package());
    out.write(&format!("\n#endif  // {}\n", guard));

    Ok(out.into_string())
}

fn emit_method_declaration(out: &mut Formatter, ctx: &CppGen<'_>, method: &Method) {
    let elided = method.can_elide_callback(ctx.arena);

    if method.returns_value() && elided.is_none() {
        out.writeln(&format!(
            "using {}_cb = std::function<void({})>;",
            method.name,
            Method::arg_signature(ctx.arena, &method.results)
        ));
    }

    method.dump_annotations(out);

    out.writeln(&format!("virtual {} = 0;", method.cpp_signature(ctx.arena, None)));
}

fn declare_service_manager_interactions(out: &mut Formatter, interface_name: &str) {
    out.writeln(&format!(
        "static ::android::sp<{}> getService(const std::string &serviceName=\"default\", bool getStub=false);",
        interface_name
    ));
    out.writeln(&format!(
        "static ::android::sp<{}> getService(const char serviceName[], bool getStub=false)  {{ std::string str(serviceName ? serviceName : \"\");      return getService(str, getStub); }}",
        interface_name
    ));
    // Without c_str the std::string constructor is ambiguous.
    out.writeln(&format!(
        "static ::android::sp<{}> getService(const ::android::hardware::hidl_string& serviceName, bool getStub=false)  {{ std::string str(serviceName.c_str());      return getService(str, getStub); }}",
        interface_name
    ));
    out.writeln(&format!(
        "static ::android::sp<{}> getService(bool getStub) {{ return getService(\"default\", getStub); }}",
        interface_name
    ));
    out.writeln("::android::status_t registerAsService(const std::string &serviceName=\"default\");");
    out.writeln("static bool registerForNotifications(");
    out.indent_by(2, |out| {
        out.writeln("const std::string &serviceName,");
        out.writeln(&format!(
            "const ::android::sp<{}> &notification);",
            SERVICE_NOTIFICATION_CPP
        ));
    });
    out.endl();
}

fn emit_root_type_declarations(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
) -> Result<(), CodegenError> {
    let root = ctx.ast.root_scope();
    let interface = root.interface();
    for id in root.types() {
        if Some(*id) == interface {
            continue;
        }
        emit_type_declaration(out, ctx, *id)?;
    }
    Ok(())
}

/// Declarations of the types a scope contains, in declaration order.
/// Aliases declare nothing; interfaces are handled by their own header
/// section.
pub(crate) fn emit_type_declarations(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    scope: &Scope,
) -> Result<(), CodegenError> {
    for id in scope.types() {
        emit_type_declaration(out, ctx, *id)?;
    }
    Ok(())
}

fn emit_type_declaration(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    id: crate::types::TypeId,
) -> Result<(), CodegenError> {
    match ctx.arena.get(id) {
        Type::Enum(e) => {
            out.write(&format!(
                "enum class {} : {} ",
                e.info.local_name,
                ctx.arena.get(e.storage).cpp_stack_type(ctx.arena)
            ));
            out.block(|out| {
                for value in &e.values {
                    match &value.value {
                        Some(expr) => out.writeln(&format!("{} = {},", value.name, expr)),
                        None => out.writeln(&format!("{},", value.name)),
                    }
                }
            });
            out.writeln(";");
            out.endl();
        }
        Type::Compound(compound) => {
            let keyword = match compound.style {
                CompoundStyle::Struct => "struct",
                CompoundStyle::Union => "union",
            };
            out.write(&format!("{} {} ", keyword, compound.info.local_name));
            let mut nested = Ok(());
            out.block(|out| {
                nested = emit_type_declarations(out, ctx, &compound.scope);
                for field in &compound.fields {
                    out.writeln(&format!(
                        "{} {};",
                        ctx.arena.get(field.ty).cpp_stack_type(ctx.arena),
                        field.name
                    ));
                }
            });
            nested?;
            out.writeln(";");
            out.endl();
        }
        Type::Constant(constant) => {
            out.writeln(&format!(
                "constexpr {} {} = {};",
                ctx.arena.get(constant.ty).cpp_stack_type(ctx.arena),
                constant.info.local_name,
                constant.value
            ));
            out.endl();
        }
        Type::TypeDef(_) | Type::Interface(_) => {}
        other => {
            return Err(CodegenError::Unsupported(format!(
                "type declaration for {:?}",
                other
            )))
        }
    }
    Ok(())
}
