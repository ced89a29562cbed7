//! Artifact 5: the in-process pass-through adapter (`BsFoo.h`)
//!
//! Method bodies live inline in the header; the constructor and the
//! one-way queue plumbing are defined in the combined source.

use crate::error::CodegenError;
use crate::formatter::Formatter;
use crate::method::{Method, TypedVar};
use crate::types::Type;

use super::{
    emit_check_non_null, emit_instrumentation_call, enter_namespace, for_each_chain_method,
    header_guard, leave_namespace, package_include, CppGen, InstrumentationEvent,
};

pub fn generate_header(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let (iface_id, iface) = ctx.interface().expect("pass-through header of a types file");
    let mut out = Formatter::new();
    let klass = iface.info.full_name.interface_passthrough_name();
    let iface_name = iface.info.local_name.clone();
    let guard = header_guard(ctx.package(), &klass);
    let support_oneway = ctx.arena.has_oneway_methods(iface_id);

    out.writeln(&format!("#ifndef {}", guard));
    out.writeln(&format!("#define {}", guard));
    out.endl();

    out.writeln("#include <cutils/trace.h>");
    out.writeln("#include <future>");
    package_include(&mut out, ctx.package(), &iface_name);
    out.endl();

    out.writeln("#include <hidl/HidlPassthroughSupport.h>");
    if support_oneway {
        out.writeln("#include <hidl/TaskRunner.h>");
    }

    enter_namespace(&mut out, ctx.package());
    out.endl();

    out.writeln(&format!(
        "struct {} : {}, ::android::hardware::HidlInstrumentor {{",
        klass, iface_name
    ));
    out.indent();
    out.writeln(&format!(
        "explicit {}(const ::android::sp<{}> impl);",
        klass, iface_name
    ));

    for_each_chain_method(&mut out, ctx, iface_id, |out, _, method| {
        emit_passthrough_method(out, ctx, method);
        Ok(())
    })?;

    out.unindent();
    out.writeln("private:");
    out.indent();
    out.writeln(&format!("const ::android::sp<{}> mImpl;", iface_name));
    if support_oneway {
        out.writeln("::android::hardware::TaskRunner mOnewayQueue;");
        out.endl();
        out.writeln("::android::hardware::Return<void> addOnewayTask(std::function<void(void)>);");
        out.endl();
    }
    out.unindent();
    out.writeln("};");
    out.endl();

    leave_namespace(&mut out, ctx.package());
    out.write(&format!("\n#endif  // {}\n", guard));

    Ok(out.into_string())
}

/// Wrap an interface-typed value so the callee never sees a raw local
/// implementation: non-remote objects go through `wrapPassthrough` and a
/// `castFrom` back to the declared interface. No-op for other types.
fn wrap_passthrough_arg(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    var: &TypedVar,
    add_prefix: bool,
    handle_error: impl Fn(&mut Formatter),
) {
    let iface = match ctx.arena.get(ctx.arena.collapse_typedefs(var.ty)) {
        Type::Interface(iface) => iface,
        _ => return,
    };
    let name = format!("{}{}", if add_prefix { "_hidl_out_" } else { "" }, var.name);
    let wrapped_name = format!(
        "{}{}",
        if add_prefix {
            "_hidl_out_wrapped_"
        } else {
            "_hidl_wrapped_"
        },
        var.name
    );

    out.writeln(&format!(
        "::android::sp<{}> {};",
        iface.info.full_name.cpp_name(),
        wrapped_name
    ));
    out.s_if(&format!("{} != nullptr && !{}->isRemote()", name, name), |out| {
        out.writeln(&format!(
            "{} = {}::castFrom(::android::hardware::wrapPassthrough({}));",
            wrapped_name,
            iface.info.full_name.cpp_name(),
            name
        ));
        out.s_if(&format!("{} == nullptr", wrapped_name), |out| {
            // The Bs* class was not found in the binary or any of its
            // dynamic libraries.
            handle_error(out);
        })
        .endl();
    })
    .s_else(|out| {
        out.writeln(&format!("{} = {};", wrapped_name, name));
    })
    .endl()
    .endl();
}

fn is_interface_arg(ctx: &CppGen<'_>, var: &TypedVar) -> bool {
    ctx.arena
        .get(ctx.arena.collapse_typedefs(var.ty))
        .is_interface()
}

fn emit_passthrough_method(out: &mut Formatter, ctx: &CppGen<'_>, method: &Method) {
    let iface_name = ctx
        .interface()
        .expect("pass-through method of a types file")
        .1
        .info
        .local_name
        .clone();
    let elided = method.can_elide_callback(ctx.arena);
    let returns_through_callback = method.returns_value() && elided.is_none();

    out.writeln(&format!("{} {{", method.cpp_signature(ctx.arena, None)));
    out.indent();

    if returns_through_callback {
        emit_check_non_null(out, "_hidl_cb");
    }

    emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::PassthroughEntry);

    for arg in &method.args {
        wrap_passthrough_arg(out, ctx, arg, false /* add_prefix */, |out| {
            out.writeln("return ::android::hardware::Status::fromExceptionCode(");
            out.indent_by(2, |out| {
                out.writeln("::android::hardware::Status::EX_TRANSACTION_FAILED,");
                out.writeln("\"Cannot wrap passthrough interface.\");");
            });
        });
    }

    out.writeln("auto _hidl_error = ::android::hardware::Void();");
    out.write("auto _hidl_return = ");

    if method.oneway {
        out.write("addOnewayTask([this, &_hidl_error");
        for arg in &method.args {
            out.write(&format!(
                ", {}{}",
                if is_interface_arg(ctx, arg) {
                    "_hidl_wrapped_"
                } else {
                    ""
                },
                arg.name
            ));
        }
        out.writeln("] {");
        out.indent();
        out.write("this->");
    }

    out.write(&format!("mImpl->{}(", method.name));
    let mut first = true;
    for arg in &method.args {
        if !first {
            out.write(", ");
        }
        first = false;
        out.write(&format!(
            "{}{}",
            if is_interface_arg(ctx, arg) {
                "_hidl_wrapped_"
            } else {
                ""
            },
            arg.name
        ));
    }

    if returns_through_callback {
        if !method.args.is_empty() {
            out.write(", ");
        }
        out.write("[&](");
        let lambda_params = method
            .results
            .iter()
            .map(|result| format!("const auto &_hidl_out_{}", result.name))
            .collect::<Vec<_>>()
            .join(", ");
        out.write(&lambda_params);
        out.writeln(") {");
        out.scoped(|out| {
            emit_instrumentation_call(
                out,
                ctx,
                &iface_name,
                method,
                InstrumentationEvent::PassthroughExit,
            );

            for result in &method.results {
                wrap_passthrough_arg(out, ctx, result, true /* add_prefix */, |out| {
                    out.writeln("_hidl_error = ::android::hardware::Status::fromExceptionCode(");
                    out.indent_by(2, |out| {
                        out.writeln("::android::hardware::Status::EX_TRANSACTION_FAILED,");
                        out.writeln("\"Cannot wrap passthrough interface.\");");
                    });
                    out.writeln("return;");
                });
            }

            out.write("_hidl_cb(");
            let forwarded = method
                .results
                .iter()
                .map(|result| {
                    format!(
                        "{}{}",
                        if is_interface_arg(ctx, result) {
                            "_hidl_out_wrapped_"
                        } else {
                            "_hidl_out_"
                        },
                        result.name
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.write(&forwarded);
            out.writeln(");");
        });
        out.writeln("});");
        out.endl();
    } else {
        out.writeln(");");
        out.endl();
        if let Some(elided) = elided {
            out.writeln(&format!(
                "{} _hidl_out_{} = _hidl_return;",
                ctx.arena.get(elided.ty).cpp_result_type(ctx.arena),
                elided.name
            ));
        }
        emit_instrumentation_call(
            out,
            ctx,
            &iface_name,
            method,
            InstrumentationEvent::PassthroughExit,
        );
    }

    if method.oneway {
        out.unindent();
        out.writeln("});");
    }

    out.writeln("return _hidl_return;");

    out.unindent();
    out.writeln("}");
}

/// Constructor and one-way queue plumbing, emitted into the combined
/// source.
pub fn generate_source(ctx: &CppGen<'_>, out: &mut Formatter) -> Result<(), CodegenError> {
    let (iface_id, iface) = ctx.interface().expect("pass-through source of a types file");
    let klass = iface.info.full_name.interface_passthrough_name();
    let support_oneway = ctx.arena.has_oneway_methods(iface_id);

    out.write(&format!(
        "{klass}::{klass}(const ::android::sp<{iface}> impl) : ::android::hardware::HidlInstrumentor(\"{package}\", \"{name}\"), mImpl(impl) {{",
        klass = klass,
        iface = iface.info.full_name.cpp_name(),
        package = ctx.package().string(),
        name = iface.info.local_name
    ));
    if support_oneway {
        out.endl();
        out.scoped(|out| {
            out.writeln("mOnewayQueue.setLimit(3000 /* similar limit to binderized */);");
        });
    }
    out.writeln("}");
    out.endl();

    if support_oneway {
        out.writeln(&format!(
            "::android::hardware::Return<void> {}::addOnewayTask(std::function<void(void)> fun) {{",
            klass
        ));
        out.scoped(|out| {
            out.s_if("!mOnewayQueue.push(fun)", |out| {
                out.writeln("return ::android::hardware::Status::fromExceptionCode(");
                out.indent_by(2, |out| {
                    out.writeln("::android::hardware::Status::EX_TRANSACTION_FAILED);");
                });
            })
            .endl();
            out.writeln("return ::android::hardware::Status();");
        });
        out.writeln("}");
        out.endl();
    }

    Ok(())
}
