//! Artifact 3: the server-side stub (`BnHwFoo.h` and its `onTransact`)

use crate::error::CodegenError;
use crate::formatter::Formatter;
use crate::method::Method;
use crate::types::wire::ErrorMode;
use crate::types::TypeId;

use super::{
    declare_reader_locals, emit_instrumentation_call, emit_reader_writer,
    emit_resolve_references, enter_namespace, header_guard, hw_header, leave_namespace,
    package_include, CppGen, InstrumentationEvent,
};

pub fn generate_header(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let (_, iface) = ctx.interface().expect("stub header of a types file");
    let mut out = Formatter::new();
    let klass = iface.info.full_name.interface_stub_name();
    let iface_name = &iface.info.local_name;
    let guard = header_guard(ctx.package(), &klass);

    out.writeln(&format!("#ifndef {}", guard));
    out.writeln(&format!("#define {}", guard));
    out.endl();

    package_include(&mut out, ctx.package(), &hw_header::class_name(ctx));
    out.endl();

    enter_namespace(&mut out, ctx.package());
    out.endl();

    out.write(&format!("struct {}", klass));
    match iface.super_type {
        None => {
            out.write(" : public ::android::hardware::BHwBinder");
            out.writeln(", public ::android::hardware::HidlInstrumentor {");
        }
        Some(super_id) => {
            out.writeln(&format!(" : public {} {{", super_stub_cpp_name(ctx, super_id)));
        }
    }
    out.indent();

    out.writeln(&format!(
        "explicit {}(const ::android::sp<{}> &_hidl_impl);",
        klass, iface_name
    ));
    out.writeln(&format!(
        "explicit {}(const ::android::sp<{}> &_hidl_impl, const std::string& HidlInstrumentor_package, const std::string& HidlInstrumentor_interface);",
        klass, iface_name
    ));
    out.endl();

    out.writeln("::android::status_t onTransact(");
    out.indent_by(2, |out| {
        out.writeln("uint32_t _hidl_code,");
        out.writeln("const ::android::hardware::Parcel &_hidl_data,");
        out.writeln("::android::hardware::Parcel *_hidl_reply,");
        out.writeln("uint32_t _hidl_flags = 0,");
        out.writeln("TransactCallback _hidl_cb = nullptr) override;");
    });
    out.endl();

    out.writeln(&format!(
        "::android::sp<{}> getImpl() {{ return _hidl_mImpl; }};",
        iface_name
    ));
    out.unindent();
    out.writeln("private:");
    out.indent();
    out.writeln(&format!("::android::sp<{}> _hidl_mImpl;", iface_name));
    out.unindent();
    out.writeln("};");
    out.endl();

    leave_namespace(&mut out, ctx.package());
    out.write(&format!("\n#endif  // {}\n", guard));

    Ok(out.into_string())
}

fn super_stub_cpp_name(ctx: &CppGen<'_>, super_id: TypeId) -> String {
    let super_fq = ctx.iface_fqname(super_id);
    format!(
        "{}::{}",
        super_fq.cpp_namespace(),
        super_fq.interface_stub_name()
    )
}

/// Constructors and the `onTransact` switch, emitted into the combined
/// source.
pub fn generate_source(ctx: &CppGen<'_>, out: &mut Formatter) -> Result<(), CodegenError> {
    let (iface_id, iface) = ctx.interface().expect("stub source of a types file");
    let klass = iface.info.full_name.interface_stub_name();
    let iface_name = &iface.info.local_name;

    // One-argument constructor: instrumentor identity is this interface.
    out.writeln(&format!(
        "{klass}::{klass}(const ::android::sp<{iface}> &_hidl_impl)",
        klass = klass,
        iface = iface_name
    ));
    out.indent_by(2, |out| match iface.super_type {
        None => out.writeln(&format!(
            ": ::android::hardware::HidlInstrumentor(\"{}\", \"{}\") {{",
            ctx.package().string(),
            iface_name
        )),
        Some(super_id) => out.writeln(&format!(
            ": {}(_hidl_impl, \"{}\", \"{}\") {{",
            super_stub_cpp_name(ctx, super_id),
            ctx.package().string(),
            iface_name
        )),
    });
    out.scoped(|out| {
        out.writeln("_hidl_mImpl = _hidl_impl;");
    });
    out.writeln("}");
    out.endl();

    // Forwarding constructor so derived stubs can name themselves to the
    // instrumentor.
    out.writeln(&format!(
        "{klass}::{klass}(const ::android::sp<{iface}> &_hidl_impl, const std::string &HidlInstrumentor_package, const std::string &HidlInstrumentor_interface)",
        klass = klass,
        iface = iface_name
    ));
    out.indent_by(2, |out| match iface.super_type {
        None => out.writeln(
            ": ::android::hardware::HidlInstrumentor(HidlInstrumentor_package, HidlInstrumentor_interface) {",
        ),
        Some(super_id) => out.writeln(&format!(
            ": {}(_hidl_impl, HidlInstrumentor_package, HidlInstrumentor_interface) {{",
            super_stub_cpp_name(ctx, super_id)
        )),
    });
    out.scoped(|out| {
        out.writeln("_hidl_mImpl = _hidl_impl;");
    });
    out.writeln("}");
    out.endl();

    out.writeln(&format!("::android::status_t {}::onTransact(", klass));
    out.indent_by(2, |out| {
        out.writeln("uint32_t _hidl_code,");
        out.writeln("const ::android::hardware::Parcel &_hidl_data,");
        out.writeln("::android::hardware::Parcel *_hidl_reply,");
        out.writeln("uint32_t _hidl_flags,");
        out.writeln("TransactCallback _hidl_cb) {");
    });
    out.indent();
    out.writeln("::android::status_t _hidl_err = ::android::OK;");
    out.endl();
    out.writeln("switch (_hidl_code) {");
    out.scoped(|out| {
        for (super_id, method) in ctx.arena.all_methods_from_root(iface_id) {
            out.writeln(&format!(
                "case {} /* {} */:",
                method.serial_id, method.name
            ));
            out.writeln("{");
            out.scoped(|out| {
                emit_stub_case(out, ctx, super_id, method);
            });
            out.writeln("}");
            out.endl();
        }

        out.writeln("default:");
        out.writeln("{");
        out.scoped(|out| {
            let delegate = match iface.super_type {
                None => "::android::hardware::BHwBinder".to_string(),
                Some(super_id) => super_stub_cpp_name(ctx, super_id),
            };
            out.writeln(&format!("return {}::onTransact(", delegate));
            out.indent_by(2, |out| {
                out.writeln("_hidl_code, _hidl_data, _hidl_reply, _hidl_flags, _hidl_cb);");
            });
        });
        out.writeln("}");
    });
    out.writeln("}");
    out.endl();

    out.s_if("_hidl_err == ::android::UNEXPECTED_NULL", |out| {
        out.writeln("_hidl_err = ::android::hardware::writeToParcel(");
        out.indent_by(2, |out| {
            out.writeln("::android::hardware::Status::fromExceptionCode(::android::hardware::Status::EX_NULL_POINTER),");
            out.writeln("_hidl_reply);");
        });
    })
    .endl();
    out.writeln("return _hidl_err;");
    out.unindent();
    out.writeln("}");
    out.endl();

    Ok(())
}

fn emit_stub_case(out: &mut Formatter, ctx: &CppGen<'_>, super_id: TypeId, method: &Method) {
    let super_fq = ctx.iface_fqname(super_id);
    let iface_name = ctx
        .interface()
        .expect("stub case of a types file")
        .1
        .info
        .local_name
        .clone();

    out.s_if(
        &format!("!_hidl_data.enforceInterface({}::descriptor)", super_fq.cpp_name()),
        |out| {
            out.writeln("_hidl_err = ::android::BAD_TYPE;");
            out.writeln("break;");
        },
    )
    .endl()
    .endl();

    declare_reader_locals(out, ctx, &method.args, false /* for_results */);

    // First pass: read argument buffers.
    for arg in &method.args {
        emit_reader_writer(out, ctx, arg, "_hidl_data", false, true, ErrorMode::Break, false);
    }
    // Second pass: resolve references.
    for arg in &method.args {
        emit_resolve_references(out, ctx, arg, "_hidl_data", false, true, ErrorMode::Break, false);
    }

    emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ServerApiEntry);

    let elided = method.can_elide_callback(ctx.arena);
    let impl_args = method
        .args
        .iter()
        .map(|arg| {
            let deref = ctx.arena.get(arg.ty).result_needs_deref(ctx.arena);
            format!("{}{}", if deref { "*" } else { "" }, arg.name)
        })
        .collect::<Vec<_>>()
        .join(", ");

    if let Some(elided) = elided {
        out.writeln(&format!(
            "{} _hidl_out_{} = _hidl_mImpl->{}({});",
            ctx.arena.get(elided.ty).cpp_result_type(ctx.arena),
            elided.name,
            method.name,
            impl_args
        ));
        out.endl();
        out.writeln(
            "::android::hardware::writeToParcel(::android::hardware::Status::ok(), _hidl_reply);",
        );
        out.endl();

        emit_reader_writer(out, ctx, elided, "_hidl_reply", true, false, ErrorMode::Ignore, true);
        emit_resolve_references(out, ctx, elided, "_hidl_reply", true, false, ErrorMode::Ignore, true);

        emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ServerApiExit);
        out.writeln("_hidl_cb(*_hidl_reply);");
    } else if method.returns_value() {
        out.writeln("bool _hidl_callbackCalled = false;");
        out.endl();

        out.write(&format!("_hidl_mImpl->{}(", method.name));
        if !impl_args.is_empty() {
            out.write(&impl_args);
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
            out.s_if("_hidl_callbackCalled", |out| {
                out.writeln(&format!(
                    "LOG_ALWAYS_FATAL(\"{}: _hidl_cb called a second time, but must be called once.\");",
                    method.name
                ));
            })
            .endl();
            out.writeln("_hidl_callbackCalled = true;");
            out.endl();

            out.writeln(
                "::android::hardware::writeToParcel(::android::hardware::Status::ok(), _hidl_reply);",
            );
            out.endl();

            for result in &method.results {
                emit_reader_writer(out, ctx, result, "_hidl_reply", true, false, ErrorMode::Ignore, true);
            }
            for result in &method.results {
                emit_resolve_references(
                    out, ctx, result, "_hidl_reply", true, false, ErrorMode::Ignore, true,
                );
            }

            emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ServerApiExit);
            out.writeln("_hidl_cb(*_hidl_reply);");
        });
        out.writeln("});");
        out.endl();

        out.s_if("!_hidl_callbackCalled", |out| {
            out.writeln(&format!(
                "LOG_ALWAYS_FATAL(\"{}: _hidl_cb not called, but must be called once.\");",
                method.name
            ));
        })
        .endl()
        .endl();
    } else {
        out.writeln(&format!("_hidl_mImpl->{}({});", method.name, impl_args));
        out.endl();
        emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ServerApiExit);
        out.writeln(
            "::android::hardware::writeToParcel(::android::hardware::Status::ok(), _hidl_reply);",
        );
        out.endl();
    }

    out.writeln("break;");
}
