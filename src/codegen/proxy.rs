//! Artifact 4: the client-side proxy (`BpHwFoo.h` and its method bodies)

use crate::error::CodegenError;
use crate::formatter::Formatter;
use crate::method::Method;
use crate::types::wire::ErrorMode;
use crate::types::TypeId;

use super::{
    declare_reader_locals, emit_check_non_null, emit_instrumentation_call, emit_reader_writer,
    emit_resolve_references, enter_namespace, for_each_chain_method, header_guard, hw_header,
    leave_namespace, package_include, CppGen, InstrumentationEvent,
};

pub fn generate_header(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let (iface_id, iface) = ctx.interface().expect("proxy header of a types file");
    let mut out = Formatter::new();
    let klass = iface.info.full_name.interface_proxy_name();
    let guard = header_guard(ctx.package(), &klass);

    out.writeln(&format!("#ifndef {}", guard));
    out.writeln(&format!("#define {}", guard));
    out.endl();

    out.writeln("#include <hidl/HidlTransportSupport.h>");
    out.endl();

    package_include(&mut out, ctx.package(), &hw_header::class_name(ctx));
    out.endl();

    enter_namespace(&mut out, ctx.package());
    out.endl();

    out.writeln(&format!(
        "struct {} : public ::android::hardware::BpInterface<{}>, public ::android::hardware::HidlInstrumentor {{",
        klass, iface.info.local_name
    ));
    out.indent();

    out.writeln(&format!(
        "explicit {}(const ::android::sp<::android::hardware::IBinder> &_hidl_impl);",
        klass
    ));
    out.endl();

    out.writeln("virtual bool isRemote() const override { return true; }");
    out.endl();

    for_each_chain_method(&mut out, ctx, iface_id, |out, _, method| {
        out.writeln(&format!("{} override;", method.cpp_signature(ctx.arena, None)));
        Ok(())
    })?;

    out.unindent();
    out.writeln("private:");
    out.indent();
    out.writeln("std::mutex _hidl_mMutex;");
    out.writeln(
        "std::vector<::android::sp<::android::hardware::hidl_binder_death_recipient>> _hidl_mDeathRecipients;",
    );
    out.unindent();
    out.writeln("};");
    out.endl();

    leave_namespace(&mut out, ctx.package());
    out.write(&format!("\n#endif  // {}\n", guard));

    Ok(out.into_string())
}

/// Constructor and every method body, emitted into the combined source.
pub fn generate_source(ctx: &CppGen<'_>, out: &mut Formatter) -> Result<(), CodegenError> {
    let (iface_id, iface) = ctx.interface().expect("proxy source of a types file");
    let klass = iface.info.full_name.interface_proxy_name();

    out.writeln(&format!(
        "{klass}::{klass}(const ::android::sp<::android::hardware::IBinder> &_hidl_impl)",
        klass = klass
    ));
    out.indent_by(2, |out| {
        out.writeln(&format!(": BpInterface<{}>(_hidl_impl),", iface.info.local_name));
        out.writeln(&format!(
            "  ::android::hardware::HidlInstrumentor(\"{}\", \"{}\") {{",
            ctx.package().string(),
            iface.info.local_name
        ));
    });
    out.writeln("}");
    out.endl();

    for_each_chain_method(out, ctx, iface_id, |out, super_id, method| {
        emit_proxy_method(out, ctx, &klass, super_id, method);
        Ok(())
    })
}

fn emit_proxy_method(
    out: &mut Formatter,
    ctx: &CppGen<'_>,
    klass: &str,
    super_id: TypeId,
    method: &Method,
) {
    let iface_name = ctx
        .interface()
        .expect("proxy method of a types file")
        .1
        .info
        .local_name
        .clone();
    let elided = method.can_elide_callback(ctx.arena);
    let returns_through_callback = method.returns_value() && elided.is_none();

    out.writeln(&format!("{} {{", method.cpp_signature(ctx.arena, Some(klass))));
    out.indent();

    if returns_through_callback {
        emit_check_non_null(out, "_hidl_cb");
    }

    emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ClientApiEntry);

    out.writeln("::android::hardware::Parcel _hidl_data;");
    out.writeln("::android::hardware::Parcel _hidl_reply;");
    out.writeln("::android::status_t _hidl_err;");
    out.writeln("::android::hardware::Status _hidl_status;");
    out.endl();

    declare_reader_locals(out, ctx, &method.results, true /* for_results */);

    out.writeln(&format!(
        "_hidl_err = _hidl_data.writeInterfaceToken({}::descriptor);",
        ctx.iface_fqname(super_id).cpp_name()
    ));
    out.writeln("if (_hidl_err != ::android::OK) { goto _hidl_error; }");
    out.endl();

    let has_interface_argument = method.args.iter().any(|arg| {
        ctx.arena
            .get(ctx.arena.collapse_typedefs(arg.ty))
            .is_interface()
    });

    // First pass: write all argument buffers.
    for arg in &method.args {
        emit_reader_writer(out, ctx, arg, "_hidl_data", false, false, ErrorMode::Goto, false);
    }
    // Second pass: resolve references.
    for arg in &method.args {
        emit_resolve_references(out, ctx, arg, "_hidl_data", false, false, ErrorMode::Goto, false);
    }

    if has_interface_argument {
        // The callee may call back on the passed interface.
        out.writeln("::android::hardware::ProcessState::self()->startThreadPool();");
    }

    out.write(&format!(
        "_hidl_err = remote()->transact({} /* {} */, _hidl_data, &_hidl_reply",
        method.serial_id, method.name
    ));
    if method.oneway {
        out.write(", ::android::hardware::IBinder::FLAG_ONEWAY");
    }
    out.writeln(");");
    out.writeln("if (_hidl_err != ::android::OK) { goto _hidl_error; }");
    out.endl();

    if !method.oneway {
        out.writeln("_hidl_err = ::android::hardware::readFromParcel(&_hidl_status, _hidl_reply);");
        out.writeln("if (_hidl_err != ::android::OK) { goto _hidl_error; }");
        out.endl();
        out.writeln("if (!_hidl_status.isOk()) { return _hidl_status; }");
        out.endl();

        for result in &method.results {
            emit_reader_writer(out, ctx, result, "_hidl_reply", false, true, ErrorMode::Goto, true);
        }
        for result in &method.results {
            emit_resolve_references(out, ctx, result, "_hidl_reply", false, true, ErrorMode::Goto, true);
        }

        if returns_through_callback {
            out.write("_hidl_cb(");
            let forwarded = method
                .results
                .iter()
                .map(|result| {
                    let deref = ctx.arena.get(result.ty).result_needs_deref(ctx.arena);
                    format!("{}_hidl_out_{}", if deref { "*" } else { "" }, result.name)
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.write(&forwarded);
            out.writeln(");");
            out.endl();
        }
    }

    emit_instrumentation_call(out, ctx, &iface_name, method, InstrumentationEvent::ClientApiExit);

    out.writeln("_hidl_status.setFromStatusT(_hidl_err);");
    match elided {
        Some(elided) => out.writeln(&format!(
            "return ::android::hardware::Return<{}>(_hidl_out_{});",
            ctx.arena.get(elided.ty).cpp_result_type(ctx.arena),
            elided.name
        )),
        None => out.writeln("return ::android::hardware::Return<void>();"),
    }
    out.endl();

    out.unindent();
    out.writeln("_hidl_error:");
    out.indent();
    out.writeln("_hidl_status.setFromStatusT(_hidl_err);");
    let error_return_type = match elided {
        Some(elided) => ctx.arena.get(elided.ty).cpp_result_type(ctx.arena),
        None => "void".to_string(),
    };
    out.writeln(&format!(
        "return ::android::hardware::Return<{}>(_hidl_status);",
        error_return_type
    ));

    out.unindent();
    out.writeln("}");
    out.endl();
}
