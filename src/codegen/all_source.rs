//! Artifact 6: the combined implementation file (`FooAll.cpp` /
//! `types.cpp`)
//!
//! Defines the wire hooks of every user-defined type, the interface
//! descriptor, the constructor-map static block, the cast chain, the
//! proxy, stub and pass-through implementations, and the
//! service-manager glue.

use crate::error::CodegenError;
use crate::formatter::Formatter;
use crate::types::wire::ErrorMode;
use crate::types::{Interface, TypeId};

use super::{
    enter_namespace, for_each_compound, leave_namespace, package_include, passthrough, proxy,
    stub, CppGen, IBASE_CPP, SERVICE_MANAGER_CPP, SERVICE_NOTIFICATION_CPP,
};

pub fn generate(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let mut out = Formatter::new();
    let iface = ctx.interface();
    let base = match iface {
        Some((_, iface)) => iface.info.full_name.interface_base_name(),
        None => "types".to_string(),
    };

    out.writeln(&format!(
        "#define LOG_TAG \"{}::{}\"",
        ctx.package().string(),
        base
    ));
    out.endl();

    out.writeln("#include <android/log.h>");
    out.writeln("#include <cutils/trace.h>");
    out.writeln("#include <hidl/HidlTransportSupport.h>");
    out.endl();

    if let Some((iface_id, iface)) = iface {
        // A no-op include for IServiceManager itself.
        out.writeln("#include <android/hidl/manager/1.0/IServiceManager.h>");
        out.writeln("#include <hidl/LegacySupport.h>");
        let fq = &iface.info.full_name;
        package_include(&mut out, ctx.package(), &fq.interface_proxy_name());
        package_include(&mut out, ctx.package(), &fq.interface_stub_name());
        package_include(&mut out, ctx.package(), &fq.interface_passthrough_name());
        for super_id in ctx.arena.interface_chain(iface_id).into_iter().skip(1) {
            let super_fq = ctx.iface_fqname(super_id);
            package_include(&mut out, super_fq, &super_fq.interface_proxy_name());
        }
        out.writeln("#include <hidl/ServiceManagement.h>");
    } else {
        package_include(&mut out, ctx.package(), "types");
        package_include(&mut out, ctx.package(), "hwtypes");
    }
    out.endl();

    enter_namespace(&mut out, ctx.package());
    out.endl();

    emit_embedded_hook_definitions(&mut out, ctx);

    if let Some((iface_id, iface)) = iface {
        emit_descriptor_and_static_block(&mut out, iface);
        emit_cast_chain(&mut out, ctx, iface_id, iface);
        proxy::generate_source(ctx, &mut out)?;
        stub::generate_source(ctx, &mut out)?;
        passthrough::generate_source(ctx, &mut out)?;

        if iface.is_ibase() {
            out.writeln("// skipped getService, registerAsService, registerForNotifications");
        } else {
            emit_service_manager_glue(&mut out, iface);
        }
    }

    leave_namespace(&mut out, ctx.package());
    Ok(out.into_string())
}

/// Definitions of the per-UDT embedded read/write hooks declared by the
/// wire-format header: one call per field that carries references, at
/// the field's offset inside the parent buffer.
fn emit_embedded_hook_definitions(out: &mut Formatter, ctx: &CppGen<'_>) {
    for_each_compound(ctx, |id, compound| {
        if !ctx.arena.get(id).needs_resolve_references(ctx.arena) {
            return;
        }
        let cpp_name = compound.info.full_name.cpp_name();

        for is_reader in [false, true] {
            if is_reader {
                out.writeln("::android::status_t readEmbeddedFromParcel(");
                out.indent_by(2, |out| {
                    out.writeln(&format!("{} &obj,", cpp_name));
                    out.writeln("const ::android::hardware::Parcel &parcel,");
                    out.writeln("size_t parentHandle,");
                    out.writeln("size_t parentOffset) {");
                });
            } else {
                out.writeln("::android::status_t writeEmbeddedToParcel(");
                out.indent_by(2, |out| {
                    out.writeln(&format!("const {} &obj,", cpp_name));
                    out.writeln("::android::hardware::Parcel *parcel,");
                    out.writeln("size_t parentHandle,");
                    out.writeln("size_t parentOffset) {");
                });
            }
            out.scoped(|out| {
                out.writeln("::android::status_t _hidl_err = ::android::OK;");
                out.endl();
                for field in &compound.fields {
                    let field_type = ctx.arena.get(field.ty);
                    if !field_type.needs_resolve_references(ctx.arena) {
                        continue;
                    }
                    field_type.emit_embedded_resolve(
                        out,
                        ctx.arena,
                        &format!("obj.{}", field.name),
                        "parcel",
                        "parentHandle",
                        &format!("parentOffset + offsetof({}, {})", cpp_name, field.name),
                        is_reader,
                        ErrorMode::Return,
                        &field.name,
                        0,
                    );
                    out.endl();
                }
                out.writeln("return _hidl_err;");
            });
            out.writeln("}");
            out.endl();
        }
    });
}

fn emit_descriptor_and_static_block(out: &mut Formatter, iface: &Interface) {
    let name = &iface.info.local_name;
    let fq = &iface.info.full_name;

    out.writeln(&format!(
        "const char* {}::descriptor(\"{}\");",
        name,
        fq.string()
    ));
    out.endl();

    out.writeln(&format!("int {}::hidlStaticBlock = []() -> int {{", name));
    out.scoped(|out| {
        out.writeln(&format!(
            "::android::hardware::gBnConstructorMap[{}::descriptor]",
            name
        ));
        out.indent_by(2, |out| {
            out.writeln("= [](void *iIntf) -> ::android::sp<::android::hardware::IBinder> {");
            out.scoped(|out| {
                out.writeln(&format!(
                    "return new {}(reinterpret_cast<{} *>(iIntf));",
                    fq.interface_stub_name(),
                    name
                ));
            });
            out.writeln("};");
        });
        out.writeln(&format!(
            "::android::hardware::gBsConstructorMap[{}::descriptor]",
            name
        ));
        out.indent_by(2, |out| {
            out.writeln(&format!("= [](void *iIntf) -> ::android::sp<{}> {{", IBASE_CPP));
            out.scoped(|out| {
                out.writeln(&format!(
                    "return new {}(reinterpret_cast<{} *>(iIntf));",
                    fq.interface_passthrough_name(),
                    name
                ));
            });
            out.writeln("};");
        });
        out.writeln("return 1;");
    });
    out.writeln("}();");
    out.endl();
}

/// `castFrom` for every ancestor: identity for the interface itself, a
/// descriptor-checked `castInterface` otherwise.
fn emit_cast_chain(out: &mut Formatter, ctx: &CppGen<'_>, iface_id: TypeId, iface: &Interface) {
    let child_result = ctx.arena.get(iface_id).cpp_stack_type(ctx.arena);

    for super_id in ctx.arena.interface_chain(iface_id) {
        out.writeln("// static ");
        out.writeln(&format!(
            "{} {}::castFrom({} parent) {{",
            child_result,
            iface.info.local_name,
            ctx.arena.get(super_id).cpp_argument_type(ctx.arena)
        ));
        out.scoped(|out| {
            if super_id == iface_id {
                out.writeln("return parent;");
            } else {
                let super_fq = ctx.iface_fqname(super_id);
                out.writeln(&format!(
                    "return ::android::hardware::castInterface<{}, {}, {}, {}>(",
                    iface.info.local_name,
                    super_fq.cpp_name(),
                    iface.info.full_name.interface_proxy_name(),
                    format!("{}::{}", super_fq.cpp_namespace(), super_fq.interface_proxy_name())
                ));
                out.indent_by(2, |out| {
                    out.writeln(&format!("parent, \"{}\");", iface.info.full_name.string()));
                });
            }
        });
        out.writeln("}");
        out.endl();
    }
}

fn emit_service_manager_glue(out: &mut Formatter, iface: &Interface) {
    let name = &iface.info.local_name;
    let fq = &iface.info.full_name;
    let package_key = format!("{}{}", fq.package(), fq.at_version());

    // getService: binderized first, then the pass-through fallback.
    out.writeln("// static");
    out.writeln(&format!(
        "::android::sp<{}> {}::getService(const std::string &serviceName, bool getStub) {{",
        name, name
    ));
    out.scoped(|out| {
        out.writeln(&format!("::android::sp<{}> iface = nullptr;", name));
        out.writeln(&format!(
            "::android::vintf::Transport transport = ::android::hardware::getTransportFromManifest(\"{}\");",
            fq.package()
        ));
        out.s_if(
            "!getStub && (transport == ::android::vintf::Transport::HWBINDER || transport == ::android::vintf::Transport::TOGGLED || transport == ::android::vintf::Transport::PASSTHROUGH || transport == ::android::vintf::Transport::EMPTY)",
            |out| {
                out.writeln(&format!("const ::android::sp<{}> sm", SERVICE_MANAGER_CPP));
                out.indent_by(2, |out| {
                    out.writeln("= ::android::hardware::defaultServiceManager();");
                });
                out.s_if("sm != nullptr", |out| {
                    out.s_if(
                        "transport == ::android::vintf::Transport::HWBINDER ||(transport == ::android::vintf::Transport::TOGGLED && ::android::hardware::details::blockingHalBinderizationEnabled())",
                        |out| {
                            out.writeln(&format!(
                                "::android::hardware::details::waitForHwService({}::descriptor, serviceName);",
                                name
                            ));
                        },
                    )
                    .endl();
                    out.writeln(&format!(
                        "::android::hardware::Return<::android::sp<{}>> ret = ",
                        IBASE_CPP
                    ));
                    out.indent_by(2, |out| {
                        out.writeln(&format!("sm->get({}::descriptor, serviceName);", name));
                    });
                    out.s_if("ret.isOk()", |out| {
                        out.writeln(&format!("iface = {}::castFrom(ret);", name));
                        out.s_if("iface != nullptr", |out| {
                            out.writeln("return iface;");
                        })
                        .endl();
                    })
                    .endl();
                })
                .endl();
            },
        )
        .endl();

        out.s_if(
            "getStub || transport == ::android::vintf::Transport::PASSTHROUGH || (transport == ::android::vintf::Transport::TOGGLED && !::android::hardware::details::blockingHalBinderizationEnabled()) ||transport == ::android::vintf::Transport::EMPTY",
            |out| {
                out.writeln(&format!("const ::android::sp<{}> pm", SERVICE_MANAGER_CPP));
                out.indent_by(2, |out| {
                    out.writeln("= ::android::hardware::getPassthroughServiceManager();");
                });
                out.s_if("pm != nullptr", |out| {
                    out.writeln(&format!(
                        "::android::hardware::Return<::android::sp<{}>> ret = ",
                        IBASE_CPP
                    ));
                    out.indent_by(2, |out| {
                        out.writeln(&format!("pm->get({}::descriptor, serviceName);", name));
                    });
                    out.s_if("ret.isOk()", |out| {
                        out.writeln(&format!(
                            "::android::sp<{}> baseInterface = ret;",
                            IBASE_CPP
                        ));
                        out.s_if("baseInterface != nullptr", |out| {
                            out.writeln(&format!(
                                "iface = new {}({}::castFrom(baseInterface));",
                                fq.interface_passthrough_name(),
                                name
                            ));
                        })
                        .endl();
                    })
                    .endl();
                })
                .endl();
            },
        )
        .endl();

        out.writeln("return iface;");
    });
    out.writeln("}");
    out.endl();

    out.writeln(&format!(
        "::android::status_t {}::registerAsService(const std::string &serviceName) {{",
        name
    ));
    out.scoped(|out| {
        out.writeln(&format!("const ::android::sp<{}> sm", SERVICE_MANAGER_CPP));
        out.indent_by(2, |out| {
            out.writeln("= ::android::hardware::defaultServiceManager();");
        });
        out.s_if("sm == nullptr", |out| {
            out.writeln("return ::android::INVALID_OPERATION;");
        })
        .endl();
        out.writeln("bool success = false;");
        out.writeln("::android::hardware::Return<void> ret =");
        out.indent_by(2, |out| {
            out.write("this->interfaceChain([&success, &sm, &serviceName, this](const auto &chain) ");
            out.block(|out| {
                out.writeln(
                    "::android::hardware::Return<bool> addRet = sm->add(chain, serviceName.c_str(), this);",
                );
                out.writeln("success = addRet.isOk() && addRet;");
            });
            out.writeln(");");
            out.writeln("success = success && ret.isOk();");
        });
        out.writeln("return success ? ::android::OK : ::android::UNKNOWN_ERROR;");
    });
    out.writeln("}");
    out.endl();

    out.writeln(&format!("bool {}::registerForNotifications(", name));
    out.indent_by(2, |out| {
        out.writeln("const std::string &serviceName,");
        out.writeln(&format!(
            "const ::android::sp<{}> &notification) {{",
            SERVICE_NOTIFICATION_CPP
        ));
    });
    out.scoped(|out| {
        out.writeln(&format!("const ::android::sp<{}> sm", SERVICE_MANAGER_CPP));
        out.indent_by(2, |out| {
            out.writeln("= ::android::hardware::defaultServiceManager();");
        });
        out.s_if("sm == nullptr", |out| {
            out.writeln("return false;");
        })
        .endl();
        out.writeln("::android::hardware::Return<bool> success =");
        out.indent_by(2, |out| {
            out.writeln(&format!(
                "sm->registerForNotifications(\"{}::{}\",",
                package_key, name
            ));
            out.indent_by(2, |out| {
                out.writeln("serviceName, notification);");
            });
        });
        out.writeln("return success.isOk() && success;");
    });
    out.writeln("}");
    out.endl();
}
