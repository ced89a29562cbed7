//! Artifact 2: the wire-format helper header (`IHwFoo.h` / `hwtypes.h`)

use crate::error::CodegenError;
use crate::formatter::Formatter;

use super::{
    enter_namespace, for_each_compound, header_guard, leave_namespace, package_include, CppGen,
};

pub fn class_name(ctx: &CppGen<'_>) -> String {
    match ctx.interface() {
        Some((_, iface)) => iface.info.full_name.interface_hw_name(),
        None => "hwtypes".to_string(),
    }
}

pub fn generate(ctx: &CppGen<'_>) -> Result<String, CodegenError> {
    let mut out = Formatter::new();
    let klass = class_name(ctx);
    let guard = header_guard(ctx.package(), &klass);

    out.writeln(&format!("#ifndef {}", guard));
    out.writeln(&format!("#define {}", guard));
    out.endl();

    package_include(&mut out, ctx.package(), &ctx.base_file_name());
    out.endl();

    for item in ctx.ast.imported_names() {
        if item.name() == "types" {
            package_include(&mut out, item, "hwtypes");
        } else {
            package_include(&mut out, item, &item.interface_stub_name());
            package_include(&mut out, item, &item.interface_proxy_name());
        }
    }
    out.endl();

    out.writeln("#include <hidl/Status.h>");
    out.writeln("#include <hwbinder/IBinder.h>");
    out.writeln("#include <hwbinder/Parcel.h>");
    out.endl();

    enter_namespace(&mut out, ctx.package());
    out.endl();

    emit_embedded_hook_declarations(&mut out, ctx);

    leave_namespace(&mut out, ctx.package());
    out.write(&format!("\n#endif  // {}\n", guard));

    Ok(out.into_string())
}

/// Declare the per-UDT embedded read/write hooks for every compound
/// type whose wire image carries references.
fn emit_embedded_hook_declarations(out: &mut Formatter, ctx: &CppGen<'_>) {
    for_each_compound(ctx, |id, compound| {
        if !ctx.arena.get(id).needs_resolve_references(ctx.arena) {
            return;
        }
        let cpp_name = compound.info.full_name.cpp_name();
        out.writeln("::android::status_t writeEmbeddedToParcel(");
        out.indent_by(2, |out| {
            out.writeln(&format!("const {} &obj,", cpp_name));
            out.writeln("::android::hardware::Parcel *parcel,");
            out.writeln("size_t parentHandle,");
            out.writeln("size_t parentOffset);");
        });
        out.endl();
        out.writeln("::android::status_t readEmbeddedFromParcel(");
        out.indent_by(2, |out| {
            out.writeln(&format!("{} &obj,", cpp_name));
            out.writeln("const ::android::hardware::Parcel &parcel,");
            out.writeln("size_t parentHandle,");
            out.writeln("size_t parentOffset);");
        });
        out.endl();
    });
}
