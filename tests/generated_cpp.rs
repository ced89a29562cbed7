//! Test that generated C++ has the structure the binder transport
//! expects
//!
//! These tests build translation units through the scope-entry API,
//! run the full artifact set through an in-memory sink factory, and
//! verify the generated text without requiring the Android runtime.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;

use hidlgen::ast::{Ast, AstId, AstRegistry};
use hidlgen::coordinator::{Coordinator, FsSinkFactory, MemorySinkFactory};
use hidlgen::error::{Error, ResolveError};
use hidlgen::method::{Annotation, Method, TypedVar};
use hidlgen::types::{CompoundStyle, ScalarKind, Type, TypeArena, VectorType};
use hidlgen::{generate_cpp, FQName};

/// Coordinator over pre-registered units: parse is a registry lookup.
struct TestCoordinator {
    units: Vec<FQName>,
}

impl TestCoordinator {
    fn new() -> TestCoordinator {
        TestCoordinator { units: Vec::new() }
    }
}

impl Coordinator for TestCoordinator {
    fn parse(
        &mut self,
        fq_name: &FQName,
        registry: &mut AstRegistry,
        _arena: &mut TypeArena,
        _imported: &mut BTreeSet<AstId>,
    ) -> Result<AstId, Error> {
        registry
            .lookup(fq_name)
            .ok_or_else(|| ResolveError::ImportNotFound(fq_name.clone()).into())
    }

    fn append_package_interfaces_to_set(
        &self,
        package: &FQName,
        out: &mut Vec<FQName>,
    ) -> Result<(), Error> {
        for unit in &self.units {
            if unit.package() == package.package() && unit.version() == package.version() {
                out.push(unit.clone());
            }
        }
        Ok(())
    }

    fn convert_package_root_to_path(&self, _package: &FQName) -> String {
        String::new()
    }

    fn get_package_path(&self, package: &FQName, _relative: bool) -> String {
        let mut path = package.package_and_version_components(false).join("/");
        path.push('/');
        path
    }
}

fn package(text: &str) -> FQName {
    FQName::parse(text).unwrap()
}

fn generate(ast: &Ast, registry: &AstRegistry, arena: &TypeArena) -> MemorySinkFactory {
    let coordinator = TestCoordinator::new();
    let mut sinks = MemorySinkFactory::new();
    generate_cpp(ast, registry, arena, &coordinator, &mut sinks).expect("generation failed");
    sinks
}

#[test]
fn scalar_method_generates_elided_return() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    let double = arena.alloc(Type::Scalar(ScalarKind::Double));
    ast.add_method(
        &mut arena,
        Method::new(
            "ping",
            vec![TypedVar::new("x", int32)],
            vec![TypedVar::new("value", double)],
        ),
    );
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);

    assert_eq!(
        sinks.paths(),
        vec![
            "p/demo/1.0/BnHwFoo.h",
            "p/demo/1.0/BpHwFoo.h",
            "p/demo/1.0/BsFoo.h",
            "p/demo/1.0/FooAll.cpp",
            "p/demo/1.0/IFoo.h",
            "p/demo/1.0/IHwFoo.h",
        ]
    );

    let header = sinks.contents("p/demo/1.0/IFoo.h").unwrap();
    assert!(header.contains("#ifndef HIDL_GENERATED_P_DEMO_V1_0_IFOO_H"));
    assert!(header.contains("struct IFoo : virtual public ::android::RefBase {"));
    assert!(header.contains("virtual ::android::hardware::Return<double> ping(int32_t x) = 0;"));
    assert!(header.contains("static const char* descriptor;"));
    assert!(header.contains("static ::android::sp<IFoo> getService(const std::string &serviceName=\"default\", bool getStub=false);"));
    // A single scalar result elides the callback alias entirely.
    assert!(!header.contains("ping_cb"));

    let proxy = sinks.contents("p/demo/1.0/BpHwFoo.h").unwrap();
    assert!(proxy.contains(
        "struct BpHwFoo : public ::android::hardware::BpInterface<IFoo>, public ::android::hardware::HidlInstrumentor {"
    ));
    assert!(proxy.contains("::android::hardware::Return<double> ping(int32_t x) override;"));

    let all = sinks.contents("p/demo/1.0/FooAll.cpp").unwrap();
    assert!(all.contains("const char* IFoo::descriptor(\"p.demo@1.0::IFoo\");"));
    assert!(all.contains(
        "_hidl_err = _hidl_data.writeInterfaceToken(::p::demo::V1_0::IFoo::descriptor);"
    ));
    assert!(all.contains("_hidl_err = _hidl_data.writeInt32(x);"));
    assert!(all.contains("_hidl_err = remote()->transact(1 /* ping */, _hidl_data, &_hidl_reply);"));
    assert!(all.contains("_hidl_err = ::android::hardware::readFromParcel(&_hidl_status, _hidl_reply);"));
    assert!(all.contains("_hidl_err = _hidl_reply.readDouble(&_hidl_out_value);"));
    assert!(all.contains("return ::android::hardware::Return<double>(_hidl_out_value);"));

    // Server side: token check, impl call, status-then-value reply.
    assert!(all.contains("case 1 /* ping */:"));
    assert!(all.contains("if (!_hidl_data.enforceInterface(::p::demo::V1_0::IFoo::descriptor)) {"));
    assert!(all.contains("double _hidl_out_value = _hidl_mImpl->ping(x);"));
    assert!(all.contains(
        "::android::hardware::writeToParcel(::android::hardware::Status::ok(), _hidl_reply);"
    ));
    assert!(all.contains("_hidl_err = _hidl_reply->writeDouble(_hidl_out_value);"));

    // Registration static block.
    assert!(all.contains("int IFoo::hidlStaticBlock = []() -> int {"));
    assert!(all.contains("::android::hardware::gBnConstructorMap[IFoo::descriptor]"));
    assert!(all.contains("::android::hardware::gBsConstructorMap[IFoo::descriptor]"));

    // Service-manager glue.
    assert!(all.contains("::android::sp<IFoo> IFoo::getService(const std::string &serviceName, bool getStub) {"));
    assert!(all.contains("::android::hardware::details::blockingHalBinderizationEnabled()"));
    assert!(all.contains("::android::status_t IFoo::registerAsService(const std::string &serviceName) {"));
    assert!(all.contains("sm->registerForNotifications(\"p.demo@1.0::IFoo\","));
}

#[test]
fn oneway_method_sets_flag_and_queues_passthrough() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    ast.add_method(&mut arena, Method::new("notify", vec![], vec![]).oneway());
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);
    let all = sinks.contents("p/demo/1.0/FooAll.cpp").unwrap();

    assert!(all.contains(
        "_hidl_err = remote()->transact(1 /* notify */, _hidl_data, &_hidl_reply, ::android::hardware::IBinder::FLAG_ONEWAY);"
    ));
    // No reply body on a one-way transaction.
    assert!(!all.contains("readFromParcel"));
    assert!(all.contains("return ::android::hardware::Return<void>();"));

    // The pass-through adapter dispatches through the bounded queue.
    let passthrough = sinks.contents("p/demo/1.0/BsFoo.h").unwrap();
    assert!(passthrough.contains("#include <hidl/TaskRunner.h>"));
    assert!(passthrough.contains("::android::hardware::TaskRunner mOnewayQueue;"));
    assert!(passthrough.contains("auto _hidl_return = addOnewayTask([this, &_hidl_error] {"));
    assert!(passthrough.contains("this->mImpl->notify();"));

    assert!(all.contains("mOnewayQueue.setLimit(3000 /* similar limit to binderized */);"));
    assert!(all.contains("if (!mOnewayQueue.push(fun)) {"));
    assert!(all.contains("::android::hardware::Status::EX_TRANSACTION_FAILED);"));
}

#[test]
fn two_results_generate_callback_contract() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    let vec32 = arena.alloc(Type::Vector(VectorType { element: int32 }));
    let string = arena.alloc(Type::HidlString);
    ast.add_method(
        &mut arena,
        Method::new(
            "foo",
            vec![TypedVar::new("x", int32)],
            vec![TypedVar::new("ys", vec32), TypedVar::new("name", string)],
        ),
    );
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);

    let header = sinks.contents("p/demo/1.0/IFoo.h").unwrap();
    assert!(header.contains(
        "using foo_cb = std::function<void(const ::android::hardware::hidl_vec<int32_t>& ys, const ::android::hardware::hidl_string& name)>;"
    ));
    assert!(header.contains(
        "virtual ::android::hardware::Return<void> foo(int32_t x, foo_cb _hidl_cb) = 0;"
    ));

    let all = sinks.contents("p/demo/1.0/FooAll.cpp").unwrap();

    // Proxy: null callback is an illegal argument, results come back
    // as pointers and are dereferenced into the callback.
    assert!(all.contains("if (_hidl_cb == nullptr) {"));
    assert!(all.contains("::android::hardware::Status::EX_ILLEGAL_ARGUMENT);"));
    assert!(all.contains("const ::android::hardware::hidl_vec<int32_t>* _hidl_out_ys;"));
    assert!(all.contains("const ::android::hardware::hidl_string* _hidl_out_name;"));
    assert!(all.contains("_hidl_cb(*_hidl_out_ys, *_hidl_out_name);"));

    // Stub: the callback must be invoked exactly once.
    assert!(all.contains("bool _hidl_callbackCalled = false;"));
    assert!(all.contains(
        "LOG_ALWAYS_FATAL(\"foo: _hidl_cb called a second time, but must be called once.\");"
    ));
    assert!(all.contains(
        "LOG_ALWAYS_FATAL(\"foo: _hidl_cb not called, but must be called once.\");"
    ));

    // Two-pass marshaling of the vector result.
    assert!(all.contains("size_t _hidl__hidl_out_ys_parent;"));
    assert!(all.contains("::android::hardware::writeEmbeddedToParcel("));
}

#[test]
fn imported_type_pulls_types_include() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();
    let mut coordinator = TestCoordinator::new();

    let mut types = Ast::new(package("q.pkg@1.0"), "q/pkg/1.0/types.hal");
    types
        .enter_compound(&mut arena, "Bar", CompoundStyle::Struct)
        .unwrap();
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    types.add_field(&mut arena, "x", int32);
    types.leave_scope();
    registry.register(types, &arena);
    coordinator.units.push(package("q.pkg@1.0::types"));

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.add_import("q.pkg@1.0::types", &mut coordinator, &mut registry, &mut arena)
        .unwrap();
    let bar = ast
        .lookup_type(&package("Bar"), &registry, &mut arena)
        .unwrap();
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    ast.add_method(&mut arena, Method::new("push", vec![TypedVar::new("bar", bar)], vec![]));
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);

    let header = sinks.contents("p/demo/1.0/IFoo.h").unwrap();
    assert!(header.contains("#include <q/pkg/1.0/types.h>"));
    assert!(header.contains(
        "virtual ::android::hardware::Return<void> push(const ::q::pkg::V1_0::Bar& bar) = 0;"
    ));

    let hw = sinks.contents("p/demo/1.0/IHwFoo.h").unwrap();
    assert!(hw.contains("#include <q/pkg/1.0/hwtypes.h>"));
}

#[test]
fn package_import_pulls_every_interface() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();
    let mut coordinator = TestCoordinator::new();

    let mut types = Ast::new(package("q.pkg@1.0"), "q/pkg/1.0/types.hal");
    types
        .enter_compound(&mut arena, "Bar", CompoundStyle::Struct)
        .unwrap();
    types.leave_scope();
    registry.register(types, &arena);

    let mut iq = Ast::new(package("q.pkg@1.0"), "q/pkg/1.0/IQ.hal");
    iq.enter_interface(&mut arena, "IQ", None).unwrap();
    iq.leave_scope();
    registry.register(iq, &arena);

    coordinator.units.push(package("q.pkg@1.0::IQ"));
    coordinator.units.push(package("q.pkg@1.0::types"));

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.add_import("q.pkg@1.0", &mut coordinator, &mut registry, &mut arena)
        .unwrap();
    assert_eq!(ast.imported_asts().len(), 2);

    // Both units are now visible to resolution.
    let bar = ast
        .lookup_type(&package("Bar"), &registry, &mut arena)
        .unwrap();
    assert!(arena.get(bar).is_compound());
    let iq_type = ast
        .lookup_type(&package("IQ"), &registry, &mut arena)
        .unwrap();
    assert!(arena.get(iq_type).is_interface());
    assert!(ast
        .imported_names()
        .contains(&package("q.pkg@1.0::IQ")));
}

#[test]
fn annotations_are_dumped_above_declarations() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    let method = Method::new("reset", vec![], vec![]).with_annotation(Annotation {
        name: "callflow".to_string(),
        params: vec![("next".to_string(), "\"*\"".to_string())],
    });
    ast.add_method(&mut arena, method);
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);
    let header = sinks.contents("p/demo/1.0/IFoo.h").unwrap();
    assert!(header.contains("@callflow(next=\"*\")"));
    assert!(header.contains("virtual ::android::hardware::Return<void> reset() = 0;"));
}

#[test]
fn ambiguous_import_aborts_resolution() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();
    let mut coordinator = TestCoordinator::new();

    for pkg in ["q.pkg@1.0", "r.pkg@1.0"] {
        let root = package(pkg);
        let mut types = Ast::new(root, "types.hal");
        types
            .enter_compound(&mut arena, "Bar", CompoundStyle::Struct)
            .unwrap();
        types.leave_scope();
        registry.register(types, &arena);
    }

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.add_import("q.pkg@1.0::types", &mut coordinator, &mut registry, &mut arena)
        .unwrap();
    ast.add_import("r.pkg@1.0::types", &mut coordinator, &mut registry, &mut arena)
        .unwrap();

    let err = ast
        .lookup_type(&package("Bar"), &registry, &mut arena)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("q.pkg@1.0::Bar"));
    assert!(message.contains("r.pkg@1.0::Bar"));
}

#[test]
fn self_import_is_rejected() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();
    let mut coordinator = TestCoordinator::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    let err = ast
        .add_import("p.demo@1.0::types", &mut coordinator, &mut registry, &mut arena)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::SelfImport(_))
    ));
}

#[test]
fn inheritance_chain_flattens_into_child_artifacts() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();

    let mut parent = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IParent.hal");
    let parent_id = parent.enter_interface(&mut arena, "IParent", None).unwrap();
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    parent.add_method(
        &mut arena,
        Method::new("m1", vec![TypedVar::new("x", int32)], vec![]),
    );
    parent.leave_scope();
    registry.register(parent, &arena);

    let mut child = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IChild.hal");
    child
        .enter_interface(&mut arena, "IChild", Some(parent_id))
        .unwrap();
    child.add_method(&mut arena, Method::new("m2", vec![], vec![]));
    child.leave_scope();

    let sinks = generate(&child, &registry, &arena);

    let proxy = sinks.contents("p/demo/1.0/BpHwChild.h").unwrap();
    assert!(proxy.contains("// Methods from ::p::demo::V1_0::IParent follow."));
    assert!(proxy.contains("::android::hardware::Return<void> m1(int32_t x) override;"));
    assert!(proxy.contains("// Methods from ::p::demo::V1_0::IChild follow."));
    assert!(proxy.contains("::android::hardware::Return<void> m2() override;"));

    let header = sinks.contents("p/demo/1.0/IChild.h").unwrap();
    assert!(header.contains("struct IChild : public ::p::demo::V1_0::IParent {"));
    assert!(header.contains(
        "static ::android::sp<::p::demo::V1_0::IChild> castFrom(const ::android::sp<::p::demo::V1_0::IChild>& parent);"
    ));
    assert!(header.contains(
        "static ::android::sp<::p::demo::V1_0::IChild> castFrom(const ::android::sp<::p::demo::V1_0::IParent>& parent);"
    ));

    let all = sinks.contents("p/demo/1.0/ChildAll.cpp").unwrap();

    // Serial ids are pairwise distinct across the chain, numbered from
    // the root.
    assert!(all.contains("case 1 /* m1 */:"));
    assert!(all.contains("case 2 /* m2 */:"));
    assert!(all.contains("if (!_hidl_data.enforceInterface(::p::demo::V1_0::IParent::descriptor)) {"));
    assert!(all.contains("if (!_hidl_data.enforceInterface(::p::demo::V1_0::IChild::descriptor)) {"));
    assert!(all.contains("return ::p::demo::V1_0::BnHwParent::onTransact("));

    // The stub forwards its instrumentor identity through the parent.
    assert!(all.contains(
        "BnHwChild::BnHwChild(const ::android::sp<IChild> &_hidl_impl)"
    ));
    assert!(all.contains(": ::p::demo::V1_0::BnHwParent(_hidl_impl, \"p.demo@1.0\", \"IChild\") {"));

    // castFrom through the chain goes through castInterface.
    assert!(all.contains(
        "return ::android::hardware::castInterface<IChild, ::p::demo::V1_0::IParent, BpHwChild, ::p::demo::V1_0::BpHwParent>("
    ));
    assert!(all.contains("parent, \"p.demo@1.0::IChild\");"));
}

#[test]
fn interface_argument_starts_thread_pool_and_wraps_passthrough() {
    let mut arena = TypeArena::new();
    let mut registry = AstRegistry::new();

    let mut callback_unit = Ast::new(package("p.demo@1.0"), "p/demo/1.0/ICallback.hal");
    let callback_id = callback_unit
        .enter_interface(&mut arena, "ICallback", None)
        .unwrap();
    callback_unit.leave_scope();
    registry.register(callback_unit, &arena);

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    ast.add_method(
        &mut arena,
        Method::new("setCallback", vec![TypedVar::new("cb", callback_id)], vec![]),
    );
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);
    let all = sinks.contents("p/demo/1.0/FooAll.cpp").unwrap();

    assert!(all.contains("::android::hardware::ProcessState::self()->startThreadPool();"));
    assert!(all.contains("_hidl_err = _hidl_data.writeStrongBinder(nullptr);"));
    assert!(all.contains("_hidl_err = _hidl_data.readNullableStrongBinder(&_hidl_binder);"));

    let passthrough = sinks.contents("p/demo/1.0/BsFoo.h").unwrap();
    assert!(passthrough.contains("if (cb != nullptr && !cb->isRemote()) {"));
    assert!(passthrough.contains(
        "_hidl_wrapped_cb = ::p::demo::V1_0::ICallback::castFrom(::android::hardware::wrapPassthrough(cb));"
    ));
    assert!(passthrough.contains("\"Cannot wrap passthrough interface.\");"));
    assert!(passthrough.contains("mImpl->setCallback(_hidl_wrapped_cb);"));
}

#[test]
fn types_unit_emits_type_artifacts_with_wire_hooks() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/types.hal");
    ast.enter_compound(&mut arena, "Record", CompoundStyle::Struct)
        .unwrap();
    let string = arena.alloc(Type::HidlString);
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    ast.add_field(&mut arena, "label", string);
    ast.add_field(&mut arena, "count", int32);
    ast.leave_scope();

    let sinks = generate(&ast, &registry, &arena);
    assert_eq!(
        sinks.paths(),
        vec![
            "p/demo/1.0/hwtypes.h",
            "p/demo/1.0/types.cpp",
            "p/demo/1.0/types.h",
        ]
    );

    let header = sinks.contents("p/demo/1.0/types.h").unwrap();
    assert!(header.contains("struct Record {"));
    assert!(header.contains("::android::hardware::hidl_string label;"));
    assert!(header.contains("int32_t count;"));

    let hw = sinks.contents("p/demo/1.0/hwtypes.h").unwrap();
    assert!(hw.contains("::android::status_t writeEmbeddedToParcel("));
    assert!(hw.contains("const ::p::demo::V1_0::Record &obj,"));

    let source = sinks.contents("p/demo/1.0/types.cpp").unwrap();
    assert!(source.contains("#define LOG_TAG \"p.demo@1.0::types\""));
    assert!(source.contains("parentOffset + offsetof(::p::demo::V1_0::Record, label));"));
    // The plain int32 field needs no fixup.
    assert!(!source.contains("offsetof(::p::demo::V1_0::Record, count)"));
}

#[test]
fn artifacts_can_be_written_to_disk() {
    let mut arena = TypeArena::new();
    let registry = AstRegistry::new();

    let mut ast = Ast::new(package("p.demo@1.0"), "p/demo/1.0/IFoo.hal");
    ast.enter_interface(&mut arena, "IFoo", None).unwrap();
    let int32 = arena.alloc(Type::Scalar(ScalarKind::Int32));
    ast.add_method(
        &mut arena,
        Method::new("poke", vec![TypedVar::new("x", int32)], vec![]),
    );
    ast.leave_scope();

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let coordinator = TestCoordinator::new();
    let mut sinks = FsSinkFactory::new(temp_dir.path());
    generate_cpp(&ast, &registry, &arena, &coordinator, &mut sinks).expect("generation failed");

    let header_path = temp_dir.path().join("p/demo/1.0/IFoo.h");
    assert!(header_path.exists());
    let contents = std::fs::read_to_string(&header_path).expect("failed to read header");
    assert!(contents.contains("virtual ::android::hardware::Return<void> poke(int32_t x) = 0;"));
}
