//! Unified error types for hidlgen using thiserror

use thiserror::Error;

use crate::fqname::FQName;

/// Top-level error type for generator operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("code generation error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name resolution and AST construction errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid fully-qualified name: {0}")]
    InvalidFqName(String),

    #[error("undefined type: {0}")]
    UndefinedType(String),

    #[error("unable to resolve type name '{query}', multiple matches found: {}", candidates.join(", "))]
    AmbiguousType {
        query: String,
        candidates: Vec<String>,
    },

    #[error("duplicate type definition: {0}")]
    DuplicateType(String),

    #[error("package {0} imports itself")]
    SelfImport(FQName),

    #[error("import of unknown package or type: {0}")]
    ImportNotFound(FQName),

    #[error("package {package} declares no interfaces")]
    EmptyPackage { package: FQName },
}

/// Code generation errors
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("translation unit {0} defines no interface and no types")]
    EmptyUnit(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),
}
