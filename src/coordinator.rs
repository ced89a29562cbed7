//! Contracts the core consumes: import parsing and output sinks
//!
//! The concrete coordinator (package root configuration, file lookup,
//! the actual parser) lives outside this crate; the AST only needs these
//! operations to chase imports and the emitter only needs them to
//! compose output paths.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{AstId, AstRegistry};
use crate::error::Error;
use crate::fqname::FQName;
use crate::types::TypeArena;

/// Import-side collaborator: parses a named artifact into the registry.
pub trait Coordinator {
    /// Parse (or find already parsed) the unit named by `fq_name`,
    /// registering it and everything it imports. Units pulled in
    /// transitively are added to `imported`.
    fn parse(
        &mut self,
        fq_name: &FQName,
        registry: &mut AstRegistry,
        arena: &mut TypeArena,
        imported: &mut BTreeSet<AstId>,
    ) -> Result<AstId, Error>;

    /// Enumerate the interfaces of a package (`p@1.0::IFoo`, ...,
    /// `p@1.0::types` if present) into `out`.
    fn append_package_interfaces_to_set(
        &self,
        package: &FQName,
        out: &mut Vec<FQName>,
    ) -> Result<(), Error>;

    /// Root directory fragment configured for the package, e.g.
    /// `android/hardware/` for `android.hardware.*`.
    fn convert_package_root_to_path(&self, package: &FQName) -> String;

    /// Package-relative directory, e.g. `foo/1.0/`.
    fn get_package_path(&self, package: &FQName, relative: bool) -> String;
}

/// Output-side collaborator: opens one sink per logical artifact.
/// Implementations guarantee parent directories exist.
pub trait SinkFactory {
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn io::Write>>;
}

/// Writes artifacts under a root directory.
pub struct FsSinkFactory {
    root: PathBuf,
}

impl FsSinkFactory {
    pub fn new(root: impl Into<PathBuf>) -> FsSinkFactory {
        FsSinkFactory { root: root.into() }
    }
}

impl SinkFactory for FsSinkFactory {
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn io::Write>> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(fs::File::create(path)?))
    }
}

/// Captures artifacts in memory, keyed by relative path.
#[derive(Default, Clone)]
pub struct MemorySinkFactory {
    files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
}

struct MemorySink {
    files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
    path: String,
}

impl io::Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .borrow_mut()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MemorySinkFactory {
    pub fn new() -> MemorySinkFactory {
        MemorySinkFactory::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }

    pub fn contents(&self, relative_path: &str) -> Option<String> {
        self.files
            .borrow()
            .get(relative_path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn io::Write>> {
        // A re-opened artifact starts over; failed emission attempts
        // never leave partial output behind.
        self.files
            .borrow_mut()
            .insert(relative_path.to_string(), Vec::new());
        Ok(Box::new(MemorySink {
            files: Rc::clone(&self.files),
            path: relative_path.to_string(),
        }))
    }
}
