//! Lexical scopes mapping local names to types

use std::collections::HashMap;

use crate::error::ResolveError;
use crate::fqname::FQName;
use crate::types::TypeId;

/// A name table for one lexical scope: the root of a translation unit,
/// an interface body, or a struct/union body. Keys are unique; insertion
/// order is preserved because emission walks sub-types in declaration
/// order; at most one contained type may be an interface.
#[derive(Debug, Default)]
pub struct Scope {
    local_name: String,
    index: HashMap<String, TypeId>,
    ordered: Vec<TypeId>,
    interface: Option<TypeId>,
}

impl Scope {
    pub fn new(local_name: &str) -> Scope {
        Scope {
            local_name: local_name.to_string(),
            index: HashMap::new(),
            ordered: Vec::new(),
            interface: None,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn add_type(
        &mut self,
        local_name: &str,
        id: TypeId,
        is_interface: bool,
    ) -> Result<(), ResolveError> {
        if self.index.contains_key(local_name) {
            return Err(ResolveError::DuplicateType(local_name.to_string()));
        }
        if is_interface {
            if self.interface.is_some() {
                return Err(ResolveError::DuplicateType(format!(
                    "{} (a scope may contain at most one interface)",
                    local_name
                )));
            }
            self.interface = Some(id);
        }
        self.index.insert(local_name.to_string(), id);
        self.ordered.push(id);
        Ok(())
    }

    /// Bare-identifier lookup: matches only when the query carries no
    /// package or version and names a single component.
    pub fn lookup_type(&self, fq_name: &FQName) -> Option<TypeId> {
        if !fq_name.package().is_empty() || !fq_name.version().is_empty() {
            return None;
        }
        let names = fq_name.names();
        if names.len() != 1 {
            return None;
        }
        self.index.get(names[0]).copied()
    }

    /// Contained types in declaration order.
    pub fn types(&self) -> &[TypeId] {
        &self.ordered
    }

    pub fn interface(&self) -> Option<TypeId> {
        self.interface
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
