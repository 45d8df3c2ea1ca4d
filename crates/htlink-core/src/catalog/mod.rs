// ── Parameter catalog ──
//
// Immutable registry of parameter descriptors. Built once, shared via
// `Arc`, and consulted by the coordinator (partitioning, decoding) and
// the write gate (capability and limits).

mod builtin;
mod descriptor;

use std::collections::HashMap;
use std::sync::Arc;

pub use builtin::OPERATING_MODES;
pub use descriptor::{Access, Category, DataKind, Limits, ParameterDescriptor, QueryClass};

use crate::error::CatalogError;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<ParameterDescriptor>,
    by_id: HashMap<String, usize>,
    by_number: HashMap<(QueryClass, u16), usize>,
    defaults: Vec<String>,
}

impl Catalog {
    /// The process-wide heat pump catalog.
    pub fn builtin() -> Arc<Self> {
        builtin::shared()
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog from descriptors, preserving their order.
    ///
    /// Rejects duplicate identifiers, two descriptors sharing a register
    /// number within one query class, and inconsistent limits.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ParameterDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();
        for desc in descriptors {
            desc.check()?;
            let idx = catalog.entries.len();
            if catalog.by_id.contains_key(&desc.id) {
                return Err(CatalogError::DuplicateId { id: desc.id });
            }
            if let Some(&other) = catalog.by_number.get(&(desc.class, desc.number)) {
                return Err(CatalogError::DuplicateNumber {
                    class: desc.class,
                    number: desc.number,
                    first: catalog.entries[other].id.clone(),
                    second: desc.id,
                });
            }
            catalog.by_id.insert(desc.id.clone(), idx);
            catalog.by_number.insert((desc.class, desc.number), idx);
            catalog.entries.push(desc);
        }
        Ok(catalog)
    }

    /// Set the selection used when a configuration selects nothing.
    pub fn with_default_selection<'a>(
        mut self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, CatalogError> {
        let mut defaults = Vec::new();
        for id in ids {
            self.lookup(id)?;
            defaults.push(id.to_owned());
        }
        self.defaults = defaults;
        Ok(self)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn lookup(&self, id: &str) -> Result<&ParameterDescriptor, CatalogError> {
        self.get(id).ok_or_else(|| CatalogError::NotFound { id: id.to_owned() })
    }

    pub fn get(&self, id: &str) -> Option<&ParameterDescriptor> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// All descriptors in declaration order.
    pub fn all(&self) -> &[ParameterDescriptor] {
        &self.entries
    }

    /// Identifiers of one query class, in declaration order.
    pub fn by_query_class(&self, class: QueryClass) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|d| d.class == class)
            .map(|d| d.id.as_str())
            .collect()
    }

    /// Descriptor for a wire register number within a query class.
    pub fn by_number(&self, class: QueryClass, number: u16) -> Option<&ParameterDescriptor> {
        self.by_number
            .get(&(class, number))
            .map(|&idx| &self.entries[idx])
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ParameterDescriptor> {
        self.entries.iter().filter(move |d| d.category == category)
    }

    /// Default selection; every identifier if none was declared.
    pub fn default_selection(&self) -> Vec<String> {
        if self.defaults.is_empty() {
            self.entries.iter().map(|d| d.id.clone()).collect()
        } else {
            self.defaults.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
