//! Resolved resource model: config validated and bound to static schema for runtime use.

use crate::query::{FieldSpec, Sortable};
use crate::schema::Table;
use crate::service::validation::RuleSet;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub path_segment: String,
    pub table: &'static Table,
    /// Name used in "<label> deleted successfully".
    pub label: String,
    pub per_page: u64,
    /// Eager-load paths applied to every response.
    pub with: Vec<String>,
    pub searchable: Vec<(String, FieldSpec)>,
    pub sortable: Sortable,
    pub create_rules: RuleSet,
    pub update_rules: RuleSet,
    /// Column names stripped from all responses.
    pub hidden: HashSet<String>,
    /// Empty: any authenticated caller.
    pub roles: Vec<String>,
    pub trash_roles: Vec<String>,
}

impl ResolvedResource {
    pub fn searchable_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.searchable.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub resources: Vec<ResolvedResource>,
    pub resource_by_path: HashMap<String, ResolvedResource>,
}

impl ResolvedModel {
    pub fn resource_by_path(&self, path: &str) -> Option<&ResolvedResource> {
        self.resource_by_path.get(path)
    }
}
