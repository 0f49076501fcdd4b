//! Raw resource config types matching `resources.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_per_page() -> u64 {
    15
}

/// One logical search/sort field. `column` defaults to the field's key; `condition` to equality.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldSpecConfig {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    /// Relation name on the resource table; the column then lives on the related table.
    #[serde(default)]
    pub relation: Option<String>,
}

/// Sort whitelist: a flat column list, or logical keys mapped to columns.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortableConfig {
    List(Vec<String>),
    Map(BTreeMap<String, FieldSpecConfig>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub path_segment: String,
    pub table: String,
    /// Display name in acknowledgment messages; defaults to the table's model name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    /// Relations eager-loaded on every response (dotted paths allowed).
    #[serde(default)]
    pub with: Vec<String>,
    #[serde(default)]
    pub searchable: BTreeMap<String, FieldSpecConfig>,
    #[serde(default)]
    pub sortable: Option<SortableConfig>,
    /// Field → rule DSL, used on create and full update.
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
    /// Separate rule-set for updates; falls back to `rules`.
    #[serde(default)]
    pub update_rules: Option<BTreeMap<String, String>>,
    /// Columns never included in responses.
    #[serde(default)]
    pub hidden: Vec<String>,
    /// Role codes allowed to use CRUD routes; empty means any authenticated caller.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Role codes allowed to restore and force-delete.
    #[serde(default)]
    pub trash_roles: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourcesFile {
    pub resources: Vec<ResourceConfig>,
}
