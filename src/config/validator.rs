//! Config validation: tables, columns, relations and rule DSL of every resource.

use crate::config::{FieldSpecConfig, ResourcesFile, SortableConfig};
use crate::error::ConfigError;
use crate::query::pagination::MAX_PER_PAGE;
use crate::schema::{self, RelationKind, Table};
use crate::service::validation::RuleSet;
use std::collections::HashSet;

fn missing(kind: &'static str, id: String) -> ConfigError {
    ConfigError::MissingReference { kind, id }
}

/// Table a field spec reads from: the resource table, or the target of a non-polymorphic relation.
pub(crate) fn field_table(
    table: &'static Table,
    field: &str,
    spec: &FieldSpecConfig,
    to_one_only: bool,
) -> Result<&'static Table, ConfigError> {
    let Some(rel_name) = spec.relation.as_deref() else {
        return Ok(table);
    };
    let rel = table
        .relation(rel_name)
        .ok_or_else(|| missing("relation", format!("{}.{}", table.name, rel_name)))?;
    if to_one_only && !rel.is_to_one() {
        return Err(ConfigError::Validation(format!(
            "{}: sort field {} goes through to-many relation {}",
            table.name, field, rel_name
        )));
    }
    rel.target().ok_or_else(|| {
        ConfigError::Validation(format!(
            "{}: field {} cannot go through polymorphic relation {}",
            table.name, field, rel_name
        ))
    })
}

fn check_field(table: &'static Table, field: &str, spec: &FieldSpecConfig, sort: bool) -> Result<(), ConfigError> {
    let target = field_table(table, field, spec, sort)?;
    let column = spec.column.as_deref().unwrap_or(field);
    if !target.has_column(column) {
        return Err(missing("column", format!("{}.{}", target.name, column)));
    }
    Ok(())
}

/// Dotted eager-load path, e.g. `user.role`. Nothing may follow a polymorphic step.
fn check_with(table: &'static Table, path: &str) -> Result<(), ConfigError> {
    let mut current = Some(table);
    for step in path.split('.') {
        let t = current.ok_or_else(|| {
            ConfigError::Validation(format!("{}: cannot nest {} below a polymorphic relation", table.name, path))
        })?;
        let rel = t
            .relation(step)
            .ok_or_else(|| missing("relation", format!("{}.{}", t.name, step)))?;
        current = match rel.kind {
            RelationKind::MorphTo { .. } => None,
            _ => rel.target(),
        };
    }
    Ok(())
}

pub fn validate(config: &ResourcesFile) -> Result<(), ConfigError> {
    let mut path_segments = HashSet::new();
    for r in &config.resources {
        if !path_segments.insert(r.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(r.path_segment.clone()));
        }
        let table = schema::table(&r.table).ok_or_else(|| missing("table", r.table.clone()))?;
        if r.per_page == 0 || r.per_page > MAX_PER_PAGE {
            return Err(ConfigError::Validation(format!(
                "{}: per_page must be within 1..={}",
                r.path_segment, MAX_PER_PAGE
            )));
        }
        for path in &r.with {
            check_with(table, path)?;
        }
        for (field, spec) in &r.searchable {
            check_field(table, field, spec, false)?;
        }
        match &r.sortable {
            None => {}
            Some(SortableConfig::List(columns)) => {
                for c in columns {
                    if !table.has_column(c) {
                        return Err(missing("column", format!("{}.{}", table.name, c)));
                    }
                }
            }
            Some(SortableConfig::Map(fields)) => {
                for (field, spec) in fields {
                    check_field(table, field, spec, true)?;
                }
            }
        }
        for c in &r.hidden {
            if table.column(c).is_none() {
                return Err(missing("column", format!("{}.{}", table.name, c)));
            }
        }
        RuleSet::parse(&r.rules)?;
        if let Some(rules) = &r.update_rules {
            RuleSet::parse(rules)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use serde_json::json;

    fn file(resources: serde_json::Value) -> ResourcesFile {
        serde_json::from_value(json!({ "resources": resources })).unwrap()
    }

    fn one(extra: serde_json::Value) -> ResourcesFile {
        let mut base = json!({ "path_segment": "users", "table": "users" });
        for (k, v) in extra.as_object().unwrap() {
            base[k] = v.clone();
        }
        file(json!([base]))
    }

    #[test]
    fn accepts_minimal_resource() {
        assert!(validate(&one(json!({}))).is_ok());
        let r: &ResourceConfig = &one(json!({})).resources[0];
        assert_eq!(r.per_page, 15);
    }

    #[test]
    fn rejects_unknown_table_and_duplicate_paths() {
        let f = file(json!([{ "path_segment": "x", "table": "nope" }]));
        assert!(matches!(validate(&f), Err(ConfigError::MissingReference { kind: "table", .. })));
        let f = file(json!([
            { "path_segment": "users", "table": "users" },
            { "path_segment": "users", "table": "roles" }
        ]));
        assert!(matches!(validate(&f), Err(ConfigError::DuplicatePathSegment(_))));
    }

    #[test]
    fn checks_search_and_sort_fields() {
        let f = one(json!({ "searchable": { "role_code": { "column": "code", "relation": "role" } } }));
        assert!(validate(&f).is_ok());
        let f = one(json!({ "searchable": { "nope": {} } }));
        assert!(matches!(validate(&f), Err(ConfigError::MissingReference { kind: "column", .. })));
        let f = one(json!({ "sortable": { "news_title": { "column": "title", "relation": "news" } } }));
        assert!(matches!(validate(&f), Err(ConfigError::Validation(_))));
        let f = one(json!({ "sortable": ["id", "phone", "bogus"] }));
        assert!(validate(&f).is_err());
    }

    #[test]
    fn checks_with_paths() {
        assert!(validate(&one(json!({ "with": ["role", "shop.files"] }))).is_ok());
        assert!(validate(&one(json!({ "with": ["role.nothing"] }))).is_err());
        let f = file(json!([{ "path_segment": "files", "table": "files", "with": ["fileable.user"] }]));
        assert!(validate(&f).is_err());
    }

    #[test]
    fn checks_rule_dsl() {
        assert!(validate(&one(json!({ "rules": { "phone": "required|frobnicate" } }))).is_err());
        assert!(validate(&one(json!({ "per_page": 0 }))).is_err());
    }
}
