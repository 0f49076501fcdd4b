//! Load resource config from the bundled JSON or a file, and resolve it against the static schema.

use crate::config::resolved::{ResolvedModel, ResolvedResource};
use crate::config::types::*;
use crate::config::validator::field_table;
use crate::config::validate;
use crate::error::ConfigError;
use crate::query::{Condition, FieldSpec, Sortable};
use crate::schema::{self, Table};
use crate::service::validation::RuleSet;
use std::collections::{BTreeMap, HashMap};

/// Resource definitions compiled into the binary.
pub const BUILTIN_RESOURCES: &str = include_str!("resources.json");

pub fn parse_resources(json: &str) -> Result<ResourcesFile, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read resources from `path` when given, else the built-in set.
pub fn load_resources(path: Option<&str>) -> Result<ResourcesFile, ConfigError> {
    match path {
        Some(p) => {
            tracing::info!(path = %p, "loading resource config");
            let text = std::fs::read_to_string(p).map_err(|e| ConfigError::Load(format!("{}: {}", p, e)))?;
            parse_resources(&text)
        }
        None => parse_resources(BUILTIN_RESOURCES),
    }
}

fn field_spec(table: &'static Table, key: &str, cfg: &FieldSpecConfig) -> Result<FieldSpec, ConfigError> {
    let relation = match cfg.relation.as_deref() {
        Some(name) => Some(
            table
                .relation(name)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "relation",
                    id: format!("{}.{}", table.name, name),
                })?,
        ),
        None => None,
    };
    Ok(FieldSpec {
        column: cfg.column.clone().unwrap_or_else(|| key.to_string()),
        condition: cfg.condition.as_deref().map(Condition::parse).unwrap_or(Condition::Equal),
        relation,
    })
}

fn sortable(table: &'static Table, cfg: Option<&SortableConfig>) -> Result<Sortable, ConfigError> {
    Ok(match cfg {
        None => Sortable::default(),
        Some(SortableConfig::List(columns)) => Sortable::Columns(columns.clone()),
        Some(SortableConfig::Map(fields)) => {
            let mut out = BTreeMap::new();
            for (key, f) in fields {
                field_table(table, key, f, true)?;
                out.insert(key.clone(), field_spec(table, key, f)?);
            }
            Sortable::Fields(out)
        }
    })
}

/// Build resolved model from resource config (validates first).
pub fn resolve(config: &ResourcesFile) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut resources = Vec::new();
    let mut resource_by_path = HashMap::new();

    for r in &config.resources {
        let table = schema::table(&r.table).ok_or_else(|| ConfigError::MissingReference {
            kind: "table",
            id: r.table.clone(),
        })?;
        let searchable = r
            .searchable
            .iter()
            .map(|(key, f)| Ok((key.clone(), field_spec(table, key, f)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let create_rules = RuleSet::parse(&r.rules)?;
        let update_rules = match &r.update_rules {
            Some(rules) => RuleSet::parse(rules)?,
            None => create_rules.clone(),
        };
        let resource = ResolvedResource {
            path_segment: r.path_segment.clone(),
            table,
            label: r.label.clone().unwrap_or_else(|| table.model.to_string()),
            per_page: r.per_page,
            with: r.with.clone(),
            searchable,
            sortable: sortable(table, r.sortable.as_ref())?,
            create_rules,
            update_rules,
            hidden: r.hidden.iter().cloned().collect(),
            roles: r.roles.clone(),
            trash_roles: r.trash_roles.clone(),
        };
        tracing::debug!(path = %resource.path_segment, table = %table.name, "resolved resource");
        resource_by_path.insert(resource.path_segment.clone(), resource.clone());
        resources.push(resource);
    }

    Ok(ResolvedModel {
        resources,
        resource_by_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LikeAnchor;

    #[test]
    fn builtin_resources_resolve() {
        let model = resolve(&load_resources(None).unwrap()).unwrap();
        for path in ["roles", "users", "shops", "news", "files"] {
            assert!(model.resource_by_path(path).is_some(), "missing {}", path);
        }
        let users = model.resource_by_path("users").unwrap();
        assert_eq!(users.with, vec!["role".to_string()]);
        assert!(users.hidden.contains("password"));
        assert_eq!(users.roles, vec!["admin".to_string()]);
        let shops = model.resource_by_path("shops").unwrap();
        assert_eq!(shops.table.name, "shop");
        assert_eq!(shops.per_page, 15);
    }

    #[test]
    fn field_specs_bind_relations_and_conditions() {
        let model = resolve(&load_resources(None).unwrap()).unwrap();
        let users = model.resource_by_path("users").unwrap();
        let (_, role_name) = users.searchable.iter().find(|(k, _)| k == "role_name").unwrap();
        assert_eq!(role_name.column, "name");
        assert_eq!(role_name.relation.map(|r| r.name), Some("role"));
        assert_eq!(role_name.condition, Condition::Like(LikeAnchor::Anywhere));
        assert!(matches!(users.sortable, Sortable::Fields(_)));
    }

    #[test]
    fn missing_condition_means_equality() {
        let f = parse_resources(r#"{"resources":[{"path_segment":"roles","table":"roles","searchable":{"code":{}}}]}"#).unwrap();
        let model = resolve(&f).unwrap();
        let (_, code) = &model.resource_by_path("roles").unwrap().searchable[0];
        assert_eq!(code.condition, Condition::Equal);
        assert_eq!(code.column, "code");
    }

    #[test]
    fn load_reports_bad_json_and_paths() {
        assert!(matches!(parse_resources("{"), Err(ConfigError::Load(_))));
        assert!(matches!(load_resources(Some("/nonexistent/resources.json")), Err(ConfigError::Load(_))));
    }
}
