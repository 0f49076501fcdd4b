//! Request validation from pipe-DSL rule sets (`required|string|max:255|unique:users,phone`).

use crate::error::{AppError, ConfigError, FieldErrors};
use crate::schema::{self, Table};
use crate::store::{Predicate, Query, Store, Trashed};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub enum Rule {
    Required,
    Nullable,
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    Min(f64),
    Max(f64),
    In(Vec<String>),
    Regex(Regex),
    Confirmed,
    Unique { table: &'static Table, column: String },
    Exists { table: &'static Table, column: String },
}

impl Rule {
    fn parse(field: &str, spec: &str) -> Result<Rule, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidRule {
            field: field.to_string(),
            message,
        };
        let (name, arg) = match spec.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a)),
            None => (spec.trim(), None),
        };
        let number = |a: Option<&str>| -> Result<f64, ConfigError> {
            a.and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(|| invalid(format!("{} needs a numeric argument", name)))
        };
        let table_column = |a: Option<&str>| -> Result<(&'static Table, String), ConfigError> {
            let a = a.ok_or_else(|| invalid(format!("{} needs table,column", name)))?;
            let (t, c) = a.split_once(',').unwrap_or((a, field));
            let table = schema::table(t.trim()).ok_or_else(|| invalid(format!("unknown table {}", t)))?;
            let column = c.trim().to_string();
            if !table.has_column(&column) {
                return Err(invalid(format!("unknown column {}.{}", table.name, column)));
            }
            Ok((table, column))
        };
        Ok(match name {
            "required" => Rule::Required,
            "nullable" => Rule::Nullable,
            "string" => Rule::String,
            "integer" => Rule::Integer,
            "numeric" => Rule::Numeric,
            "boolean" => Rule::Boolean,
            "array" => Rule::Array,
            "confirmed" => Rule::Confirmed,
            "min" => Rule::Min(number(arg)?),
            "max" => Rule::Max(number(arg)?),
            "in" => Rule::In(
                arg.unwrap_or("")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            "regex" => {
                let pattern = arg.ok_or_else(|| invalid("regex needs a pattern".into()))?;
                let pattern = pattern
                    .strip_prefix('/')
                    .and_then(|p| p.strip_suffix('/'))
                    .unwrap_or(pattern);
                Rule::Regex(Regex::new(pattern).map_err(|e| invalid(e.to_string()))?)
            }
            "unique" => {
                let (table, column) = table_column(arg)?;
                Rule::Unique { table, column }
            }
            "exists" => {
                let (table, column) = table_column(arg)?;
                Rule::Exists { table, column }
            }
            other => return Err(invalid(format!("unknown rule {}", other))),
        })
    }
}

#[derive(Clone, Debug)]
pub struct FieldRules {
    pub field: String,
    pub rules: Vec<Rule>,
}

impl FieldRules {
    fn has(&self, f: impl Fn(&Rule) -> bool) -> bool {
        self.rules.iter().any(f)
    }

    fn is_numeric(&self) -> bool {
        self.has(|r| matches!(r, Rule::Integer | Rule::Numeric))
    }
}

/// Parsed rules keyed by field, in field-name order.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    fields: Vec<FieldRules>,
    /// Custom messages keyed `field.rule`, e.g. `password.min`.
    messages: BTreeMap<String, String>,
}

impl RuleSet {
    pub fn parse(specs: &BTreeMap<String, String>) -> Result<RuleSet, ConfigError> {
        let mut fields = Vec::new();
        for (field, spec) in specs {
            let mut rules = Vec::new();
            let mut parts = spec.split('|');
            while let Some(part) = parts.next() {
                if part.trim().is_empty() {
                    continue;
                }
                // A regex may itself contain '|'; it takes the rest of the spec.
                if part.trim_start().starts_with("regex:") {
                    let rest: Vec<&str> = parts.by_ref().collect();
                    let full = std::iter::once(part).chain(rest).collect::<Vec<_>>().join("|");
                    rules.push(Rule::parse(field, full.trim())?);
                    break;
                }
                rules.push(Rule::parse(field, part)?);
            }
            fields.push(FieldRules {
                field: field.clone(),
                rules,
            });
        }
        Ok(RuleSet {
            fields,
            messages: BTreeMap::new(),
        })
    }

    /// Replace the default message of `field.rule` keys.
    pub fn with_messages<'a>(mut self, messages: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.messages
            .extend(messages.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    fn fail(&self, errors: &mut FieldErrors, field: &str, rule: &str, default: String) {
        let message = self
            .messages
            .get(&format!("{}.{}", field, rule))
            .cloned()
            .unwrap_or(default);
        errors.add(field, message);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldRules] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldRules> {
        self.fields.iter().find(|f| f.field == name)
    }
}

/// PUT / POST validate every rule; PATCH only the fields present in the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Full,
    Partial,
}

/// Human attribute name used in messages.
pub fn attribute_name(field: &str) -> String {
    match field {
        "password_confirmation" => "password confirmation",
        "current_password" => "current password",
        "phone" => "phone number",
        "role_id" => "role",
        "user_id" => "user",
        "created_by" => "creator",
        "url" => "URL",
        "thumb" => "thumbnail",
        "geo" => "coordinates",
        "sns_id" => "social network ID",
        "sns_driver" => "social network type",
        "is_published" => "published flag",
        "fileable_id" => "owner",
        "fileable_type" => "owner type",
        other => return other.replace('_', " "),
    }
    .to_string()
}

/// Trim every string (recursively); empty strings become null.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                Value::Null
            } else {
                Value::String(t.to_string())
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect()),
        other => other,
    }
}

fn as_integer(v: &Value) -> Option<Value> {
    match v {
        Value::Number(n) if n.is_i64() => Some(v.clone()),
        Value::Number(n) => n.as_f64().filter(|f| f.fract() == 0.0).map(|f| Value::from(f as i64)),
        Value::String(s) => s.parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<Value> {
    match v {
        Value::Number(_) => Some(v.clone()),
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)),
        _ => None,
    }
}

fn as_boolean(v: &Value) -> Option<Value> {
    match v {
        Value::Bool(_) => Some(v.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "1" | "true" => Some(Value::Bool(true)),
            "0" | "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// Size used by min/max: numeric value, array length or character count.
fn size_of(field: &FieldRules, v: &Value) -> Option<f64> {
    match v {
        Value::Array(items) => Some(items.len() as f64),
        _ if field.is_numeric() => as_number(v).and_then(|n| n.as_f64()),
        Value::String(s) => Some(s.chars().count() as f64),
        _ => None,
    }
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn size_message(field: &FieldRules, v: &Value, attr: &str, n: f64, min: bool) -> String {
    let n = fmt_num(n);
    match (v, field.is_numeric(), min) {
        (Value::Array(_), _, true) => format!("The {} field must have at least {} items.", attr, n),
        (Value::Array(_), _, false) => format!("The {} field must not have more than {} items.", attr, n),
        (_, true, true) => format!("The {} field must be at least {}.", attr, n),
        (_, true, false) => format!("The {} field must not be greater than {}.", attr, n),
        (_, false, true) => format!("The {} field must be at least {} characters.", attr, n),
        (_, false, false) => format!("The {} field must not be greater than {} characters.", attr, n),
    }
}

fn plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct RequestValidator<'a> {
    store: &'a dyn Store,
}

impl<'a> RequestValidator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        RequestValidator { store }
    }

    /// Validate `input` against `rules`. Returns only rule-keyed fields present in the input, with
    /// integers and booleans coerced. `ignore` excludes one row from `unique` checks on its table.
    pub async fn validate(
        &self,
        rules: &RuleSet,
        input: &Map<String, Value>,
        mode: Mode,
        ignore: Option<(&'static Table, i64)>,
    ) -> Result<Map<String, Value>, AppError> {
        let input = match normalize(Value::Object(input.clone())) {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        let mut errors = FieldErrors::new();
        let mut out = Map::new();
        for field in rules.fields() {
            let name = field.field.as_str();
            let attr = attribute_name(name);
            let present = input.contains_key(name);
            if mode == Mode::Partial && !present {
                continue;
            }
            let value = input.get(name).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                if field.has(|r| matches!(r, Rule::Required)) {
                    rules.fail(&mut errors, name, "required", format!("The {} field is required.", attr));
                } else if present && !field.has(|r| matches!(r, Rule::Nullable)) {
                    self.check_null(rules, field, &attr, &mut errors);
                    if !errors.has(name) {
                        out.insert(name.to_string(), Value::Null);
                    }
                } else if present {
                    out.insert(name.to_string(), Value::Null);
                }
                continue;
            }
            let mut value = value;
            let before = errors.get(name).map_or(0, |e| e.len());
            for rule in &field.rules {
                match rule {
                    Rule::Required | Rule::Nullable => {}
                    Rule::String => {
                        if !value.is_string() {
                            rules.fail(&mut errors, name, "string", format!("The {} field must be a string.", attr));
                        }
                    }
                    Rule::Integer => match as_integer(&value) {
                        Some(v) => value = v,
                        None => rules.fail(&mut errors, name, "integer", format!("The {} field must be an integer.", attr)),
                    },
                    Rule::Numeric => match as_number(&value) {
                        Some(v) => value = v,
                        None => rules.fail(&mut errors, name, "numeric", format!("The {} field must be a number.", attr)),
                    },
                    Rule::Boolean => match as_boolean(&value) {
                        Some(v) => value = v,
                        None => rules.fail(&mut errors, name, "boolean", format!("The {} field must be true or false.", attr)),
                    },
                    Rule::Array => {
                        if !value.is_array() {
                            rules.fail(&mut errors, name, "array", format!("The {} field must be an array.", attr));
                        }
                    }
                    Rule::Min(n) => {
                        if size_of(field, &value).is_some_and(|s| s < *n) {
                            rules.fail(&mut errors, name, "min", size_message(field, &value, &attr, *n, true));
                        }
                    }
                    Rule::Max(n) => {
                        if size_of(field, &value).is_some_and(|s| s > *n) {
                            rules.fail(&mut errors, name, "max", size_message(field, &value, &attr, *n, false));
                        }
                    }
                    Rule::In(allowed) => {
                        if !allowed.iter().any(|a| *a == plain(&value)) {
                            rules.fail(&mut errors, name, "in", format!("The selected {} is invalid.", attr));
                        }
                    }
                    Rule::Regex(re) => {
                        if !value.as_str().is_some_and(|s| re.is_match(s)) {
                            rules.fail(&mut errors, name, "regex", format!("The {} field format is invalid.", attr));
                        }
                    }
                    Rule::Confirmed => {
                        let confirmation = input.get(&format!("{}_confirmation", name));
                        if confirmation != Some(&value) {
                            rules.fail(&mut errors, name, "confirmed", format!("The {} confirmation does not match.", attr));
                        }
                    }
                    Rule::Unique { .. } | Rule::Exists { .. } => {}
                }
            }
            // Store lookups only for values that passed the local rules.
            if errors.get(name).map_or(0, |e| e.len()) == before {
                for rule in &field.rules {
                    match rule {
                        Rule::Unique { table, column } => {
                            if self.taken(table, column, &value, ignore).await? {
                                rules.fail(&mut errors, name, "unique", format!("The {} has already been taken.", attr));
                            }
                        }
                        Rule::Exists { table, column } => {
                            if !self.exists(table, column, &value).await? {
                                rules.fail(&mut errors, name, "exists", format!("The selected {} is invalid.", attr));
                            }
                        }
                        _ => {}
                    }
                }
            }
            if errors.get(name).map_or(0, |e| e.len()) == before {
                out.insert(name.to_string(), value);
            }
        }
        if errors.is_empty() {
            Ok(out)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn check_null(&self, rules: &RuleSet, field: &FieldRules, attr: &str, errors: &mut FieldErrors) {
        let name = field.field.as_str();
        for rule in &field.rules {
            let (key, message) = match rule {
                Rule::String => ("string", format!("The {} field must be a string.", attr)),
                Rule::Integer => ("integer", format!("The {} field must be an integer.", attr)),
                Rule::Numeric => ("numeric", format!("The {} field must be a number.", attr)),
                Rule::Boolean => ("boolean", format!("The {} field must be true or false.", attr)),
                Rule::Array => ("array", format!("The {} field must be an array.", attr)),
                _ => continue,
            };
            rules.fail(errors, name, key, message);
        }
    }

    async fn taken(
        &self,
        table: &'static Table,
        column: &str,
        value: &Value,
        ignore: Option<(&'static Table, i64)>,
    ) -> Result<bool, AppError> {
        let Some(ty) = table.column_type(column) else {
            return Ok(false);
        };
        let Some(v) = ty.coerce(value) else {
            return Ok(false);
        };
        let mut q = Query::new(table)
            .filter(Predicate::eq(column, v))
            .trashed(Trashed::Include);
        if let Some((t, id)) = ignore {
            if t.name == table.name {
                q.push(Predicate::not_eq("id", id));
            }
        }
        Ok(self.store.count(&q).await? > 0)
    }

    async fn exists(&self, table: &'static Table, column: &str, value: &Value) -> Result<bool, AppError> {
        let Some(v) = table.column_type(column).and_then(|ty| ty.coerce(value)) else {
            return Ok(false);
        };
        let q = Query::new(table)
            .filter(Predicate::eq(column, v))
            .trashed(Trashed::Include);
        Ok(self.store.count(&q).await? > 0)
    }
}
