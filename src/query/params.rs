//! Query-string parameters as scalars or lists (`key=a`, `key[]=a&key[]=b`, `key[0]=a`).

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::List(_) => None,
        }
    }

    /// True for an empty scalar (after trimming) or an empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            ParamValue::Single(s) => s.trim().is_empty(),
            ParamValue::List(v) => v.is_empty(),
        }
    }

    /// Scalars are split on commas; lists are taken as is.
    pub fn comma_list(&self) -> Vec<String> {
        match self {
            ParamValue::Single(s) => s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            ParamValue::List(v) => v.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values: BTreeMap<String, ParamValue> = BTreeMap::new();
        for (k, v) in pairs {
            let k = k.as_ref();
            let list_key = k
                .strip_suffix(']')
                .and_then(|rest| rest.split_once('['))
                .filter(|(_, idx)| idx.is_empty() || idx.chars().all(|c| c.is_ascii_digit()))
                .map(|(name, _)| name);
            match list_key {
                Some(name) => match values.entry(name.to_string()).or_insert_with(|| ParamValue::List(Vec::new())) {
                    ParamValue::List(items) => items.push(v.into()),
                    // A list entry after a scalar of the same name replaces it.
                    slot => *slot = ParamValue::List(vec![v.into()]),
                },
                None => {
                    values.insert(k.to_string(), ParamValue::Single(v.into()));
                }
            }
        }
        QueryParams { values }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// Scalar value, or None when absent or given as a list.
    pub fn single(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(ParamValue::as_single)
    }

    /// Trimmed non-empty scalar.
    pub fn filled(&self, key: &str) -> Option<&str> {
        self.single(key).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}
