//! Filtered, sorted list views.
//!
//! Queries come in as request-style parameters:
//!
//! ```
//! use model::listing::ListQuery;
//! use model::Product;
//!
//! let products = vec![Product::new("Product 1", ""), Product::new("Product 2", "")];
//! let query = ListQuery::from_params([("filter-name", "1")]);
//! let listed = query.apply(&products);
//! assert_eq!(listed.len(), 1);
//! assert_eq!(listed[0].name, "Product 1");
//! ```
//!
//! Anything the query does not understand (unknown filter fields, unknown
//! sort fields, a bad sort direction) is dropped rather than reported.

use crate::entity::Entity;
use crate::result::TestResult;
use crate::types::{CaseVersion, Product, ProductVersion, Run};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const FILTER_PREFIX: &str = "filter-";
pub const SORT_FIELD: &str = "sortfield";
pub const SORT_DIRECTION: &str = "sortdirection";

/// A field value as seen by filters and sorting
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text; filters match case-insensitive substrings
    Text(String),
    /// Enumerated values and ids; filters match exactly
    Choice(String),
    /// Timestamps; filters match a prefix of the RFC 3339 form
    Time(DateTime<Utc>),
}

impl FieldValue {
    fn matches(&self, wanted: &str) -> bool {
        match self {
            FieldValue::Text(text) => text.to_lowercase().contains(&wanted.to_lowercase()),
            FieldValue::Choice(choice) => choice == wanted,
            FieldValue::Time(time) => time.to_rfc3339().starts_with(wanted),
        }
    }

    fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (FieldValue::Choice(a), FieldValue::Choice(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Something that can appear in a list view
pub trait Listable {
    /// Value of a named field, or `None` if the field is unknown.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Filters plus an optional sort
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    filters: BTreeMap<String, Vec<String>>,
    sort: Option<(String, SortDirection)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from `filter-<field>`, `sortfield` and `sortdirection` parameters.
    ///
    /// Repeated filters on one field are alternatives. Other keys, blank
    /// values and unparseable directions are ignored.
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::new();
        let mut field = None;
        let mut direction = SortDirection::Asc;
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            if value.is_empty() {
                continue;
            }
            if let Some(name) = key.strip_prefix(FILTER_PREFIX) {
                query = query.filter(name, value);
            } else if key == SORT_FIELD {
                field = Some(value.to_string());
            } else if key == SORT_DIRECTION {
                direction = value.parse().unwrap_or_default();
            }
        }
        if let Some(field) = field {
            query = query.sort_by(field, direction);
        }
        query
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.filters.entry(field.into()).or_default().push(value);
        }
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    /// Use this sort unless the query already names one.
    pub fn with_default_sort(mut self, field: Option<&str>, direction: SortDirection) -> Self {
        if self.sort.is_none() {
            if let Some(field) = field {
                self.sort = Some((field.to_string(), direction));
            }
        }
        self
    }

    pub fn sort(&self) -> Option<(&str, SortDirection)> {
        self.sort.as_ref().map(|(field, dir)| (field.as_str(), *dir))
    }

    pub fn filters(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Filter and sort `items`, keeping input order among equals.
    pub fn apply<'a, T, I>(&self, items: I) -> Vec<&'a T>
    where
        T: Listable + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut listed: Vec<&T> = items
            .into_iter()
            .filter(|item| self.accepts(*item))
            .collect();

        if let Some((field, direction)) = &self.sort {
            let known = listed.first().map_or(false, |item| item.field(field).is_some());
            if known {
                listed.sort_by(|a, b| {
                    let ordering = match (a.field(field), b.field(field)) {
                        (Some(a), Some(b)) => a.compare(&b),
                        _ => Ordering::Equal,
                    };
                    match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                });
            }
        }
        listed
    }

    fn accepts<T: Listable>(&self, item: &T) -> bool {
        self.filters.iter().all(|(name, wanted)| match item.field(name) {
            Some(value) => wanted.iter().any(|w| value.matches(w)),
            None => true,
        })
    }
}

fn created<E: Entity>(entity: &E) -> FieldValue {
    FieldValue::Time(entity.metadata().created_at)
}

impl Listable for Product {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Text(self.name.clone())),
            "description" => Some(FieldValue::Text(self.description.clone())),
            "created" => Some(created(self)),
            _ => None,
        }
    }
}

impl Listable for ProductVersion {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "version" => Some(FieldValue::Text(self.version.clone())),
            "codename" => Some(FieldValue::Text(self.codename.clone())),
            "product" => Some(FieldValue::Choice(self.product.clone())),
            "created" => Some(created(self)),
            _ => None,
        }
    }
}

impl Listable for Run {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Text(self.name.clone())),
            "status" => Some(FieldValue::Choice(self.status.to_string())),
            "productversion" => Some(FieldValue::Choice(self.productversion.clone())),
            "created" => Some(created(self)),
            _ => None,
        }
    }
}

impl Listable for CaseVersion {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Text(self.name.clone())),
            "productversion" => Some(FieldValue::Choice(self.productversion.clone())),
            "case" => Some(FieldValue::Choice(self.case.clone())),
            "created" => Some(created(self)),
            _ => None,
        }
    }
}

impl Listable for TestResult {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "status" => Some(FieldValue::Choice(self.status.to_string())),
            "tester" => Some(FieldValue::Choice(self.tester.clone())),
            "environment" => Some(FieldValue::Choice(self.environment.clone())),
            "runcaseversion" => Some(FieldValue::Choice(self.runcaseversion.clone())),
            "created" => Some(created(self)),
            _ => None,
        }
    }
}
