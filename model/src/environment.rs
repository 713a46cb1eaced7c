//! Environments: combinations of `category = element` values such as
//! `OS = Linux, Browser = Firefox`.

use crate::entity::{impl_entity, EntityMetadata, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category name to element name.
pub type Elements = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub elements: Elements,
}

impl Environment {
    pub fn new(elements: Elements) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::Environment),
            elements,
        }
    }

    /// Element for `category`, if this environment has one.
    pub fn element(&self, category: &str) -> Option<&str> {
        self.elements.get(category).map(String::as_str)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for element in self.elements.values() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(element)?;
            first = false;
        }
        Ok(())
    }
}

impl_entity!(Environment);

/// Parse `Category=Element` into a pair, trimming whitespace on both sides.
pub fn parse_element(pair: &str) -> Option<(String, String)> {
    let (category, element) = pair.split_once('=')?;
    let (category, element) = (category.trim(), element.trim());
    if category.is_empty() || element.is_empty() {
        return None;
    }
    Some((category.to_string(), element.to_string()))
}

/// Every combination of one element per category, in category order.
///
/// `[("OS", ["OS X", "Linux"]), ("Browser", ["Firefox"])]` yields
/// `{OS: OS X, Browser: Firefox}` then `{OS: Linux, Browser: Firefox}`.
/// A category with no elements yields no combinations at all.
pub fn cartesian<C, E>(categories: &[(C, Vec<E>)]) -> Vec<Elements>
where
    C: AsRef<str>,
    E: AsRef<str>,
{
    let mut combos = vec![Elements::new()];
    for (category, elements) in categories {
        let mut next = Vec::with_capacity(combos.len() * elements.len());
        for combo in &combos {
            for element in elements {
                let mut extended = combo.clone();
                extended.insert(category.as_ref().to_string(), element.as_ref().to_string());
                next.push(extended);
            }
        }
        combos = next;
    }
    if categories.is_empty() {
        return Vec::new();
    }
    combos
}
