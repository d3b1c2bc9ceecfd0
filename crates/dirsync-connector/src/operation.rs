//! Operation types for directory connectors
//!
//! Entries, attribute maps, attribute deltas, search filters and scopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dn::{normalize, Dn};

/// Multi-valued attributes of one entry.
///
/// Attribute names keep the spelling they were inserted with; lookups
/// ignore case (RFC 4512).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap {
    attrs: BTreeMap<String, Vec<String>>,
}

impl AttributeMap {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(&self, name: &str) -> Option<&String> {
        self.attrs.keys().find(|k| k.eq_ignore_ascii_case(name))
    }

    /// Set all values of an attribute, replacing any previous spelling.
    pub fn set<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if let Some(existing) = self.key_of(&name).cloned() {
            self.attrs.remove(&existing);
        }
        self.attrs
            .insert(name, values.into_iter().map(Into::into).collect());
    }

    /// Builder form of [`AttributeMap::set`].
    #[must_use]
    pub fn with<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// All values of an attribute.
    pub fn get(&self, name: &str) -> Option<&Vec<String>> {
        self.key_of(name).and_then(|k| self.attrs.get(k))
    }

    /// Mutable access to the values of an attribute.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        let key = self.key_of(name)?.clone();
        self.attrs.get_mut(&key)
    }

    /// The first value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values of an attribute, empty when absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the attribute is present with at least one value.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Remove an attribute entirely.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let key = self.key_of(name)?.clone();
        self.attrs.remove(&key)
    }

    /// Attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Iterate over (name, values).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.attrs.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Keep only the named attributes. `*` or an empty list keeps everything.
    #[must_use]
    pub fn project(&self, names: &[&str]) -> AttributeMap {
        if names.is_empty() || names.contains(&"*") {
            return self.clone();
        }
        let attrs = self
            .attrs
            .iter()
            .filter(|(k, _)| names.iter().any(|n| k.eq_ignore_ascii_case(n)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        AttributeMap { attrs }
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeMap
where
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = AttributeMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

/// One entry in the remote hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryObject {
    /// Identity of the entry.
    pub dn: Dn,
    /// Attribute values.
    pub attributes: AttributeMap,
}

impl DirectoryObject {
    /// Create an entry value.
    pub fn new(dn: impl Into<Dn>, attributes: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// The first value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes.first(name)
    }

    /// All values of an attribute.
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes.values(name)
    }

    /// Whether the entry carries the given object class.
    pub fn has_object_class(&self, class: &str) -> bool {
        self.values("objectClass")
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }
}

/// Attribute changes for one modify call.
///
/// The three kinds stay separate: values to add, attributes whose values are
/// replaced wholesale, and values to delete (an empty list deletes the whole
/// attribute).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDelta {
    /// Values to add to (possibly multi-valued) attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub added: BTreeMap<String, Vec<String>>,

    /// Attributes to replace entirely.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changed: BTreeMap<String, Vec<String>>,

    /// Values to remove; an empty list removes the attribute.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub removed: BTreeMap<String, Vec<String>>,
}

impl AttributeDelta {
    /// Create a new empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add values to an attribute.
    pub fn add<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.added
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Replace all values of an attribute.
    pub fn replace<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Remove values from an attribute.
    pub fn remove<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.removed
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Remove an attribute with all its values.
    pub fn clear_attribute(&mut self, name: impl Into<String>) -> &mut Self {
        self.removed.insert(name.into(), Vec::new());
        self
    }

    /// Check if this delta has any changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Get all affected attribute names.
    pub fn affected_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.added.keys().map(String::as_str));
        names.extend(self.changed.keys().map(String::as_str));
        names.extend(self.removed.keys().map(String::as_str));
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Compute the delta that turns `old` into `new`.
    ///
    /// Attributes only in `new` are added, attributes in both with different
    /// values are replaced, attributes only in `old` are removed.
    pub fn between(old: &AttributeMap, new: &AttributeMap) -> Self {
        let mut delta = AttributeDelta::new();

        for (name, old_values) in old.iter() {
            match new.get(name) {
                Some(new_values) if !same_values(old_values, new_values) => {
                    delta.replace(name.clone(), new_values.iter().cloned());
                }
                Some(_) => {}
                None => {
                    delta.clear_attribute(name.clone());
                }
            }
        }

        for (name, new_values) in new.iter() {
            if old.get(name).is_none() {
                delta.add(name.clone(), new_values.iter().cloned());
            }
        }

        delta
    }

    /// Flatten into protocol modifications: adds, then replaces, then deletes.
    pub fn to_modifications(&self) -> Vec<Modification> {
        let mut mods = Vec::new();
        for (name, values) in &self.added {
            mods.push(Modification::Add(name.clone(), values.clone()));
        }
        for (name, values) in &self.changed {
            mods.push(Modification::Replace(name.clone(), values.clone()));
        }
        for (name, values) in &self.removed {
            mods.push(Modification::Delete(name.clone(), values.clone()));
        }
        mods
    }
}

fn same_values(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

/// One attribute change as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values.
    Add(String, Vec<String>),
    /// Replace all values (empty removes the attribute).
    Replace(String, Vec<String>),
    /// Delete values (empty removes the attribute).
    Delete(String, Vec<String>),
}

/// Search scope relative to the base entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and everything below it.
    Subtree,
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// All sub-filters match.
    And { filters: Vec<Filter> },
    /// Any sub-filter matches.
    Or { filters: Vec<Filter> },
    /// The sub-filter does not match.
    Not { filter: Box<Filter> },
    /// Attribute has a value equal to `value`.
    Equals { attribute: String, value: String },
    /// Attribute is present.
    Present { attribute: String },
}

impl Filter {
    /// Equality filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Presence filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Conjunction.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Disjunction.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Negation.
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Matches every entry: `(objectClass=*)`.
    pub fn any_object() -> Self {
        Filter::present("objectClass")
    }

    /// "Entry of class `class` whose `naming_attribute` is `name`."
    pub fn named(class: &str, naming_attribute: &str, name: &str) -> Self {
        Filter::and(vec![
            Filter::eq("objectClass", class),
            Filter::eq(naming_attribute, name),
        ])
    }

    /// "Entry of any of `classes` whose `naming_attribute` is any of `names`."
    pub fn any_named<S: AsRef<str>>(classes: &[&str], naming_attribute: &str, names: &[S]) -> Self {
        Filter::and(vec![
            Filter::or(
                classes
                    .iter()
                    .map(|c| Filter::eq("objectClass", *c))
                    .collect(),
            ),
            Filter::or(
                names
                    .iter()
                    .map(|n| Filter::eq(naming_attribute, n.as_ref()))
                    .collect(),
            ),
        ])
    }

    /// Render as an RFC 4515 filter string.
    pub fn to_ldap(&self) -> String {
        match self {
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap).collect();
                format!("(|{})", inner.join(""))
            }
            Filter::Not { filter } => format!("(!{})", filter.to_ldap()),
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => format!("({attribute}=*)"),
        }
    }

    /// Evaluate against an attribute map, using directory matching rules.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Filter::And { filters } => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not { filter } => !filter.matches(attributes),
            Filter::Equals { attribute, value } => attributes
                .values(attribute)
                .iter()
                .any(|v| values_match(v, value)),
            Filter::Present { attribute } => {
                attribute.eq_ignore_ascii_case("objectClass") || attributes.has(attribute)
            }
        }
    }
}

/// Case-insensitive value comparison; DN-shaped values compare component-wise.
pub fn values_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b) || (a.contains('=') && Dn::new(a) == Dn::new(b))
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
