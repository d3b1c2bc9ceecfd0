//! In-memory directory for tests and offline runs.
//!
//! Implements [`DirectorySession`] with the LDAP semantics the upper layers
//! depend on: parents must exist, non-leaf entries cannot be deleted,
//! modify-DN moves whole subtrees, and `memberOf` is computed from group
//! `member` values. Every write is recorded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::dn::Dn;
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{
    values_match, AttributeMap, DirectoryObject, Filter, Modification, SearchScope,
};
use crate::traits::{Connector, DirectorySession};

/// LDAP result code: attributeOrValueExists.
const RC_VALUE_EXISTS: u32 = 20;
/// LDAP result code: noSuchAttribute.
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
/// LDAP result code: objectClassViolation.
const RC_OBJECT_CLASS_VIOLATION: u32 = 65;

/// One recorded write against the in-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryWrite {
    Add {
        dn: Dn,
    },
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
    },
    Delete {
        dn: Dn,
    },
    ModifyDn {
        dn: Dn,
        new_dn: Dn,
    },
}

impl DirectoryWrite {
    /// The entry the write targeted.
    pub fn dn(&self) -> &Dn {
        match self {
            DirectoryWrite::Add { dn }
            | DirectoryWrite::Modify { dn, .. }
            | DirectoryWrite::Delete { dn }
            | DirectoryWrite::ModifyDn { dn, .. } => dn,
        }
    }
}

/// In-memory implementation of [`DirectorySession`].
#[derive(Debug)]
pub struct InMemoryDirectory {
    name: String,
    // Key: normalized DN
    entries: RwLock<BTreeMap<String, DirectoryObject>>,
    writes: RwLock<Vec<DirectoryWrite>>,
    disposed: AtomicBool,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            writes: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Insert an entry directly, without parent checks or write recording.
    pub fn seed(&self, dn: impl Into<Dn>, object_classes: &[&str], attributes: AttributeMap) {
        let dn = dn.into();
        let mut attributes = attributes.with("objectClass", object_classes.iter().copied());
        ensure_naming_attribute(&dn, &mut attributes);
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(dn.normalized(), DirectoryObject::new(dn, attributes));
    }

    /// Read one entry with computed attributes (for testing).
    pub fn get(&self, dn: &Dn) -> Option<DirectoryObject> {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .get(&dn.normalized())
            .map(|entry| with_member_of(entry, &entries))
    }

    /// Whether an entry exists.
    pub fn contains(&self, dn: &Dn) -> bool {
        self.entries
            .read()
            .expect("lock poisoned")
            .contains_key(&dn.normalized())
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// All writes so far, in order (for testing).
    pub fn writes(&self) -> Vec<DirectoryWrite> {
        self.writes.read().expect("lock poisoned").clone()
    }

    /// Forget recorded writes, keeping the entries.
    pub fn clear_writes(&self) {
        self.writes.write().expect("lock poisoned").clear();
    }

    /// Remove all entries and recorded writes.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
        self.clear_writes();
    }

    fn ensure_connected(&self) -> ConnectorResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ConnectorError::transport("not connected"));
        }
        Ok(())
    }

    fn record(&self, write: DirectoryWrite) {
        self.writes.write().expect("lock poisoned").push(write);
    }
}

/// Make sure the RDN attribute carries the RDN value, as a server would.
fn ensure_naming_attribute(dn: &Dn, attributes: &mut AttributeMap) {
    let attr = dn.rdn_attribute();
    if attr.is_empty() {
        return;
    }
    let value = dn.rdn_value();
    let present = attributes
        .values(attr)
        .iter()
        .any(|v| values_match(v, &value));
    if !present {
        attributes.set(attr.to_string(), [value]);
    }
}

/// A copy of `entry` with `memberOf` computed from group `member` values.
fn with_member_of(
    entry: &DirectoryObject,
    entries: &BTreeMap<String, DirectoryObject>,
) -> DirectoryObject {
    let groups: Vec<String> = entries
        .values()
        .filter(|group| {
            group
                .values("member")
                .iter()
                .any(|m| Dn::new(m.as_str()) == entry.dn)
        })
        .map(|group| group.dn.to_string())
        .collect();

    let mut view = entry.clone();
    if groups.is_empty() {
        view.attributes.remove("memberOf");
    } else {
        view.attributes.set("memberOf", groups);
    }
    view
}

fn in_scope(dn: &Dn, base: &Dn, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn.parent().as_ref() == Some(base),
        SearchScope::Subtree => dn.is_within(base),
    }
}

fn apply_modification(attributes: &mut AttributeMap, modification: &Modification) -> ConnectorResult<()> {
    match modification {
        Modification::Add(name, values) => {
            let mut current = attributes.values(name).to_vec();
            for value in values {
                if current.iter().any(|v| values_match(v, value)) {
                    return Err(ConnectorError::transport_with_code(
                        format!("attribute {name} already has value {value}"),
                        RC_VALUE_EXISTS,
                    ));
                }
                current.push(value.clone());
            }
            attributes.set(name.clone(), current);
        }
        Modification::Replace(name, values) => {
            if values.is_empty() {
                attributes.remove(name);
            } else {
                attributes.set(name.clone(), values.iter().cloned());
            }
        }
        Modification::Delete(name, values) => {
            if !attributes.has(name) {
                return Err(ConnectorError::transport_with_code(
                    format!("no such attribute: {name}"),
                    RC_NO_SUCH_ATTRIBUTE,
                ));
            }
            if values.is_empty() {
                attributes.remove(name);
                return Ok(());
            }
            let mut current = attributes.values(name).to_vec();
            for value in values {
                let before = current.len();
                current.retain(|v| !values_match(v, value));
                if current.len() == before {
                    return Err(ConnectorError::transport_with_code(
                        format!("attribute {name} has no value {value}"),
                        RC_NO_SUCH_ATTRIBUTE,
                    ));
                }
            }
            if current.is_empty() {
                attributes.remove(name);
            } else {
                attributes.set(name.clone(), current);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Connector for InMemoryDirectory {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        self.ensure_connected()
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectorySession for InMemoryDirectory {
    async fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>> {
        self.ensure_connected()?;
        let entries = self.entries.read().expect("lock poisoned");

        if !entries.contains_key(&base.normalized()) {
            return Err(ConnectorError::not_found(base.to_string()));
        }

        let results: Vec<DirectoryObject> = entries
            .values()
            .filter(|entry| in_scope(&entry.dn, base, scope))
            .map(|entry| with_member_of(entry, &entries))
            .filter(|view| filter.matches(&view.attributes))
            .map(|view| DirectoryObject::new(view.dn, view.attributes.project(attributes)))
            .collect();

        debug!(base = %base, filter = %filter.to_ldap(), count = results.len(), "in-memory search");
        Ok(results)
    }

    async fn add(&self, dn: &Dn, attributes: Vec<(String, Vec<String>)>) -> ConnectorResult<()> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = dn.normalized();

        if entries.contains_key(&key) {
            return Err(ConnectorError::already_exists(dn.to_string()));
        }
        if let Some(parent) = dn.parent() {
            if !entries.contains_key(&parent.normalized()) {
                return Err(ConnectorError::not_found(parent.to_string()));
            }
        }

        let mut map: AttributeMap = attributes
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        if !map.has("objectClass") {
            return Err(ConnectorError::transport_with_code(
                format!("no objectClass for {dn}"),
                RC_OBJECT_CLASS_VIOLATION,
            ));
        }
        ensure_naming_attribute(dn, &mut map);

        entries.insert(key, DirectoryObject::new(dn.clone(), map));
        drop(entries);
        self.record(DirectoryWrite::Add { dn: dn.clone() });
        Ok(())
    }

    async fn modify(&self, dn: &Dn, modifications: Vec<Modification>) -> ConnectorResult<()> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().expect("lock poisoned");
        let entry = entries
            .get_mut(&dn.normalized())
            .ok_or_else(|| ConnectorError::not_found(dn.to_string()))?;

        // All or nothing
        let mut updated = entry.attributes.clone();
        for modification in &modifications {
            apply_modification(&mut updated, modification)?;
        }
        entry.attributes = updated;

        drop(entries);
        self.record(DirectoryWrite::Modify {
            dn: dn.clone(),
            modifications,
        });
        Ok(())
    }

    async fn delete(&self, dn: &Dn) -> ConnectorResult<()> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = dn.normalized();

        if !entries.contains_key(&key) {
            return Err(ConnectorError::not_found(dn.to_string()));
        }
        if let Some(child) = entries.values().find(|e| e.dn.is_descendant_of(dn)) {
            return Err(ConnectorError::HasChildren {
                identifier: dn.to_string(),
                child: Some(child.dn.to_string()),
            });
        }

        entries.remove(&key);
        for entry in entries.values_mut() {
            if let Some(members) = entry.attributes.get_mut("member") {
                members.retain(|m| Dn::new(m.as_str()) != *dn);
                if members.is_empty() {
                    entry.attributes.remove("member");
                }
            }
        }

        drop(entries);
        self.record(DirectoryWrite::Delete { dn: dn.clone() });
        Ok(())
    }

    async fn modify_dn(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&Dn>,
    ) -> ConnectorResult<()> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().expect("lock poisoned");

        if !entries.contains_key(&dn.normalized()) {
            return Err(ConnectorError::not_found(dn.to_string()));
        }
        let parent = match new_superior {
            Some(superior) => Some(superior.clone()),
            None => dn.parent(),
        };
        if let Some(parent) = &parent {
            if !entries.contains_key(&parent.normalized()) {
                return Err(ConnectorError::not_found(parent.to_string()));
            }
        }
        let new_dn = match &parent {
            Some(parent) if !parent.is_root() => Dn::new(format!("{new_rdn},{parent}")),
            _ => Dn::new(new_rdn),
        };
        if new_dn.is_descendant_of(dn) {
            return Err(ConnectorError::InvalidData {
                message: format!("cannot move {dn} below itself"),
            });
        }
        if new_dn != *dn && entries.contains_key(&new_dn.normalized()) {
            return Err(ConnectorError::already_exists(new_dn.to_string()));
        }

        let moved: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.dn.is_within(dn))
            .map(|(k, _)| k.clone())
            .collect();

        for key in moved {
            let Some(mut entry) = entries.remove(&key) else {
                continue;
            };
            let rebased = entry.dn.rebase(dn, &new_dn).unwrap_or_else(|| entry.dn.clone());
            if entry.dn == *dn {
                let attr = new_dn.rdn_attribute().to_string();
                let value = new_dn.rdn_value();
                if delete_old_rdn {
                    entry.attributes.set(attr, [value.clone()]);
                } else {
                    let mut values = entry.attributes.values(&attr).to_vec();
                    if !values.iter().any(|v| values_match(v, &value)) {
                        values.push(value.clone());
                    }
                    entry.attributes.set(attr, values);
                }
                if entry.attributes.has("name") {
                    entry.attributes.set("name", [value]);
                }
            }
            entry.dn = rebased;
            entries.insert(entry.dn.normalized(), entry);
        }

        // Rewrite member references into the moved subtree
        for entry in entries.values_mut() {
            if let Some(members) = entry.attributes.get_mut("member") {
                for member in members.iter_mut() {
                    if let Some(rebased) = Dn::new(member.as_str()).rebase(dn, &new_dn) {
                        *member = rebased.to_string();
                    }
                }
            }
        }

        drop(entries);
        self.record(DirectoryWrite::ModifyDn {
            dn: dn.clone(),
            new_dn,
        });
        Ok(())
    }
}
