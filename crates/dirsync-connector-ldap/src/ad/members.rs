//! Group membership reconciliation
//!
//! Converges a group's directory membership toward the caller's declared
//! member names. The diff is computed on names; names are resolved to
//! identities only for the members that actually have to change.
//!
//! ```text
//! to_remove = (old ∩ actual) - new
//! to_add    = new - actual - old
//! drift     = actual - to_remove - new
//! ```
//!
//! `drift` is folded into `to_remove` unless unmanaged members are ignored.
//! Note that a member declared in both `old` and `new` but missing from the
//! directory is never re-added.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, instrument};

use dirsync_connector::dn::{normalize, Dn};
use dirsync_connector::error::{ConnectorError, ConnectorResult, ResultExt};
use dirsync_connector::operation::AttributeDelta;

use super::group::GroupRepository;
use super::schema::attr;

/// A set of member names compared case-insensitively.
///
/// The first spelling inserted for a name is the one kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    names: BTreeMap<String, String>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name. Returns false when an equal name was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let key = normalize(&name);
        if key.is_empty() || self.names.contains_key(&key) {
            return false;
        }
        self.names.insert(key, name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&normalize(name))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(&normalize(name)).is_some()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names as first inserted, ordered by their normalized form.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    /// Owned names, ordered by their normalized form.
    pub fn names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }

    /// Members of `self` not in `other`.
    #[must_use]
    pub fn difference(&self, other: &MemberSet) -> MemberSet {
        self.filtered(|key| !other.names.contains_key(key))
    }

    /// Members of `self` also in `other`, spelled as in `self`.
    #[must_use]
    pub fn intersection(&self, other: &MemberSet) -> MemberSet {
        self.filtered(|key| other.names.contains_key(key))
    }

    /// Members of either set; `self` wins on spelling.
    #[must_use]
    pub fn union(&self, other: &MemberSet) -> MemberSet {
        let mut names = other.names.clone();
        names.extend(self.names.iter().map(|(k, v)| (k.clone(), v.clone())));
        MemberSet { names }
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> MemberSet {
        MemberSet {
            names: self
                .names
                .iter()
                .filter(|(key, _)| keep(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for MemberSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = MemberSet::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for MemberSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

/// Names to add to and remove from a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub to_add: MemberSet,
    /// Includes `drift` unless unmanaged members are ignored.
    pub to_remove: MemberSet,
    /// Actual members neither declared nor already being removed.
    pub drift: MemberSet,
}

impl MembershipDelta {
    /// True when no write is needed.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff actual group membership against the old and new declarations.
pub fn compute_membership_delta(
    actual: &MemberSet,
    old: &MemberSet,
    new: &MemberSet,
    ignore_unmanaged: bool,
) -> MembershipDelta {
    let mut to_remove = actual.intersection(old).difference(new);
    let to_add = new.difference(actual).difference(old);
    let drift = actual.difference(&to_remove).difference(new);

    if !ignore_unmanaged {
        to_remove = to_remove.union(&drift);
    }

    MembershipDelta {
        to_add,
        to_remove,
        drift,
    }
}

/// The members reported for a group read.
///
/// When unmanaged members are ignored only declared members that are
/// actually present count; otherwise every actual member does.
pub fn managed_members(actual: &MemberSet, declared: &MemberSet, ignore_unmanaged: bool) -> MemberSet {
    if ignore_unmanaged {
        actual.intersection(declared)
    } else {
        actual.clone()
    }
}

/// Reconciliation phases, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    ReadingActualState,
    ComputingDeltas,
    ResolvingIdentities,
    Applying,
    NoOpConverged,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ReconcilePhase::ReadingActualState => "reading actual state",
            ReconcilePhase::ComputingDeltas => "computing deltas",
            ReconcilePhase::ResolvingIdentities => "resolving identities",
            ReconcilePhase::Applying => "applying",
            ReconcilePhase::NoOpConverged => "converged",
        };
        f.write_str(phase)
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to change; no write was issued.
    Unchanged,
    /// One modify was issued.
    Applied { added: Vec<Dn>, removed: Vec<Dn> },
}

impl ReconcileOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReconcileOutcome::Unchanged)
    }
}

/// Membership reconciler.
#[derive(Debug, Clone)]
pub struct MembershipReconciler {
    groups: GroupRepository,
}

impl MembershipReconciler {
    pub fn new(groups: GroupRepository) -> Self {
        Self { groups }
    }

    /// Converge the members of the group at `group_dn`.
    ///
    /// Every read happens before the single write. Any member name that
    /// cannot be resolved fails the whole call with `UnresolvedMembers`
    /// listing all of them, and nothing is written.
    #[instrument(skip(self, old, new), fields(group = %group_dn, old = %old, new = %new))]
    pub async fn reconcile(
        &self,
        group_dn: &Dn,
        old: &MemberSet,
        new: &MemberSet,
        ignore_unmanaged: bool,
    ) -> ConnectorResult<ReconcileOutcome> {
        let label = |phase: ReconcilePhase| format!("reconcile members of {group_dn}: {phase}");
        let store = self.groups.store();

        if !store
            .exists(group_dn)
            .await
            .context(|| label(ReconcilePhase::ReadingActualState))?
        {
            return Err(ConnectorError::not_found(group_dn.to_string())
                .with_context(label(ReconcilePhase::ReadingActualState)));
        }
        let actual = self
            .groups
            .member_names(group_dn)
            .await
            .context(|| label(ReconcilePhase::ReadingActualState))?;

        let delta = compute_membership_delta(&actual, old, new, ignore_unmanaged);
        debug!(
            phase = %ReconcilePhase::ComputingDeltas,
            actual = %actual,
            to_add = %delta.to_add,
            to_remove = %delta.to_remove,
            drift = %delta.drift,
            "membership delta computed"
        );

        if delta.is_empty() {
            debug!(phase = %ReconcilePhase::NoOpConverged, "membership already converged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let (added, mut unresolved) = self
            .groups
            .lookup_identities(&delta.to_add)
            .await
            .context(|| label(ReconcilePhase::ResolvingIdentities))?;
        let (removed, unresolved_removals) = self
            .groups
            .lookup_identities(&delta.to_remove)
            .await
            .context(|| label(ReconcilePhase::ResolvingIdentities))?;
        unresolved.extend(unresolved_removals);
        if !unresolved.is_empty() {
            return Err(ConnectorError::unresolved(unresolved)
                .with_context(label(ReconcilePhase::ResolvingIdentities)));
        }

        let mut changes = AttributeDelta::new();
        if !added.is_empty() {
            changes.add(attr::MEMBER, added.iter().map(Dn::to_string));
        }
        if !removed.is_empty() {
            changes.remove(attr::MEMBER, removed.iter().map(Dn::to_string));
        }
        store
            .update_deltas(group_dn, None, &changes)
            .await
            .context(|| label(ReconcilePhase::Applying))?;

        info!(added = added.len(), removed = removed.len(), "group membership updated");
        Ok(ReconcileOutcome::Applied { added, removed })
    }
}
