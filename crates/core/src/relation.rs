//! Event/calendar membership diffing
//!
//! Membership updates are applied as minimal add/remove sets, never as a
//! delete-and-reinsert: wholesale replacement would drop `external_ref`
//! columns on untouched rows and cause an observable flicker on clients.

use std::collections::HashSet;

/// Minimal membership change set for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl MembershipDiff {
    /// True when the desired set already matches the current one.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of membership writes this diff will issue.
    pub fn write_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compute the symmetric difference between the current and desired calendar
/// sets of one event.
///
/// Pure function over two id sets; never touches storage. Callers must
/// reject an empty `desired` set before calling (an event with zero
/// memberships violates the non-empty invariant and is deleted, not kept).
/// Duplicate ids in either input are ignored; input order is preserved in
/// the output.
pub fn diff_membership(current: &[String], desired: &[String]) -> MembershipDiff {
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let to_add = desired
        .iter()
        .filter(|id| !current_set.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let to_remove = current
        .iter()
        .filter(|id| !desired_set.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    MembershipDiff { to_add, to_remove }
}
